//! Environment-sourced configuration for the block ingester.
//!
//! Every option the core needs is a field on [`Config`], deserialized from
//! environment variables with [`envy`] (optionally preloaded from a `.env` file
//! with [`dotenvy`], for local development).

mod error;

use std::time::Duration;

use ingestr_types::BlockNumber;
use serde::Deserialize;
use tracing::debug;

pub use error::ConfigError;

fn default_redis_db() -> i64 {
    0
}

fn default_working_block_set_key() -> String {
    "ingestr:working_block_set".to_string()
}

fn default_working_time_set_key() -> String {
    "ingestr:working_time_set".to_string()
}

fn default_last_finished_block_key() -> String {
    "ingestr:last_finished_block".to_string()
}

fn default_max_concurrency() -> usize {
    10
}

fn default_new_block_timeout_ms() -> u64 {
    30_000
}

fn default_http_req_timeout_ms() -> u64 {
    10_000
}

fn default_s3_timeout_ms() -> u64 {
    10_000
}

fn default_sns_timeout_ms() -> u64 {
    10_000
}

fn default_working_block_ttl_seconds() -> u64 {
    300
}

/// Every environment-sourced option the ingester recognizes.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub eth_node_host: String,
    pub eth_node_port: String,

    pub redis_address: String,
    #[serde(default)]
    pub redis_password: String,
    #[serde(default = "default_redis_db")]
    pub redis_db: i64,
    #[serde(default = "default_working_block_set_key")]
    pub redis_working_block_set_key: String,
    #[serde(default = "default_working_time_set_key")]
    pub redis_working_time_set_key: String,
    #[serde(default = "default_last_finished_block_key")]
    pub redis_last_finished_block_key: String,

    pub s3_bucket_uri: String,
    pub sns_topic: String,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub min_confirmations: u64,

    #[serde(default = "default_new_block_timeout_ms")]
    pub new_block_timeout_ms: u64,
    #[serde(default = "default_http_req_timeout_ms")]
    pub http_req_timeout_ms: u64,
    #[serde(default = "default_s3_timeout_ms")]
    pub s3_timeout_ms: u64,
    #[serde(default = "default_sns_timeout_ms")]
    pub sns_timeout_ms: u64,

    #[serde(default)]
    pub working_block_start: BlockNumber,
    #[serde(default = "default_working_block_ttl_seconds")]
    pub working_block_ttl_seconds: u64,
}

impl Config {
    /// Loads configuration from the process environment, pre-loading a `.env`
    /// file if one is present (ignored if absent — this is a development
    /// convenience, not a requirement).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let config: Config = envy::from_env()?;
        config.validate()?;
        debug!(target: "ingestr::config", max_concurrency = config.max_concurrency, min_confirmations = config.min_confirmations, "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.eth_node_host.trim().is_empty() {
            return Err(ConfigError::Invalid("eth_node_host must not be empty".into()));
        }
        if self.eth_node_port.trim().is_empty() {
            return Err(ConfigError::Invalid("eth_node_port must not be empty".into()));
        }
        if self.redis_address.trim().is_empty() {
            return Err(ConfigError::Invalid("redis_address must not be empty".into()));
        }
        if self.s3_bucket_uri.trim().is_empty() {
            return Err(ConfigError::Invalid("s3_bucket_uri must not be empty".into()));
        }
        if self.sns_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("sns_topic must not be empty".into()));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be greater than zero".into()));
        }
        Ok(())
    }

    /// The websocket endpoint used by the tip tracker to subscribe to new heads.
    pub fn eth_ws_endpoint(&self) -> String {
        format!("ws://{}:{}", self.eth_node_host, self.eth_node_port)
    }

    /// The HTTP endpoint used for one-shot RPC calls (fetch block, fetch receipt).
    pub fn eth_http_endpoint(&self) -> String {
        format!("http://{}:{}", self.eth_node_host, self.eth_node_port)
    }

    pub fn new_block_timeout(&self) -> Duration {
        Duration::from_millis(self.new_block_timeout_ms)
    }

    pub fn http_req_timeout(&self) -> Duration {
        Duration::from_millis(self.http_req_timeout_ms)
    }

    pub fn s3_timeout(&self) -> Duration {
        Duration::from_millis(self.s3_timeout_ms)
    }

    pub fn sns_timeout(&self) -> Duration {
        Duration::from_millis(self.sns_timeout_ms)
    }

    pub fn working_block_ttl(&self) -> Duration {
        Duration::from_secs(self.working_block_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::Mutex;

    // envy reads the real process environment, so tests that touch it must not
    // run concurrently with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const REQUIRED_VARS: &[(&str, &str)] = &[
        ("ETH_NODE_HOST", "localhost"),
        ("ETH_NODE_PORT", "8545"),
        ("REDIS_ADDRESS", "localhost:6379"),
        ("S3_BUCKET_URI", "s3://blocks"),
        ("SNS_TOPIC", "arn:aws:sns:us-east-1:000000000000:blocks"),
    ];

    fn clear_env() {
        for (key, _) in REQUIRED_VARS {
            std::env::remove_var(key);
        }
        std::env::remove_var("MAX_CONCURRENCY");
        std::env::remove_var("WORKING_BLOCK_START");
        std::env::remove_var("WORKING_BLOCK_TTL_SECONDS");
    }

    #[test]
    fn loads_required_fields_and_applies_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        for (key, value) in REQUIRED_VARS {
            std::env::set_var(key, value);
        }

        let config = envy::from_env::<Config>().expect("config should load");
        assert_eq!(config.eth_node_host, "localhost");
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.working_block_ttl_seconds, 300);
        assert_eq!(config.redis_working_block_set_key, "ingestr:working_block_set");
        clear_env();
    }

    #[test]
    fn rejects_zero_max_concurrency() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        for (key, value) in REQUIRED_VARS {
            std::env::set_var(key, value);
        }
        std::env::set_var("MAX_CONCURRENCY", "0");

        let config = envy::from_env::<Config>().expect("config should load");
        assert_matches!(config.validate(), Err(ConfigError::Invalid(_)));
        clear_env();
    }

    #[test]
    fn endpoints_are_assembled_from_host_and_port() {
        let config = Config {
            eth_node_host: "geth".into(),
            eth_node_port: "8546".into(),
            redis_address: "redis:6379".into(),
            redis_password: String::new(),
            redis_db: 0,
            redis_working_block_set_key: default_working_block_set_key(),
            redis_working_time_set_key: default_working_time_set_key(),
            redis_last_finished_block_key: default_last_finished_block_key(),
            s3_bucket_uri: "s3://blocks".into(),
            sns_topic: "arn:aws:sns:us-east-1:000000000000:blocks".into(),
            max_concurrency: 10,
            min_confirmations: 12,
            new_block_timeout_ms: default_new_block_timeout_ms(),
            http_req_timeout_ms: default_http_req_timeout_ms(),
            s3_timeout_ms: default_s3_timeout_ms(),
            sns_timeout_ms: default_sns_timeout_ms(),
            working_block_start: 0,
            working_block_ttl_seconds: default_working_block_ttl_seconds(),
        };

        assert_eq!(config.eth_ws_endpoint(), "ws://geth:8546");
        assert_eq!(config.eth_http_endpoint(), "http://geth:8546");
    }
}
