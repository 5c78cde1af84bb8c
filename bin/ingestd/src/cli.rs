use clap::Parser;
use ingestr_config::Config;

/// CLI flags mirroring the operationally-interesting subset of [`Config`].
/// Every flag is optional: environment variables (loaded via
/// [`Config::from_env`]) remain authoritative unless overridden here, and
/// `clap`'s `env` feature means a flag can also be supplied through the same
/// environment variable it overrides — CLI flags win when both are present.
#[derive(Debug, Parser)]
#[command(name = "ingestd", about = "Distributed blockchain block ingester", version)]
pub struct Cli {
    #[arg(long, env = "ETH_NODE_HOST")]
    pub eth_node_host: Option<String>,

    #[arg(long, env = "ETH_NODE_PORT")]
    pub eth_node_port: Option<String>,

    #[arg(long, env = "REDIS_ADDRESS")]
    pub redis_address: Option<String>,

    #[arg(long, env = "S3_BUCKET_URI")]
    pub s3_bucket_uri: Option<String>,

    #[arg(long, env = "SNS_TOPIC")]
    pub sns_topic: Option<String>,

    #[arg(long, env = "MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,

    #[arg(long, env = "MIN_CONFIRMATIONS")]
    pub min_confirmations: Option<u64>,

    #[arg(long, env = "WORKING_BLOCK_START")]
    pub working_block_start: Option<u64>,

    #[arg(long, env = "WORKING_BLOCK_TTL_SECONDS")]
    pub working_block_ttl_seconds: Option<u64>,
}

impl Cli {
    /// Applies every flag that was actually supplied on top of an
    /// environment-loaded [`Config`], leaving the rest untouched.
    pub fn apply_overrides(self, config: &mut Config) {
        if let Some(v) = self.eth_node_host {
            config.eth_node_host = v;
        }
        if let Some(v) = self.eth_node_port {
            config.eth_node_port = v;
        }
        if let Some(v) = self.redis_address {
            config.redis_address = v;
        }
        if let Some(v) = self.s3_bucket_uri {
            config.s3_bucket_uri = v;
        }
        if let Some(v) = self.sns_topic {
            config.sns_topic = v;
        }
        if let Some(v) = self.max_concurrency {
            config.max_concurrency = v;
        }
        if let Some(v) = self.min_confirmations {
            config.min_confirmations = v;
        }
        if let Some(v) = self.working_block_start {
            config.working_block_start = v;
        }
        if let Some(v) = self.working_block_ttl_seconds {
            config.working_block_ttl_seconds = v;
        }
    }
}
