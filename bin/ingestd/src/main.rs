//! Process bootstrap for the block ingester: CLI/config loading, structured
//! logging, connecting to every external collaborator in sequence, and
//! wiring the Tip Tracker and Ingest Engine together until a shutdown signal
//! arrives.

mod cli;

use std::sync::Arc;

use alloy::providers::ProviderBuilder;
use aws_config::BehaviorVersion;
use clap::Parser;
use cli::Cli;
use eyre::{Context, Result};
use ingestr_cache::{BlockCache, S3BlockCache};
use ingestr_chain::{AlloyChainClient, AlloyHeadSubscriber, ChainClient, HeadSubscriber, TipTracker};
use ingestr_config::Config;
use ingestr_coordinator::{CoordinationBackend, CoordinatorKeys, RedisCoordinator};
use ingestr_engine::{Engine, EngineParams};
use ingestr_notifier::{Notifier, SnsNotifier};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("failed to load configuration")?;
    cli.apply_overrides(&mut config);

    info!(target: "ingestr::bootstrap", "starting ingestr");

    let coordinator = connect_coordinator(&config).await?;
    let cache = connect_cache(&config).await;
    let notifier = connect_notifier(&config).await;
    let (chain, subscriber) = connect_chain(&config);

    info!(target: "ingestr::bootstrap", "subscribing to new heads");
    let (tracker, tip) = TipTracker::new(subscriber);
    let tracker = tracker.connect().await.context("initial subscription to the chain's new-heads stream failed")?;

    let shutdown = CancellationToken::new();

    let tracker_shutdown = shutdown.clone();
    let tracker_handle = tokio::spawn(async move { tracker.run(tracker_shutdown).await });

    let params = EngineParams {
        max_concurrency: config.max_concurrency,
        min_confirmations: config.min_confirmations,
        working_block_start: config.working_block_start,
        working_block_ttl_seconds: config.working_block_ttl_seconds as i64,
    };
    let engine = Engine::new(coordinator, cache, notifier, chain, tip, params);

    let engine_shutdown = shutdown.clone();
    let engine_handle = tokio::spawn(engine.run(engine_shutdown));

    info!(target: "ingestr::bootstrap", "ingestr is running");
    wait_for_shutdown_signal().await;
    info!(target: "ingestr::bootstrap", "shutdown signal received, stopping");
    shutdown.cancel();

    if let Err(err) = tracker_handle.await {
        error!(target: "ingestr::bootstrap", error = %err, "tip tracker task panicked");
    }
    if let Err(err) = engine_handle.await {
        error!(target: "ingestr::bootstrap", error = %err, "ingest engine task panicked");
    }

    info!(target: "ingestr::bootstrap", "clean shutdown");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect_coordinator(config: &Config) -> Result<Arc<dyn CoordinationBackend>> {
    info!(target: "ingestr::bootstrap", "connecting to redis");
    let pool_config = deadpool_redis::Config::from_url(redis_url(config));
    let pool = pool_config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .context("invalid redis connection parameters")?;

    // Every transactional call checks out its own connection from this pool
    // (see ingestr_coordinator::RedisCoordinator), so a dedicated physical
    // connection's WATCH/MULTI/EXEC sequence never interleaves with another
    // caller's. Check one out now so a misconfigured or unreachable Redis
    // fails startup fatally rather than on the first claim.
    let mut conn = pool.get().await.context("failed to connect to redis")?;
    redis::cmd("PING").query_async::<_, String>(&mut conn).await.context("redis did not respond to PING")?;

    let keys = CoordinatorKeys {
        block_set: config.redis_working_block_set_key.clone(),
        time_set: config.redis_working_time_set_key.clone(),
        last_finished: config.redis_last_finished_block_key.clone(),
    };
    Ok(Arc::new(RedisCoordinator::new(pool, keys)))
}

fn redis_url(config: &Config) -> String {
    if config.redis_password.is_empty() {
        format!("redis://{}/{}", config.redis_address, config.redis_db)
    } else {
        format!("redis://:{}@{}/{}", config.redis_password, config.redis_address, config.redis_db)
    }
}

async fn connect_cache(config: &Config) -> Arc<dyn BlockCache> {
    info!(target: "ingestr::bootstrap", "connecting to object store");
    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let client = aws_sdk_s3::Client::new(&aws_config);
    Arc::new(S3BlockCache::new(client, &config.s3_bucket_uri, config.s3_timeout()))
}

async fn connect_notifier(config: &Config) -> Arc<dyn Notifier> {
    info!(target: "ingestr::bootstrap", "connecting to pub/sub broker");
    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let client = aws_sdk_sns::Client::new(&aws_config);
    Arc::new(SnsNotifier::new(client, config.sns_topic.clone(), config.sns_timeout()))
}

fn connect_chain(config: &Config) -> (Arc<dyn ChainClient>, Arc<dyn HeadSubscriber>) {
    info!(target: "ingestr::bootstrap", "establishing connection to ethereum node");
    let http_provider = ProviderBuilder::new().on_http(
        config.eth_http_endpoint().parse().expect("eth_http_endpoint is built from validated host/port config"),
    );
    let chain: Arc<dyn ChainClient> =
        Arc::new(AlloyChainClient::new(http_provider, config.eth_ws_endpoint(), config.new_block_timeout(), config.http_req_timeout()));
    let subscriber: Arc<dyn HeadSubscriber> =
        Arc::new(AlloyHeadSubscriber::new(config.eth_ws_endpoint(), config.new_block_timeout()));
    (chain, subscriber)
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
