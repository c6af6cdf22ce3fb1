//! autotag-consumer binary.

use anyhow::Context;
use autotag_consumer::{CancellationToken, Consumer, ConsumerArgs, Controller, StompConnection};
use autotag_logging::{init_logging, LogConfig};
use autotag_repository::RestRepository;
use autotag_worker::{JobRunner, RedisStore, WorkerPool};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ConsumerArgs::parse();

    init_logging(LogConfig {
        app_name: "autotag_consumer",
        level: &args.log_level,
        format: args.log_format,
    })?;

    info!(config = ?args, "Starting autotag consumer");

    let cancel = CancellationToken::new();
    cancel
        .cancel_on_signals()
        .context("Failed to install signal handlers")?;

    let repository = RestRepository::new(args.repository_config()?)
        .context("Failed to build repository client")?;
    let store = RedisStore::connect(&args.redis_url)
        .await
        .context("Failed to connect to idempotency store")?;
    let runner = JobRunner::new(Arc::new(repository), Arc::new(store))
        .with_ttl(args.idempotency_ttl());
    let pool = WorkerPool::new(Arc::new(runner), args.worker_concurrency, args.retry_config());
    let controller = Controller::new(pool, args.worker_timeout());

    let broker = args.broker_config();
    let mut conn = StompConnection::connect(&broker)
        .await
        .with_context(|| format!("Failed to connect to broker at {}:{}", broker.host, broker.port))?;
    conn.subscribe(&broker).await?;

    Consumer::new(conn, controller).run(&cancel).await?;

    info!("Consumer stopped");
    Ok(())
}
