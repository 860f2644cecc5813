//! Outbox dispatcher service.
//!
//! Scheduled jobs, all running against the shared outbox table:
//! - poll & dispatch ready records to the queue (every 5s)
//! - reset records stuck in PROCESSING (hourly)
//! - delete old PROCESSED records (daily at 02:00)
//!
//! Any number of instances may run concurrently: the SKIP LOCKED claim
//! guarantees each record is handed off exactly once per cycle.

use core_config::{env_or_default, env_parse_or_default, Environment, FromEnv};
use database::postgres::{self, PostgresConfig};
use database::redis::{self as redis_db, RedisConfig};
use domain_notifications::postgres::PgOutboxRepository;
use domain_notifications::{OutboxPoller, PollerConfig};
use message_queue::RedisStreamQueue;
use migration::Migrator;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

type Poller = OutboxPoller<PgOutboxRepository, RedisStreamQueue>;

pub async fn run() -> eyre::Result<()> {
    let _ = color_eyre::install();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    let pg_config = PostgresConfig::from_env()?;
    let db = postgres::connect_with_retry(pg_config, None).await?;
    postgres::run_migrations::<Migrator>(&db, "courier").await?;

    let redis_config = RedisConfig::from_env()?;
    let redis = redis_db::connect_with_retry(&redis_config.url, None).await?;

    let config = PollerConfig::default()
        .with_destination(env_or_default(
            "NOTIFICATION_EVENTS_DESTINATION",
            "notification:events",
        ))
        .with_batch_size(env_parse_or_default("OUTBOX_BATCH_SIZE", 100)?);

    let poller: Arc<Poller> = Arc::new(OutboxPoller::new(
        Arc::new(PgOutboxRepository::new(db)),
        Arc::new(RedisStreamQueue::new(redis)),
        config,
    ));

    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| eyre::eyre!("failed to create scheduler: {e}"))?;

    add_job(&scheduler, "*/5 * * * * *", Arc::clone(&poller), |poller| async move {
        if let Err(e) = poller.poll_and_dispatch().await {
            error!(error = %e, "Outbox poll cycle failed");
        }
    })
    .await?;

    add_job(&scheduler, "0 0 * * * *", Arc::clone(&poller), |poller| async move {
        if let Err(e) = poller.reset_stuck().await {
            error!(error = %e, "Stuck-record reset failed");
        }
    })
    .await?;

    add_job(&scheduler, "0 0 2 * * *", Arc::clone(&poller), |poller| async move {
        if let Err(e) = poller.cleanup_processed().await {
            error!(error = %e, "Processed-record cleanup failed");
        }
    })
    .await?;

    scheduler
        .start()
        .await
        .map_err(|e| eyre::eyre!("failed to start scheduler: {e}"))?;

    info!("Outbox dispatcher started");
    shutdown_signal().await?;
    info!("Shutdown signal received, stopping outbox dispatcher");

    let mut scheduler = scheduler;
    scheduler
        .shutdown()
        .await
        .map_err(|e| eyre::eyre!("failed to stop scheduler: {e}"))?;

    Ok(())
}

async fn add_job<F, Fut>(
    scheduler: &JobScheduler,
    schedule: &str,
    poller: Arc<Poller>,
    task: F,
) -> eyre::Result<()>
where
    F: Fn(Arc<Poller>) -> Fut + Send + Sync + Clone + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let job = Job::new_async(schedule, move |_id, _scheduler| {
        let poller = Arc::clone(&poller);
        let task = task.clone();
        Box::pin(async move {
            task(poller).await;
        })
    })
    .map_err(|e| eyre::eyre!("invalid job schedule '{schedule}': {e}"))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| eyre::eyre!("failed to add job: {e}"))?;
    Ok(())
}

async fn shutdown_signal() -> eyre::Result<()> {
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}
