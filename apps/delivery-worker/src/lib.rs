//! Delivery worker service.
//!
//! Long-polls the notification events queue, routes each event to its
//! channel dispatcher, and acknowledges only fully-routed messages so
//! redelivery stays transport-driven. Multiple instances may run
//! concurrently: they share a consumer group and the dispatch path is
//! idempotent.

use core_config::{env_or_default, env_parse_or_default, Environment, FromEnv};
use database::postgres::{self, PostgresConfig};
use database::redis::{self as redis_db, RedisConfig};
use domain_notifications::postgres::{
    PgDeviceTokenRepository, PgEmailRepository, PgNotificationRepository, PgOutboxRepository,
    PgRecipientRepository, PgSmsRepository,
};
use domain_notifications::senders::{
    MockEmailProvider, MockInAppProvider, MockPushProvider, MockSmsProvider,
};
use domain_notifications::{
    ConsumerConfig, DispatcherRegistry, EmailDispatcher, EventConsumer, InAppDispatcher,
    PushDispatcher, SmsDispatcher,
};
use message_queue::{ConsumerGroupConfig, RedisStreamConsumer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

pub async fn run() -> eyre::Result<()> {
    let _ = color_eyre::install();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    let pg_config = PostgresConfig::from_env()?;
    let db = postgres::connect_with_retry(pg_config, None).await?;

    let redis_config = RedisConfig::from_env()?;
    let redis = redis_db::connect_with_retry(&redis_config.url, None).await?;

    let destination = env_or_default("NOTIFICATION_EVENTS_DESTINATION", "notification:events");
    let group = env_or_default("NOTIFICATION_CONSUMER_GROUP", "notification_workers");

    let outbox = Arc::new(PgOutboxRepository::new(db.clone()));
    let registry = Arc::new(
        DispatcherRegistry::new()
            .register(Arc::new(EmailDispatcher::new(
                Arc::clone(&outbox),
                Arc::new(PgEmailRepository::new(db.clone())),
                Arc::new(MockEmailProvider),
            )))
            .register(Arc::new(SmsDispatcher::new(
                Arc::clone(&outbox),
                Arc::new(PgSmsRepository::new(db.clone())),
                Arc::new(MockSmsProvider),
            )))
            .register(Arc::new(PushDispatcher::new(
                Arc::clone(&outbox),
                Arc::new(PgRecipientRepository::new(db.clone())),
                Arc::new(PgNotificationRepository::new(db.clone())),
                Arc::new(PgDeviceTokenRepository::new(db.clone())),
                Arc::new(MockPushProvider),
            )))
            .register(Arc::new(InAppDispatcher::new(
                Arc::clone(&outbox),
                Arc::new(PgRecipientRepository::new(db.clone())),
                Arc::new(PgNotificationRepository::new(db)),
                Arc::new(MockInAppProvider),
            ))),
    );

    let consumer_group = ConsumerGroupConfig::new(destination, group)
        .with_claim_idle(Duration::from_secs(env_parse_or_default(
            "NOTIFICATION_CLAIM_IDLE_SECS",
            30,
        )?));
    let receiver = RedisStreamConsumer::new(redis, consumer_group);
    receiver.ensure_group().await?;

    let config = ConsumerConfig {
        max_messages: env_parse_or_default("NOTIFICATION_BATCH_SIZE", 10)?,
        wait: Duration::from_secs(env_parse_or_default("NOTIFICATION_WAIT_SECS", 20)?),
        ..ConsumerConfig::default()
    };
    let consumer = EventConsumer::new(Arc::new(receiver), registry, config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    info!("Delivery worker started");
    consumer.run(shutdown_rx).await?;
    info!("Delivery worker stopped");
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
