//! Outbox Dispatcher - Entry Point
//!
//! Poller process bridging the outbox table to the queue transport.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    courier_outbox_dispatcher::run().await
}
