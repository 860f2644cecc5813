//! Delivery Worker - Entry Point
//!
//! Consumes outbox events from the queue and dispatches them per channel.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    courier_delivery_worker::run().await
}
