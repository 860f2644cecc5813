//! Redis support

mod config;
mod connector;

pub use config::RedisConfig;
pub use connector::{connect, connect_from_config, connect_with_retry};
