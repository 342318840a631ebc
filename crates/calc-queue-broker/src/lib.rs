pub mod broker;
pub mod queue;
pub mod config;
pub mod metrics;

pub use broker::Broker;
pub use config::BrokerConfig;
