pub mod worker;
pub mod handler;
pub mod executor;
pub mod fanout;
pub mod config;

pub use worker::Worker;
pub use handler::{TaskHandler, TaskHandlerRegistry};
pub use fanout::{FanOutConfig, FanOutCoordinator};
pub use config::WorkerConfig;
