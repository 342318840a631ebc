//! HTTP surface: job submission, status and result endpoints.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod routes;

pub use config::ApiConfig;
pub use error::ApiError;
pub use orchestrator::Orchestrator;
pub use routes::create_router;
