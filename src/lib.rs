pub mod config;
pub mod engines;
pub mod error;
pub mod geo;
pub mod lifecycle;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod scoring;
pub mod urgency;

pub use config::Config;
pub use error::{AppError, AppResult};
