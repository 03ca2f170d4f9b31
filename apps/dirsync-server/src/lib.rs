//! dirsync service.
//!
//! Exposes the sync entry points and the deletion webhook over HTTP, runs
//! the scheduled sync and audit, and (with the `kafka` feature) consumes
//! deletion messages from the bus.

pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
