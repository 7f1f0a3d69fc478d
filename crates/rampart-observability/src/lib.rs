//! # rampart-observability
//!
//! Logging and metrics infrastructure for Rampart.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use metrics::describe_engine_metrics;
