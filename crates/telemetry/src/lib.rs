//! Structured logging and Prometheus metrics for the LPR workspace.

pub mod logging;
pub mod metrics;

pub use logging::{init_structured_logging, init_with_service, LogConfig, LogFormat};
pub use metrics::encode_metrics;
