//! HTTP request handlers for the voice chat service.

pub mod health;
pub mod metrics;
pub mod sessions;

pub use health::{health_check, root};
pub use metrics::metrics_handler;
pub use sessions::{create_session, join_session};
