//! HTTP middleware for the voice chat service.

pub mod http_metrics;

pub use http_metrics::http_metrics_middleware;
