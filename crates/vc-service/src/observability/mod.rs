//! Observability module for the voice chat service.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
