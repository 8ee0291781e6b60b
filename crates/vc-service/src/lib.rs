//! Voice Chat Session Service Library
//!
//! Small groups join an ad-hoc voice chat session keyed by a client-chosen
//! room identifier. The service maps each session to a meeting owned by the
//! RealtimeKit provider, creates that meeting once, and degrades to mock
//! identifiers when the provider is unavailable.
//!
//! # Architecture
//!
//! Handler -> Service -> Repository:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Stored records and API types
//! - `observability` - Prometheus metrics
//! - `repositories` - Versioned key-value record store (in-memory, Redis)
//! - `routes` - Axum router setup
//! - `services` - Mode selection, provider client, create/join workflows

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
