//! Service layer for the voice chat service.
//!
//! # Components
//!
//! - `mode` - Per-request mock/real mode selection
//! - `provider_client` - HTTP client for the RealtimeKit meetings API
//! - `mapping_resolver` - Session ID → meeting ID resolution with stale-mock detection
//! - `session_reconciler` - Loads session records and repairs meeting ID drift
//! - `session_service` - Create and join workflows

pub mod mapping_resolver;
pub mod mode;
pub mod provider_client;
pub mod session_reconciler;
pub mod session_service;

pub use mapping_resolver::{MappingResolver, Resolution};
pub use mode::{ModeSelector, ModeSwitch, RealtimeMode};
pub use provider_client::mock::MockMeetingProvider;
pub use provider_client::{MeetingProvider, ProviderError, RealtimeKitClient};
pub use session_reconciler::{Reconciled, SessionReconciler};
pub use session_service::SessionService;
