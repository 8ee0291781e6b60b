//! Record store port.

use async_trait::async_trait;
use thiserror::Error;

/// Key prefix for session → meeting mappings.
pub const MAPPING_KEY_PREFIX: &str = "game:";

/// Key prefix for session records (keyed by meeting ID).
pub const SESSION_KEY_PREFIX: &str = "session:";

/// Store key for the mapping of a client-facing session ID.
pub fn mapping_key(session_id: &str) -> String {
    format!("{MAPPING_KEY_PREFIX}{session_id}")
}

/// Store key for the session record backed by a meeting.
pub fn session_key(meeting_id: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{meeting_id}")
}

/// Errors raised by a record store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable, quota exceeded, or a command failed.
    #[error("store backend error: {0}")]
    Backend(String),

    /// The backend returned something the adapter could not interpret.
    #[error("unexpected store response: {0}")]
    Protocol(String),
}

/// A stored value together with its version.
///
/// Versions increase by one on every write to a key. A value written by a
/// client that does not maintain versions reads back as version 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: String,
    pub version: u64,
}

/// Result of a conditional put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The value was written; carries the new version.
    Written { version: u64 },
    /// The stored version did not match the expected one. Nothing was written.
    Conflict,
}

/// Key-value store with per-key versions and a conditional put.
///
/// No cross-key atomicity is offered. Callers order their writes and rely on
/// `put_if_version` to detect concurrent modification of a single key.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read a key. Returns `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError>;

    /// Unconditionally write a key. Returns the new version.
    async fn put(&self, key: &str, value: &str) -> Result<u64, StoreError>;

    /// Write a key only if its current version equals `expected`.
    ///
    /// `expected = None` means the key must not exist.
    async fn put_if_version(
        &self,
        key: &str,
        value: &str,
        expected: Option<u64>,
    ) -> Result<PutOutcome, StoreError>;

    /// Check backend connectivity.
    async fn ping(&self) -> Result<(), StoreError>;
}
