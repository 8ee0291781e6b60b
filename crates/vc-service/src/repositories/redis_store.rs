//! Redis-backed record store.
//!
//! # Key Patterns
//!
//! - `{key}` - Record value (JSON or plain string)
//! - `{key}:version` - Monotonic version counter for the record
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently, so every operation clones it instead of locking.
//!
//! Reads fetch the value and its version in one MULTI/EXEC transaction.
//! Writes go through the Lua scripts in `lua_scripts`.

use super::lua_scripts::{self, EXPECT_ABSENT};
use super::record_store::{PutOutcome, RecordStore, StoreError, VersionedValue};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use tracing::{debug, error, instrument, warn};

/// Version counter key for a record key.
fn version_key(key: &str) -> String {
    format!("{key}:version")
}

/// Record store backed by Redis.
#[derive(Clone)]
pub struct RedisRecordStore {
    connection: MultiplexedConnection,
    conditional_put_script: Script,
    versioned_put_script: Script,
}

impl RedisRecordStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the client cannot be opened or the
    /// connection cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Do NOT log redis_url, it may contain credentials
            error!(target: "vc.repositories.redis", error = %e, "Failed to open Redis client");
            StoreError::Backend(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "vc.repositories.redis", error = %e, "Failed to connect to Redis");
                StoreError::Backend(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            connection,
            conditional_put_script: Script::new(lua_scripts::CONDITIONAL_PUT),
            versioned_put_script: Script::new(lua_scripts::VERSIONED_PUT),
        })
    }
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    #[instrument(skip(self), name = "vc.repo.get")]
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        let mut conn = self.connection.clone();

        // MULTI/EXEC so the value and its version come from the same point in time
        let (value, version): (Option<String>, Option<u64>) = redis::pipe()
            .atomic()
            .get(key)
            .get(version_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(target: "vc.repositories.redis", error = %e, key = %key, "Failed to read record");
                StoreError::Backend(format!("Failed to read {key}: {e}"))
            })?;

        Ok(value.map(|value| VersionedValue {
            value,
            version: version.unwrap_or(0),
        }))
    }

    #[instrument(skip(self, value), name = "vc.repo.put")]
    async fn put(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection.clone();

        let version: i64 = self
            .versioned_put_script
            .key(key)
            .key(version_key(key))
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(target: "vc.repositories.redis", error = %e, key = %key, "Failed to write record");
                StoreError::Backend(format!("Failed to write {key}: {e}"))
            })?;

        u64::try_from(version)
            .map_err(|_| StoreError::Protocol(format!("negative version {version} for {key}")))
    }

    #[instrument(skip(self, value), name = "vc.repo.put_if_version")]
    async fn put_if_version(
        &self,
        key: &str,
        value: &str,
        expected: Option<u64>,
    ) -> Result<PutOutcome, StoreError> {
        let mut conn = self.connection.clone();
        let expected_arg = expected.map_or_else(|| EXPECT_ABSENT.to_string(), |v| v.to_string());

        let result: i64 = self
            .conditional_put_script
            .key(key)
            .key(version_key(key))
            .arg(&expected_arg)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(target: "vc.repositories.redis", error = %e, key = %key, "Conditional write failed");
                StoreError::Backend(format!("Failed to write {key}: {e}"))
            })?;

        match result {
            0 => {
                debug!(target: "vc.repositories.redis", key = %key, expected = %expected_arg, "Version conflict");
                Ok(PutOutcome::Conflict)
            }
            v if v > 0 => Ok(PutOutcome::Written { version: v as u64 }),
            _ => {
                error!(target: "vc.repositories.redis", key = %key, result = result, "Invalid version format in Redis");
                Err(StoreError::Protocol(format!("invalid version for {key}")))
            }
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("PING failed: {e}")))?;
        Ok(())
    }
}
