//! Repository layer for the voice chat service.
//!
//! Sessions and mappings live in a key-value store with no multi-key
//! transactions. Every value carries a version so read-modify-write cycles
//! can use a conditional put instead of last-write-wins.
//!
//! # Key Patterns
//!
//! - `game:{session_id}` - Mapping from client session ID to meeting ID
//! - `session:{meeting_id}` - Session record (JSON)

pub mod in_memory;
pub mod lua_scripts;
pub mod record_store;
pub mod redis_store;

pub use in_memory::InMemoryRecordStore;
pub use record_store::{
    mapping_key, session_key, PutOutcome, RecordStore, StoreError, VersionedValue,
};
pub use redis_store::RedisRecordStore;
