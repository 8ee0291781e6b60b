//! Session ID → meeting ID resolution.
//!
//! The resolver only reads. Writing a replacement mapping is the join
//! workflow's job, using the version observed here.

use crate::models::{Mapping, MeetingKind};
use crate::repositories::{mapping_key, RecordStore, StoreError};
use crate::services::mode::RealtimeMode;
use tracing::warn;

/// Outcome of looking up a session's mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Usable mapping.
    Found { mapping: Mapping, version: u64 },
    /// Mock mapping seen in real mode; must be reallocated.
    Stale { mapping: Mapping, version: u64 },
    /// No mapping stored.
    NotFound,
}

impl Resolution {
    /// Version to pass as `expected` when replacing the mapping.
    pub fn observed_version(&self) -> Option<u64> {
        match self {
            Resolution::Found { version, .. } | Resolution::Stale { version, .. } => {
                Some(*version)
            }
            Resolution::NotFound => None,
        }
    }
}

/// Stateless mapping lookup.
pub struct MappingResolver;

impl MappingResolver {
    /// Look up the mapping for `session_id` under the given mode.
    pub async fn resolve(
        store: &dyn RecordStore,
        session_id: &str,
        mode: RealtimeMode,
    ) -> Result<Resolution, StoreError> {
        let Some(stored) = store.get(&mapping_key(session_id)).await? else {
            return Ok(Resolution::NotFound);
        };

        let mapping = Mapping::decode(&stored.value);

        if mode == RealtimeMode::Real && mapping.meeting_kind == MeetingKind::Mock {
            warn!(
                target: "vc.services.mapping_resolver",
                session_id = %session_id,
                meeting_id = %mapping.meeting_id,
                "Mock meeting mapped in real mode, reallocating"
            );
            return Ok(Resolution::Stale {
                mapping,
                version: stored.version,
            });
        }

        Ok(Resolution::Found {
            mapping,
            version: stored.version,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryRecordStore;

    #[tokio::test]
    async fn test_missing_mapping_is_not_found() {
        let store = InMemoryRecordStore::new();

        let resolution = MappingResolver::resolve(&store, "room-1", RealtimeMode::Real)
            .await
            .unwrap();

        assert_eq!(resolution, Resolution::NotFound);
        assert_eq!(resolution.observed_version(), None);
    }

    #[tokio::test]
    async fn test_real_mapping_is_found_in_either_mode() {
        let store = InMemoryRecordStore::new();
        store
            .put(
                "game:room-1",
                r#"{"meetingId":"real-1","meetingKind":"real"}"#,
            )
            .await
            .unwrap();

        for mode in [RealtimeMode::Real, RealtimeMode::Mock] {
            let resolution = MappingResolver::resolve(&store, "room-1", mode)
                .await
                .unwrap();
            assert!(
                matches!(&resolution, Resolution::Found { mapping, version: 1 } if mapping.meeting_id == "real-1")
            );
        }
    }

    #[tokio::test]
    async fn test_mock_mapping_is_stale_in_real_mode() {
        let store = InMemoryRecordStore::new();
        store
            .put("game:room-1", "mock-meeting-id")
            .await
            .unwrap();

        let resolution = MappingResolver::resolve(&store, "room-1", RealtimeMode::Real)
            .await
            .unwrap();

        assert!(matches!(
            &resolution,
            Resolution::Stale { mapping, version: 1 } if mapping.meeting_kind == MeetingKind::Mock
        ));
        assert_eq!(resolution.observed_version(), Some(1));
    }

    #[tokio::test]
    async fn test_mock_mapping_is_found_in_mock_mode() {
        let store = InMemoryRecordStore::new();
        store
            .put(
                "game:room-1",
                r#"{"meetingId":"mock-meeting-room-1","meetingKind":"mock"}"#,
            )
            .await
            .unwrap();

        let resolution = MappingResolver::resolve(&store, "room-1", RealtimeMode::Mock)
            .await
            .unwrap();

        assert!(matches!(resolution, Resolution::Found { .. }));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = InMemoryRecordStore::new();
        store.set_unavailable(true);

        let result = MappingResolver::resolve(&store, "room-1", RealtimeMode::Mock).await;
        assert!(result.is_err());
    }
}
