//! Loads the session a mapping points at and repairs drift.

use crate::errors::VcError;
use crate::models::{Mapping, MeetingKind, Session};
use crate::repositories::{session_key, RecordStore};
use tracing::{error, info};

/// A loaded session plus the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub session: Session,
    pub version: u64,
    /// The record disagreed with the mapping and was corrected in memory.
    /// The caller must persist it.
    pub repaired: bool,
}

/// Stateless session loader.
pub struct SessionReconciler;

impl SessionReconciler {
    /// Load `session:{mapping.meeting_id}`.
    ///
    /// Returns `None` when the record is absent.
    ///
    /// # Errors
    ///
    /// - `VcError::Store` if the read fails
    /// - `VcError::Internal` if the stored record cannot be decoded
    pub async fn reconcile(
        store: &dyn RecordStore,
        mapping: &Mapping,
    ) -> Result<Option<Reconciled>, VcError> {
        let key = session_key(&mapping.meeting_id);
        let Some(stored) = store.get(&key).await? else {
            return Ok(None);
        };

        let mut session = Session::decode(&stored.value).map_err(|e| {
            error!(target: "vc.services.session_reconciler", key = %key, error = %e, "Stored session is not valid JSON");
            VcError::Internal
        })?;

        let mut repaired = false;
        if session.meeting_id != mapping.meeting_id {
            info!(
                target: "vc.services.session_reconciler",
                session_id = %session.session_id,
                stored = %session.meeting_id,
                mapped = %mapping.meeting_id,
                "Repairing session meeting ID"
            );
            session.meeting_id = mapping.meeting_id.clone();
            repaired = true;
        }
        if session.meeting_kind != mapping.meeting_kind {
            session.meeting_kind = mapping.meeting_kind;
            if mapping.meeting_kind == MeetingKind::Real {
                session.degraded = false;
            }
            repaired = true;
        }

        Ok(Some(Reconciled {
            session,
            version: stored.version,
            repaired,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryRecordStore;

    fn mapping(meeting_id: &str) -> Mapping {
        Mapping {
            meeting_id: meeting_id.to_string(),
            meeting_kind: MeetingKind::classify(meeting_id),
        }
    }

    #[tokio::test]
    async fn test_missing_session_is_none() {
        let store = InMemoryRecordStore::new();
        let result = SessionReconciler::reconcile(&store, &mapping("real-1"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_consistent_session_is_not_repaired() {
        let store = InMemoryRecordStore::new();
        store
            .put(
                "session:real-1",
                r#"{"sessionId":"room-1","meetingId":"real-1","meetingKind":"real","degraded":false,"users":[],"createdAt":7}"#,
            )
            .await
            .unwrap();

        let reconciled = SessionReconciler::reconcile(&store, &mapping("real-1"))
            .await
            .unwrap()
            .unwrap();

        assert!(!reconciled.repaired);
        assert_eq!(reconciled.version, 1);
        assert_eq!(reconciled.session.session_id, "room-1");
        assert_eq!(reconciled.session.created_at, 7);
    }

    #[tokio::test]
    async fn test_meeting_id_drift_is_repaired() {
        let store = InMemoryRecordStore::new();
        // Legacy record whose embedded meeting ID disagrees with its key
        store
            .put(
                "session:real-1",
                r#"{"sessionId":"room-1","meetingId":"mock-meeting-id","users":[{"userId":"u1","joinedAt":1}],"createdAt":7}"#,
            )
            .await
            .unwrap();

        let reconciled = SessionReconciler::reconcile(&store, &mapping("real-1"))
            .await
            .unwrap()
            .unwrap();

        assert!(reconciled.repaired);
        assert_eq!(reconciled.session.meeting_id, "real-1");
        assert_eq!(reconciled.session.meeting_kind, MeetingKind::Real);
        assert_eq!(reconciled.session.users.len(), 1);
        // Repair is in memory only
        assert!(store
            .raw_value("session:real-1")
            .await
            .unwrap()
            .contains("mock-meeting-id"));
    }

    #[tokio::test]
    async fn test_corrupt_session_is_internal_error() {
        let store = InMemoryRecordStore::new();
        store.put("session:real-1", "{not json").await.unwrap();

        let result = SessionReconciler::reconcile(&store, &mapping("real-1")).await;
        assert!(matches!(result, Err(VcError::Internal)));
    }
}
