//! Session create and join workflows.
//!
//! # Consistency
//!
//! The store has no multi-key transactions. Every read-modify-write goes
//! through `put_if_version` against the version observed on read, and the
//! join workflow retries a bounded number of times when it loses a race.
//! Provider failures never fail a request: the workflows degrade to mock
//! identifiers and tag the result as degraded.

use crate::errors::VcError;
use crate::models::{
    mock_meeting_id, AllocatedMeeting, JoinSessionRequest, JoinSessionResponse, Mapping,
    MeetingKind, RealtimeCredentials, Session, MOCK_TOKEN,
};
use crate::observability::metrics;
use crate::repositories::{mapping_key, session_key, PutOutcome, RecordStore};
use crate::services::mapping_resolver::{MappingResolver, Resolution};
use crate::services::mode::RealtimeMode;
use crate::services::provider_client::MeetingProvider;
use crate::services::session_reconciler::SessionReconciler;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Upper bound on optimistic join attempts per request.
pub const MAX_JOIN_ATTEMPTS: usize = 5;

/// Result of one pass through the join loop.
enum JoinAttempt {
    Joined { session: Session, added: bool },
    Conflict,
}

/// Orchestrates mapping resolution, allocation, and membership updates.
pub struct SessionService {
    store: Arc<dyn RecordStore>,
    provider: Arc<dyn MeetingProvider>,
    app_id: String,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn MeetingProvider>,
        app_id: String,
    ) -> Self {
        Self {
            store,
            provider,
            app_id,
        }
    }

    /// Create a new, empty session with a generated ID.
    ///
    /// # Errors
    ///
    /// - `VcError::Store` if either write fails
    /// - `VcError::Conflict` if the generated ID is already taken
    #[instrument(skip(self), name = "vc.sessions.create")]
    pub async fn create_session(&self, mode: RealtimeMode) -> Result<Session, VcError> {
        let session_id = Uuid::new_v4().to_string();
        let meeting = self.allocate_meeting(mode, &session_id).await;
        let session = Session::new(&session_id, &meeting, now_millis());

        // Mapping first: a join that finds it before the session creates the session in place
        let mapping_json = encode(&Mapping::new(&meeting))?;
        if self
            .store
            .put_if_version(&mapping_key(&session_id), &mapping_json, None)
            .await?
            == PutOutcome::Conflict
        {
            error!(target: "vc.services.sessions", session_id = %session_id, "Generated session ID already mapped");
            return Err(VcError::Conflict("Session ID already in use".to_string()));
        }

        let session_json = encode(&session)?;
        if self
            .store
            .put_if_version(&session_key(&meeting.meeting_id), &session_json, None)
            .await?
            == PutOutcome::Conflict
        {
            error!(target: "vc.services.sessions", meeting_id = %meeting.meeting_id, "Session record already exists");
            return Err(VcError::Conflict("Session already exists".to_string()));
        }

        metrics::record_session_created(meeting.kind.as_str());
        info!(
            target: "vc.services.sessions",
            session_id = %session.session_id,
            meeting_id = %session.meeting_id,
            meeting_kind = meeting.kind.as_str(),
            degraded = session.degraded,
            "Session created"
        );

        Ok(session)
    }

    /// Add a user to a session, creating it on first join.
    ///
    /// # Errors
    ///
    /// - `VcError::BadRequest` if the request fails validation
    /// - `VcError::SessionFull` if the session already has 5 members
    /// - `VcError::Conflict` if every optimistic attempt lost a race
    /// - `VcError::Store` / `VcError::Internal` on storage failures
    #[instrument(skip(self, request), name = "vc.sessions.join")]
    pub async fn join_session(
        &self,
        mode: RealtimeMode,
        session_id: &str,
        request: &JoinSessionRequest,
    ) -> Result<JoinSessionResponse, VcError> {
        let user_id = request.validate().map_err(|reason| {
            metrics::record_session_join("invalid");
            VcError::BadRequest(reason.to_string())
        })?;

        let mut allocated: Option<AllocatedMeeting> = None;

        for attempt in 1..=MAX_JOIN_ATTEMPTS {
            let outcome = self
                .try_join(
                    mode,
                    session_id,
                    user_id,
                    request.icon_url.as_deref(),
                    &mut allocated,
                )
                .await
                .inspect_err(|e| {
                    let outcome = match e {
                        VcError::SessionFull => "full",
                        _ => "error",
                    };
                    metrics::record_session_join(outcome);
                })?;

            match outcome {
                JoinAttempt::Joined { session, added } => {
                    if let Some(orphan) = allocated
                        .as_ref()
                        .filter(|m| m.kind == MeetingKind::Real && m.meeting_id != session.meeting_id)
                    {
                        warn!(
                            target: "vc.services.sessions",
                            session_id = %session_id,
                            orphaned_meeting_id = %orphan.meeting_id,
                            "Provider meeting orphaned by concurrent allocation"
                        );
                    }

                    metrics::record_session_join(if added { "joined" } else { "rejoined" });
                    info!(
                        target: "vc.services.sessions",
                        session_id = %session_id,
                        user_id = %user_id,
                        members = session.users.len(),
                        added = added,
                        "User joined session"
                    );

                    let realtime = self.issue_credentials(mode, &session, user_id).await;
                    return Ok(JoinSessionResponse {
                        session,
                        realtime: Some(realtime),
                    });
                }
                JoinAttempt::Conflict => {
                    metrics::record_join_conflict();
                    debug!(
                        target: "vc.services.sessions",
                        session_id = %session_id,
                        attempt = attempt,
                        "Concurrent update detected, retrying join"
                    );
                }
            }
        }

        metrics::record_session_join("conflict");
        warn!(
            target: "vc.services.sessions",
            session_id = %session_id,
            attempts = MAX_JOIN_ATTEMPTS,
            "Join abandoned after repeated conflicts"
        );
        Err(VcError::Conflict(
            "Session is busy, please retry".to_string(),
        ))
    }

    /// One optimistic pass: resolve, load or allocate, check capacity, upsert, persist.
    async fn try_join(
        &self,
        mode: RealtimeMode,
        session_id: &str,
        user_id: &str,
        icon_url: Option<&str>,
        allocated: &mut Option<AllocatedMeeting>,
    ) -> Result<JoinAttempt, VcError> {
        let store = self.store.as_ref();
        let resolution = MappingResolver::resolve(store, session_id, mode).await?;

        let (mut session, session_version, mut dirty) = match &resolution {
            // The mapping is authoritative even when its session is not written yet
            Resolution::Found { mapping, .. } => {
                match SessionReconciler::reconcile(store, mapping).await? {
                    Some(reconciled) => (
                        reconciled.session,
                        Some(reconciled.version),
                        reconciled.repaired,
                    ),
                    None => {
                        debug!(
                            target: "vc.services.sessions",
                            session_id = %session_id,
                            meeting_id = %mapping.meeting_id,
                            "Mapped session not written yet, creating it"
                        );
                        let meeting = AllocatedMeeting {
                            meeting_id: mapping.meeting_id.clone(),
                            kind: mapping.meeting_kind,
                            degraded: false,
                        };
                        (Session::new(session_id, &meeting, now_millis()), None, true)
                    }
                }
            }
            Resolution::Stale { .. } | Resolution::NotFound => {
                let current = match &resolution {
                    Resolution::Stale { mapping, .. } => Some(mapping),
                    _ => None,
                };
                let meeting = match allocated.as_ref() {
                    Some(meeting) => meeting.clone(),
                    None => {
                        let meeting = self.allocate_meeting(mode, session_id).await;
                        *allocated = Some(meeting.clone());
                        meeting
                    }
                };

                let mapping = Mapping::new(&meeting);
                // A fallback to the same mock meeting leaves the mapping untouched
                if current != Some(&mapping) {
                    let mapping_json = encode(&mapping)?;
                    if self
                        .store
                        .put_if_version(
                            &mapping_key(session_id),
                            &mapping_json,
                            resolution.observed_version(),
                        )
                        .await?
                        == PutOutcome::Conflict
                    {
                        return Ok(JoinAttempt::Conflict);
                    }
                }

                // A record may already sit at the meeting key (deterministic mock IDs)
                let (mut session, version, mut dirty) =
                    match SessionReconciler::reconcile(store, &mapping).await? {
                        Some(reconciled) if reconciled.session.session_id == session_id => (
                            reconciled.session,
                            Some(reconciled.version),
                            reconciled.repaired,
                        ),
                        leftover => (
                            Session::new(session_id, &meeting, now_millis()),
                            leftover.map(|r| r.version),
                            true,
                        ),
                    };

                if session.degraded != meeting.degraded {
                    session.degraded = meeting.degraded;
                    dirty = true;
                }
                (session, version, dirty)
            }
        };

        if session.is_full() {
            info!(
                target: "vc.services.sessions",
                session_id = %session_id,
                user_id = %user_id,
                "Join rejected, session is full"
            );
            return Err(VcError::SessionFull);
        }

        let added = session.add_member(user_id, icon_url.map(str::to_string), now_millis());
        dirty |= added;

        if dirty {
            let session_json = encode(&session)?;
            if self
                .store
                .put_if_version(
                    &session_key(&session.meeting_id),
                    &session_json,
                    session_version,
                )
                .await?
                == PutOutcome::Conflict
            {
                return Ok(JoinAttempt::Conflict);
            }
        }

        Ok(JoinAttempt::Joined { session, added })
    }

    /// Obtain a meeting for a session, degrading to a mock one on provider failure.
    async fn allocate_meeting(&self, mode: RealtimeMode, session_id: &str) -> AllocatedMeeting {
        let mock = |degraded| AllocatedMeeting {
            meeting_id: mock_meeting_id(session_id),
            kind: MeetingKind::Mock,
            degraded,
        };

        match mode {
            RealtimeMode::Mock => {
                debug!(target: "vc.services.sessions", session_id = %session_id, "Mock mode, skipping provider meeting");
                mock(false)
            }
            RealtimeMode::Real => match self.provider.create_meeting(session_id).await {
                Ok(meeting_id) => AllocatedMeeting {
                    meeting_id,
                    kind: MeetingKind::Real,
                    degraded: false,
                },
                Err(e) => {
                    warn!(
                        target: "vc.services.sessions",
                        session_id = %session_id,
                        error = %e,
                        "Provider meeting creation failed, using mock meeting"
                    );
                    metrics::record_provider_fallback("create_meeting");
                    mock(true)
                }
            },
        }
    }

    /// Issue voice credentials for a persisted session.
    async fn issue_credentials(
        &self,
        mode: RealtimeMode,
        session: &Session,
        user_id: &str,
    ) -> RealtimeCredentials {
        let (token, degraded) = match (mode, session.meeting_kind) {
            (RealtimeMode::Mock, _) => (MOCK_TOKEN.to_string(), false),
            (RealtimeMode::Real, MeetingKind::Mock) => {
                warn!(
                    target: "vc.services.sessions",
                    meeting_id = %session.meeting_id,
                    "Session has no provider meeting, issuing mock token"
                );
                metrics::record_provider_fallback("create_participant");
                (MOCK_TOKEN.to_string(), true)
            }
            (RealtimeMode::Real, MeetingKind::Real) => {
                match self
                    .provider
                    .create_participant(&session.meeting_id, user_id)
                    .await
                {
                    Ok(token) => (token, false),
                    Err(e) => {
                        warn!(
                            target: "vc.services.sessions",
                            meeting_id = %session.meeting_id,
                            error = %e,
                            "Provider token issuance failed, issuing mock token"
                        );
                        metrics::record_provider_fallback("create_participant");
                        (MOCK_TOKEN.to_string(), true)
                    }
                }
            }
        };

        RealtimeCredentials {
            meeting_id: session.meeting_id.clone(),
            token,
            app_id: self.app_id.clone(),
            degraded,
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn encode<T: Serialize>(record: &T) -> Result<String, VcError> {
    serde_json::to_string(record).map_err(|e| {
        error!(target: "vc.services.sessions", error = %e, "Failed to encode record");
        VcError::Internal
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::models::MAX_SESSION_MEMBERS;
    use crate::repositories::InMemoryRecordStore;
    use crate::services::provider_client::mock::MockMeetingProvider;

    struct Fixture {
        store: InMemoryRecordStore,
        provider: Arc<MockMeetingProvider>,
        service: SessionService,
    }

    fn fixture(provider: MockMeetingProvider) -> Fixture {
        let store = InMemoryRecordStore::new();
        let provider = Arc::new(provider);
        let service = SessionService::new(
            Arc::new(store.clone()),
            provider.clone(),
            "app-1".to_string(),
        );
        Fixture {
            store,
            provider,
            service,
        }
    }

    fn join_request(user_id: &str) -> JoinSessionRequest {
        JoinSessionRequest {
            user_id: Some(user_id.to_string()),
            icon_url: None,
        }
    }

    async fn stored_session(store: &InMemoryRecordStore, session_id: &str) -> Session {
        let mapping = Mapping::decode(&store.raw_value(&mapping_key(session_id)).await.unwrap());
        Session::decode(
            &store
                .raw_value(&session_key(&mapping.meeting_id))
                .await
                .unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_in_mock_mode_never_calls_provider() {
        let f = fixture(MockMeetingProvider::accepting());

        let session = f.service.create_session(RealtimeMode::Mock).await.unwrap();

        assert_eq!(f.provider.meeting_calls(), 0);
        assert!(session.meeting_id.starts_with("mock-"));
        assert_eq!(session.meeting_kind, MeetingKind::Mock);
        assert!(!session.degraded);
        assert!(session.users.is_empty());
        assert!(Uuid::parse_str(&session.session_id).is_ok());
        assert_eq!(stored_session(&f.store, &session.session_id).await, session);
    }

    #[tokio::test]
    async fn test_create_in_real_mode_uses_session_id_as_title() {
        let f = fixture(MockMeetingProvider::accepting());

        let session = f.service.create_session(RealtimeMode::Real).await.unwrap();

        assert_eq!(f.provider.meeting_calls(), 1);
        assert_eq!(f.provider.titles(), vec![session.session_id.clone()]);
        assert_eq!(session.meeting_id, "real-meeting-1");
        assert_eq!(session.meeting_kind, MeetingKind::Real);
        assert!(!session.degraded);
    }

    #[tokio::test]
    async fn test_create_falls_back_when_provider_fails() {
        let f = fixture(MockMeetingProvider::failing());

        let session = f.service.create_session(RealtimeMode::Real).await.unwrap();

        assert_eq!(f.provider.meeting_calls(), 1);
        assert_eq!(session.meeting_id, mock_meeting_id(&session.session_id));
        assert_eq!(session.meeting_kind, MeetingKind::Mock);
        assert!(session.degraded);
    }

    #[tokio::test]
    async fn test_create_propagates_store_failure() {
        let f = fixture(MockMeetingProvider::accepting());
        f.store.set_unavailable(true);

        let result = f.service.create_session(RealtimeMode::Mock).await;
        assert!(matches!(result, Err(VcError::Store(_))));
    }

    #[tokio::test]
    async fn test_join_rejects_missing_user_id() {
        let f = fixture(MockMeetingProvider::accepting());

        let result = f
            .service
            .join_session(RealtimeMode::Mock, "room-1", &JoinSessionRequest::default())
            .await;

        assert!(matches!(result, Err(VcError::BadRequest(msg)) if msg == "User ID is required"));
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_join_unknown_session_creates_it() {
        let f = fixture(MockMeetingProvider::accepting());

        let response = f
            .service
            .join_session(RealtimeMode::Mock, "room-1", &join_request("alice"))
            .await
            .unwrap();

        assert_eq!(response.session.session_id, "room-1");
        assert_eq!(response.session.meeting_id, "mock-meeting-room-1");
        assert_eq!(response.session.users.len(), 1);
        assert_eq!(response.session.users[0].user_id, "alice");

        let realtime = response.realtime.unwrap();
        assert_eq!(realtime.token, MOCK_TOKEN);
        assert_eq!(realtime.meeting_id, "mock-meeting-room-1");
        assert_eq!(realtime.app_id, "app-1");
        assert!(!realtime.degraded);

        assert_eq!(stored_session(&f.store, "room-1").await, response.session);
        assert_eq!(f.provider.meeting_calls(), 0);
        assert_eq!(f.provider.participant_calls(), 0);
    }

    #[tokio::test]
    async fn test_joins_fill_in_order_then_reject() {
        let f = fixture(MockMeetingProvider::accepting());

        for i in 0..MAX_SESSION_MEMBERS {
            let response = f
                .service
                .join_session(RealtimeMode::Mock, "room-1", &join_request(&format!("u{i}")))
                .await
                .unwrap();
            assert_eq!(response.session.users.len(), i + 1);
        }

        let before = f.store.raw_value("session:mock-meeting-room-1").await;
        let result = f
            .service
            .join_session(RealtimeMode::Mock, "room-1", &join_request("u5"))
            .await;

        assert!(matches!(result, Err(VcError::SessionFull)));
        assert_eq!(f.store.raw_value("session:mock-meeting-room-1").await, before);

        let session = stored_session(&f.store, "room-1").await;
        let order: Vec<_> = session.users.iter().map(|m| m.user_id.as_str()).collect();
        assert_eq!(order, vec!["u0", "u1", "u2", "u3", "u4"]);
    }

    #[tokio::test]
    async fn test_rejoin_is_idempotent() {
        let f = fixture(MockMeetingProvider::accepting());

        let first = f
            .service
            .join_session(RealtimeMode::Mock, "room-1", &join_request("alice"))
            .await
            .unwrap();
        let version_after_first = f
            .store
            .get("session:mock-meeting-room-1")
            .await
            .unwrap()
            .unwrap()
            .version;

        let second = f
            .service
            .join_session(
                RealtimeMode::Mock,
                "room-1",
                &JoinSessionRequest {
                    user_id: Some("alice".to_string()),
                    icon_url: Some("http://icon".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(second.session.users.len(), 1);
        assert_eq!(second.session.users, first.session.users);
        let version_after_second = f
            .store
            .get("session:mock-meeting-room-1")
            .await
            .unwrap()
            .unwrap()
            .version;
        assert_eq!(version_after_first, version_after_second);
    }

    #[tokio::test]
    async fn test_create_then_join_round_trip() {
        let f = fixture(MockMeetingProvider::accepting());

        let created = f.service.create_session(RealtimeMode::Mock).await.unwrap();
        let joined = f
            .service
            .join_session(RealtimeMode::Mock, &created.session_id, &join_request("alice"))
            .await
            .unwrap();

        assert_eq!(joined.session.session_id, created.session_id);
        assert_eq!(joined.session.created_at, created.created_at);
        assert_eq!(joined.session.meeting_id, created.meeting_id);
        assert_eq!(joined.session.users.len(), 1);
    }

    #[tokio::test]
    async fn test_real_mode_join_issues_provider_token() {
        let f = fixture(MockMeetingProvider::accepting());

        let created = f.service.create_session(RealtimeMode::Real).await.unwrap();
        let joined = f
            .service
            .join_session(RealtimeMode::Real, &created.session_id, &join_request("alice"))
            .await
            .unwrap();

        let realtime = joined.realtime.unwrap();
        assert_eq!(realtime.meeting_id, "real-meeting-1");
        assert_eq!(realtime.token, "token-real-meeting-1-alice");
        assert!(!realtime.degraded);
        assert_eq!(f.provider.meeting_calls(), 1);
        assert_eq!(f.provider.participant_calls(), 1);
    }

    #[tokio::test]
    async fn test_real_mode_token_failure_degrades() {
        let f = fixture(MockMeetingProvider::failing_participants());

        let joined = f
            .service
            .join_session(RealtimeMode::Real, "room-1", &join_request("alice"))
            .await
            .unwrap();

        assert_eq!(joined.session.meeting_kind, MeetingKind::Real);
        let realtime = joined.realtime.unwrap();
        assert_eq!(realtime.token, MOCK_TOKEN);
        assert!(realtime.degraded);
        assert_eq!(f.provider.participant_calls(), 1);
    }

    #[tokio::test]
    async fn test_real_mode_provider_down_degrades_without_token_call() {
        let f = fixture(MockMeetingProvider::failing());

        let joined = f
            .service
            .join_session(RealtimeMode::Real, "room-1", &join_request("alice"))
            .await
            .unwrap();

        assert_eq!(joined.session.meeting_id, "mock-meeting-room-1");
        assert!(joined.session.degraded);
        let realtime = joined.realtime.unwrap();
        assert_eq!(realtime.token, MOCK_TOKEN);
        assert!(realtime.degraded);
        assert_eq!(f.provider.participant_calls(), 0);
    }

    #[tokio::test]
    async fn test_mock_mapping_is_reallocated_in_real_mode() {
        let f = fixture(MockMeetingProvider::accepting());

        f.service
            .join_session(RealtimeMode::Mock, "room-1", &join_request("alice"))
            .await
            .unwrap();

        let joined = f
            .service
            .join_session(RealtimeMode::Real, "room-1", &join_request("bob"))
            .await
            .unwrap();

        assert_eq!(joined.session.meeting_id, "real-meeting-1");
        assert_eq!(joined.session.meeting_kind, MeetingKind::Real);
        assert_eq!(f.provider.titles(), vec!["room-1".to_string()]);

        let mapping = Mapping::decode(&f.store.raw_value("game:room-1").await.unwrap());
        assert_eq!(mapping.meeting_id, "real-meeting-1");
        assert_eq!(mapping.meeting_kind, MeetingKind::Real);
        assert_eq!(stored_session(&f.store, "room-1").await, joined.session);
    }

    #[tokio::test]
    async fn test_legacy_plain_mapping_is_reallocated_in_real_mode() {
        let f = fixture(MockMeetingProvider::accepting());
        f.store.put("game:room-1", "mock-meeting-id").await.unwrap();
        f.store
            .put(
                "session:mock-meeting-id",
                r#"{"sessionId":"room-1","meetingId":"mock-meeting-id","users":[],"createdAt":1}"#,
            )
            .await
            .unwrap();

        let joined = f
            .service
            .join_session(RealtimeMode::Real, "room-1", &join_request("alice"))
            .await
            .unwrap();

        assert_eq!(joined.session.meeting_id, "real-meeting-1");
        assert_eq!(f.provider.meeting_calls(), 1);
    }

    #[tokio::test]
    async fn test_mapping_without_session_creates_it_in_place() {
        let f = fixture(MockMeetingProvider::accepting());
        f.store
            .put(
                "game:room-1",
                r#"{"meetingId":"real-pending","meetingKind":"real"}"#,
            )
            .await
            .unwrap();

        let joined = f
            .service
            .join_session(RealtimeMode::Real, "room-1", &join_request("alice"))
            .await
            .unwrap();

        assert_eq!(joined.session.meeting_id, "real-pending");
        assert_eq!(joined.session.meeting_kind, MeetingKind::Real);
        assert_eq!(joined.session.users.len(), 1);
        assert_eq!(f.provider.meeting_calls(), 0);
        assert_eq!(joined.realtime.unwrap().token, "token-real-pending-alice");

        // Mapping is left as it was
        assert_eq!(f.store.get("game:room-1").await.unwrap().unwrap().version, 1);
        assert_eq!(stored_session(&f.store, "room-1").await, joined.session);
    }

    #[tokio::test]
    async fn test_degraded_fallback_is_recorded_on_reused_mock_session() {
        let f = fixture(MockMeetingProvider::failing());

        f.service
            .join_session(RealtimeMode::Mock, "room-1", &join_request("alice"))
            .await
            .unwrap();
        assert!(!stored_session(&f.store, "room-1").await.degraded);

        let joined = f
            .service
            .join_session(RealtimeMode::Real, "room-1", &join_request("bob"))
            .await
            .unwrap();

        assert_eq!(joined.session.meeting_id, "mock-meeting-room-1");
        assert!(joined.session.degraded);
        assert!(joined.realtime.unwrap().degraded);
        let stored = stored_session(&f.store, "room-1").await;
        assert!(stored.degraded);
        assert_eq!(stored.users.len(), 2);
    }

    #[tokio::test]
    async fn test_full_session_rejection_leaves_stale_mapping_untouched() {
        let f = fixture(MockMeetingProvider::failing());

        for i in 0..MAX_SESSION_MEMBERS {
            f.service
                .join_session(RealtimeMode::Mock, "room-1", &join_request(&format!("u{i}")))
                .await
                .unwrap();
        }
        let mapping_before = f.store.get("game:room-1").await.unwrap().unwrap();
        let session_before = f.store.get("session:mock-meeting-room-1").await.unwrap().unwrap();

        let result = f
            .service
            .join_session(RealtimeMode::Real, "room-1", &join_request("u5"))
            .await;

        assert!(matches!(result, Err(VcError::SessionFull)));
        assert_eq!(f.provider.meeting_calls(), 1);
        assert_eq!(
            f.store.get("game:room-1").await.unwrap().unwrap(),
            mapping_before
        );
        assert_eq!(
            f.store
                .get("session:mock-meeting-room-1")
                .await
                .unwrap()
                .unwrap(),
            session_before
        );
    }

    #[tokio::test]
    async fn test_user_ids_are_stored_verbatim() {
        let f = fixture(MockMeetingProvider::accepting());

        for user_id in ["alice", " alice"] {
            f.service
                .join_session(RealtimeMode::Mock, "room-1", &join_request(user_id))
                .await
                .unwrap();
        }

        let session = stored_session(&f.store, "room-1").await;
        let ids: Vec<_> = session.users.iter().map(|m| m.user_id.as_str()).collect();
        assert_eq!(ids, vec!["alice", " alice"]);
    }

    /// Store wrapper that parks the first conditional write to one key until released.
    struct GatedStore {
        inner: InMemoryRecordStore,
        gated_key: String,
        armed: std::sync::atomic::AtomicBool,
        reached: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    impl GatedStore {
        fn new(inner: InMemoryRecordStore, gated_key: &str) -> Self {
            Self {
                inner,
                gated_key: gated_key.to_string(),
                armed: std::sync::atomic::AtomicBool::new(true),
                reached: tokio::sync::Notify::new(),
                release: tokio::sync::Notify::new(),
            }
        }
    }

    #[async_trait::async_trait]
    impl RecordStore for GatedStore {
        async fn get(
            &self,
            key: &str,
        ) -> Result<Option<crate::repositories::VersionedValue>, crate::repositories::StoreError>
        {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &str) -> Result<u64, crate::repositories::StoreError> {
            self.inner.put(key, value).await
        }

        async fn put_if_version(
            &self,
            key: &str,
            value: &str,
            expected: Option<u64>,
        ) -> Result<PutOutcome, crate::repositories::StoreError> {
            if key == self.gated_key
                && self
                    .armed
                    .swap(false, std::sync::atomic::Ordering::SeqCst)
            {
                self.reached.notify_one();
                self.release.notified().await;
            }
            self.inner.put_if_version(key, value, expected).await
        }

        async fn ping(&self) -> Result<(), crate::repositories::StoreError> {
            self.inner.ping().await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_join_racing_a_pending_session_write_keeps_both_members() {
        let store = InMemoryRecordStore::new();
        let gated = Arc::new(GatedStore::new(store.clone(), "session:real-meeting-1"));
        let provider = Arc::new(MockMeetingProvider::accepting());
        let service = Arc::new(SessionService::new(
            gated.clone(),
            provider.clone(),
            "app-1".to_string(),
        ));

        // Alice maps room-1 to real-meeting-1, then parks before writing the session
        let alice = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .join_session(RealtimeMode::Real, "room-1", &join_request("alice"))
                    .await
            })
        };
        gated.reached.notified().await;

        let bob = service
            .join_session(RealtimeMode::Real, "room-1", &join_request("bob"))
            .await
            .unwrap();
        assert_eq!(bob.session.meeting_id, "real-meeting-1");

        gated.release.notify_one();
        let alice = alice.await.unwrap().unwrap();

        assert_eq!(alice.session.meeting_id, "real-meeting-1");
        assert_eq!(provider.meeting_calls(), 1);

        let mapping = Mapping::decode(&store.raw_value("game:room-1").await.unwrap());
        assert_eq!(mapping.meeting_id, "real-meeting-1");

        let session = stored_session(&store, "room-1").await;
        assert!(session.has_member("alice"));
        assert!(session.has_member("bob"));
        assert_eq!(session.users.len(), 2);
    }

    #[tokio::test]
    async fn test_join_propagates_store_failure() {
        let f = fixture(MockMeetingProvider::accepting());
        f.store.set_unavailable(true);

        let result = f
            .service
            .join_session(RealtimeMode::Mock, "room-1", &join_request("alice"))
            .await;
        assert!(matches!(result, Err(VcError::Store(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_below_capacity_keep_every_member() {
        let f = fixture(MockMeetingProvider::accepting());
        let created = f.service.create_session(RealtimeMode::Mock).await.unwrap();
        let service = Arc::new(f.service);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let service = service.clone();
                let session_id = created.session_id.clone();
                tokio::spawn(async move {
                    service
                        .join_session(RealtimeMode::Mock, &session_id, &join_request(&format!("u{i}")))
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let session = stored_session(&f.store, &created.session_id).await;
        assert_eq!(session.users.len(), 4);
        for i in 0..4 {
            assert!(session.has_member(&format!("u{i}")));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_never_exceed_capacity() {
        let f = fixture(MockMeetingProvider::accepting());
        let created = f.service.create_session(RealtimeMode::Mock).await.unwrap();
        let service = Arc::new(f.service);

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let service = service.clone();
                let session_id = created.session_id.clone();
                tokio::spawn(async move {
                    let user_id = format!("u{i}");
                    let result = service
                        .join_session(RealtimeMode::Mock, &session_id, &join_request(&user_id))
                        .await;
                    (user_id, result)
                })
            })
            .collect();

        let mut joined = Vec::new();
        for handle in handles {
            let (user_id, result) = handle.await.unwrap();
            match result {
                Ok(_) => joined.push(user_id),
                Err(VcError::SessionFull) | Err(VcError::Conflict(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        let session = stored_session(&f.store, &created.session_id).await;
        assert!(session.users.len() <= MAX_SESSION_MEMBERS);
        assert_eq!(session.users.len(), joined.len());
        for user_id in &joined {
            assert!(session.has_member(user_id));
        }
    }
}
