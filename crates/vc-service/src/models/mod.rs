//! Voice chat service models.
//!
//! Contains the stored records (Session, Member, Mapping) and the HTTP API
//! request/response types. All JSON uses camelCase field names.

use serde::{Deserialize, Serialize};

/// Maximum number of members in a session.
pub const MAX_SESSION_MEMBERS: usize = 5;

/// Prefix carried by every mock meeting identifier.
pub const MOCK_MEETING_PREFIX: &str = "mock-";

/// Sentinel voice token returned when no real token could be issued.
pub const MOCK_TOKEN: &str = "mock-token";

/// Maximum user ID length.
pub const MAX_USER_ID_LENGTH: usize = 128;

/// Maximum icon URL length.
pub const MAX_ICON_URL_LENGTH: usize = 2048;

/// Mock meeting identifier scoped to one session.
pub fn mock_meeting_id(session_id: &str) -> String {
    format!("{MOCK_MEETING_PREFIX}meeting-{session_id}")
}

/// Whether a meeting is backed by the provider or synthesized locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingKind {
    /// Synthetic meeting; no provider resource exists.
    Mock,
    /// Meeting created at the provider.
    Real,
}

impl MeetingKind {
    /// Infer the kind from a meeting identifier.
    ///
    /// Only needed for records that predate the explicit `meetingKind` field.
    pub fn classify(meeting_id: &str) -> Self {
        if meeting_id.starts_with(MOCK_MEETING_PREFIX) {
            MeetingKind::Mock
        } else {
            MeetingKind::Real
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingKind::Mock => "mock",
            MeetingKind::Real => "real",
        }
    }
}

/// A meeting obtained for a session, either from the provider or as a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedMeeting {
    pub meeting_id: String,
    pub kind: MeetingKind,
    /// True when the provider was supposed to be used but failed.
    pub degraded: bool,
}

/// One participant in a session roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: String,

    /// Epoch milliseconds when the member was first added.
    pub joined_at: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// A voice chat room, stored at `session:{meeting_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,

    pub meeting_id: String,

    /// Explicit mock/real tag. Older records lack it and are classified by prefix.
    #[serde(default = "default_meeting_kind")]
    pub meeting_kind: MeetingKind,

    /// True when the meeting is a mock fallback for a failed provider call.
    #[serde(default)]
    pub degraded: bool,

    /// Members in join order.
    #[serde(default)]
    pub users: Vec<Member>,

    /// Epoch milliseconds.
    pub created_at: i64,
}

fn default_meeting_kind() -> MeetingKind {
    MeetingKind::Real
}

impl Session {
    /// Build an empty session around an allocated meeting.
    pub fn new(session_id: &str, meeting: &AllocatedMeeting, created_at: i64) -> Self {
        Self {
            session_id: session_id.to_string(),
            meeting_id: meeting.meeting_id.clone(),
            meeting_kind: meeting.kind,
            degraded: meeting.degraded,
            users: Vec::new(),
            created_at,
        }
    }

    /// Decode a stored session record.
    ///
    /// A record without `meetingKind` gets its kind from the meeting ID prefix.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let has_kind = value.get("meetingKind").is_some();
        let mut session: Session = serde_json::from_value(value)?;
        if !has_kind {
            session.meeting_kind = MeetingKind::classify(&session.meeting_id);
        }
        Ok(session)
    }

    pub fn is_full(&self) -> bool {
        self.users.len() >= MAX_SESSION_MEMBERS
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.users.iter().any(|member| member.user_id == user_id)
    }

    /// Append a member unless one with the same user ID already exists.
    ///
    /// Returns `true` if the roster changed.
    pub fn add_member(&mut self, user_id: &str, icon_url: Option<String>, joined_at: i64) -> bool {
        if self.has_member(user_id) {
            return false;
        }
        self.users.push(Member {
            user_id: user_id.to_string(),
            joined_at,
            icon_url,
        });
        true
    }
}

/// Indirection record from client session ID to meeting ID, stored at `game:{session_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    pub meeting_id: String,
    pub meeting_kind: MeetingKind,
}

impl Mapping {
    pub fn new(meeting: &AllocatedMeeting) -> Self {
        Self {
            meeting_id: meeting.meeting_id.clone(),
            meeting_kind: meeting.kind,
        }
    }

    /// Decode a stored mapping.
    ///
    /// Accepts the JSON form and the legacy form where the value is the bare
    /// meeting ID.
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str::<Mapping>(raw) {
            Ok(mapping) => mapping,
            Err(_) => Self {
                meeting_id: raw.to_string(),
                meeting_kind: MeetingKind::classify(raw),
            },
        }
    }
}

// ============================================================================
// HTTP API Models
// ============================================================================

/// Request body for `POST /sessions/{session_id}/join`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionRequest {
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub icon_url: Option<String>,
}

impl JoinSessionRequest {
    /// Validate the request and return the user ID as sent.
    ///
    /// Whitespace-only IDs are rejected, but a valid ID is stored verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<&str, &'static str> {
        let user_id = self.user_id.as_deref().unwrap_or_default();

        if user_id.trim().is_empty() {
            return Err("User ID is required");
        }

        if user_id.len() > MAX_USER_ID_LENGTH {
            return Err("User ID must be at most 128 characters");
        }

        if let Some(icon_url) = &self.icon_url {
            if icon_url.len() > MAX_ICON_URL_LENGTH {
                return Err("Icon URL must be at most 2048 characters");
            }
        }

        Ok(user_id)
    }
}

/// Voice credentials for the joining user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeCredentials {
    pub meeting_id: String,
    pub token: String,
    pub app_id: String,
    /// True when `token` is a sentinel because real credentials could not be issued.
    pub degraded: bool,
}

/// Response body for `POST /sessions/{session_id}/join`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionResponse {
    pub session: Session,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime: Option<RealtimeCredentials>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status ("healthy" or "unhealthy").
    pub status: String,

    /// Realtime mode currently in effect ("mock" or "real").
    pub mode: String,

    /// Record store connectivity status.
    pub store: String,
}
