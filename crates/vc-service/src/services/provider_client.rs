//! RealtimeKit HTTP client.
//!
//! Creates provider meetings and issues participant tokens.
//!
//! # Behavior
//!
//! - Authenticates with HTTP Basic (`org_id:api_key`)
//! - Every call is single-shot and bounded by the configured timeout
//! - Failures are returned as `ProviderError`; callers decide how to degrade

use crate::errors::VcError;
use crate::observability::metrics;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, instrument, warn};

/// Connect timeout for provider requests in seconds.
const PROVIDER_CONNECT_TIMEOUT_SECS: u64 = 2;

/// Preset assigned to every participant.
pub const PARTICIPANT_PRESET: &str = "group_call_participant";

/// Failure talking to the meeting provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider returned status {status}")]
    Status { status: u16 },

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Short label for the `status` metric dimension.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProviderError::Unreachable(_) => "unreachable",
            ProviderError::Timeout => "timeout",
            ProviderError::Status { .. } => "status",
            ProviderError::MalformedResponse(_) => "malformed",
        }
    }
}

/// Meeting provider operations used by the workflows.
#[async_trait]
pub trait MeetingProvider: Send + Sync {
    /// Create a provider meeting and return its identifier.
    async fn create_meeting(&self, title: &str) -> Result<String, ProviderError>;

    /// Register a participant in a meeting and return their auth token.
    async fn create_participant(
        &self,
        meeting_id: &str,
        user_id: &str,
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct CreateMeetingRequest<'a> {
    title: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateParticipantRequest<'a> {
    name: &'a str,
    custom_participant_id: &'a str,
    preset_name: &'a str,
}

/// Provider responses wrap their payload in `data`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MeetingData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ParticipantData {
    token: String,
}

/// HTTP client for the RealtimeKit API.
#[derive(Clone)]
pub struct RealtimeKitClient {
    /// HTTP client with configured timeouts.
    client: Client,

    /// API base URL without trailing slash.
    base_url: String,

    org_id: String,

    api_key: SecretString,
}

impl RealtimeKitClient {
    /// Create a new provider client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API base URL (e.g., "https://api.realtime.cloudflare.com/v2")
    /// * `org_id` - Organization ID used as the Basic auth user
    /// * `api_key` - API key used as the Basic auth password
    /// * `timeout_secs` - Deadline for each call
    ///
    /// # Errors
    ///
    /// Returns `VcError::Internal` if the HTTP client cannot be built.
    pub fn new(
        base_url: String,
        org_id: String,
        api_key: SecretString,
        timeout_secs: u64,
    ) -> Result<Self, VcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(
                PROVIDER_CONNECT_TIMEOUT_SECS.min(timeout_secs),
            ))
            .build()
            .map_err(|e| {
                error!(target: "vc.services.provider_client", error = %e, "Failed to build HTTP client");
                VcError::Internal
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            org_id,
            api_key,
        })
    }

    /// POST a JSON body and decode the `data` payload of the response.
    async fn post<B, T>(&self, operation: &str, path: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();

        let result = self.send(&url, body).await;

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.as_label(),
        };
        metrics::record_provider_call(operation, status, start.elapsed());

        result
    }

    async fn send<B, T>(&self, url: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.org_id, Some(self.api_key.expose_secret()))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!(target: "vc.services.provider_client", "Provider request timed out");
                    ProviderError::Timeout
                } else {
                    warn!(target: "vc.services.provider_client", error = %e, "Provider request failed");
                    ProviderError::Unreachable(e.to_string())
                }
            })?;

        Self::handle_response(response).await
    }

    /// Map status codes to errors and decode the envelope.
    async fn handle_response<T>(response: reqwest::Response) -> Result<T, ProviderError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();

        if status.is_success() {
            let envelope: Envelope<T> = response.json().await.map_err(|e| {
                if e.is_timeout() {
                    return ProviderError::Timeout;
                }
                error!(target: "vc.services.provider_client", error = %e, "Failed to parse provider response");
                ProviderError::MalformedResponse(e.to_string())
            })?;
            return Ok(envelope.data);
        }

        if status.as_u16() == 401 {
            error!(target: "vc.services.provider_client", "Provider credentials rejected");
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(
                target: "vc.services.provider_client",
                status = %status,
                body = %body,
                "Provider returned error status"
            );
        }

        Err(ProviderError::Status {
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl MeetingProvider for RealtimeKitClient {
    #[instrument(skip(self), name = "vc.provider.create_meeting")]
    async fn create_meeting(&self, title: &str) -> Result<String, ProviderError> {
        let data: MeetingData = self
            .post("create_meeting", "/meetings", &CreateMeetingRequest { title })
            .await?;
        Ok(data.id)
    }

    #[instrument(skip(self), name = "vc.provider.create_participant")]
    async fn create_participant(
        &self,
        meeting_id: &str,
        user_id: &str,
    ) -> Result<String, ProviderError> {
        let path = format!("/meetings/{meeting_id}/participants");
        let request = CreateParticipantRequest {
            name: user_id,
            custom_participant_id: user_id,
            preset_name: PARTICIPANT_PRESET,
        };
        let data: ParticipantData = self.post("create_participant", &path, &request).await?;
        Ok(data.token)
    }
}

/// Mock provider for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Call-counting provider double.
    ///
    /// Meeting IDs are `real-meeting-{n}` and tokens are
    /// `token-{meeting_id}-{user_id}`.
    #[derive(Debug, Default)]
    pub struct MockMeetingProvider {
        fail_meetings: bool,
        fail_participants: bool,
        meeting_calls: AtomicUsize,
        participant_calls: AtomicUsize,
        titles: Mutex<Vec<String>>,
    }

    impl MockMeetingProvider {
        /// Create a mock where every call succeeds.
        pub fn accepting() -> Self {
            Self::default()
        }

        /// Create a mock where every call fails.
        pub fn failing() -> Self {
            Self {
                fail_meetings: true,
                fail_participants: true,
                ..Self::default()
            }
        }

        /// Create a mock that creates meetings but cannot issue tokens.
        pub fn failing_participants() -> Self {
            Self {
                fail_participants: true,
                ..Self::default()
            }
        }

        /// Number of `create_meeting` calls made.
        pub fn meeting_calls(&self) -> usize {
            self.meeting_calls.load(Ordering::SeqCst)
        }

        /// Number of `create_participant` calls made.
        pub fn participant_calls(&self) -> usize {
            self.participant_calls.load(Ordering::SeqCst)
        }

        /// Titles passed to `create_meeting`, in call order.
        pub fn titles(&self) -> Vec<String> {
            self.titles
                .lock()
                .map(|titles| titles.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl MeetingProvider for MockMeetingProvider {
        async fn create_meeting(&self, title: &str) -> Result<String, ProviderError> {
            let count = self.meeting_calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut titles) = self.titles.lock() {
                titles.push(title.to_string());
            }

            if self.fail_meetings {
                return Err(ProviderError::Unreachable(
                    "Mock provider error".to_string(),
                ));
            }

            Ok(format!("real-meeting-{}", count + 1))
        }

        async fn create_participant(
            &self,
            meeting_id: &str,
            user_id: &str,
        ) -> Result<String, ProviderError> {
            self.participant_calls.fetch_add(1, Ordering::SeqCst);

            if self.fail_participants {
                return Err(ProviderError::Status { status: 503 });
            }

            Ok(format!("token-{meeting_id}-{user_id}"))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout_secs: u64) -> RealtimeKitClient {
        RealtimeKitClient::new(
            format!("{}/v2/", server.uri()),
            "org-1".to_string(),
            SecretString::from("key-1".to_string()),
            timeout_secs,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_meeting_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/meetings"))
            .and(header("authorization", "Basic b3JnLTE6a2V5LTE="))
            .and(body_json(serde_json::json!({ "title": "room-1" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "success": true,
                "data": { "id": "bbb4d3a2-meeting", "title": "room-1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let meeting_id = client_for(&server, 5).create_meeting("room-1").await.unwrap();
        assert_eq!(meeting_id, "bbb4d3a2-meeting");
    }

    #[tokio::test]
    async fn test_create_participant_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/meetings/m-1/participants"))
            .and(body_json(serde_json::json!({
                "name": "alice",
                "custom_participant_id": "alice",
                "preset_name": "group_call_participant"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": { "id": "p-1", "token": "participant-token" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = client_for(&server, 5)
            .create_participant("m-1", "alice")
            .await
            .unwrap();
        assert_eq!(token, "participant-token");
    }

    #[tokio::test]
    async fn test_error_status_maps_to_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/meetings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let result = client_for(&server, 5).create_meeting("room-1").await;
        assert!(matches!(result, Err(ProviderError::Status { status: 500 })));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/meetings"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = client_for(&server, 5).create_meeting("room-1").await;
        assert!(matches!(result, Err(ProviderError::Status { status: 401 })));
    }

    #[tokio::test]
    async fn test_missing_data_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/meetings"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": {} })),
            )
            .mount(&server)
            .await;

        let result = client_for(&server, 5).create_meeting("room-1").await;
        assert!(matches!(result, Err(ProviderError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/meetings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "data": { "id": "late" } }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let result = client_for(&server, 1).create_meeting("room-1").await;
        assert!(matches!(result, Err(ProviderError::Timeout)));
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let client = RealtimeKitClient::new(
            "http://127.0.0.1:1".to_string(),
            "org-1".to_string(),
            SecretString::from("key-1".to_string()),
            2,
        )
        .unwrap();

        let result = client.create_meeting("room-1").await;
        assert!(matches!(
            result,
            Err(ProviderError::Unreachable(_)) | Err(ProviderError::Timeout)
        ));
    }

    #[test]
    fn test_error_labels() {
        assert_eq!(ProviderError::Timeout.as_label(), "timeout");
        assert_eq!(ProviderError::Status { status: 502 }.as_label(), "status");
        assert_eq!(
            ProviderError::Unreachable("x".to_string()).as_label(),
            "unreachable"
        );
        assert_eq!(
            ProviderError::MalformedResponse("x".to_string()).as_label(),
            "malformed"
        );
    }

    #[tokio::test]
    async fn test_mock_provider_counts_calls() {
        let provider = mock::MockMeetingProvider::accepting();

        assert_eq!(provider.create_meeting("a").await.unwrap(), "real-meeting-1");
        assert_eq!(provider.create_meeting("b").await.unwrap(), "real-meeting-2");
        assert_eq!(
            provider.create_participant("m", "u").await.unwrap(),
            "token-m-u"
        );

        assert_eq!(provider.meeting_calls(), 2);
        assert_eq!(provider.participant_calls(), 1);
        assert_eq!(provider.titles(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_provider_failing() {
        let provider = mock::MockMeetingProvider::failing();
        assert!(provider.create_meeting("a").await.is_err());
        assert!(provider.create_participant("m", "u").await.is_err());
        assert_eq!(provider.meeting_calls(), 1);
        assert_eq!(provider.participant_calls(), 1);
    }
}
