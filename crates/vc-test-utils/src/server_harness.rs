//! Test server harness for E2E testing
//!
//! Provides `TestVcServer` for spawning real voice chat server instances
//! backed by an in-memory record store.

use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use vc_service::config::Config;
use vc_service::repositories::{InMemoryRecordStore, RecordStore};
use vc_service::routes::{self, init_metrics_recorder, AppState};
use vc_service::services::{
    MeetingProvider, MockMeetingProvider, ModeSelector, ModeSwitch, RealtimeKitClient,
    RealtimeMode, SessionService,
};

/// App ID configured on every test server.
pub const TEST_APP_ID: &str = "test-app-id";

static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global recorder once per process; later callers share it.
fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder().unwrap_or_else(|_| {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .build_recorder()
                    .handle()
            })
        })
        .clone()
}

/// Test harness for spawning the voice chat server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> Result<()> {
///     let server = TestVcServer::spawn(RealtimeMode::Mock).await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestVcServer {
    addr: SocketAddr,
    store: InMemoryRecordStore,
    mode_switch: ModeSwitch,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestVcServer {
    /// Spawn a server whose provider is an always-succeeding mock.
    pub async fn spawn(mode: RealtimeMode) -> Result<Self, anyhow::Error> {
        Self::spawn_with_provider(mode, Arc::new(MockMeetingProvider::accepting())).await
    }

    /// Spawn a server that talks to a real HTTP provider at `base_url`
    /// (typically a wiremock server).
    pub async fn spawn_with_provider_url(
        mode: RealtimeMode,
        base_url: &str,
    ) -> Result<Self, anyhow::Error> {
        let config = test_config(Some(base_url))?;
        let provider = RealtimeKitClient::new(
            config.realtime_api_base_url.clone(),
            config.realtime_org_id.clone(),
            config.realtime_api_key.clone(),
            config.realtime_timeout_seconds,
        )
        .map_err(|e| anyhow::anyhow!("Failed to create provider client: {}", e))?;

        Self::start(mode, config, Arc::new(provider)).await
    }

    /// Spawn a server with a caller-supplied provider.
    pub async fn spawn_with_provider(
        mode: RealtimeMode,
        provider: Arc<dyn MeetingProvider>,
    ) -> Result<Self, anyhow::Error> {
        let config = test_config(None)?;
        Self::start(mode, config, provider).await
    }

    async fn start(
        mode: RealtimeMode,
        config: Config,
        provider: Arc<dyn MeetingProvider>,
    ) -> Result<Self, anyhow::Error> {
        let store = InMemoryRecordStore::new();
        let store_dyn: Arc<dyn RecordStore> = Arc::new(store.clone());

        let sessions = Arc::new(SessionService::new(
            store_dyn.clone(),
            provider,
            config.realtime_app_id.clone(),
        ));

        let (mode_switch, selector) = ModeSelector::channel(mode);

        let state = Arc::new(AppState {
            store: store_dyn,
            sessions,
            mode: selector,
        });

        // Build routes using vc-service's real route builder
        let app = routes::build_routes(state, test_metrics_handle());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            store,
            mode_switch,
            config,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the in-memory store behind the server.
    pub fn store(&self) -> &InMemoryRecordStore {
        &self.store
    }

    /// Change the realtime mode for subsequent requests.
    pub fn set_mode(&self, mode: RealtimeMode) {
        self.mode_switch.set(mode);
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestVcServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

fn test_config(provider_base_url: Option<&str>) -> Result<Config, anyhow::Error> {
    let mut vars = HashMap::from([
        (
            "REDIS_URL".to_string(),
            "redis://localhost:6379".to_string(),
        ),
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ("REALTIME_ORG_ID".to_string(), "test-org".to_string()),
        ("REALTIME_API_KEY".to_string(), "test-key".to_string()),
        ("REALTIME_KIT_APP_ID".to_string(), TEST_APP_ID.to_string()),
        ("REALTIME_TIMEOUT_SECONDS".to_string(), "2".to_string()),
    ]);
    if let Some(url) = provider_base_url {
        vars.insert("REALTIME_API_BASE_URL".to_string(), url.to_string());
    }

    Config::from_vars(&vars).map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))
}
