//! HTTP routes for the voice chat service.
//!
//! Defines the Axum router and application state.

use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::repositories::RecordStore;
use crate::services::{ModeSelector, SessionService};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub use crate::observability::metrics::init_metrics_recorder;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Record store, used directly by the health check.
    pub store: Arc<dyn RecordStore>,

    /// Create and join workflows.
    pub sessions: Arc<SessionService>,

    /// Realtime mode, read once per request.
    pub mode: ModeSelector,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/` - Liveness banner
/// - `/health` - Store connectivity and current mode
/// - `/metrics` - Prometheus metrics endpoint
/// - `/sessions` - Create a session
/// - `/sessions/{session_id}/join` - Join a session
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let app_routes = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/:session_id/join", post(handlers::join_session))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    app_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::repositories::InMemoryRecordStore;
    use crate::services::{MockMeetingProvider, RealtimeMode};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn test_router(store: InMemoryRecordStore, mode: RealtimeMode) -> Router {
        let config = Config::from_vars(&HashMap::from([
            (
                "REDIS_URL".to_string(),
                "redis://localhost:6379".to_string(),
            ),
            ("REALTIME_KIT_APP_ID".to_string(), "app-1".to_string()),
        ]))
        .unwrap();
        let store: Arc<dyn RecordStore> = Arc::new(store);
        let sessions = Arc::new(SessionService::new(
            store.clone(),
            Arc::new(MockMeetingProvider::accepting()),
            config.realtime_app_id.clone(),
        ));
        let state = Arc::new(AppState {
            store,
            sessions,
            mode: ModeSelector::fixed(mode),
        });
        let handle = PrometheusBuilder::new().build_recorder().handle();
        build_routes(state, handle)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn join(session_id: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/sessions/{session_id}/join"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[tokio::test]
    async fn test_root_banner() {
        let app = test_router(InMemoryRecordStore::new(), RealtimeMode::Mock);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes.as_ref(), b"Voice Chat service is running!");
    }

    #[tokio::test]
    async fn test_health_reports_mode_and_store() {
        let app = test_router(InMemoryRecordStore::new(), RealtimeMode::Mock);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["mode"], "mock");
        assert_eq!(json["store"], "healthy");
    }

    #[tokio::test]
    async fn test_health_unhealthy_store_still_200() {
        let store = InMemoryRecordStore::new();
        store.set_unavailable(true);
        let app = test_router(store, RealtimeMode::Real);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["mode"], "real");
        assert_eq!(json["store"], "unhealthy");
    }

    #[tokio::test]
    async fn test_create_session_route() {
        let app = test_router(InMemoryRecordStore::new(), RealtimeMode::Mock);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sessions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["sessionId"].is_string());
        assert!(json["meetingId"].as_str().unwrap().starts_with("mock-"));
        assert_eq!(json["users"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_join_route_missing_user_id() {
        let app = test_router(InMemoryRecordStore::new(), RealtimeMode::Mock);

        let response = app.oneshot(join("room-1", "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "User ID is required");
    }

    #[tokio::test]
    async fn test_join_route_malformed_body() {
        let app = test_router(InMemoryRecordStore::new(), RealtimeMode::Mock);

        let response = app.oneshot(join("room-1", "{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_join_route_success() {
        let app = test_router(InMemoryRecordStore::new(), RealtimeMode::Mock);

        let response = app
            .oneshot(join("room-1", r#"{"userId":"alice","iconUrl":"http://i/a.png"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["session"]["sessionId"], "room-1");
        assert_eq!(json["session"]["users"][0]["userId"], "alice");
        assert_eq!(json["session"]["users"][0]["iconUrl"], "http://i/a.png");
        assert_eq!(json["realtime"]["token"], "mock-token");
        assert_eq!(json["realtime"]["appId"], "app-1");
        assert_eq!(json["realtime"]["degraded"], false);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = test_router(InMemoryRecordStore::new(), RealtimeMode::Mock);

        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
