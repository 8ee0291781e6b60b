//! Health, banner, and metrics endpoint integration tests.
//!
//! Uses the `TestVcServer` harness.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use vc_service::services::RealtimeMode;
use vc_test_utils::TestVcServer;

#[tokio::test]
async fn test_root_returns_banner() -> Result<(), anyhow::Error> {
    let server = TestVcServer::spawn(RealtimeMode::Mock).await?;

    let response = reqwest::get(server.url()).await?;

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "Voice Chat service is running!");

    Ok(())
}

#[tokio::test]
async fn test_health_endpoint_returns_200() -> Result<(), anyhow::Error> {
    let server = TestVcServer::spawn(RealtimeMode::Real).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert!(
        content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json")),
        "Expected application/json content type, got {:?}",
        content_type
    );

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["mode"], "real");
    assert_eq!(body["store"], "healthy");

    Ok(())
}

#[tokio::test]
async fn test_health_reports_unhealthy_store() -> Result<(), anyhow::Error> {
    let server = TestVcServer::spawn(RealtimeMode::Mock).await?;
    server.store().set_unavailable(true);

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["store"], "unhealthy");

    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_http_metrics() -> Result<(), anyhow::Error> {
    let server = TestVcServer::spawn(RealtimeMode::Mock).await?;

    reqwest::get(format!("{}/health", server.url())).await?;
    let response = reqwest::get(format!("{}/metrics", server.url())).await?;

    assert_eq!(response.status(), 200);
    let body = response.text().await?;
    assert!(
        body.contains("vc_http_requests_total"),
        "metrics output missing request counter: {body}"
    );

    Ok(())
}

#[tokio::test]
async fn test_unknown_route_returns_404() -> Result<(), anyhow::Error> {
    let server = TestVcServer::spawn(RealtimeMode::Mock).await?;

    let response = reqwest::get(format!("{}/v1/nonexistent", server.url())).await?;

    assert_eq!(response.status(), 404);

    Ok(())
}
