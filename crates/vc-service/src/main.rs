//! Voice Chat Session Service
//!
//! Entry point. Connects to Redis, builds the provider client, and serves
//! the session API until SIGINT/SIGTERM.

use secrecy::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vc_service::config::Config;
use vc_service::repositories::{RecordStore, RedisRecordStore};
use vc_service::routes::{self, AppState};
use vc_service::services::{
    MeetingProvider, ModeSelector, ModeSwitch, RealtimeKitClient, RealtimeMode, SessionService,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vc_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Voice Chat service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        realtime_mode = config.realtime_mode.as_str(),
        realtime_api_base_url = %config.realtime_api_base_url,
        realtime_timeout_seconds = config.realtime_timeout_seconds,
        "Configuration loaded successfully"
    );

    if config.realtime_mode == RealtimeMode::Real && !config.has_provider_credentials() {
        warn!("Real mode without REALTIME_ORG_ID/REALTIME_API_KEY, provider calls will fall back to mock");
    }

    let metrics_handle = routes::init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    info!("Connecting to Redis...");
    let store: Arc<dyn RecordStore> =
        Arc::new(RedisRecordStore::connect(config.redis_url.expose_secret()).await?);
    info!("Redis connection established");

    let provider: Arc<dyn MeetingProvider> = Arc::new(RealtimeKitClient::new(
        config.realtime_api_base_url.clone(),
        config.realtime_org_id.clone(),
        config.realtime_api_key.clone(),
        config.realtime_timeout_seconds,
    )?);

    let sessions = Arc::new(SessionService::new(
        store.clone(),
        provider,
        config.realtime_app_id.clone(),
    ));

    let (mode_switch, mode) = ModeSelector::channel(config.realtime_mode);
    tokio::spawn(mode_signal_listener(mode_switch));

    let bind_address = config.bind_address.clone();
    let drain_seconds = config.drain_seconds;

    let state = Arc::new(AppState {
        store,
        sessions,
        mode,
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Voice Chat service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(drain_seconds))
        .await?;

    info!("Voice Chat service shutdown complete");

    Ok(())
}

/// Flips the realtime mode at runtime: SIGUSR1 selects mock, SIGUSR2 selects real.
#[cfg(unix)]
async fn mode_signal_listener(switch: ModeSwitch) {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let (mut to_mock, mut to_real) = match (
        unix_signal(SignalKind::user_defined1()),
        unix_signal(SignalKind::user_defined2()),
    ) {
        (Ok(to_mock), Ok(to_real)) => (to_mock, to_real),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to listen for mode signals, mode is fixed: {}", e);
            return;
        }
    };

    loop {
        tokio::select! {
            Some(()) = to_mock.recv() => switch.set(RealtimeMode::Mock),
            Some(()) = to_real.recv() => switch.set(RealtimeMode::Real),
            else => break,
        }
    }
}

#[cfg(not(unix))]
async fn mode_signal_listener(_switch: ModeSwitch) {}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal(drain_secs: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (VC_DRAIN_SECONDS=0)");
    }
}
