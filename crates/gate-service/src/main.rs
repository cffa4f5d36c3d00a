//! Gate Service
//!
//! Verifies bearer tokens and authorizes calls before they reach the
//! protected routes.

use anyhow::Context;
use gate_service::auth::{JwksClient, JwksOptions};
use gate_service::config::Config;
use gate_service::observability::metrics::init_metrics_recorder;
use gate_service::routes::{self, AppState};
use gate_service::{policy, tasks};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting gate service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        jwks_url = %config.jwks_url,
        jwt_algorithm = ?config.jwt_algorithm,
        policy_mode = %config.policy_mode,
        policy_query = %config.policy_query,
        auth_optional = config.auth_optional,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        anyhow::anyhow!(e)
    })?;

    // Initial key set fetch; no key set, no service
    let jwks_client = Arc::new(
        JwksClient::connect(
            config.jwks_url.clone(),
            JwksOptions {
                fetch_timeout: Duration::from_secs(config.jwks_fetch_timeout_seconds),
                min_refresh_interval: Duration::from_secs(config.jwks_min_refresh_interval_seconds),
            },
        )
        .await
        .map_err(|e| {
            error!("Failed to load key set: {}", e);
            e
        })?,
    );

    let pdp = policy::from_config(&config).map_err(|e| {
        error!("Failed to prepare policy: {}", e);
        e
    })?;

    let bind_address = config.bind_address.clone();
    let refresh_interval = config.jwks_refresh_interval_seconds;

    let state = Arc::new(AppState {
        config,
        jwks_client: Arc::clone(&jwks_client),
        pdp,
    });

    let app = routes::build_routes(state, metrics_handle).map_err(|e| {
        error!("Failed to build pipeline: {}", e);
        e
    })?;

    // Background key set refresh
    let cancel_token = CancellationToken::new();
    let refresher = if refresh_interval > 0 {
        Some(tokio::spawn(tasks::start_jwks_refresher(
            jwks_client,
            Duration::from_secs(refresh_interval),
            cancel_token.clone(),
        )))
    } else {
        info!("Periodic key set refresh disabled (JWKS_REFRESH_INTERVAL_SECONDS=0)");
        None
    };

    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("invalid bind address: {}", bind_address))?;

    info!("Gate service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    cancel_token.cancel();
    if let Some(handle) = refresher {
        if let Err(e) = handle.await {
            error!("Key set refresher task failed: {}", e);
        }
    }

    info!("Gate service shutdown complete");

    Ok(())
}

/// Structured logs; JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gate_service=info,gate=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
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
}
