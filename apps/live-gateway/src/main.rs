use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_gateway::auth::JwtAuthenticator;
use live_gateway::config::Config;
use live_gateway::gateway::hub::{Hub, HubHandle};
use live_gateway::grants::LiveKitGrantIssuer;
use live_gateway::roster::HttpRoster;
use live_gateway::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let authenticator = Arc::new(JwtAuthenticator::new(&config.ws_jwt_secret));
    let roster = Arc::new(HttpRoster::new(&config.roster_url, config.roster_token.clone()));
    let grants = Arc::new(LiveKitGrantIssuer::new(
        &config.livekit_api_key,
        &config.livekit_api_secret,
    ));

    let (hub, hub_handle) = Hub::new();
    let hub_task = tokio::spawn(hub.run());

    tracing::info!(roster_url = %config.roster_url, "live-gateway configured");

    let cors = match config.allowed_origin.as_deref() {
        Some(origin) => CorsLayer::new().allow_origin(AllowOrigin::exact(
            HeaderValue::from_str(origin).expect("ALLOWED_ORIGIN must be a valid header value"),
        )),
        None => CorsLayer::new().allow_origin(Any),
    }
    .allow_methods(Any)
    .allow_headers(Any);

    let state = AppState {
        config: Arc::new(config),
        hub: hub_handle.clone(),
        authenticator,
        roster,
        grants,
    };

    let app = Router::new()
        .merge(live_gateway::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "live-gateway listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub_handle))
        .await
        .expect("server error");

    let _ = hub_task.await;
}

/// Wait for Ctrl-C or SIGTERM, then close every open connection.
async fn shutdown_signal(hub: HubHandle) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    match hub.shutdown().await {
        Ok(closed) => tracing::info!(closed, "hub stopped"),
        Err(_) => tracing::warn!("hub already stopped"),
    }
}
