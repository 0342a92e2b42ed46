use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use beacon_broker::config::Config;
use beacon_broker::signaling::heartbeat;
use beacon_broker::signaling::registry::{ClientRegistry, CloseReason};
use beacon_broker::signaling::server::CLOSE_NORMAL;
use beacon_broker::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(
        max_clients = config.max_clients,
        max_room_clients = config.max_room_clients,
        heartbeat_ms = config.heartbeat_interval.as_millis() as u64,
        auth = config.ws_secret.is_some(),
        "broker configured"
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("invalid HOST/PORT");

    let state = AppState::new(config);

    heartbeat::spawn(
        state.registry.clone(),
        state.dispatcher.clone(),
        state.config.heartbeat_interval,
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = beacon_broker::routes::router()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    tracing::info!(%addr, "broker listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");

    let (draining_tx, draining_rx) = oneshot::channel();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.registry.clone(), draining_tx));

    // Connection tasks get a bounded grace period after the shutdown signal;
    // anything still open when it elapses is torn down with the process.
    tokio::select! {
        result = server => {
            result.expect("server error");
        }
        _ = drain_deadline(draining_rx) => {
            tracing::warn!(
                open_clients = state.registry.len(),
                "grace period elapsed, forcing termination"
            );
        }
    }

    tracing::info!("broker stopped");
}

/// Bound on how long shutdown waits for connection tasks to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Wait for ctrl-c or SIGTERM, then close every client connection with a
/// normal close so in-flight sessions drain promptly.
async fn shutdown_signal(registry: Arc<ClientRegistry>, draining: oneshot::Sender<()>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, closing client connections");
    for client in registry.handles() {
        client.kill(Some(CloseReason {
            code: CLOSE_NORMAL,
            reason: "shutting-down",
        }));
    }
    let _ = draining.send(());
}

/// Resolves once the grace period after the shutdown signal has elapsed.
/// Pends forever while no shutdown is in progress.
async fn drain_deadline(draining: oneshot::Receiver<()>) {
    if draining.await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(SHUTDOWN_GRACE).await;
}
