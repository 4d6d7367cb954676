use std::sync::Arc;

use mercure_auth::TokenVerifier;
use mercure_hub::config::TransportKind;
use mercure_hub::{build_router, AppState, Configuration};
use mercure_transport::{Hub, InMemoryTransport, RedisStreamTransport, Transport};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let config = Configuration::from_env().expect("invalid configuration");

    let transport: Arc<dyn Transport> = match &config.transport {
        TransportKind::Memory { retained_capacity } => {
            info!("using in-memory transport");
            Arc::new(InMemoryTransport::new(*retained_capacity, config.subscriber_buffer))
        }
        TransportKind::Redis { url, stream_key } => {
            info!(stream_key = %stream_key, "connecting to redis transport");
            let transport = RedisStreamTransport::connect(url, stream_key.clone(), config.subscriber_buffer)
                .await
                .expect("failed to connect to redis transport");
            Arc::new(transport)
        }
    };

    let hub = Hub::new(transport);
    let verifier = TokenVerifier::new(config.key_config.clone());
    verifier
        .prefetch()
        .await
        .expect("failed to fetch configured JWK set(s)");
    let bind_addr = config.bind_addr;
    let state = AppState::new(hub.clone(), verifier, config);

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "mercure hub listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    hub.close().await;
    info!("hub shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
