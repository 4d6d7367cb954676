use std::time::Duration;

use mercure_auth::{KeyConfig, KeyMaterial, TokenVerifier};
use mercure_hub::config::TransportKind;
use mercure_hub::{build_router, AppState, Configuration};
use mercure_transport::{Hub, InMemoryTransport, Transport};

/// A running hub bound to a random local port, for integration tests that
/// need a real HTTP + SSE round trip rather than calling handlers directly.
/// Mirrors the teacher's `MockWsServer::start` — bind to port 0, report the
/// resolved address, tear down the task on drop.
pub struct TestHub {
    pub base_url: String,
    pub secret: Vec<u8>,
    handle: tokio::task::JoinHandle<()>,
}

pub struct TestHubOptions {
    pub anonymous_access: bool,
    pub allow_query_authorization: bool,
}

impl Default for TestHubOptions {
    fn default() -> Self {
        Self {
            anonymous_access: false,
            allow_query_authorization: true,
        }
    }
}

impl TestHub {
    pub async fn start(options: TestHubOptions) -> Self {
        let secret = b"test-hub-secret".to_vec();
        let key_config = KeyConfig::Shared(KeyMaterial::Symmetric {
            secret: secret.clone(),
            algorithm: jsonwebtoken::Algorithm::HS256,
        });
        let verifier = TokenVerifier::new(key_config.clone());
        let transport: std::sync::Arc<dyn Transport> = std::sync::Arc::new(InMemoryTransport::new(None, 256));
        let hub = Hub::new(transport);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().expect("listener has a local address");

        let config = Configuration {
            bind_addr: addr,
            anonymous_access: options.anonymous_access,
            allow_query_authorization: options.allow_query_authorization,
            cookie_name: "mercureAuthorization".to_owned(),
            heartbeat_interval: Some(Duration::from_secs(15)),
            allowed_origins: None,
            subscriber_buffer: 256,
            key_config,
            transport: TransportKind::Memory {
                retained_capacity: None,
            },
            public_url: Some(
                url::Url::parse(&format!("http://{addr}/.well-known/mercure"))
                    .expect("constructed URL is always valid"),
            ),
        };

        let state = AppState::new(hub, verifier, config);
        let router = build_router(state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("test hub server error");
        });

        Self {
            base_url: format!("http://{addr}/.well-known/mercure"),
            secret,
            handle,
        }
    }
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
