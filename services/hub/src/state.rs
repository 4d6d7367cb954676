use std::sync::Arc;

use mercure_auth::TokenVerifier;
use mercure_transport::Hub;

use crate::config::Configuration;

/// Shared application state handed to every handler, the same shape as the
/// teacher's `AppState` (a pool plus shared registries) generalized to the
/// hub's own dependencies: the transport facade and the token verifier.
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub verifier: Arc<TokenVerifier>,
    pub config: Arc<Configuration>,
}

impl AppState {
    pub fn new(hub: Hub, verifier: TokenVerifier, config: Configuration) -> Self {
        Self {
            hub,
            verifier: Arc::new(verifier),
            config: Arc::new(config),
        }
    }
}
