pub mod config;
pub mod publish;
pub mod router;
pub mod state;
pub mod subscribe;
pub mod subscriber;

pub use config::{Configuration, ConfigError, TransportKind};
pub use router::build_router;
pub use state::AppState;
