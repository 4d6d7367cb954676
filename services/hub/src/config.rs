use std::net::SocketAddr;
use std::time::Duration;

use mercure_auth::{KeyConfig, RawKeyConfig};

/// Selects which [`mercure_transport`] adapter backs the hub, derived from
/// the scheme of `MERCURE_TRANSPORT_URL`.
#[derive(Debug, Clone)]
pub enum TransportKind {
    Memory { retained_capacity: Option<usize> },
    Redis { url: String, stream_key: String },
}

/// The hub's fully-resolved configuration. Loaded once at startup into an
/// immutable struct, the same shape as the teacher's flat `env::var` reads
/// in `main.rs` — not a general-purpose layered config framework.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub bind_addr: SocketAddr,
    pub anonymous_access: bool,
    pub allow_query_authorization: bool,
    pub cookie_name: String,
    pub heartbeat_interval: Option<Duration>,
    pub allowed_origins: Option<Vec<String>>,
    pub subscriber_buffer: usize,
    pub key_config: KeyConfig,
    pub transport: TransportKind,
    pub public_url: Option<url::Url>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {variable}: {source}")]
    Io {
        variable: String,
        source: std::io::Error,
    },
    #[error("{variable} is not valid: {reason}")]
    Invalid { variable: String, reason: String },
    #[error(transparent)]
    Key(#[from] mercure_auth::KeyError),
}

/// Reads `MERCURE_<name>`, honoring the `_FILE` indirection convention:
/// `MERCURE_<name>_FILE` takes precedence and is read as a file whose
/// contents (trimmed) become the value.
fn env_var(name: &str) -> Result<Option<String>, ConfigError> {
    let key = format!("MERCURE_{name}");
    let file_key = format!("{key}_FILE");

    if let Ok(path) = std::env::var(&file_key) {
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            variable: file_key.clone(),
            source,
        })?;
        return Ok(Some(contents.trim().to_owned()));
    }

    Ok(std::env::var(&key).ok())
}

fn env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env_var(name)? {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(ConfigError::Invalid {
                variable: format!("MERCURE_{name}"),
                reason: format!("expected 'true' or 'false', got '{other}'"),
            }),
        },
    }
}

impl Configuration {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env_var("BIND_ADDR")?
            .unwrap_or_else(|| "0.0.0.0:3000".to_owned())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                variable: "MERCURE_BIND_ADDR".to_owned(),
                reason: e.to_string(),
            })?;

        let anonymous_access = env_bool("ANONYMOUS_ACCESS", false)?;
        let allow_query_authorization = env_bool("ALLOW_QUERY_AUTHORIZATION", false)?;
        let cookie_name = env_var("COOKIE_NAME")?.unwrap_or_else(|| "mercureAuthorization".to_owned());

        let heartbeat_interval = match env_var("HEARTBEAT_INTERVAL")? {
            None => Some(Duration::from_secs(15)),
            Some(raw) => {
                let seconds: u64 = raw.parse().map_err(|_| ConfigError::Invalid {
                    variable: "MERCURE_HEARTBEAT_INTERVAL".to_owned(),
                    reason: "expected an integer number of seconds".to_owned(),
                })?;
                (seconds > 0).then(|| Duration::from_secs(seconds))
            }
        };

        let allowed_origins = env_var("CORS_ALLOWED_ORIGINS")?
            .map(|raw| raw.split(',').map(|s| s.trim().to_owned()).collect());

        let subscriber_buffer = match env_var("SUBSCRIBER_BUFFER")? {
            None => 256,
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                variable: "MERCURE_SUBSCRIBER_BUFFER".to_owned(),
                reason: "expected a positive integer".to_owned(),
            })?,
        };

        let public_url = env_var("PUBLIC_URL")?
            .map(|raw| {
                url::Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    variable: "MERCURE_PUBLIC_URL".to_owned(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let algorithm = match env_var("JWT_ALGORITHM")?.as_deref() {
            None => jsonwebtoken::Algorithm::HS256,
            Some("HS256") => jsonwebtoken::Algorithm::HS256,
            Some("RS256") => jsonwebtoken::Algorithm::RS256,
            Some("ES256") => jsonwebtoken::Algorithm::ES256,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    variable: "MERCURE_JWT_ALGORITHM".to_owned(),
                    reason: format!("unsupported algorithm '{other}'"),
                })
            }
        };

        let raw_key_config = RawKeyConfig {
            jwk: env_var("JWT_KEY")?,
            publisher_jwk: env_var("PUBLISHER_JWT_KEY")?,
            subscriber_jwk: env_var("SUBSCRIBER_JWT_KEY")?,
            jwks_url: env_var("JWKS_URL")?,
            publisher_jwks_url: env_var("PUBLISHER_JWKS_URL")?,
            subscriber_jwks_url: env_var("SUBSCRIBER_JWKS_URL")?,
            algorithm,
        };
        let key_config = KeyConfig::from_raw(raw_key_config)?;

        let transport = match env_var("TRANSPORT_URL")? {
            None => TransportKind::Memory {
                retained_capacity: None,
            },
            Some(raw) => {
                let parsed = url::Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    variable: "MERCURE_TRANSPORT_URL".to_owned(),
                    reason: e.to_string(),
                })?;
                match parsed.scheme() {
                    "memory" => {
                        let retained_capacity = parsed
                            .query_pairs()
                            .find(|(k, _)| k == "size")
                            .and_then(|(_, v)| v.parse::<usize>().ok());
                        TransportKind::Memory { retained_capacity }
                    }
                    "redis" | "rediss" => {
                        let path = parsed.path().trim_start_matches('/');
                        let stream_key = if path.is_empty() {
                            "mercure-updates".to_owned()
                        } else {
                            path.to_owned()
                        };
                        TransportKind::Redis {
                            url: raw.clone(),
                            stream_key,
                        }
                    }
                    other => {
                        return Err(ConfigError::Invalid {
                            variable: "MERCURE_TRANSPORT_URL".to_owned(),
                            reason: format!("unsupported transport scheme '{other}'"),
                        })
                    }
                }
            }
        };

        Ok(Self {
            bind_addr,
            anonymous_access,
            allow_query_authorization,
            cookie_name,
            heartbeat_interval,
            allowed_origins,
            subscriber_buffer,
            key_config,
            transport,
            public_url,
        })
    }
}
