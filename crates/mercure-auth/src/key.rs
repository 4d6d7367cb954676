use jsonwebtoken::{Algorithm, DecodingKey};

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key material is not valid for the algorithm it is paired with: {0}")]
    InvalidMaterial(String),
    #[error("key configuration mixes mutually exclusive options: {0}")]
    MutuallyExclusive(String),
}

/// Decoded key bytes plus the algorithm family they are meant for. Keys
/// prefixed `base64:` in configuration are decoded before reaching here;
/// everything else is taken as PEM or raw secret bytes verbatim.
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    /// A shared secret, used with HMAC algorithms (HS256/HS384/HS512).
    Symmetric { secret: Vec<u8>, algorithm: Algorithm },
    /// A PEM-encoded RSA public key, used with RS256/RS384/RS512.
    RsaPublicPem { pem: Vec<u8>, algorithm: Algorithm },
    /// A PEM-encoded EC public key, used with ES256/ES384.
    EcPublicPem { pem: Vec<u8>, algorithm: Algorithm },
}

impl KeyMaterial {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Symmetric { algorithm, .. }
            | Self::RsaPublicPem { algorithm, .. }
            | Self::EcPublicPem { algorithm, .. } => *algorithm,
        }
    }

    pub fn decoding_key(&self) -> Result<DecodingKey, KeyError> {
        match self {
            Self::Symmetric { secret, .. } => Ok(DecodingKey::from_secret(secret)),
            Self::RsaPublicPem { pem, .. } => DecodingKey::from_rsa_pem(pem)
                .map_err(|e| KeyError::InvalidMaterial(e.to_string())),
            Self::EcPublicPem { pem, .. } => {
                DecodingKey::from_ec_pem(pem).map_err(|e| KeyError::InvalidMaterial(e.to_string()))
            }
        }
    }

    /// Decodes a `base64:`-prefixed secret per the hub's key material
    /// convention; anything else is passed through as raw bytes (PEM text
    /// or a plain secret string).
    pub fn decode_value(raw: &str) -> Vec<u8> {
        use base64::Engine as _;
        match raw.strip_prefix("base64:") {
            Some(encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .unwrap_or_else(|_| raw.as_bytes().to_vec()),
            None => raw.as_bytes().to_vec(),
        }
    }
}

/// Which role a token is being verified for, when the hub is configured
/// with separate publisher/subscriber keys or JWK-Set URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Publisher,
    Subscriber,
}

/// The hub's key configuration. Exactly one of these shapes is active at a
/// time; a single shared key, a role-split pair of keys, a single JWK-Set
/// URL, or a role-split pair of JWK-Set URLs. These groups are mutually
/// exclusive by construction: [`KeyConfig::from_parts`] is the only
/// fallible entry point and rejects any combination that isn't one clean
/// shape.
#[derive(Debug, Clone)]
pub enum KeyConfig {
    Shared(KeyMaterial),
    SplitByRole {
        publisher: KeyMaterial,
        subscriber: KeyMaterial,
    },
    JwksUrl(url::Url),
    SplitJwksUrlByRole {
        publisher: url::Url,
        subscriber: url::Url,
    },
}

/// Raw, not-yet-validated key configuration inputs, one field per
/// `MERCURE_*` variable named in the hub's authorization configuration.
#[derive(Debug, Clone)]
pub struct RawKeyConfig {
    pub jwk: Option<String>,
    pub publisher_jwk: Option<String>,
    pub subscriber_jwk: Option<String>,
    pub jwks_url: Option<String>,
    pub publisher_jwks_url: Option<String>,
    pub subscriber_jwks_url: Option<String>,
    pub algorithm: Algorithm,
}

impl Default for RawKeyConfig {
    fn default() -> Self {
        Self {
            jwk: None,
            publisher_jwk: None,
            subscriber_jwk: None,
            jwks_url: None,
            publisher_jwks_url: None,
            subscriber_jwks_url: None,
            algorithm: Algorithm::HS256,
        }
    }
}

impl KeyConfig {
    /// Validates that exactly one mutually-exclusive group of key options
    /// was supplied and builds the corresponding [`KeyConfig`].
    ///
    /// The canonical field names are the camelCase `jwksUrl` family; a
    /// snake_case `jwks_url` alias is intentionally not accepted.
    pub fn from_raw(raw: RawKeyConfig) -> Result<Self, KeyError> {
        let shared = raw.jwk.is_some();
        let split = raw.publisher_jwk.is_some() || raw.subscriber_jwk.is_some();
        let jwks = raw.jwks_url.is_some();
        let split_jwks = raw.publisher_jwks_url.is_some() || raw.subscriber_jwks_url.is_some();

        let groups_set = [shared, split, jwks, split_jwks]
            .iter()
            .filter(|set| **set)
            .count();
        if groups_set == 0 {
            return Err(KeyConfig::missing_error());
        }
        if groups_set > 1 {
            return Err(KeyError::MutuallyExclusive(
                "only one of jwk, {publisher,subscriber}Jwk, jwksUrl, {publisher,subscriber}JwksUrl may be set".to_owned(),
            ));
        }

        if shared {
            let material = KeyMaterial::Symmetric {
                secret: KeyMaterial::decode_value(&raw.jwk.unwrap()),
                algorithm: raw.algorithm,
            };
            return Ok(Self::Shared(material));
        }

        if split {
            let publisher = raw.publisher_jwk.ok_or_else(KeyConfig::missing_error)?;
            let subscriber = raw.subscriber_jwk.ok_or_else(KeyConfig::missing_error)?;
            return Ok(Self::SplitByRole {
                publisher: KeyMaterial::Symmetric {
                    secret: KeyMaterial::decode_value(&publisher),
                    algorithm: raw.algorithm,
                },
                subscriber: KeyMaterial::Symmetric {
                    secret: KeyMaterial::decode_value(&subscriber),
                    algorithm: raw.algorithm,
                },
            });
        }

        if jwks {
            let parsed = url::Url::parse(&raw.jwks_url.unwrap())
                .map_err(|e| KeyError::InvalidMaterial(e.to_string()))?;
            return Ok(Self::JwksUrl(parsed));
        }

        let publisher = raw
            .publisher_jwks_url
            .ok_or_else(KeyConfig::missing_error)?;
        let subscriber = raw
            .subscriber_jwks_url
            .ok_or_else(KeyConfig::missing_error)?;
        Ok(Self::SplitJwksUrlByRole {
            publisher: url::Url::parse(&publisher).map_err(|e| KeyError::InvalidMaterial(e.to_string()))?,
            subscriber: url::Url::parse(&subscriber).map_err(|e| KeyError::InvalidMaterial(e.to_string()))?,
        })
    }

    fn missing_error() -> KeyError {
        KeyError::MutuallyExclusive(
            "exactly one of jwk, {publisher,subscriber}Jwk, jwksUrl, {publisher,subscriber}JwksUrl must be set"
                .to_owned(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_no_key_configured() {
        let raw = RawKeyConfig {
            algorithm: Algorithm::HS256,
            ..Default::default()
        };
        assert!(matches!(
            KeyConfig::from_raw(raw),
            Err(KeyError::MutuallyExclusive(_))
        ));
    }

    #[test]
    fn rejects_mixed_shared_and_split() {
        let raw = RawKeyConfig {
            jwk: Some("secret".to_owned()),
            publisher_jwk: Some("other-secret".to_owned()),
            algorithm: Algorithm::HS256,
            ..Default::default()
        };
        assert!(matches!(
            KeyConfig::from_raw(raw),
            Err(KeyError::MutuallyExclusive(_))
        ));
    }

    #[test]
    fn accepts_shared_jwk() {
        let raw = RawKeyConfig {
            jwk: Some("base64:c2VjcmV0".to_owned()),
            algorithm: Algorithm::HS256,
            ..Default::default()
        };
        let config = KeyConfig::from_raw(raw).unwrap();
        match config {
            KeyConfig::Shared(KeyMaterial::Symmetric { secret, .. }) => {
                assert_eq!(secret, b"secret");
            }
            _ => panic!("expected shared symmetric key"),
        }
    }

    #[test]
    fn accepts_split_jwks_urls() {
        let raw = RawKeyConfig {
            publisher_jwks_url: Some("https://idp.example.com/publisher.jwks".to_owned()),
            subscriber_jwks_url: Some("https://idp.example.com/subscriber.jwks".to_owned()),
            algorithm: Algorithm::RS256,
            ..Default::default()
        };
        assert!(matches!(
            KeyConfig::from_raw(raw),
            Ok(KeyConfig::SplitJwksUrlByRole { .. })
        ));
    }
}
