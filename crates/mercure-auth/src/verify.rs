use jsonwebtoken::{decode, Validation};

use crate::claims::TokenClaims;
use crate::key::{KeyConfig, Role};
use crate::jwks::JwksCache;
use crate::AuthError;

/// Verifies hub tokens against whichever [`KeyConfig`] shape the hub was
/// configured with, resolving role-split keys and JWK-Set URLs as needed.
pub struct TokenVerifier {
    config: KeyConfig,
    jwks: Option<(JwksCache, JwksCache)>,
}

impl TokenVerifier {
    pub fn new(config: KeyConfig) -> Self {
        let jwks = match &config {
            KeyConfig::JwksUrl(url) => {
                let cache = JwksCache::new(url.clone(), jsonwebtoken::Algorithm::RS256);
                Some((
                    JwksCache::new(url.clone(), jsonwebtoken::Algorithm::RS256),
                    cache,
                ))
            }
            KeyConfig::SplitJwksUrlByRole {
                publisher,
                subscriber,
            } => Some((
                JwksCache::new(publisher.clone(), jsonwebtoken::Algorithm::RS256),
                JwksCache::new(subscriber.clone(), jsonwebtoken::Algorithm::RS256),
            )),
            _ => None,
        };
        Self { config, jwks }
    }

    /// Fetches any configured JWK-Set(s) up front so startup fails fast on a
    /// bad URL or unreachable key server, rather than on the first request.
    /// A no-op for key configurations that don't involve a JWK-Set URL.
    pub async fn prefetch(&self) -> Result<(), AuthError> {
        let Some((publisher, subscriber)) = &self.jwks else {
            return Ok(());
        };
        publisher.refresh().await?;
        subscriber.refresh().await?;
        Ok(())
    }

    /// Verifies `token` was issued for `role`, returning its decoded
    /// claims. A single shared key/JWK-Set serves both roles.
    pub async fn verify(&self, token: &str, role: Role) -> Result<TokenClaims, AuthError> {
        match &self.config {
            KeyConfig::Shared(material) => {
                let mut validation = Validation::new(material.algorithm());
                validation.validate_exp = true;
                let key = material
                    .decoding_key()
                    .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
                decode::<TokenClaims>(token, &key, &validation)
                    .map(|data| data.claims)
                    .map_err(|e| AuthError::InvalidToken(e.to_string()))
            }
            KeyConfig::SplitByRole {
                publisher,
                subscriber,
            } => {
                let material = match role {
                    Role::Publisher => publisher,
                    Role::Subscriber => subscriber,
                };
                let mut validation = Validation::new(material.algorithm());
                validation.validate_exp = true;
                let key = material
                    .decoding_key()
                    .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
                decode::<TokenClaims>(token, &key, &validation)
                    .map(|data| data.claims)
                    .map_err(|e| AuthError::InvalidToken(e.to_string()))
            }
            KeyConfig::JwksUrl(_) | KeyConfig::SplitJwksUrlByRole { .. } => {
                let (publisher_cache, subscriber_cache) = self
                    .jwks
                    .as_ref()
                    .expect("jwks caches are built alongside a jwks KeyConfig");
                let cache = match role {
                    Role::Publisher => publisher_cache,
                    Role::Subscriber => subscriber_cache,
                };
                let kid = peek_kid(token);
                let (key, algorithm) = cache.decoding_key_for(kid.as_deref()).await?;
                let mut validation = Validation::new(algorithm);
                validation.validate_exp = true;
                match decode::<TokenClaims>(token, &key, &validation) {
                    Ok(data) => Ok(data.claims),
                    Err(first_err) => {
                        // Rotation: refresh once and retry before failing closed.
                        cache.refresh().await?;
                        let (key, algorithm) = cache.decoding_key_for(kid.as_deref()).await?;
                        let mut validation = Validation::new(algorithm);
                        validation.validate_exp = true;
                        decode::<TokenClaims>(token, &key, &validation)
                            .map(|data| data.claims)
                            .map_err(|_| AuthError::InvalidToken(first_err.to_string()))
                    }
                }
            }
        }
    }
}

/// Reads the unverified `kid` header field from a JWT, without validating
/// its signature, so the right JWK can be selected before verification.
fn peek_kid(token: &str) -> Option<String> {
    let header = jsonwebtoken::decode_header(token).ok()?;
    header.kid
}
