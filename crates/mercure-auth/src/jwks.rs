use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;

use crate::AuthError;

/// Caches a remote JWK-Set, fetched on first use and refreshed whenever a
/// verification attempt fails against the cached keys — covers key
/// rotation without a background poller.
pub struct JwksCache {
    client: reqwest::Client,
    url: url::Url,
    default_algorithm: Algorithm,
    cached: RwLock<Option<JwkSet>>,
}

impl JwksCache {
    pub fn new(url: url::Url, default_algorithm: Algorithm) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            default_algorithm,
            cached: RwLock::new(None),
        }
    }

    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))?;
        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))
    }

    pub async fn refresh(&self) -> Result<(), AuthError> {
        let set = self.fetch().await?;
        *self.cached.write().await = Some(set);
        Ok(())
    }

    fn find_key(&self, set: &JwkSet, kid: Option<&str>) -> Option<(DecodingKey, Algorithm)> {
        let jwk = match kid {
            Some(kid) => set
                .keys
                .iter()
                .find(|jwk| jwk.common.key_id.as_deref() == Some(kid)),
            None => set.keys.first(),
        }?;
        let key = DecodingKey::from_jwk(jwk).ok()?;
        Some((key, self.default_algorithm))
    }

    /// Resolves a decoding key for `kid`, fetching the set on first use and
    /// refreshing once if the key isn't found in the cached copy.
    pub async fn decoding_key_for(&self, kid: Option<&str>) -> Result<(DecodingKey, Algorithm), AuthError> {
        {
            let guard = self.cached.read().await;
            if let Some(set) = guard.as_ref() {
                if let Some(found) = self.find_key(set, kid) {
                    return Ok(found);
                }
            }
        }
        self.refresh().await?;
        let guard = self.cached.read().await;
        let set = guard.as_ref().ok_or_else(|| AuthError::JwksFetchFailed("empty JWK set".to_owned()))?;
        self.find_key(set, kid)
            .ok_or_else(|| AuthError::InvalidToken("no matching key in JWK set".to_owned()))
    }
}
