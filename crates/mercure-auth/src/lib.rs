//! Token extraction, verification, and capability-selector resolution for
//! the hub's subscribe and publish endpoints.

mod claims;
mod extract;
mod jwks;
mod key;
mod verify;

pub use claims::{MercureClaim, TokenClaims};
pub use extract::extract_token;
pub use jwks::JwksCache;
pub use key::{KeyConfig, KeyError, KeyMaterial, RawKeyConfig, Role};
pub use verify::TokenVerifier;

use http::HeaderMap;
use mercure_protocol::TopicSelector;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("failed to fetch JWK set: {0}")]
    JwksFetchFailed(String),
    #[error("origin '{0}' is not in the allowed origins list")]
    OriginNotAllowed(String),
}

/// What a request is allowed to do, resolved from its token (or from
/// anonymous access when no token was supplied).
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub authorized_topics: Vec<TopicSelector>,
    pub payload: Option<serde_json::Value>,
    pub anonymous: bool,
}

/// Outcome of resolving authorization for one request: either a context
/// (possibly anonymous), a hard rejection requiring re-authentication, or a
/// rejection because the presented token/origin was invalid.
pub enum Authorization {
    Granted(AuthContext),
    MissingToken,
    Invalid(AuthError),
}

/// Checks the request's `Origin` (falling back to `Referer`) against the
/// hub's allowed-origins list. `None` means the check is not enforced at
/// all (the hub's default). An empty origin (same-origin or non-browser
/// client) always passes; `*` in the list allows everything.
pub fn check_origin(headers: &HeaderMap, allowed_origins: Option<&[String]>) -> Result<(), AuthError> {
    let Some(allowed_origins) = allowed_origins else {
        return Ok(());
    };

    let origin = headers
        .get(http::header::ORIGIN)
        .or_else(|| headers.get(http::header::REFERER))
        .and_then(|v| v.to_str().ok());

    let Some(origin) = origin else {
        return Ok(());
    };
    if origin.is_empty() {
        return Ok(());
    }
    if allowed_origins.iter().any(|o| o == "*" || o == origin) {
        return Ok(());
    }
    Err(AuthError::OriginNotAllowed(origin.to_owned()))
}

/// Resolves authorization for one request: extracts a token (header, then
/// opt-in query param, then cookie), verifies it for `role`, and compiles
/// its `mercure.publish`/`mercure.subscribe` selectors against `base`. A
/// request with no token is [`Authorization::MissingToken`] — callers
/// decide whether anonymous access is allowed.
pub async fn authorize(
    verifier: &TokenVerifier,
    role: Role,
    headers: &HeaderMap,
    query: &str,
    allow_query_authorization: bool,
    cookie_name: &str,
    base: Option<&url::Url>,
) -> Authorization {
    let Some(token) = extract_token(headers, query, allow_query_authorization, cookie_name) else {
        return Authorization::MissingToken;
    };

    let claims = match verifier.verify(&token, role).await {
        Ok(claims) => claims,
        Err(e) => return Authorization::Invalid(e),
    };

    let raw_selectors = match role {
        Role::Publisher => &claims.mercure.publish,
        Role::Subscriber => &claims.mercure.subscribe,
    };

    let mut authorized_topics = Vec::with_capacity(raw_selectors.len());
    for raw in raw_selectors {
        match TopicSelector::compile(raw, base) {
            Ok(selector) => authorized_topics.push(selector),
            Err(e) => return Authorization::Invalid(AuthError::InvalidToken(e.to_string())),
        }
    }

    Authorization::Granted(AuthContext {
        authorized_topics,
        payload: claims.mercure.payload,
        anonymous: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn origin_check_allows_empty_origin() {
        let headers = HeaderMap::new();
        assert!(check_origin(&headers, Some(&["https://allowed.example".to_owned()])).is_ok());
    }

    #[test]
    fn origin_check_allows_wildcard() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::ORIGIN, HeaderValue::from_static("https://anything.example"));
        assert!(check_origin(&headers, Some(&["*".to_owned()])).is_ok());
    }

    #[test]
    fn origin_check_rejects_unlisted_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        assert!(check_origin(&headers, Some(&["https://allowed.example".to_owned()])).is_err());
    }

    #[test]
    fn origin_check_falls_back_to_referer() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::REFERER, HeaderValue::from_static("https://allowed.example/page"));
        assert!(check_origin(&headers, Some(&["https://allowed.example/page".to_owned()])).is_ok());
    }

    #[test]
    fn origin_check_not_enforced_when_unset() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        assert!(check_origin(&headers, None).is_ok());
    }
}
