use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
struct MercureClaim {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    publish: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    subscribe: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct TokenClaims {
    mercure: MercureClaim,
    exp: u64,
}

/// Mints an HS256-signed hub token with the given publish/subscribe
/// selectors, signed with `secret`. Mirrors the shape `mercure-auth`
/// decodes on the other end.
pub fn issue_token(secret: &[u8], publish: &[&str], subscribe: &[&str]) -> String {
    let claims = TokenClaims {
        mercure: MercureClaim {
            publish: publish.iter().map(|s| (*s).to_owned()).collect(),
            subscribe: subscribe.iter().map(|s| (*s).to_owned()).collect(),
        },
        exp: 4_102_444_800, // year 2100
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .expect("token encoding with a well-formed secret never fails")
}
