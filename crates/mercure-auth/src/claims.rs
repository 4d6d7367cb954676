use serde::{Deserialize, Serialize};

/// The `mercure` private claim carried by a hub token, per mercure.rocks
/// §Authorization. All three fields are optional; a token with neither
/// `publish` nor `subscribe` grants no extra capability beyond whatever
/// anonymous access allows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MercureClaim {
    #[serde(default)]
    pub publish: Vec<String>,
    #[serde(default)]
    pub subscribe: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// The full set of registered + private claims the hub reads out of a
/// verified token. Unknown claims are ignored rather than rejected.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenClaims {
    pub mercure: MercureClaim,
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub iat: Option<u64>,
}
