use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Frozen HTTP error envelope used by all non-2xx responses.
///
/// Shape mirrors the protocol's `{ status, error, errors? }` media-type rule:
/// `status` is carried by the response itself, `error` maps to `code`, and
/// `errors[]` (when present) maps to `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

pub mod error_codes {
    pub const MALFORMED_REQUEST: &str = "MALFORMED_REQUEST";
    pub const AUTH_REQUIRED: &str = "AUTH_REQUIRED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const METHOD_NOT_ALLOWED: &str = "METHOD_NOT_ALLOWED";
    pub const UNSUPPORTED_MEDIA_TYPE: &str = "UNSUPPORTED_MEDIA_TYPE";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// The error kinds named in the hub's error handling design: each maps to a
/// fixed HTTP status and error code. `Forbidden`/`AuthRequired` carry the
/// extra headers mercure.rocks requires (`WWW-Authenticate`); `MethodNotAllowed`
/// carries `Allow`.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("{0}")]
    MalformedRequest(String),
    #[error("authorization required")]
    AuthRequired,
    #[error("{0}")]
    Forbidden(String),
    #[error("not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed { allowed: Vec<String> },
    #[error("unsupported media type")]
    UnsupportedMediaType,
    #[error("{0}")]
    Internal(String),
}

impl HubError {
    fn status(&self) -> StatusCode {
        match self {
            HubError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            HubError::AuthRequired => StatusCode::UNAUTHORIZED,
            HubError::Forbidden(_) => StatusCode::FORBIDDEN,
            HubError::NotFound => StatusCode::NOT_FOUND,
            HubError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            HubError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            HubError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            HubError::MalformedRequest(_) => error_codes::MALFORMED_REQUEST,
            HubError::AuthRequired => error_codes::AUTH_REQUIRED,
            HubError::Forbidden(_) => error_codes::FORBIDDEN,
            HubError::NotFound => error_codes::NOT_FOUND,
            HubError::MethodNotAllowed { .. } => error_codes::METHOD_NOT_ALLOWED,
            HubError::UnsupportedMediaType => error_codes::UNSUPPORTED_MEDIA_TYPE,
            HubError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    /// Internal errors log the real cause but never expose it to the client.
    fn public_message(&self) -> String {
        match self {
            HubError::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        if let HubError::Internal(cause) = &self {
            tracing::error!(error = %cause, "internal error");
        }

        let status = self.status();
        let envelope = HttpErrorEnvelope {
            code: self.code().to_owned(),
            message: self.public_message(),
            details: None,
        };

        let mut response = (status, Json(envelope)).into_response();

        match &self {
            HubError::AuthRequired => {
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer realm=\"mercure\""),
                );
            }
            HubError::MethodNotAllowed { allowed } => {
                if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                    response.headers_mut().insert(header::ALLOW, value);
                }
            }
            HubError::UnsupportedMediaType => {
                response.headers_mut().insert(
                    header::ACCEPT,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                );
            }
            _ => {}
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> HttpErrorEnvelope {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn auth_required_carries_www_authenticate() {
        let response = HubError::AuthRequired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer realm=\"mercure\""
        );
        let envelope = body_json(response).await;
        assert_eq!(envelope.code, error_codes::AUTH_REQUIRED);
    }

    #[tokio::test]
    async fn method_not_allowed_lists_allowed_methods() {
        let response = HubError::MethodNotAllowed {
            allowed: vec!["GET".to_owned(), "POST".to_owned()],
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET, POST");
    }

    #[tokio::test]
    async fn internal_error_hides_cause_from_body() {
        let response = HubError::Internal("database pool exhausted".to_owned()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = body_json(response).await;
        assert_eq!(envelope.message, "an internal error occurred");
    }

    #[tokio::test]
    async fn forbidden_reports_message_and_code() {
        let response =
            HubError::Forbidden("token missing mercure claim".to_owned()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let envelope = body_json(response).await;
        assert_eq!(envelope.code, error_codes::FORBIDDEN);
        assert_eq!(envelope.message, "token missing mercure claim");
    }
}
