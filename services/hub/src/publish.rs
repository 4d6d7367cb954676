use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use mercure_auth::{authorize, check_origin, Authorization, Role};
use mercure_protocol::{any_selector_matches, BuildUpdateError, HubError, Update};

use crate::state::AppState;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// `POST /.well-known/mercure`: authorizes the publisher, builds an
/// `Update` from the form body, checks it against the publisher's granted
/// selectors, and hands it to the transport.
pub async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HubError> {
    check_origin(&headers, state.config.allowed_origins.as_deref())
        .map_err(|e| HubError::Forbidden(e.to_string()))?;

    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with(FORM_CONTENT_TYPE) {
        return Err(HubError::UnsupportedMediaType);
    }

    let authorization = authorize(
        &state.verifier,
        Role::Publisher,
        &headers,
        "",
        false,
        &state.config.cookie_name,
        state.config.public_url.as_ref(),
    )
    .await;

    let publisher_selectors = match authorization {
        Authorization::Granted(ctx) => ctx.authorized_topics,
        Authorization::MissingToken => return Err(HubError::AuthRequired),
        Authorization::Invalid(e) => return Err(HubError::Forbidden(e.to_string())),
    };

    let form = mercure_protocol::parse_publish_form(&body);
    let client_supplied_id = form.id.as_deref().filter(|id| !id.is_empty()).map(str::to_owned);

    let update = Update::build(form).map_err(|e| match e {
        BuildUpdateError::NoTopics | BuildUpdateError::InvalidRetry => {
            HubError::MalformedRequest(e.to_string())
        }
    })?;

    if !update
        .topics()
        .iter()
        .all(|topic| any_selector_matches(&publisher_selectors, topic))
    {
        return Err(HubError::Forbidden(
            "publisher token does not cover every topic in this update".to_owned(),
        ));
    }

    if let Some(id) = &client_supplied_id {
        if !any_selector_matches(&publisher_selectors, id) {
            return Err(HubError::Forbidden(
                "publisher token does not cover the supplied update id".to_owned(),
            ));
        }
    }

    let id = update.id().to_owned();
    state
        .hub
        .publish(update)
        .await
        .map_err(|e| HubError::Internal(e.to_string()))?;

    Ok((axum::http::StatusCode::OK, id).into_response())
}
