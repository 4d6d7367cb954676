use http::HeaderMap;

/// Extracts the hub's bearer token from a request per mercure.rocks
/// §Authorization's fixed precedence: `Authorization` header first (and
/// only that, when present), then the `authorization` query parameter if
/// the hub opted in, then the configured cookie.
pub fn extract_token<'a>(
    headers: &'a HeaderMap,
    query: &'a str,
    allow_query_authorization: bool,
    cookie_name: &str,
) -> Option<String> {
    if let Some(token) = extract_bearer_header(headers) {
        return Some(token);
    }
    if allow_query_authorization {
        if let Some(token) = extract_query_param(query) {
            return Some(token);
        }
    }
    extract_cookie(headers, cookie_name)
}

fn extract_bearer_header(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::to_owned)
}

fn extract_query_param(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "authorization")
        .map(|(_, value)| value.into_owned())
}

fn extract_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let raw = headers.get(http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == cookie_name).then(|| value.to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn prefers_authorization_header_over_everything() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );
        headers.insert(
            http::header::COOKIE,
            HeaderValue::from_static("mercureAuthorization=cookie-token"),
        );
        let token = extract_token(&headers, "authorization=query-token", true, "mercureAuthorization");
        assert_eq!(token.as_deref(), Some("header-token"));
    }

    #[test]
    fn falls_back_to_query_param_when_enabled() {
        let headers = HeaderMap::new();
        let token = extract_token(&headers, "authorization=query-token", true, "mercureAuthorization");
        assert_eq!(token.as_deref(), Some("query-token"));
    }

    #[test]
    fn ignores_query_param_when_disabled() {
        let headers = HeaderMap::new();
        let token = extract_token(&headers, "authorization=query-token", false, "mercureAuthorization");
        assert_eq!(token, None);
    }

    #[test]
    fn falls_back_to_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::COOKIE,
            HeaderValue::from_static("other=1; mercureAuthorization=cookie-token; another=2"),
        );
        let token = extract_token(&headers, "", false, "mercureAuthorization");
        assert_eq!(token.as_deref(), Some("cookie-token"));
    }

    #[test]
    fn no_token_found_returns_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_token(&headers, "", false, "mercureAuthorization"), None);
    }
}
