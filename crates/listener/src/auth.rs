//! Setup-token check for operator routes.

use std::collections::HashMap;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use crate::{ApiError, ListenerSettings};

/// Query parameter accepted in place of a bearer header.
pub const SETUP_TOKEN_PARAM: &str = "setup_token";

/// Passes when no setup token is configured, or when the request presents it
/// as `Authorization: Bearer <token>` or `?setup_token=<token>`.
pub fn authorize_setup(
    settings: &ListenerSettings,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Result<(), ApiError> {
    let Some(expected) = settings
        .setup_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    else {
        return Ok(());
    };

    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);
    let from_query = query.get(SETUP_TOKEN_PARAM).map(String::as_str);

    if [bearer, from_query]
        .into_iter()
        .flatten()
        .any(|candidate| token_matches(candidate, expected))
    {
        Ok(())
    } else {
        tracing::debug!("setup request without a valid token");
        Err(ApiError::unauthorized("unauthorized"))
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

fn token_matches(candidate: &str, expected: &str) -> bool {
    candidate.trim().as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use bridge::Provider;

    fn settings(token: Option<&str>) -> ListenerSettings {
        ListenerSettings {
            setup_token: token.map(str::to_string),
            ..ListenerSettings::new(Provider::GitHub, "secret")
        }
    }

    #[test]
    fn open_when_no_token_configured() {
        let empty = HashMap::new();
        assert!(authorize_setup(&settings(None), &HeaderMap::new(), &empty).is_ok());
        assert!(authorize_setup(&settings(Some("  ")), &HeaderMap::new(), &empty).is_ok());
    }

    #[test]
    fn accepts_bearer_in_any_case() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  op-token "));
        assert!(authorize_setup(&settings(Some("op-token")), &headers, &HashMap::new()).is_ok());
    }

    #[test]
    fn accepts_query_parameter() {
        let query = HashMap::from([(SETUP_TOKEN_PARAM.to_string(), "op-token".to_string())]);
        assert!(authorize_setup(&settings(Some("op-token")), &HeaderMap::new(), &query).is_ok());
    }

    #[test]
    fn rejects_wrong_or_missing_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic op-token"));
        let query = HashMap::from([(SETUP_TOKEN_PARAM.to_string(), "nope".to_string())]);
        let err = authorize_setup(&settings(Some("op-token")), &headers, &query).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);
        assert!(authorize_setup(&settings(Some("op-token")), &HeaderMap::new(), &HashMap::new()).is_err());
    }
}
