//! Bearer token extraction and caller identity.
//!
//! Lectern does not issue or verify tokens itself: the caller's token is
//! forwarded to the course backend on every call, and the backend decides.
//! The caller's role only comes from identity headers set by a gateway that
//! presents the configured shared key; everyone else is a student.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use lectern_core::types::{AuthToken, RequestContext, UserRole};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

pub const GATEWAY_KEY_HEADER: &str = "x-gateway-key";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<AuthToken> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| AuthToken::new(token))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolve who is calling.
///
/// Without a gateway key header the caller is an anonymous student. With
/// one, the key must match `gateway_key`, and the identity headers are
/// then trusted.
pub fn caller_identity(headers: &HeaderMap, gateway_key: Option<&str>) -> Result<RequestContext, ApiError> {
    let Some(presented) = header_str(headers, GATEWAY_KEY_HEADER) else {
        if headers.contains_key(USER_ROLE_HEADER) {
            debug!("Ignoring identity headers without a gateway key");
        }
        return Ok(RequestContext::default());
    };
    match gateway_key {
        Some(expected) if expected == presented => {}
        Some(_) => return Err(ApiError::Unauthorized("Invalid gateway key".into())),
        None => {
            warn!("Gateway key presented but none is configured");
            return Err(ApiError::Unauthorized("Gateway identity is not enabled".into()));
        }
    }

    let role = match header_str(headers, USER_ROLE_HEADER) {
        Some(raw) => raw.parse::<UserRole>().map_err(ApiError::BadRequest)?,
        None => UserRole::default(),
    };
    Ok(RequestContext {
        user_email: header_str(headers, USER_EMAIL_HEADER).map(str::to_string),
        user_name: header_str(headers, USER_NAME_HEADER).map(str::to_string),
        role,
    })
}

/// Middleware that rejects requests without a bearer token (401) and
/// attaches the [`AuthToken`] and resolved [`RequestContext`] as extensions.
pub async fn require_bearer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let token = match req.headers().get(AUTHORIZATION) {
        None => return ApiError::Unauthorized("Missing Authorization header".into()).into_response(),
        Some(value) => match value.to_str().ok().and_then(bearer_token) {
            Some(token) => token,
            None => return ApiError::Unauthorized("Invalid bearer token".into()).into_response(),
        },
    };
    let identity = match caller_identity(req.headers(), state.gateway_key.as_deref()) {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };
    req.extensions_mut().insert(token);
    req.extensions_mut().insert(identity);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def").unwrap().as_str(), "abc.def");
        assert_eq!(bearer_token("bearer  xyz ").unwrap().as_str(), "xyz");
        assert!(bearer_token("Basic dXNlcjpwYXNz").is_none());
        assert!(bearer_token("Bearer ").is_none());
        assert!(bearer_token("Bearer").is_none());
    }

    // ---- caller identity ----

    #[test]
    fn test_no_gateway_is_student() {
        let identity = caller_identity(&headers(&[]), Some("k")).unwrap();
        assert_eq!(identity, RequestContext::default());
    }

    #[test]
    fn test_role_header_without_key_ignored() {
        let h = headers(&[(USER_ROLE_HEADER, "super_admin")]);
        assert_eq!(caller_identity(&h, Some("k")).unwrap().role, UserRole::Student);
        assert_eq!(caller_identity(&h, None).unwrap().role, UserRole::Student);
    }

    #[test]
    fn test_trusted_gateway_identity() {
        let h = headers(&[
            (GATEWAY_KEY_HEADER, "k"),
            (USER_ROLE_HEADER, "teacher"),
            (USER_EMAIL_HEADER, "t@school.edu"),
            (USER_NAME_HEADER, "Sam"),
        ]);
        let identity = caller_identity(&h, Some("k")).unwrap();
        assert_eq!(identity.role, UserRole::Teacher);
        assert_eq!(identity.user_email.as_deref(), Some("t@school.edu"));
        assert_eq!(identity.user_name.as_deref(), Some("Sam"));
    }

    #[test]
    fn test_wrong_or_unconfigured_key_rejected() {
        let h = headers(&[(GATEWAY_KEY_HEADER, "guess"), (USER_ROLE_HEADER, "super_admin")]);
        assert!(matches!(caller_identity(&h, Some("k")), Err(ApiError::Unauthorized(_))));
        assert!(matches!(caller_identity(&h, None), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_unknown_role_is_bad_request() {
        let h = headers(&[(GATEWAY_KEY_HEADER, "k"), (USER_ROLE_HEADER, "dean")]);
        assert!(matches!(caller_identity(&h, Some("k")), Err(ApiError::BadRequest(_))));
    }
}
