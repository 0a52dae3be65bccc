use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::store::AppState;

const FORWARDED_USER: &str = "x-forwarded-user";
const FORWARDED_EMAIL: &str = "x-forwarded-email";

/// Claims produced by the authentication layer in front of the service.
/// Set as request extension; handlers never read it directly.
#[derive(Debug, Clone, Default)]
pub struct Claims(pub Map<String, Value>);

/// Authenticated caller extracted from request claims.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Name the catalog knows the caller by (login name, or email when no name claim).
    pub user_name: String,
    pub email: Option<String>,
    pub ip_addr: Option<String>,
}

impl AuthUser {
    pub fn identity(&self) -> &str {
        &self.user_name
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ip_addr = extract_ip(parts, state.config.trust_proxy_headers);
        let claims = parts
            .extensions
            .get::<Claims>()
            .ok_or(ApiError::Unauthorized)?;
        let (user_name, email) = identity_from_claims(claims)?;
        Ok(Self {
            user_name,
            email,
            ip_addr,
        })
    }
}

/// Read `username` (falling back to `email`) from the claims.
///
/// A claim that is present with a non-string value is a broken auth layer, not a missing
/// login, and is reported as an internal error.
fn identity_from_claims(claims: &Claims) -> Result<(String, Option<String>), ApiError> {
    let email = string_claim(claims, "email")?;
    let user_name = match string_claim(claims, "username")? {
        Some(name) => name,
        None => email.clone().ok_or(ApiError::Unauthorized)?,
    };
    Ok((user_name, email))
}

fn string_claim(claims: &Claims, key: &str) -> Result<Option<String>, ApiError> {
    match claims.0.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_owned())),
        Some(other) => Err(ApiError::Internal(anyhow::anyhow!(
            "{key} claim has unexpected type: {}",
            json_type(other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Turn identity headers set by a trusted reverse proxy into [`Claims`].
///
/// Claims already attached to the request win. Without `PORTAL_TRUST_PROXY` the headers
/// are ignored so clients cannot assert an identity themselves.
pub async fn proxy_claims(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if state.config.trust_proxy_headers
        && req.extensions().get::<Claims>().is_none()
        && let Some(claims) = claims_from_headers(req.headers())
    {
        req.extensions_mut().insert(claims);
    }
    next.run(req).await
}

fn claims_from_headers(headers: &axum::http::HeaderMap) -> Option<Claims> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    };
    let user = header(FORWARDED_USER);
    let email = header(FORWARDED_EMAIL);
    if user.is_none() && email.is_none() {
        return None;
    }
    let mut map = Map::new();
    if let Some(user) = user {
        map.insert("username".into(), Value::String(user));
    }
    if let Some(email) = email {
        map.insert("email".into(), Value::String(email));
    }
    Some(Claims(map))
}

fn extract_ip(parts: &Parts, trust_proxy: bool) -> Option<String> {
    // Only trust X-Forwarded-For when behind a configured reverse proxy
    if trust_proxy
        && let Some(forwarded) = parts.headers.get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(first_ip) = val.split(',').next()
    {
        return Some(first_ip.trim().to_owned());
    }
    parts
        .extensions
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use serde_json::json;

    fn make_parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/test");
        for &(k, v) in headers {
            builder = builder.header(k, v);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts
    }

    fn claims(value: Value) -> Claims {
        match value {
            Value::Object(map) => Claims(map),
            _ => panic!("claims must be an object"),
        }
    }

    // -- identity_from_claims --

    #[test]
    fn username_claim_is_identity() {
        let (name, email) =
            identity_from_claims(&claims(json!({"username": "alice", "email": "a@x.io"}))).unwrap();
        assert_eq!(name, "alice");
        assert_eq!(email.as_deref(), Some("a@x.io"));
    }

    #[test]
    fn email_is_fallback_identity() {
        let (name, _) = identity_from_claims(&claims(json!({"email": "a@x.io"}))).unwrap();
        assert_eq!(name, "a@x.io");
    }

    #[test]
    fn no_identity_claim_is_unauthorized() {
        let err = identity_from_claims(&claims(json!({"groups": ["x"]}))).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[test]
    fn wrong_typed_username_is_internal() {
        let err = identity_from_claims(&claims(json!({"username": 42}))).unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn blank_username_falls_back_to_email() {
        let (name, _) =
            identity_from_claims(&claims(json!({"username": " ", "email": "a@x.io"}))).unwrap();
        assert_eq!(name, "a@x.io");
    }

    // -- claims_from_headers --

    #[test]
    fn forwarded_headers_become_claims() {
        let parts = make_parts(&[(FORWARDED_USER, "alice"), (FORWARDED_EMAIL, "a@x.io")]);
        let c = claims_from_headers(&parts.headers).unwrap();
        assert_eq!(c.0.get("username"), Some(&json!("alice")));
        assert_eq!(c.0.get("email"), Some(&json!("a@x.io")));
    }

    #[test]
    fn no_forwarded_headers_no_claims() {
        let parts = make_parts(&[(FORWARDED_USER, "  ")]);
        assert!(claims_from_headers(&parts.headers).is_none());
    }

    // -- extract_ip --

    #[test]
    fn ip_from_forwarded_for_trusted() {
        let parts = make_parts(&[("x-forwarded-for", "1.2.3.4, 5.6.7.8")]);
        assert_eq!(extract_ip(&parts, true), Some("1.2.3.4".into()));
    }

    #[test]
    fn ip_forwarded_for_ignored_when_not_trusted() {
        let parts = make_parts(&[("x-forwarded-for", "1.2.3.4")]);
        assert_eq!(extract_ip(&parts, false), None);
    }
}
