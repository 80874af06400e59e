//! Perimeter gateway: bearer token verification and trust-header injection.
//!
//! Runs in front of every route, including the upstream proxy. Handlers and
//! downstream services read identity only from the headers set here.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use polygon_core::models::auth::VerifiedIdentity;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_TEAM_ID: HeaderName = HeaderName::from_static("x-team-id");
pub const X_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");
pub const X_REFRESH_TOKEN: HeaderName = HeaderName::from_static("x-refresh-token");

/// Headers only the gateway may set.
pub const TRUST_HEADERS: [HeaderName; 4] = [X_USER_ID, X_TEAM_ID, X_USER_ROLE, X_REFRESH_TOKEN];

/// Which paths skip authentication and which require an admin.
#[derive(Clone, Debug)]
pub struct GatewayPolicy {
    pub public_prefixes: Vec<String>,
    pub admin_prefix: String,
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self {
            public_prefixes: vec![
                crate::routes::POST_AUTH_LOGIN.to_string(),
                crate::routes::POST_AUTH_REGISTER.to_string(),
                crate::routes::POST_AUTH_REFRESH.to_string(),
            ],
            admin_prefix: "/v1/admin/".to_string(),
        }
    }
}

impl GatewayPolicy {
    pub fn is_public(&self, path: &str) -> bool {
        self.public_prefixes.iter().any(|p| path.starts_with(p))
    }

    pub fn is_admin(&self, path: &str) -> bool {
        path.starts_with(&self.admin_prefix)
    }
}

/// Verified identity, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub VerifiedIdentity);

/// Extract the token from `Bearer <token>`. The scheme is case-insensitive.
pub fn bearer_token(value: &HeaderValue) -> Option<&str> {
    let value = value.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}

fn strip_trust_headers(headers: &mut HeaderMap) {
    for name in TRUST_HEADERS {
        headers.remove(name);
    }
}

fn propagate_refresh_cookie(headers: &mut HeaderMap, cookie_name: &str) {
    let token = CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());
    if let Some(token) = token
        && let Ok(value) = HeaderValue::from_str(&token)
    {
        headers.insert(X_REFRESH_TOKEN, value);
    }
}

fn insert_identity(headers: &mut HeaderMap, identity: &VerifiedIdentity) -> Result<(), AppError> {
    let invalid = |_| AppError::Internal("identity is not a valid header value".into());
    headers.insert(X_USER_ID, HeaderValue::from_str(&identity.user_id).map_err(invalid)?);
    if let Some(team_id) = &identity.team_id {
        headers.insert(X_TEAM_ID, HeaderValue::from_str(team_id).map_err(invalid)?);
    }
    headers.insert(X_USER_ROLE, HeaderValue::from_static(identity.role.as_str()));
    Ok(())
}

/// Axum middleware implementing the gateway state machine.
///
/// Public paths and requests without `Authorization` pass through
/// unauthenticated. A malformed header or an invalid token is a 401; a valid
/// non-admin token on an admin path is a 403.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_string();
    let headers = request.headers_mut();
    strip_trust_headers(headers);
    propagate_refresh_cookie(headers, &state.config.cookie.name);

    if state.gateway.is_public(&path) {
        return Ok(next.run(request).await);
    }

    let Some(header) = request.headers().get(AUTHORIZATION) else {
        return Ok(next.run(request).await);
    };

    let token = bearer_token(header).ok_or_else(|| AppError::Unauthenticated {
        code: "invalid_authorization_header",
        message: "Authorization header must be 'Bearer <token>'".into(),
    })?;

    let identity = state
        .validator
        .validate(token)
        .map(|claims| claims.into_identity())
        .map_err(|e| {
            debug!(error = %e, %path, "access token rejected");
            AppError::Unauthenticated {
                code: "invalid_token",
                message: "Invalid or expired token".into(),
            }
        })?;

    if state.gateway.is_admin(&path) && !identity.role.is_admin() {
        return Err(AppError::Forbidden {
            code: "admin_access_required",
            message: "Admin access required".into(),
        });
    }

    // The Authorization header stays; upstreams may forward it further.
    insert_identity(request.headers_mut(), &identity)?;
    request.extensions_mut().insert(AuthenticatedUser(identity));

    Ok(next.run(request).await)
}
