//! Identity as seen by a service behind the gateway.
//!
//! These extractors trust `x-user-id`, `x-team-id` and `x-user-role`
//! unconditionally; the gateway middleware is the only thing that sets them.

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, HeaderName, request::Parts};
use polygon_core::models::auth::{Role, VerifiedIdentity};

use crate::error::AppError;
use crate::middleware::gateway::{X_TEAM_ID, X_USER_ID, X_USER_ROLE};

/// Read the trust headers. `None` when no user id was propagated.
pub fn identity_from_headers(headers: &HeaderMap) -> Option<VerifiedIdentity> {
    let header = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let user_id = header(X_USER_ID)?;
    let role = header(X_USER_ROLE)
        .and_then(|r| r.parse::<Role>().ok())
        .unwrap_or_default();
    Some(VerifiedIdentity {
        user_id,
        team_id: header(X_TEAM_ID),
        role,
    })
}

/// Any authenticated caller.
#[derive(Debug, Clone)]
pub struct TrustedIdentity(pub VerifiedIdentity);

impl<S> FromRequestParts<S> for TrustedIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_headers(&parts.headers)
            .map(TrustedIdentity)
            .ok_or_else(|| AppError::unauthenticated("Authentication required"))
    }
}

/// An authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminIdentity(pub VerifiedIdentity);

impl<S> FromRequestParts<S> for AdminIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TrustedIdentity(identity) = TrustedIdentity::from_request_parts(parts, state).await?;
        if !identity.role.is_admin() {
            return Err(AppError::Forbidden {
                code: "admin_access_required",
                message: "Admin access required".into(),
            });
        }
        Ok(AdminIdentity(identity))
    }
}
