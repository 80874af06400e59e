//! Authentication request handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use polygon_core::auth::AuthError;
use polygon_core::models::auth::{IssuedSession, VerifiedIdentity};

use super::json_body;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extractors::identity::TrustedIdentity;
use crate::middleware::gateway::X_REFRESH_TOKEN;
use crate::models::{
    CreateUserRequest, CreateUserResponse, IdentityResponse, LoginRequest, LogoutResponse,
    RefreshRequest, RevokeAllResponse, SessionResponse, ValidateTokenRequest,
};
use crate::services::cookies::{clear_refresh_cookie, refresh_cookie};

impl From<IssuedSession> for SessionResponse {
    fn from(s: IssuedSession) -> Self {
        Self {
            access_token: s.access_token,
            expires_at: s.access_expires_at.timestamp(),
            user_id: s.user_id,
            team_id: s.team_id,
            role: s.role.to_string(),
            refresh_token: s.refresh_token,
            refresh_expires_at: s.refresh_expires_at.timestamp(),
        }
    }
}

impl From<VerifiedIdentity> for IdentityResponse {
    fn from(i: VerifiedIdentity) -> Self {
        Self {
            user_id: i.user_id,
            team_id: i.team_id,
            role: i.role.to_string(),
        }
    }
}

/// Body field first, then the cookie, then the header the gateway copies
/// the cookie into.
fn presented_refresh_token(
    body: RefreshRequest,
    jar: &CookieJar,
    headers: &HeaderMap,
    cookie_name: &str,
) -> Option<String> {
    body.refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| {
            jar.get(cookie_name)
                .map(|c| c.value().to_string())
                .filter(|t| !t.is_empty())
        })
        .or_else(|| {
            headers
                .get(X_REFRESH_TOKEN)
                .and_then(|v| v.to_str().ok())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
}

fn session_reply(
    state: &AppState,
    jar: CookieJar,
    session: IssuedSession,
) -> (CookieJar, Json<SessionResponse>) {
    let cookie = refresh_cookie(
        &state.config.cookie,
        &session.refresh_token,
        session.refresh_expires_at,
    );
    (jar.add(cookie), Json(session.into()))
}

/// `POST /v1/auth/register`: create the profile upstream and its credential.
pub async fn register_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<CreateUserResponse>> {
    let req: CreateUserRequest = json_body(&body)?;
    let user = state
        .session
        .create_user(&req.name, &req.password, req.avatar.as_deref())
        .await?;
    Ok(Json(CreateUserResponse {
        user_id: user.user_id,
        name: user.name,
        avatar_url: user.avatar_url,
    }))
}

/// `POST /v1/auth/login`
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let req: LoginRequest = json_body(&body)?;
    let session = state
        .session
        .login(&req.name, &req.password)
        .await
        .map_err(|e| match e {
            AuthError::NotFound(_) if state.config.mask_unknown_user => {
                AppError::unauthenticated("invalid credentials")
            }
            other => other.into(),
        })?;
    Ok(session_reply(&state, jar, session))
}

/// `POST /v1/auth/refresh`: rotate the refresh token and reissue the cookie.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let req: RefreshRequest = json_body(&body)?;
    let token = presented_refresh_token(req, &jar, &headers, &state.config.cookie.name)
        .ok_or_else(|| AppError::InvalidArgument("refresh token required".into()))?;
    let session = state.session.refresh(&token).await?;
    Ok(session_reply(&state, jar, session))
}

/// `POST /v1/auth/validate`
pub async fn validate_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<IdentityResponse>> {
    let req: ValidateTokenRequest = json_body(&body)?;
    let identity = state.session.validate_token(&req.access_token)?;
    Ok(Json(identity.into()))
}

/// `POST /v1/auth/logout`: revoke the presented refresh token, if any.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(CookieJar, Json<LogoutResponse>)> {
    let req: RefreshRequest = json_body(&body)?;
    let revoked = match presented_refresh_token(req, &jar, &headers, &state.config.cookie.name) {
        Some(token) => state.session.logout(&token).await?,
        None => false,
    };
    let jar = jar.add(clear_refresh_cookie(&state.config.cookie));
    Ok((jar, Json(LogoutResponse { revoked })))
}

/// `POST /v1/auth/logout-all`: revoke every session of the caller.
pub async fn logout_all_handler(
    State(state): State<AppState>,
    TrustedIdentity(identity): TrustedIdentity,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<RevokeAllResponse>)> {
    let revoked = state.session.revoke_all(&identity.user_id).await?;
    let jar = jar.add(clear_refresh_cookie(&state.config.cookie));
    Ok((jar, Json(RevokeAllResponse { revoked })))
}

/// `GET /v1/auth/session`: echo the identity the gateway propagated.
pub async fn session_handler(
    TrustedIdentity(identity): TrustedIdentity,
) -> Json<IdentityResponse> {
    Json(identity.into())
}
