//! Administrative handlers. The gateway already requires the admin role on
//! this prefix; the extractor repeats the check for routes reached without it.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use polygon_core::models::auth::Role;
use tracing::info;

use super::json_body;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extractors::identity::AdminIdentity;
use crate::models::{PurgeResponse, SetPasswordRequest, SetRoleRequest};

/// `PUT /v1/admin/users/{user_id}/password`: set a password and revoke
/// the user's sessions.
pub async fn set_password_handler(
    State(state): State<AppState>,
    AdminIdentity(admin): AdminIdentity,
    Path(user_id): Path<String>,
    body: Bytes,
) -> AppResult<StatusCode> {
    let req: SetPasswordRequest = json_body(&body)?;
    state.session.set_password(&user_id, &req.password).await?;
    info!(admin = %admin.user_id, %user_id, "password set by admin");
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /v1/admin/users/{user_id}/role`
pub async fn set_role_handler(
    State(state): State<AppState>,
    AdminIdentity(admin): AdminIdentity,
    Path(user_id): Path<String>,
    body: Bytes,
) -> AppResult<StatusCode> {
    let req: SetRoleRequest = json_body(&body)?;
    let role: Role = req
        .role
        .parse()
        .map_err(|_| AppError::InvalidArgument("role must be 'user' or 'admin'".into()))?;
    state.session.set_role(&user_id, role).await?;
    info!(admin = %admin.user_id, %user_id, %role, "role set by admin");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/admin/maintenance/purge-expired`
pub async fn purge_expired_handler(
    State(state): State<AppState>,
    AdminIdentity(_): AdminIdentity,
) -> AppResult<Json<PurgeResponse>> {
    let deleted = state.session.purge_expired(Utc::now()).await?;
    Ok(Json(PurgeResponse { deleted }))
}
