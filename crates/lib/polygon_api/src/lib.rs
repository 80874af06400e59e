//! # polygon_api
//!
//! HTTP surface for the Polygon identity subsystem: session routes, admin
//! routes and the perimeter gateway in front of downstream services.

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod proxy;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post, put};
use polygon_core::auth::jwt::TokenValidator;
use polygon_core::auth::session::SessionService;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{ApiConfig, CorsSettings};
use crate::handlers::{admin, auth, health};
use crate::middleware::gateway::GatewayPolicy;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionService>,
    pub config: ApiConfig,
    pub gateway: GatewayPolicy,
    /// Gateway-side validator, keyed by the same secret as the session service.
    pub validator: TokenValidator,
    /// Client for proxied requests.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(session: Arc<SessionService>, config: ApiConfig, http: reqwest::Client) -> Self {
        let validator = TokenValidator::new(&config.jwt_secret);
        Self {
            session,
            config,
            gateway: GatewayPolicy::default(),
            validator,
            http,
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `polygon_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    polygon_core::migrate::migrate(pool).await
}

/// Any origin without credentials, or the configured origins with the
/// refresh cookie allowed through.
pub fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
        .expose_headers([CONTENT_TYPE, CONTENT_LENGTH, SET_COOKIE])
        .allow_credentials(settings.allow_credentials)
}

/// Builds the Axum router with all routes, the gateway layer and shared state.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors);

    let auth_routes = Router::new()
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_VALIDATE, post(auth::validate_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::POST_AUTH_LOGOUT_ALL, post(auth::logout_all_handler))
        .route(routes::GET_AUTH_SESSION, get(auth::session_handler));

    let admin_routes = Router::new()
        .route(routes::PUT_ADMIN_USER_PASSWORD, put(admin::set_password_handler))
        .route(routes::PUT_ADMIN_USER_ROLE, put(admin::set_role_handler))
        .route(routes::POST_ADMIN_PURGE_EXPIRED, post(admin::purge_expired_handler));

    Router::new()
        .route(routes::GET_HEALTHZ, get(health::health_handler))
        .merge(auth_routes)
        .merge(admin_routes)
        .fallback(proxy::forward)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::gateway::authenticate,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
