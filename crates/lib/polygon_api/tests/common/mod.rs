//! Shared harness: the full router over in-memory collaborators.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use polygon_api::config::ApiConfig;
use polygon_api::{AppState, router};
use polygon_core::auth::jwt::SigningSecret;
use polygon_core::auth::session::SessionService;
use polygon_core::auth::store::{AuthStore, MemoryAuthStore};
use polygon_core::collaborators::{MemoryProfileDirectory, StaticTeamDirectory, TeamDirectory};
use polygon_core::models::auth::Role;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

pub const SECRET: &str = "integration-test-secret";

pub struct Harness {
    pub app: Router,
    pub store: Arc<MemoryAuthStore>,
    pub teams: Arc<StaticTeamDirectory>,
    pub profiles: Arc<MemoryProfileDirectory>,
    pub config: ApiConfig,
}

pub fn config() -> ApiConfig {
    let secret = SigningSecret::new(SECRET).unwrap();
    ApiConfig::new(secret, Url::parse("http://users.invalid/").unwrap())
}

pub fn harness() -> Harness {
    harness_with(config())
}

pub fn harness_with(config: ApiConfig) -> Harness {
    let store = Arc::new(MemoryAuthStore::new());
    let teams = Arc::new(StaticTeamDirectory::new());
    let profiles = Arc::new(MemoryProfileDirectory::new());
    let session = SessionService::new(
        store.clone(),
        profiles.clone(),
        Some(teams.clone() as Arc<dyn TeamDirectory>),
        &config.jwt_secret,
        config.session_settings(),
    );
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    let state = AppState::new(Arc::new(session), config.clone(), http);
    Harness {
        app: router(state),
        store,
        teams,
        profiles,
        config,
    }
}

impl Harness {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.expect("request")
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let resp = self.send(json_request("POST", uri, &body)).await;
        split(resp).await
    }

    /// Register and return the new user id.
    pub async fn register(&self, name: &str, password: &str) -> String {
        let (status, body) = self
            .post_json("/v1/auth/register", json!({"name": name, "password": password}))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["userId"].as_str().expect("userId").to_string()
    }

    pub async fn login(&self, name: &str, password: &str) -> Value {
        let (status, body) = self
            .post_json("/v1/auth/login", json!({"name": name, "password": password}))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }

    /// Register, promote to admin, and log in.
    pub async fn admin_session(&self, name: &str) -> Value {
        let user_id = self.register(name, "admin-pass").await;
        assert!(self.store.set_role(&user_id, Role::Admin).await.unwrap());
        self.login(name, "admin-pass").await
    }
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn bearer(builder: axum::http::request::Builder, token: &str) -> axum::http::request::Builder {
    builder.header(header::AUTHORIZATION, format!("Bearer {token}"))
}

pub async fn split(resp: Response<Body>) -> (StatusCode, Value) {
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse JSON")
    };
    (status, json)
}
