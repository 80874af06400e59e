//! End-to-end flows through the router: gateway, session routes, admin routes.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{bearer, harness, harness_with, json_request, split};
use polygon_core::auth::jwt::{SigningSecret, TokenIssuer};
use polygon_core::models::auth::Role;
use serde_json::json;

#[tokio::test]
async fn login_sets_refresh_cookie_and_returns_pair() {
    let h = harness();
    let user_id = h.register("alice", "s3cret").await;
    h.teams.assign(&user_id, "team-7");

    let resp = h
        .send(json_request(
            "POST",
            "/v1/auth/login",
            &json!({"name": "alice", "password": "s3cret"}),
        ))
        .await;
    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .expect("set-cookie")
        .to_str()
        .unwrap()
        .to_string();
    let (status, body) = split(resp).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], user_id.as_str());
    assert_eq!(body["teamId"], "team-7");
    assert_eq!(body["role"], "user");
    let refresh = body["refreshToken"].as_str().unwrap();
    assert!(cookie.starts_with(&format!("refresh_token={refresh}")));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(body["expiresAt"].as_i64().unwrap() < body["refreshExpiresAt"].as_i64().unwrap());
}

#[tokio::test]
async fn login_failures() {
    let h = harness();
    h.register("bob", "right").await;

    let (status, body) = h
        .post_json("/v1/auth/login", json!({"name": "bob", "password": "wrong"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");

    let (status, _) = h
        .post_json("/v1/auth/login", json!({"name": "nobody", "password": "x"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = h.post_json("/v1/auth/login", json!({"name": "bob"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");
}

#[tokio::test]
async fn masked_unknown_user_looks_like_bad_password() {
    let mut config = common::config();
    config.mask_unknown_user = true;
    let h = harness_with(config);

    let (status, body) = h
        .post_json("/v1/auth/login", json!({"name": "nobody", "password": "x"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid credentials");
}

#[tokio::test]
async fn refresh_rotates_and_rejects_replay() {
    let h = harness();
    h.register("carol", "pw").await;
    let first = h.login("carol", "pw").await;
    let r1 = first["refreshToken"].as_str().unwrap().to_string();

    let (status, second) = h
        .post_json("/v1/auth/refresh", json!({"refreshToken": r1}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let r2 = second["refreshToken"].as_str().unwrap();
    assert_ne!(r1, r2);

    let (status, body) = h
        .post_json("/v1/auth/refresh", json!({"refreshToken": r1}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "refresh token expired or revoked");
}

#[tokio::test]
async fn refresh_accepts_cookie() {
    let h = harness();
    h.register("dave", "pw").await;
    let session = h.login("dave", "pw").await;
    let token = session["refreshToken"].as_str().unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/v1/auth/refresh")
        .header(header::COOKIE, format!("refresh_token={token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["refreshToken"], token);
}

#[tokio::test]
async fn refresh_without_token_is_invalid_argument() {
    let h = harness();
    let (status, body) = h.post_json("/v1/auth/refresh", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");

    let (status, _) = h
        .post_json("/v1/auth/refresh", json!({"refreshToken": "never-issued"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn validate_returns_identity() {
    let h = harness();
    let user_id = h.register("erin", "pw").await;
    let session = h.login("erin", "pw").await;

    let (status, body) = h
        .post_json("/v1/auth/validate", json!({"accessToken": session["accessToken"]}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], user_id.as_str());
    assert!(body.get("teamId").is_none());

    let (status, _) = h
        .post_json("/v1/auth/validate", json!({"accessToken": "garbage"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h.post_json("/v1/auth/validate", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn validate_accepts_both_access_token_spellings() {
    let h = harness();
    let user_id = h.register("erin", "pw").await;
    let session = h.login("erin", "pw").await;
    let token = session["accessToken"].as_str().unwrap();

    for body in [json!({"access_token": token}), json!({"accessToken": token})] {
        let (status, reply) = h.post_json("/v1/auth/validate", body).await;
        assert_eq!(status, StatusCode::OK, "{reply}");
        assert_eq!(reply["userId"], user_id.as_str());
    }
}

#[tokio::test]
async fn refresh_and_logout_accept_snake_case_field() {
    let h = harness();
    h.register("nora", "pw").await;
    let session = h.login("nora", "pw").await;
    let r0 = session["refreshToken"].as_str().unwrap();

    let (status, rotated) = h
        .post_json("/v1/auth/refresh", json!({"refresh_token": r0}))
        .await;
    assert_eq!(status, StatusCode::OK, "{rotated}");
    let r1 = rotated["refreshToken"].as_str().unwrap();
    assert_ne!(r0, r1);

    let (status, body) = h
        .post_json("/v1/auth/logout", json!({"refresh_token": r1}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], true);
}

#[tokio::test]
async fn register_passes_avatar_to_profile_store() {
    let h = harness();
    let (status, body) = h
        .post_json(
            "/v1/auth/register",
            json!({"name": "bob", "password": "p", "avatar": "x.png"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["avatarUrl"], "x.png");

    let profiles = h.profiles.profiles();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].avatar_url.as_deref(), Some("x.png"));
}

fn preflight(origin: &str) -> Request<Body> {
    Request::builder()
        .method("OPTIONS")
        .uri("/v1/auth/refresh")
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn preflight_defaults_to_any_origin_without_credentials() {
    let h = harness();
    let resp = h.send(preflight("https://elsewhere.example")).await;
    let headers = resp.headers();
    assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
}

#[tokio::test]
async fn preflight_for_configured_origin_allows_credentials() {
    let mut config = common::config();
    config.cors.origins = vec!["https://app.example.com".into()];
    let h = harness_with(config);

    let resp = h.send(preflight("https://app.example.com")).await;
    let headers = resp.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://app.example.com"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );

    let resp = h.send(preflight("https://evil.example")).await;
    assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn gateway_propagates_identity_downstream() {
    let h = harness();
    let user_id = h.register("frank", "pw").await;
    h.teams.assign(&user_id, "team-1");
    let session = h.login("frank", "pw").await;
    let token = session["accessToken"].as_str().unwrap();

    let req = bearer(Request::builder().uri("/v1/auth/session"), token)
        .body(Body::empty())
        .unwrap();
    let (status, body) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], user_id.as_str());
    assert_eq!(body["teamId"], "team-1");
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn spoofed_trust_headers_are_ignored() {
    let h = harness();
    let req = Request::builder()
        .uri("/v1/auth/session")
        .header("x-user-id", "someone-else")
        .header("x-user-role", "admin")
        .body(Body::empty())
        .unwrap();
    let (status, _) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_authorization_passes_through_unauthenticated() {
    let h = harness();
    // /healthz has no identity requirement; the gateway must not block it.
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let (status, body) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storeConnected"], true);
}

#[tokio::test]
async fn malformed_or_invalid_authorization_is_401() {
    let h = harness();

    let req = Request::builder()
        .uri("/healthz")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwdw==")
        .body(Body::empty())
        .unwrap();
    let (status, body) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_authorization_header");

    let req = bearer(Request::builder().uri("/healthz"), "not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, body) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn public_paths_ignore_bad_authorization() {
    let h = harness();
    h.register("gina", "pw").await;
    let req = Request::builder()
        .method("POST")
        .uri("/v1/auth/login")
        .header(header::AUTHORIZATION, "garbage")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"name": "gina", "password": "pw"}).to_string()))
        .unwrap();
    let (status, _) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn token_from_another_secret_is_rejected() {
    let h = harness();
    let other = TokenIssuer::new(&SigningSecret::new("other-secret").unwrap());
    let (token, _) = other
        .issue("u1", None, Role::Admin, chrono::Duration::minutes(5))
        .unwrap();
    let req = bearer(Request::builder().uri("/v1/auth/session"), &token)
        .body(Body::empty())
        .unwrap();
    let (status, _) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_prefix_requires_admin_role() {
    let h = harness();
    let user_id = h.register("henry", "pw").await;
    let session = h.login("henry", "pw").await;
    let token = session["accessToken"].as_str().unwrap();

    let req = bearer(
        Request::builder()
            .method("POST")
            .uri("/v1/admin/maintenance/purge-expired"),
        token,
    )
    .body(Body::empty())
    .unwrap();
    let (status, body) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "admin_access_required");

    let req = json_request(
        "PUT",
        &format!("/v1/admin/users/{user_id}/password"),
        &json!({"password": "new"}),
    );
    let (status, _) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_set_password_revokes_sessions() {
    let h = harness();
    let admin = h.admin_session("root").await;
    let admin_token = admin["accessToken"].as_str().unwrap();
    assert_eq!(admin["role"], "admin");

    let user_id = h.register("ivy", "old").await;
    let session = h.login("ivy", "old").await;
    let refresh = session["refreshToken"].as_str().unwrap();

    let mut req = json_request(
        "PUT",
        &format!("/v1/admin/users/{user_id}/password"),
        &json!({"password": "new"}),
    );
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {admin_token}").parse().unwrap(),
    );
    let (status, _) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = h
        .post_json("/v1/auth/refresh", json!({"refreshToken": refresh}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
        .post_json("/v1/auth/login", json!({"name": "ivy", "password": "old"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    h.login("ivy", "new").await;
}

#[tokio::test]
async fn admin_set_role_promotes_on_next_login() {
    let h = harness();
    let admin = h.admin_session("root").await;
    let admin_token = admin["accessToken"].as_str().unwrap();
    let user_id = h.register("jack", "pw").await;

    let mut req = json_request(
        "PUT",
        &format!("/v1/admin/users/{user_id}/role"),
        &json!({"role": "admin"}),
    );
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {admin_token}").parse().unwrap(),
    );
    let (status, _) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let session = h.login("jack", "pw").await;
    assert_eq!(session["role"], "admin");

    let mut req = json_request(
        "PUT",
        &format!("/v1/admin/users/{user_id}/role"),
        &json!({"role": "superuser"}),
    );
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {admin_token}").parse().unwrap(),
    );
    let (status, _) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logout_revokes_and_clears_cookie() {
    let h = harness();
    h.register("kate", "pw").await;
    let session = h.login("kate", "pw").await;
    let refresh = session["refreshToken"].as_str().unwrap();

    let resp = h
        .send(json_request(
            "POST",
            "/v1/auth/logout",
            &json!({"refreshToken": refresh}),
        ))
        .await;
    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let (status, body) = split(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], true);
    assert!(cookie.contains("Max-Age=0"));

    let (status, _) = h
        .post_json("/v1/auth/refresh", json!({"refreshToken": refresh}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = h
        .post_json("/v1/auth/logout", json!({"refreshToken": refresh}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], false);
}

#[tokio::test]
async fn logout_all_revokes_every_session() {
    let h = harness();
    h.register("liam", "pw").await;
    let a = h.login("liam", "pw").await;
    let b = h.login("liam", "pw").await;

    let req = bearer(
        Request::builder().method("POST").uri("/v1/auth/logout-all"),
        a["accessToken"].as_str().unwrap(),
    )
    .body(Body::empty())
    .unwrap();
    let (status, body) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 2);

    for session in [a, b] {
        let (status, _) = h
            .post_json(
                "/v1/auth/refresh",
                json!({"refreshToken": session["refreshToken"]}),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn unknown_path_is_404() {
    let h = harness();
    let req = Request::builder()
        .uri("/v1/unknown/thing")
        .body(Body::empty())
        .unwrap();
    let (status, body) = split(h.send(req).await).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}
