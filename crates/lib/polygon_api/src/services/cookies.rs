//! Refresh-token cookie construction.

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Utc};
use time::{Duration, OffsetDateTime};

use crate::config::CookieSettings;

fn base(settings: &CookieSettings, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::build((settings.name.clone(), value))
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build();
    if let Some(domain) = &settings.domain {
        cookie.set_domain(domain.clone());
    }
    cookie
}

/// HttpOnly cookie carrying the refresh token, expiring with it.
pub fn refresh_cookie(
    settings: &CookieSettings,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Cookie<'static> {
    let mut cookie = base(settings, token.to_string());
    if let Ok(at) = OffsetDateTime::from_unix_timestamp(expires_at.timestamp()) {
        cookie.set_expires(at);
    }
    cookie
}

/// Expired cookie that makes the browser drop the refresh token.
pub fn clear_refresh_cookie(settings: &CookieSettings) -> Cookie<'static> {
    let mut cookie = base(settings, String::new());
    cookie.set_max_age(Duration::ZERO);
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
    cookie
}
