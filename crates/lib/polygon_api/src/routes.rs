//! Route paths served by this crate.

pub const POST_AUTH_REGISTER: &str = "/v1/auth/register";
pub const POST_AUTH_LOGIN: &str = "/v1/auth/login";
pub const POST_AUTH_REFRESH: &str = "/v1/auth/refresh";
pub const POST_AUTH_VALIDATE: &str = "/v1/auth/validate";
pub const POST_AUTH_LOGOUT: &str = "/v1/auth/logout";
pub const POST_AUTH_LOGOUT_ALL: &str = "/v1/auth/logout-all";
pub const GET_AUTH_SESSION: &str = "/v1/auth/session";

pub const PUT_ADMIN_USER_PASSWORD: &str = "/v1/admin/users/{user_id}/password";
pub const PUT_ADMIN_USER_ROLE: &str = "/v1/admin/users/{user_id}/role";
pub const POST_ADMIN_PURGE_EXPIRED: &str = "/v1/admin/maintenance/purge-expired";

pub const GET_HEALTHZ: &str = "/healthz";
