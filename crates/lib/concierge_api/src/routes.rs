//! Route paths.

pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
pub const POST_AUTH_LOGOUT_ALL: &str = "/auth/logout-all";

pub const GET_PUSH_VAPID_PUBLIC_KEY: &str = "/push/vapid-public-key";
pub const POST_PUSH_SUBSCRIPTIONS_WEB: &str = "/push/subscriptions/web";
pub const POST_PUSH_SUBSCRIPTIONS_MOBILE: &str = "/push/subscriptions/mobile";
pub const POST_PUSH_UNSUBSCRIBE: &str = "/push/unsubscribe";
pub const POST_PUSH_TEST: &str = "/push/test";
