// @zen-component: SESS-TokenEndpoints
//
//! Authentication service: login, refresh and logout flows delegating to
//! [`concierge_core::auth::session`].

use concierge_core::auth::session::SessionService;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{LogoutAllResponse, LogoutResponse, TokenResponse};

/// Authenticate with email + password.
pub async fn login(sessions: &SessionService, email: &str, password: &str) -> AppResult<TokenResponse> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(AppError::Validation("Email and password are required".into()));
    }
    let session = sessions.login(email, password).await?;
    Ok(session.into())
}

/// Exchange a refresh token for a new access token (and, with rotation, a new
/// refresh token).
pub async fn refresh(sessions: &SessionService, refresh_token: &str) -> AppResult<TokenResponse> {
    let session = sessions.refresh_session(refresh_token.trim()).await?;
    Ok(session.into())
}

/// Revoke a refresh token. Succeeds whether or not the token was still active.
pub async fn logout(sessions: &SessionService, refresh_token: Option<&str>) -> AppResult<LogoutResponse> {
    if let Some(token) = refresh_token.map(str::trim).filter(|t| !t.is_empty()) {
        let revoked = sessions.logout(token).await?;
        debug!(revoked, "logout");
    }
    Ok(LogoutResponse { success: true })
}

/// Revoke every session of `user_id`.
pub async fn logout_all(sessions: &SessionService, user_id: &str) -> AppResult<LogoutAllResponse> {
    let revoked = sessions.logout_all(user_id).await?;
    Ok(LogoutAllResponse { revoked })
}
