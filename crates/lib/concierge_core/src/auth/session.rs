// @zen-component: SESS-SessionService
//
//! Session lifecycle: login, issue, refresh (with rotation and reuse
//! detection), logout, and garbage collection of dead refresh tokens.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::AuthError;
use super::jwt::TokenIssuer;
use super::password::verify_password;
use super::refresh::{generate_refresh_token, hash_refresh_token};
use crate::config::SessionConfig;
use crate::models::auth::{IssuedSession, Principal, RefreshTokenRecord, RefreshTokenState};
use crate::store::CredentialStore;
use crate::uuid::uuidv7;

/// Issues and rotates session tokens against a [`CredentialStore`].
pub struct SessionService {
    issuer: TokenIssuer,
    store: Arc<dyn CredentialStore>,
    refresh_ttl: Duration,
    refresh_retention: Duration,
    reuse_grace: Duration,
    rotate_on_use: bool,
}

fn lifetime(
    name: &str,
    value: i64,
    to_duration: fn(i64) -> Option<Duration>,
) -> Result<Duration, AuthError> {
    to_duration(value)
        .ok_or_else(|| AuthError::InvalidConfiguration(format!("{name} out of range: {value}")))
}

impl SessionService {
    /// Build the service. Fails with [`AuthError::ConfigurationMissing`] when
    /// the signing secret is empty and with [`AuthError::InvalidConfiguration`]
    /// when a lifetime does not fit a [`Duration`].
    pub fn new(store: Arc<dyn CredentialStore>, config: &SessionConfig) -> Result<Self, AuthError> {
        let access_ttl = lifetime("access token TTL", config.access_ttl_secs, Duration::try_seconds)?;
        let issuer = TokenIssuer::new(config.signing_secret.as_bytes())?.with_access_ttl(access_ttl);
        Ok(Self {
            issuer,
            store,
            refresh_ttl: lifetime("refresh token TTL", config.refresh_ttl_days, Duration::try_days)?,
            refresh_retention: lifetime(
                "refresh token retention",
                config.refresh_retention_days,
                Duration::try_days,
            )?,
            reuse_grace: lifetime("reuse grace", config.reuse_grace_secs, Duration::try_seconds)?,
            rotate_on_use: config.rotate_on_use,
        })
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn rotates_on_use(&self) -> bool {
        self.rotate_on_use
    }

    /// Verify an access token and return who it belongs to.
    pub fn verify_access_token(&self, token: &str) -> Result<Principal, AuthError> {
        self.issuer
            .verify_access_token(token)
            .map(|claims| claims.principal())
    }

    /// Mint an access token and a fresh refresh token for `principal`.
    pub async fn issue_session(&self, principal: &Principal) -> Result<IssuedSession, AuthError> {
        let access_token = self.issuer.sign_access_token(principal)?;
        let refresh_token = self.mint_refresh_token(principal).await?;
        Ok(self.session(principal.clone(), access_token, Some(refresh_token)))
    }

    /// Authenticate with email and password.
    ///
    /// Unknown email, a user without a password, and a wrong password all fail
    /// with the same [`AuthError::InvalidCredentials`].
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedSession, AuthError> {
        let Some(found) = self.store.find_user_by_email(email).await? else {
            debug!(email, "login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        let Some(hash) = found.password_hash.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let principal = found.user.principal();
        info!(user_id = %principal.user_id, role = %principal.role, "login succeeded");
        self.issue_session(&principal).await
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The access token carries the role and tenant captured when the refresh
    /// token was issued. With rotation on, the presented token is revoked with
    /// a compare-and-set before anything is signed, so of two concurrent
    /// refreshes only one can win; the other gets [`AuthError::RevokedToken`].
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<IssuedSession, AuthError> {
        let token_hash = hash_refresh_token(refresh_token);
        let record = self
            .store
            .find_refresh_token(&token_hash)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        let now = Utc::now();
        match record.state_at(now) {
            RefreshTokenState::Active => {}
            RefreshTokenState::Expired => return Err(AuthError::ExpiredToken),
            RefreshTokenState::Revoked => {
                if self.rotate_on_use {
                    if self.revoked_within_grace(&record, now) {
                        debug!(user_id = %record.user_id, "refresh token rotated moments ago");
                    } else {
                        self.revoke_family_on_reuse(&record).await?;
                    }
                }
                return Err(AuthError::RevokedToken);
            }
        }

        let principal = record.principal();

        if !self.rotate_on_use {
            let access_token = self.issuer.sign_access_token(&principal)?;
            return Ok(self.session(principal, access_token, None));
        }

        if !self.store.revoke_refresh_token(&token_hash, now).await? {
            debug!(user_id = %principal.user_id, "lost refresh rotation race");
            return Err(AuthError::RevokedToken);
        }

        let access_token = self.issuer.sign_access_token(&principal)?;
        let next = self.mint_refresh_token(&principal).await?;
        debug!(user_id = %principal.user_id, "refresh token rotated");
        Ok(self.session(principal, access_token, Some(next)))
    }

    /// Revoke one refresh token. Unknown or already revoked tokens are not an
    /// error; returns whether this call did the revoking.
    pub async fn logout(&self, refresh_token: &str) -> Result<bool, AuthError> {
        let token_hash = hash_refresh_token(refresh_token);
        let revoked = self
            .store
            .revoke_refresh_token(&token_hash, Utc::now())
            .await?;
        Ok(revoked)
    }

    /// Revoke every active refresh token of `user_id`.
    pub async fn logout_all(&self, user_id: &str) -> Result<u64, AuthError> {
        let revoked = self
            .store
            .revoke_all_refresh_tokens(user_id, Utc::now())
            .await?;
        info!(user_id, revoked, "revoked all refresh tokens");
        Ok(revoked)
    }

    /// Delete refresh tokens that expired longer ago than the retention window.
    ///
    /// Revoked tokens are kept until then too, so presenting one is still
    /// recognised as reuse rather than an unknown token.
    pub async fn purge_expired_refresh_tokens(&self) -> Result<u64, AuthError> {
        let cutoff = Utc::now()
            .checked_sub_signed(self.refresh_retention)
            .ok_or_else(|| AuthError::Internal("retention cutoff out of range".into()))?;
        Ok(self.store.purge_refresh_tokens_expired_before(cutoff).await?)
    }

    /// A concurrent refresh of the same token loses the compare-and-set after
    /// the winner has revoked it; such a loser is not a replay.
    fn revoked_within_grace(&self, record: &RefreshTokenRecord, now: DateTime<Utc>) -> bool {
        record
            .revoked_at
            .is_some_and(|revoked_at| now - revoked_at < self.reuse_grace)
    }

    async fn revoke_family_on_reuse(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        let revoked = self
            .store
            .revoke_all_refresh_tokens(&record.user_id, Utc::now())
            .await?;
        warn!(
            user_id = %record.user_id,
            token_id = %record.id,
            revoked,
            "revoked refresh token presented again, revoking all sessions of user"
        );
        Ok(())
    }

    async fn mint_refresh_token(&self, principal: &Principal) -> Result<String, AuthError> {
        let token = generate_refresh_token();
        let issued_at = Utc::now();
        let expires_at = issued_at
            .checked_add_signed(self.refresh_ttl)
            .ok_or_else(|| AuthError::Internal("refresh token expiry out of range".into()))?;
        let record = RefreshTokenRecord {
            id: uuidv7().to_string(),
            token_hash: hash_refresh_token(&token),
            user_id: principal.user_id.clone(),
            role: principal.role,
            hotel_id: principal.hotel_id.clone(),
            issued_at,
            expires_at,
            revoked_at: None,
        };
        self.store.insert_refresh_token(&record).await?;
        Ok(token)
    }

    fn session(
        &self,
        principal: Principal,
        access_token: String,
        refresh_token: Option<String>,
    ) -> IssuedSession {
        IssuedSession {
            principal,
            access_token,
            expires_in: self.issuer.access_ttl().num_seconds(),
            refresh_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::models::auth::Role;
    use crate::store::memory::MemoryStore;

    fn staff() -> Principal {
        Principal {
            user_id: "user-1".into(),
            role: Role::Staff,
            hotel_id: Some("hotel-1".into()),
        }
    }

    fn service_with(config: SessionConfig) -> (Arc<SessionService>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = SessionService::new(store.clone(), &config).unwrap();
        (Arc::new(service), store)
    }

    fn service() -> (Arc<SessionService>, Arc<MemoryStore>) {
        service_with(SessionConfig::with_secret("test-secret"))
    }

    #[test]
    fn empty_secret_fails_construction() {
        let store = Arc::new(MemoryStore::new());
        let result = SessionService::new(store, &SessionConfig::with_secret(""));
        assert!(matches!(result, Err(AuthError::ConfigurationMissing(_))));
    }

    #[tokio::test]
    async fn issued_session_verifies() {
        let (svc, store) = service();
        let session = svc.issue_session(&staff()).await.unwrap();
        assert_eq!(session.expires_in, 3600);
        assert!(session.refresh_token.is_some());
        assert_eq!(svc.verify_access_token(&session.access_token).unwrap(), staff());
        assert_eq!(store.refresh_token_count(), 1);
    }

    #[tokio::test]
    async fn refresh_rotates_and_keeps_captured_principal() {
        let (svc, _) = service();
        let first = svc.issue_session(&staff()).await.unwrap();
        let old = first.refresh_token.unwrap();

        let second = svc.refresh_session(&old).await.unwrap();
        let new = second.refresh_token.clone().unwrap();
        assert_ne!(old, new);
        assert_eq!(second.principal, staff());
        assert_eq!(svc.verify_access_token(&second.access_token).unwrap(), staff());

        // The rotated token can be refreshed in turn.
        assert!(svc.refresh_session(&new).await.is_ok());
    }

    #[tokio::test]
    async fn revoked_token_stays_revoked() {
        let (svc, _) = service();
        let token = svc.issue_session(&staff()).await.unwrap().refresh_token.unwrap();
        assert!(svc.logout(&token).await.unwrap());

        for _ in 0..3 {
            assert!(matches!(
                svc.refresh_session(&token).await,
                Err(AuthError::RevokedToken)
            ));
        }
        // Second logout is a no-op.
        assert!(!svc.logout(&token).await.unwrap());
    }

    #[tokio::test]
    async fn replaying_a_rotated_token_revokes_every_session() {
        let mut config = SessionConfig::with_secret("test-secret");
        config.reuse_grace_secs = 0;
        let (svc, _) = service_with(config);
        let stolen = svc.issue_session(&staff()).await.unwrap().refresh_token.unwrap();
        let other_device = svc.issue_session(&staff()).await.unwrap().refresh_token.unwrap();
        let rotated = svc
            .refresh_session(&stolen)
            .await
            .unwrap()
            .refresh_token
            .unwrap();

        assert!(matches!(
            svc.refresh_session(&stolen).await,
            Err(AuthError::RevokedToken)
        ));
        assert!(matches!(
            svc.refresh_session(&rotated).await,
            Err(AuthError::RevokedToken)
        ));
        assert!(matches!(
            svc.refresh_session(&other_device).await,
            Err(AuthError::RevokedToken)
        ));
    }

    #[tokio::test]
    async fn concurrent_refresh_has_exactly_one_winner() {
        let (svc, _) = service();
        let token = svc.issue_session(&staff()).await.unwrap().refresh_token.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = svc.clone();
                let token = token.clone();
                tokio::spawn(async move { svc.refresh_session(&token).await })
            })
            .collect();

        let mut winners = Vec::new();
        let mut revoked = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(session) => winners.push(session),
                Err(AuthError::RevokedToken) => revoked += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(revoked, 7);

        // Losing the race must not cost the winner its session.
        let rotated = winners.remove(0).refresh_token.unwrap();
        assert!(svc.refresh_session(&rotated).await.is_ok());
    }

    #[test]
    fn concurrent_refresh_never_logs_the_winner_out() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (svc, _) = service();
            for _ in 0..50 {
                let token = svc.issue_session(&staff()).await.unwrap().refresh_token.unwrap();
                let a = tokio::spawn({
                    let (svc, token) = (svc.clone(), token.clone());
                    async move { svc.refresh_session(&token).await }
                });
                let b = tokio::spawn({
                    let (svc, token) = (svc.clone(), token.clone());
                    async move { svc.refresh_session(&token).await }
                });
                let results = [a.await.unwrap(), b.await.unwrap()];
                let winner = results
                    .iter()
                    .find_map(|r| r.as_ref().ok())
                    .and_then(|s| s.refresh_token.clone())
                    .expect("one refresh wins");
                assert!(
                    results
                        .iter()
                        .any(|r| matches!(r, Err(AuthError::RevokedToken)))
                );
                assert!(svc.refresh_session(&winner).await.is_ok());
            }
        });
    }

    #[tokio::test]
    async fn token_presented_again_right_after_rotation_keeps_sessions() {
        let (svc, _) = service();
        let original = svc.issue_session(&staff()).await.unwrap().refresh_token.unwrap();
        let other_device = svc.issue_session(&staff()).await.unwrap().refresh_token.unwrap();
        let rotated = svc
            .refresh_session(&original)
            .await
            .unwrap()
            .refresh_token
            .unwrap();

        assert!(matches!(
            svc.refresh_session(&original).await,
            Err(AuthError::RevokedToken)
        ));
        assert!(svc.refresh_session(&rotated).await.is_ok());
        assert!(svc.refresh_session(&other_device).await.is_ok());
    }

    #[tokio::test]
    async fn oversized_refresh_ttl_is_an_error_not_a_panic() {
        let mut config = SessionConfig::with_secret("test-secret");
        config.refresh_ttl_days = 100_000_000;
        let (svc, store) = service_with(config);
        assert!(matches!(
            svc.issue_session(&staff()).await,
            Err(AuthError::Internal(_))
        ));
        assert_eq!(store.refresh_token_count(), 0);
    }

    #[test]
    fn unrepresentable_lifetime_fails_construction() {
        let mut config = SessionConfig::with_secret("test-secret");
        config.access_ttl_secs = i64::MAX;
        let result = SessionService::new(Arc::new(MemoryStore::new()), &config);
        assert!(matches!(result, Err(AuthError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (svc, _) = service();
        assert!(matches!(
            svc.refresh_session("never-issued").await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn expired_refresh_token_is_rejected() {
        let mut config = SessionConfig::with_secret("test-secret");
        config.refresh_ttl_days = -1;
        let (svc, _) = service_with(config);
        let token = svc.issue_session(&staff()).await.unwrap().refresh_token.unwrap();
        assert!(matches!(
            svc.refresh_session(&token).await,
            Err(AuthError::ExpiredToken)
        ));
    }

    #[tokio::test]
    async fn without_rotation_the_token_is_reusable() {
        let mut config = SessionConfig::with_secret("test-secret");
        config.rotate_on_use = false;
        let (svc, store) = service_with(config);
        let token = svc.issue_session(&staff()).await.unwrap().refresh_token.unwrap();

        for _ in 0..2 {
            let session = svc.refresh_session(&token).await.unwrap();
            assert!(session.refresh_token.is_none());
        }
        assert_eq!(store.refresh_token_count(), 1);
    }

    #[tokio::test]
    async fn login_checks_password_uniformly() {
        let (svc, store) = service();
        let hash = hash_password("correct horse").unwrap();
        let id = store.insert_user("staff@example.com", Some(hash), Role::Admin, Some("hotel-7"));
        store.insert_user("sso@example.com", None, Role::Guest, None);

        let session = svc.login("staff@example.com", "correct horse").await.unwrap();
        assert_eq!(session.principal.user_id, id);
        assert_eq!(session.principal.hotel_id.as_deref(), Some("hotel-7"));

        for (email, password) in [
            ("staff@example.com", "wrong"),
            ("nobody@example.com", "correct horse"),
            ("sso@example.com", "anything"),
        ] {
            assert!(matches!(
                svc.login(email, password).await,
                Err(AuthError::InvalidCredentials)
            ));
        }
    }

    #[tokio::test]
    async fn logout_all_revokes_every_token_of_user() {
        let (svc, _) = service();
        let a = svc.issue_session(&staff()).await.unwrap().refresh_token.unwrap();
        let b = svc.issue_session(&staff()).await.unwrap().refresh_token.unwrap();

        assert_eq!(svc.logout_all("user-1").await.unwrap(), 2);
        for token in [a, b] {
            assert!(matches!(
                svc.refresh_session(&token).await,
                Err(AuthError::RevokedToken)
            ));
        }
    }

    #[tokio::test]
    async fn purge_respects_retention() {
        let mut config = SessionConfig::with_secret("test-secret");
        config.refresh_ttl_days = -10;
        config.refresh_retention_days = 7;
        let (svc, store) = service_with(config);
        svc.issue_session(&staff()).await.unwrap();

        assert_eq!(svc.purge_expired_refresh_tokens().await.unwrap(), 1);
        assert_eq!(store.refresh_token_count(), 0);
    }

    #[tokio::test]
    async fn purge_keeps_revoked_tokens_until_they_expire() {
        let mut config = SessionConfig::with_secret("test-secret");
        config.reuse_grace_secs = 0;
        let (svc, store) = service_with(config);
        let token = svc.issue_session(&staff()).await.unwrap().refresh_token.unwrap();
        assert!(svc.logout(&token).await.unwrap());

        assert_eq!(svc.purge_expired_refresh_tokens().await.unwrap(), 0);
        assert_eq!(store.refresh_token_count(), 1);
        assert!(matches!(
            svc.refresh_session(&token).await,
            Err(AuthError::RevokedToken)
        ));
    }
}
