// @zen-component: STORE-CredentialStore
//
//! Credential store: the system of record for users, refresh tokens and push
//! endpoints.
//!
//! The token issuer, push registry and dispatcher only ever talk to the
//! [`CredentialStore`] trait. [`postgres::PgStore`] is the production
//! implementation; [`memory::MemoryStore`] backs tests and local runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::auth::{RefreshTokenRecord, UserWithPassword};
use crate::models::push::{Channel, EndpointTarget, PushEndpoint};

/// Credential store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Storage operations consumed by the session and push services.
///
/// Every mutation is atomic per row. Implementations must make
/// [`revoke_refresh_token`](CredentialStore::revoke_refresh_token) a
/// compare-and-set so concurrent rotations of one token cannot both succeed.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch a user (with password hash) by email.
    async fn find_user_by_email(&self, email: &str)
    -> Result<Option<UserWithPassword>, StoreError>;

    /// Persist a newly issued refresh token.
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;

    /// Look up a refresh token by hash, whatever its state.
    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Set `revoked_at` if it is still unset.
    ///
    /// Returns `true` only when this call performed the transition; `false`
    /// when the token is unknown or was already revoked.
    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Revoke every still-active refresh token of a user. Returns the count.
    async fn revoke_all_refresh_tokens(
        &self,
        user_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Delete refresh tokens whose expiry is before `cutoff`. Returns the count.
    async fn purge_refresh_tokens_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Insert or overwrite an endpoint by identity, marking it active.
    ///
    /// Ownership and keys follow the last writer.
    async fn upsert_push_endpoint(
        &self,
        user_id: &str,
        target: &EndpointTarget,
    ) -> Result<(), StoreError>;

    /// Flip the active flag. Returns `false` when no row matched.
    async fn set_push_endpoint_active(
        &self,
        channel: Channel,
        identity: &str,
        active: bool,
    ) -> Result<bool, StoreError>;

    /// Hard-delete an endpoint owned by `user_id`. Returns `false` when no row
    /// matched, including when the endpoint belongs to someone else.
    async fn delete_push_endpoint(
        &self,
        user_id: &str,
        channel: Channel,
        identity: &str,
    ) -> Result<bool, StoreError>;

    /// All active endpoints of a user across both channels, in no particular order.
    async fn list_active_push_endpoints(
        &self,
        user_id: &str,
    ) -> Result<Vec<PushEndpoint>, StoreError>;
}
