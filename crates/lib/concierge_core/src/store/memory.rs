//! In-memory credential store.
//!
//! All state sits behind one mutex, which makes every operation (including the
//! refresh-token compare-and-set) atomic. The lock is never held across an
//! await point.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CredentialStore, StoreError};
use crate::models::auth::{RefreshTokenRecord, Role, User, UserWithPassword};
use crate::models::push::{Channel, EndpointTarget, PushEndpoint};
use crate::uuid::{uuidv4, uuidv7};

#[derive(Debug, Default)]
struct Inner {
    /// Keyed by email.
    users: HashMap<String, UserWithPassword>,
    /// Keyed by token hash.
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    /// Keyed by (channel, identity).
    endpoints: HashMap<(Channel, String), PushEndpoint>,
}

/// Credential store held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a user, returning the generated user ID.
    pub fn insert_user(
        &self,
        email: &str,
        password_hash: Option<String>,
        role: Role,
        hotel_id: Option<&str>,
    ) -> String {
        let id = uuidv4().to_string();
        let user = User {
            id: id.clone(),
            email: email.to_string(),
            role,
            hotel_id: hotel_id.map(str::to_string),
        };
        self.lock().users.insert(
            email.to_string(),
            UserWithPassword {
                user,
                password_hash,
            },
        );
        id
    }

    /// Fetch an endpoint regardless of its active flag.
    pub fn push_endpoint(&self, channel: Channel, identity: &str) -> Option<PushEndpoint> {
        self.lock()
            .endpoints
            .get(&(channel, identity.to_string()))
            .cloned()
    }

    /// Number of stored endpoints, active or not.
    pub fn push_endpoint_count(&self) -> usize {
        self.lock().endpoints.len()
    }

    /// Number of stored refresh tokens, active or not.
    pub fn refresh_token_count(&self) -> usize {
        self.lock().refresh_tokens.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserWithPassword>, StoreError> {
        Ok(self.lock().users.get(email).cloned())
    }

    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        self.lock()
            .refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.lock().refresh_tokens.get(token_hash).cloned())
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner.refresh_tokens.get_mut(token_hash) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(revoked_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_refresh_tokens(
        &self,
        user_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut revoked = 0;
        for record in inner.refresh_tokens.values_mut() {
            if record.user_id == user_id && record.revoked_at.is_none() {
                record.revoked_at = Some(revoked_at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_refresh_tokens_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let before = inner.refresh_tokens.len();
        inner.refresh_tokens.retain(|_, r| r.expires_at >= cutoff);
        Ok((before - inner.refresh_tokens.len()) as u64)
    }

    async fn upsert_push_endpoint(
        &self,
        user_id: &str,
        target: &EndpointTarget,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let key = (target.channel(), target.identity().to_string());
        let id = inner
            .endpoints
            .get(&key)
            .map(|existing| existing.id.clone())
            .unwrap_or_else(|| uuidv7().to_string());
        inner.endpoints.insert(
            key,
            PushEndpoint {
                id,
                user_id: user_id.to_string(),
                target: target.clone(),
                active: true,
            },
        );
        Ok(())
    }

    async fn set_push_endpoint_active(
        &self,
        channel: Channel,
        identity: &str,
        active: bool,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner.endpoints.get_mut(&(channel, identity.to_string())) {
            Some(endpoint) => {
                endpoint.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_push_endpoint(
        &self,
        user_id: &str,
        channel: Channel,
        identity: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let key = (channel, identity.to_string());
        if inner
            .endpoints
            .get(&key)
            .is_some_and(|endpoint| endpoint.user_id == user_id)
        {
            inner.endpoints.remove(&key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn list_active_push_endpoints(
        &self,
        user_id: &str,
    ) -> Result<Vec<PushEndpoint>, StoreError> {
        Ok(self
            .lock()
            .endpoints
            .values()
            .filter(|e| e.active && e.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::push::WebKeys;

    fn refresh_record(hash: &str, user_id: &str, expires_at: DateTime<Utc>) -> RefreshTokenRecord {
        RefreshTokenRecord {
            id: uuidv7().to_string(),
            token_hash: hash.to_string(),
            user_id: user_id.to_string(),
            role: Role::Guest,
            hotel_id: None,
            issued_at: Utc::now(),
            expires_at,
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn revoke_is_compare_and_set() {
        let store = MemoryStore::new();
        let rec = refresh_record("h1", "u1", Utc::now() + Duration::days(1));
        store.insert_refresh_token(&rec).await.unwrap();

        assert!(store.revoke_refresh_token("h1", Utc::now()).await.unwrap());
        assert!(!store.revoke_refresh_token("h1", Utc::now()).await.unwrap());
        assert!(!store.revoke_refresh_token("missing", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn revoke_all_only_touches_active_tokens_of_user() {
        let store = MemoryStore::new();
        let later = Utc::now() + Duration::days(1);
        for (hash, user) in [("a", "u1"), ("b", "u1"), ("c", "u2")] {
            store
                .insert_refresh_token(&refresh_record(hash, user, later))
                .await
                .unwrap();
        }
        store.revoke_refresh_token("a", Utc::now()).await.unwrap();

        assert_eq!(store.revoke_all_refresh_tokens("u1", Utc::now()).await.unwrap(), 1);
        let c = store.find_refresh_token("c").await.unwrap().unwrap();
        assert!(c.revoked_at.is_none());
    }

    #[tokio::test]
    async fn purge_drops_only_long_expired_tokens() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_refresh_token(&refresh_record("old", "u1", now - Duration::days(10)))
            .await
            .unwrap();
        store
            .insert_refresh_token(&refresh_record("new", "u1", now + Duration::days(10)))
            .await
            .unwrap();

        let purged = store
            .purge_refresh_tokens_expired_before(now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.refresh_token_count(), 1);
    }

    #[tokio::test]
    async fn upsert_keeps_row_id_and_reactivates() {
        let store = MemoryStore::new();
        let target = EndpointTarget::Web {
            endpoint: "https://push.example.com/1".into(),
            keys: WebKeys {
                p256dh: "k1".into(),
                auth: "a1".into(),
            },
            user_agent: None,
        };
        store.upsert_push_endpoint("u1", &target).await.unwrap();
        let first = store
            .push_endpoint(Channel::Web, "https://push.example.com/1")
            .unwrap();

        store
            .set_push_endpoint_active(Channel::Web, "https://push.example.com/1", false)
            .await
            .unwrap();
        store.upsert_push_endpoint("u2", &target).await.unwrap();

        let second = store
            .push_endpoint(Channel::Web, "https://push.example.com/1")
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.user_id, "u2");
        assert!(second.active);
        assert_eq!(store.push_endpoint_count(), 1);
    }

    #[tokio::test]
    async fn missing_rows_are_not_errors() {
        let store = MemoryStore::new();
        assert!(
            !store
                .set_push_endpoint_active(Channel::Mobile, "nope", false)
                .await
                .unwrap()
        );
        assert!(
            !store
                .delete_push_endpoint("u1", Channel::Mobile, "nope")
                .await
                .unwrap()
        );
    }
}
