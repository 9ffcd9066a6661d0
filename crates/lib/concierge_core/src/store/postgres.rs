//! PostgreSQL credential store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{CredentialStore, StoreError};
use crate::models::auth::{RefreshTokenRecord, Role, User, UserWithPassword};
use crate::models::push::{Channel, EndpointTarget, PushEndpoint, WebKeys};
use crate::uuid::uuidv7;

type RefreshTokenRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

/// Credential store backed by a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded migrations from `concierge_core/migrations/`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn parse_role(role: &str) -> Result<Role, StoreError> {
    role.parse::<Role>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn refresh_record_from_row(row: RefreshTokenRow) -> Result<RefreshTokenRecord, StoreError> {
    let (id, token_hash, user_id, role, hotel_id, issued_at, expires_at, revoked_at) = row;
    Ok(RefreshTokenRecord {
        id,
        token_hash,
        user_id,
        role: parse_role(&role)?,
        hotel_id,
        issued_at,
        expires_at,
        revoked_at,
    })
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserWithPassword>, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String, Option<String>, Option<String>)>(
            "SELECT id::text, email, role, hotel_id::text, password_hash \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, email, role, hotel_id, password_hash)| {
            Ok(UserWithPassword {
                user: User {
                    id,
                    email,
                    role: parse_role(&role)?,
                    hotel_id,
                },
                password_hash,
            })
        })
        .transpose()
    }

    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO refresh_tokens \
             (id, token_hash, user_id, role, hotel_id, issued_at, expires_at) \
             VALUES ($1::uuid, $2, $3::uuid, $4, $5::uuid, $6, $7)",
        )
        .bind(&record.id)
        .bind(&record.token_hash)
        .bind(&record.user_id)
        .bind(record.role.as_str())
        .bind(record.hotel_id.as_deref())
        .bind(record.issued_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            "SELECT id::text, token_hash, user_id::text, role, hotel_id::text, \
                    issued_at, expires_at, revoked_at \
             FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(refresh_record_from_row).transpose()
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 \
             WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(token_hash)
        .bind(revoked_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_refresh_tokens(
        &self,
        user_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 \
             WHERE user_id = $1::uuid AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(revoked_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_refresh_tokens_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_push_endpoint(
        &self,
        user_id: &str,
        target: &EndpointTarget,
    ) -> Result<(), StoreError> {
        match target {
            EndpointTarget::Web {
                endpoint,
                keys,
                user_agent,
            } => {
                sqlx::query(
                    "INSERT INTO web_push_subscriptions \
                     (id, endpoint, p256dh, auth, user_id, user_agent, active) \
                     VALUES ($1, $2, $3, $4, $5::uuid, $6, TRUE) \
                     ON CONFLICT (endpoint) DO UPDATE SET \
                       p256dh = EXCLUDED.p256dh, \
                       auth = EXCLUDED.auth, \
                       user_id = EXCLUDED.user_id, \
                       user_agent = EXCLUDED.user_agent, \
                       active = TRUE, \
                       updated_at = now()",
                )
                .bind(uuidv7())
                .bind(endpoint)
                .bind(&keys.p256dh)
                .bind(&keys.auth)
                .bind(user_id)
                .bind(user_agent.as_deref())
                .execute(&self.pool)
                .await?;
            }
            EndpointTarget::Mobile { token } => {
                sqlx::query(
                    "INSERT INTO mobile_push_tokens (id, token, user_id, active) \
                     VALUES ($1, $2, $3::uuid, TRUE) \
                     ON CONFLICT (token) DO UPDATE SET \
                       user_id = EXCLUDED.user_id, \
                       active = TRUE, \
                       updated_at = now()",
                )
                .bind(uuidv7())
                .bind(token)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    async fn set_push_endpoint_active(
        &self,
        channel: Channel,
        identity: &str,
        active: bool,
    ) -> Result<bool, StoreError> {
        let sql = match channel {
            Channel::Web => {
                "UPDATE web_push_subscriptions SET active = $2, updated_at = now() \
                 WHERE endpoint = $1"
            }
            Channel::Mobile => {
                "UPDATE mobile_push_tokens SET active = $2, updated_at = now() \
                 WHERE token = $1"
            }
        };
        let result = sqlx::query(sql)
            .bind(identity)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_push_endpoint(
        &self,
        user_id: &str,
        channel: Channel,
        identity: &str,
    ) -> Result<bool, StoreError> {
        let sql = match channel {
            Channel::Web => {
                "DELETE FROM web_push_subscriptions WHERE endpoint = $1 AND user_id = $2::uuid"
            }
            Channel::Mobile => {
                "DELETE FROM mobile_push_tokens WHERE token = $1 AND user_id = $2::uuid"
            }
        };
        let result = sqlx::query(sql)
            .bind(identity)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_active_push_endpoints(
        &self,
        user_id: &str,
    ) -> Result<Vec<PushEndpoint>, StoreError> {
        let web = sqlx::query_as::<_, (String, String, String, String, Option<String>)>(
            "SELECT id::text, endpoint, p256dh, auth, user_agent \
             FROM web_push_subscriptions \
             WHERE user_id = $1::uuid AND active",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mobile = sqlx::query_as::<_, (String, String)>(
            "SELECT id::text, token FROM mobile_push_tokens \
             WHERE user_id = $1::uuid AND active",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let web = web
            .into_iter()
            .map(|(id, endpoint, p256dh, auth, user_agent)| PushEndpoint {
                id,
                user_id: user_id.to_string(),
                target: EndpointTarget::Web {
                    endpoint,
                    keys: WebKeys { p256dh, auth },
                    user_agent,
                },
                active: true,
            });
        let mobile = mobile.into_iter().map(|(id, token)| PushEndpoint {
            id,
            user_id: user_id.to_string(),
            target: EndpointTarget::Mobile { token },
            active: true,
        });

        Ok(web.chain(mobile).collect())
    }
}
