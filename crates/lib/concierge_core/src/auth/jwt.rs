// @zen-component: SESS-TokenIssuer
//
//! JWT access token generation and verification.

use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use super::AuthError;
use crate::models::auth::{Principal, TokenClaims};

/// Default access token lifetime: 1 hour.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60;

/// Value of the `typ` claim on access tokens.
pub const ACCESS_TOKEN_TYPE: &str = "access";

/// Signs and verifies HS256 access tokens with one process-wide secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Build an issuer from the signing secret.
    ///
    /// An empty secret is a startup misconfiguration and fails with
    /// [`AuthError::ConfigurationMissing`].
    pub fn new(secret: &[u8]) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::ConfigurationMissing(
                "JWT signing secret is empty".into(),
            ));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL_SECS),
        })
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Generate a signed access token for `principal`.
    pub fn sign_access_token(&self, principal: &Principal) -> Result<String, AuthError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.access_ttl)
            .ok_or_else(|| AuthError::Internal("access token expiry out of range".into()))?;
        let claims = TokenClaims {
            sub: principal.user_id.clone(),
            role: principal.role,
            hotel_id: principal.hotel_id.clone(),
            typ: ACCESS_TOKEN_TYPE.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Verify an access token, returning its claims.
    ///
    /// Fails with [`AuthError::ExpiredToken`] once `exp` has passed (no
    /// leeway) and with [`AuthError::InvalidToken`] for anything else.
    pub fn verify_access_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            })?
            .claims;

        if claims.typ != ACCESS_TOKEN_TYPE {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}

/// Resolve the signing secret: env var `JWT_SECRET` → `AUTH_SECRET`.
///
/// There is no generated fallback; a missing secret is fatal.
pub fn resolve_signing_secret() -> Result<String, AuthError> {
    ["JWT_SECRET", "AUTH_SECRET"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|secret| !secret.is_empty())
        .ok_or_else(|| {
            AuthError::ConfigurationMissing("JWT_SECRET (or AUTH_SECRET) must be set".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::Role;

    fn principal() -> Principal {
        Principal {
            user_id: "user-1".into(),
            role: Role::Staff,
            hotel_id: Some("hotel-9".into()),
        }
    }

    #[test]
    fn empty_secret_is_configuration_missing() {
        assert!(matches!(
            TokenIssuer::new(b""),
            Err(AuthError::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn sign_verify_round_trip() {
        let issuer = TokenIssuer::new(b"test-secret").unwrap();
        let token = issuer.sign_access_token(&principal()).unwrap();
        let claims = issuer.verify_access_token(&token).unwrap();
        assert_eq!(claims.principal(), principal());
        assert_eq!(claims.typ, ACCESS_TOKEN_TYPE);
        assert_eq!(claims.exp - claims.iat, DEFAULT_ACCESS_TOKEN_TTL_SECS);
    }

    #[test]
    fn round_trip_without_tenant() {
        let issuer = TokenIssuer::new(b"test-secret").unwrap();
        let p = Principal {
            user_id: "root".into(),
            role: Role::SuperAdmin,
            hotel_id: None,
        };
        let claims = issuer
            .verify_access_token(&issuer.sign_access_token(&p).unwrap())
            .unwrap();
        assert_eq!(claims.principal(), p);
    }

    #[test]
    fn expired_token_is_rejected_as_expired() {
        let issuer = TokenIssuer::new(b"test-secret")
            .unwrap()
            .with_access_ttl(Duration::seconds(-5));
        let token = issuer.sign_access_token(&principal()).unwrap();
        assert!(matches!(
            issuer.verify_access_token(&token),
            Err(AuthError::ExpiredToken)
        ));
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let issuer = TokenIssuer::new(b"secret-a").unwrap();
        let other = TokenIssuer::new(b"secret-b").unwrap();
        let token = issuer.sign_access_token(&principal()).unwrap();
        assert!(matches!(
            other.verify_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn garbage_is_invalid() {
        let issuer = TokenIssuer::new(b"test-secret").unwrap();
        assert!(matches!(
            issuer.verify_access_token("not.a.jwt"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn non_access_token_type_is_invalid() {
        let secret = b"test-secret";
        let issuer = TokenIssuer::new(secret).unwrap();
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: "user-1".into(),
            role: Role::Guest,
            hotel_id: None,
            typ: "refresh".into(),
            exp: now + 60,
            iat: now,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap();
        assert!(matches!(
            issuer.verify_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }
}
