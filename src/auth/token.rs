//! Signed admin session tokens with server-side revocation.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::hash_token;
use crate::config::MIN_JWT_SECRET_LEN;
use crate::db::{format_timestamp, now_timestamp, AdminRole, AdminUser, DbPool};

pub const TOKEN_ISSUER: &str = "storefront";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
    #[error("token signing is misconfigured: {0}")]
    Misconfigured(String),
    #[error("session storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Admin user id
    pub sub: String,
    pub email: String,
    pub role: AdminRole,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    /// Unique per issued token, so two logins never share a session row
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and validates HS256 session tokens and tracks them in
/// `admin_sessions` so they can be revoked before they expire.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
    db: DbPool,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration, db: DbPool) -> Result<Self, AuthError> {
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(AuthError::Misconfigured(format!(
                "signing secret must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            db,
        })
    }

    pub fn issue(&self, admin: &AdminUser) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: admin.id.clone(),
            email: admin.email.clone(),
            role: admin.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: TOKEN_ISSUER.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Misconfigured(e.to_string()))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Check signature, issuer and expiry. Revocation is checked separately.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                kind => {
                    debug!(error = ?kind, "Rejected session token");
                    AuthError::Invalid
                }
            })
    }

    /// Persist the session so it can later be revoked.
    pub async fn record_session(&self, admin_id: &str, issued: &IssuedToken) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO admin_sessions (id, admin_id, token_hash, expires_at, is_revoked, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(admin_id)
        .bind(hash_token(&issued.token))
        .bind(format_timestamp(issued.expires_at))
        .bind(now_timestamp())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// A token is live only while a matching, unrevoked, unexpired session
    /// row exists. Lookup failures count as revoked.
    pub async fn is_revoked(&self, token: &str) -> bool {
        let live: Result<i64, sqlx::Error> = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM admin_sessions
            WHERE token_hash = ? AND is_revoked = 0 AND expires_at > ?
            "#,
        )
        .bind(hash_token(token))
        .bind(now_timestamp())
        .fetch_one(&self.db)
        .await;

        match live {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) => {
                error!(error = %e, "Session lookup failed, treating token as revoked");
                true
            }
        }
    }

    /// Mark the session for this token revoked. Revoking twice is a no-op.
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let result = sqlx::query("UPDATE admin_sessions SET is_revoked = 1 WHERE token_hash = ?")
            .bind(hash_token(token))
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            warn!("Revoke requested for a token with no recorded session");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{insert_admin, test_pool};

    const SECRET: &str = "test-secret-that-is-long-enough-0123456789";

    async fn setup(ttl: Duration) -> (TokenService, AdminUser) {
        let pool = test_pool().await;
        let admin = insert_admin(&pool, "ops@example.com", "password", AdminRole::Viewer).await;
        (TokenService::new(SECRET, ttl, pool).unwrap(), admin)
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let (service, admin) = setup(Duration::hours(2)).await;
        let issued = service.issue(&admin).unwrap();

        let claims = service.validate(&issued.token).unwrap();
        assert_eq!(claims.sub, admin.id);
        assert_eq!(claims.role, AdminRole::Viewer);
        assert_eq!(claims.iss, TOKEN_ISSUER);
        assert_eq!(claims.exp - claims.iat, 2 * 60 * 60);
    }

    #[tokio::test]
    async fn test_rejects_short_secret() {
        let pool = test_pool().await;
        assert!(matches!(
            TokenService::new("short", Duration::hours(2), pool),
            Err(AuthError::Misconfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let (service, admin) = setup(Duration::minutes(-5)).await;
        let issued = service.issue(&admin).unwrap();
        assert!(matches!(service.validate(&issued.token), Err(AuthError::Expired)));
    }

    #[tokio::test]
    async fn test_wrong_secret_and_garbage() {
        let (service, admin) = setup(Duration::hours(2)).await;
        let other = TokenService::new(
            "another-secret-that-is-long-enough-9876543210",
            Duration::hours(2),
            service.db.clone(),
        )
        .unwrap();
        let issued = other.issue(&admin).unwrap();

        assert!(matches!(service.validate(&issued.token), Err(AuthError::Invalid)));
        assert!(matches!(service.validate("not.a.jwt"), Err(AuthError::Invalid)));
    }

    #[tokio::test]
    async fn test_revoked_token_still_validates() {
        let (service, admin) = setup(Duration::hours(2)).await;
        let issued = service.issue(&admin).unwrap();
        service.record_session(&admin.id, &issued).await.unwrap();
        assert!(!service.is_revoked(&issued.token).await);

        service.revoke(&issued.token).await.unwrap();
        assert!(service.is_revoked(&issued.token).await);
        assert!(service.validate(&issued.token).is_ok());

        // Idempotent
        service.revoke(&issued.token).await.unwrap();
        assert!(service.is_revoked(&issued.token).await);
    }

    #[tokio::test]
    async fn test_same_second_logins_are_separate_sessions() {
        let (service, admin) = setup(Duration::hours(2)).await;
        let laptop = service.issue(&admin).unwrap();
        let phone = service.issue(&admin).unwrap();
        assert_ne!(laptop.token, phone.token);

        service.record_session(&admin.id, &laptop).await.unwrap();
        service.record_session(&admin.id, &phone).await.unwrap();

        service.revoke(&laptop.token).await.unwrap();
        assert!(service.is_revoked(&laptop.token).await);
        assert!(!service.is_revoked(&phone.token).await);
    }

    #[tokio::test]
    async fn test_unknown_token_is_revoked() {
        let (service, admin) = setup(Duration::hours(2)).await;
        let issued = service.issue(&admin).unwrap();
        // Never recorded
        assert!(service.is_revoked(&issued.token).await);
    }

    #[tokio::test]
    async fn test_expired_session_row_is_revoked() {
        let (service, admin) = setup(Duration::minutes(-1)).await;
        let issued = service.issue(&admin).unwrap();
        service.record_session(&admin.id, &issued).await.unwrap();
        assert!(service.is_revoked(&issued.token).await);
    }

    #[tokio::test]
    async fn test_storage_failure_fails_closed() {
        let (service, admin) = setup(Duration::hours(2)).await;
        let issued = service.issue(&admin).unwrap();
        service.record_session(&admin.id, &issued).await.unwrap();

        service.db.close().await;
        assert!(service.is_revoked(&issued.token).await);
    }
}
