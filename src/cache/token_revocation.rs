//! Access token revocation: single tokens on logout, whole users on logout-all.

use deadpool_redis::Pool;
use redis::AsyncCommands;
use tracing::{debug, error};
use uuid::Uuid;

const REVOKED_TOKEN_PREFIX: &str = "robotech:revoked:token:";
const REVOKED_USER_PREFIX: &str = "robotech:revoked:user:";

#[derive(Clone)]
pub struct TokenRevocationList {
    pool: Option<Pool>,
}

impl TokenRevocationList {
    pub fn new(pool: Option<Pool>) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, RevocationError> {
        let pool = self.pool.as_ref().ok_or(RevocationError::NoRedis)?;
        pool.get().await.map_err(|e| {
            error!(error = %e, "Failed to get Redis connection");
            RevocationError::ConnectionFailed
        })
    }

    /// `token_hash` is the sha256 of the bearer token; the entry lives until the token would expire.
    pub async fn revoke_token(&self, token_hash: &str, ttl_secs: u64) -> Result<(), RevocationError> {
        if ttl_secs == 0 {
            return Ok(());
        }
        let mut conn = self.connection().await?;

        conn.set_ex::<_, _, ()>(format!("{}{}", REVOKED_TOKEN_PREFIX, token_hash), "1", ttl_secs)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to revoke token");
                RevocationError::OperationFailed
            })?;

        debug!(ttl_secs, "Access token revoked");
        Ok(())
    }

    pub async fn is_token_revoked(&self, token_hash: &str) -> bool {
        let Ok(mut conn) = self.connection().await else {
            return false;
        };

        conn.exists::<_, bool>(format!("{}{}", REVOKED_TOKEN_PREFIX, token_hash))
            .await
            .unwrap_or(false)
    }

    /// Rejects every access token for `user_id` issued before now.
    pub async fn revoke_all_user_tokens(
        &self,
        user_id: Uuid,
        ttl_secs: u64,
    ) -> Result<(), RevocationError> {
        let mut conn = self.connection().await?;
        let revoked_at = chrono::Utc::now().timestamp();

        conn.set_ex::<_, _, ()>(format!("{}{}", REVOKED_USER_PREFIX, user_id), revoked_at, ttl_secs)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user_id, "Failed to revoke user tokens");
                RevocationError::OperationFailed
            })?;

        debug!(user_id = %user_id, "All user tokens revoked");
        Ok(())
    }

    pub async fn is_user_token_revoked(&self, user_id: Uuid, token_iat: i64) -> bool {
        let Ok(mut conn) = self.connection().await else {
            return false;
        };

        let revoked_at = conn
            .get::<_, Option<i64>>(format!("{}{}", REVOKED_USER_PREFIX, user_id))
            .await
            .ok()
            .flatten();

        revoked_at.is_some_and(|ts| token_iat < ts)
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    pub fn pool(&self) -> Option<&Pool> {
        self.pool.as_ref()
    }
}

#[derive(Debug, Clone)]
pub enum RevocationError {
    NoRedis,
    ConnectionFailed,
    OperationFailed,
}

impl std::fmt::Display for RevocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RevocationError::NoRedis => write!(f, "Redis not configured"),
            RevocationError::ConnectionFailed => write!(f, "Redis connection failed"),
            RevocationError::OperationFailed => write!(f, "Redis operation failed"),
        }
    }
}

impl std::error::Error for RevocationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_nothing_is_revoked_without_redis() {
        let list = TokenRevocationList::new(None);
        assert!(!list.is_available());
        assert!(!list.is_token_revoked("abc123").await);
        assert!(!list.is_user_token_revoked(Uuid::new_v4(), 12345).await);
    }

    #[tokio::test]
    async fn test_expired_token_needs_no_entry() {
        let list = TokenRevocationList::new(None);
        assert!(list.revoke_token("abc123", 0).await.is_ok());
    }
}
