//! Redis cache of each user's effective permission set.

use deadpool_redis::Pool;
use redis::AsyncCommands;
use tracing::{debug, error};
use uuid::Uuid;

use crate::auth::permissions::EffectivePermissions;

const PERMISSION_CACHE_PREFIX: &str = "robotech:permissions:";
const DEFAULT_TTL_SECS: u64 = 300;

#[derive(Clone)]
pub struct PermissionCache {
    pool: Option<Pool>,
    ttl_secs: u64,
}

impl PermissionCache {
    pub fn new(pool: Option<Pool>) -> Self {
        Self {
            pool,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }

    fn cache_key(user_id: Uuid) -> String {
        format!("{}{}", PERMISSION_CACHE_PREFIX, user_id)
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, CacheError> {
        let pool = self.pool.as_ref().ok_or(CacheError::NoRedis)?;
        pool.get().await.map_err(|e| {
            error!(error = %e, "Failed to get Redis connection");
            CacheError::ConnectionFailed
        })
    }

    pub async fn set(&self, user_id: Uuid, perms: &EffectivePermissions) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let value = serde_json::to_string(perms).map_err(|_| CacheError::SerializationFailed)?;

        conn.set_ex::<_, _, ()>(Self::cache_key(user_id), value, self.ttl_secs)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to cache permissions");
                CacheError::OperationFailed
            })?;

        debug!(user_id = %user_id, "Permissions cached");
        Ok(())
    }

    pub async fn get(&self, user_id: Uuid) -> Option<EffectivePermissions> {
        let mut conn = self.connection().await.ok()?;
        let value: Option<String> = conn.get(Self::cache_key(user_id)).await.ok()?;
        value.and_then(|v| serde_json::from_str(&v).ok())
    }

    /// Drops one user's entry after their roles or profile position change.
    pub async fn invalidate(&self, user_id: Uuid) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(Self::cache_key(user_id))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to invalidate permission cache");
                CacheError::OperationFailed
            })?;

        debug!(user_id = %user_id, "Permission cache invalidated");
        Ok(())
    }

    /// Drops every cached entry after a role or position definition changes.
    pub async fn invalidate_all(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;

        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", PERMISSION_CACHE_PREFIX))
            .query_async(&mut *conn)
            .await
            .unwrap_or_default();

        let flushed = keys.len();
        if flushed > 0 {
            conn.del::<_, ()>(keys).await.map_err(|e| {
                error!(error = %e, "Failed to flush permission cache");
                CacheError::OperationFailed
            })?;
        }

        debug!(flushed, "Permission cache flushed");
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }
}

#[derive(Debug, Clone)]
pub enum CacheError {
    NoRedis,
    ConnectionFailed,
    OperationFailed,
    SerializationFailed,
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::NoRedis => write!(f, "Redis not configured"),
            CacheError::ConnectionFailed => write!(f, "Redis connection failed"),
            CacheError::OperationFailed => write!(f, "Redis operation failed"),
            CacheError::SerializationFailed => write!(f, "Serialization failed"),
        }
    }
}

impl std::error::Error for CacheError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_is_inert_without_redis() {
        let cache = PermissionCache::new(None);
        assert!(!cache.is_available());
        assert!(cache.get(Uuid::new_v4()).await.is_none());
        assert!(matches!(
            cache.invalidate_all().await,
            Err(CacheError::NoRedis)
        ));
    }

    #[test]
    fn test_cache_key_is_per_user() {
        let user_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            PermissionCache::cache_key(user_id),
            "robotech:permissions:550e8400-e29b-41d4-a716-446655440000"
        );
    }
}
