//! Failed-login lockout, keyed by username and stored in Redis.

use deadpool_redis::Pool;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

const FAILED_ATTEMPTS_PREFIX: &str = "robotech:lockout:attempts:";
const LOCKED_ACCOUNT_PREFIX: &str = "robotech:lockout:locked:";

#[derive(Clone)]
pub struct LockoutManager {
    pool: Option<Pool>,
    max_attempts: u32,
    lockout_duration_secs: u64,
}

impl LockoutManager {
    pub fn new(pool: Option<Pool>, max_attempts: u32, lockout_duration_mins: u32) -> Self {
        Self {
            pool,
            max_attempts,
            lockout_duration_secs: lockout_duration_mins as u64 * 60,
        }
    }

    fn attempts_key(username: &str) -> String {
        format!("{}{}", FAILED_ATTEMPTS_PREFIX, username.to_lowercase())
    }

    fn locked_key(username: &str) -> String {
        format!("{}{}", LOCKED_ACCOUNT_PREFIX, username.to_lowercase())
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, LockoutError> {
        let pool = self.pool.as_ref().ok_or(LockoutError::NoRedis)?;
        pool.get().await.map_err(|_| LockoutError::ConnectionFailed)
    }

    /// Seconds left on an active lock, or `None` when the account is not locked.
    pub async fn lockout_remaining(&self, username: &str) -> Option<u64> {
        let mut conn = self.connection().await.ok()?;
        let ttl: i64 = conn.ttl(Self::locked_key(username)).await.ok()?;
        (ttl > 0).then_some(ttl as u64)
    }

    /// Returns true when this failure tripped the lock.
    pub async fn record_failed_attempt(&self, username: &str) -> Result<bool, LockoutError> {
        let mut conn = self.connection().await?;
        let attempts_key = Self::attempts_key(username);

        let attempts: u32 = conn
            .incr(&attempts_key, 1)
            .await
            .map_err(|_| LockoutError::OperationFailed)?;

        if attempts == 1 {
            let _ = conn
                .expire::<_, ()>(&attempts_key, self.lockout_duration_secs as i64)
                .await;
        }

        debug!(username = %username, attempts, max_attempts = self.max_attempts, "Recorded failed login attempt");

        if attempts < self.max_attempts {
            return Ok(false);
        }

        let _: () = conn
            .set_ex(Self::locked_key(username), "1", self.lockout_duration_secs)
            .await
            .map_err(|_| LockoutError::OperationFailed)?;
        let _: () = conn
            .del(&attempts_key)
            .await
            .map_err(|_| LockoutError::OperationFailed)?;

        warn!(username = %username, lockout_duration_secs = self.lockout_duration_secs, "Account locked after repeated failed logins");
        Ok(true)
    }

    pub async fn clear_failed_attempts(&self, username: &str) -> Result<(), LockoutError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(Self::attempts_key(username))
            .await
            .map_err(|_| LockoutError::OperationFailed)?;
        Ok(())
    }

    /// Drops both the lock and the attempt counter, used when an admin resets a password.
    pub async fn unlock_account(&self, username: &str) -> Result<(), LockoutError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(vec![Self::locked_key(username), Self::attempts_key(username)])
            .await
            .map_err(|_| LockoutError::OperationFailed)?;

        info!(username = %username, "Account unlocked");
        Ok(())
    }

    /// `unlock_account` for password resets: reports whether a lock could be
    /// cleared and logs Redis failures instead of returning them.
    pub async fn release_after_reset(&self, username: &str) -> bool {
        match self.unlock_account(username).await {
            Ok(()) => true,
            Err(LockoutError::NoRedis) => false,
            Err(e) => {
                warn!(error = %e, username = %username, "Failed to clear login lockout after password reset");
                false
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }
}

#[derive(Debug, Clone)]
pub enum LockoutError {
    NoRedis,
    ConnectionFailed,
    OperationFailed,
}

impl std::fmt::Display for LockoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockoutError::NoRedis => write!(f, "Redis not configured"),
            LockoutError::ConnectionFailed => write!(f, "Redis connection failed"),
            LockoutError::OperationFailed => write!(f, "Redis operation failed"),
        }
    }
}

impl std::error::Error for LockoutError {}
