//! Short-lived "is typing" markers for discussion threads.
//!
//! Entries live in Redis under `robotech:typing:<thread>:<user>` with the indicator TTL.
//! Without Redis the tracker keeps the same markers in process memory, which is
//! enough for a single-instance deployment.

use deadpool_redis::Pool;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

const TYPING_PREFIX: &str = "robotech:typing:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Typer {
    pub id: Uuid,
    pub username: String,
}

pub struct TypingTracker {
    pool: Option<Pool>,
    ttl: Duration,
    local: Mutex<HashMap<Uuid, HashMap<Uuid, (String, Instant)>>>,
}

impl TypingTracker {
    pub fn new(pool: Option<Pool>, ttl_secs: u64) -> Self {
        Self {
            pool,
            ttl: Duration::from_secs(ttl_secs.max(1)),
            local: Mutex::new(HashMap::new()),
        }
    }

    fn key(thread_id: Uuid, user_id: Uuid) -> String {
        format!("{}{}:{}", TYPING_PREFIX, thread_id, user_id)
    }

    pub async fn signal(&self, thread_id: Uuid, user_id: Uuid, username: &str) {
        if let Some(pool) = &self.pool {
            match pool.get().await {
                Ok(mut conn) => {
                    let result: redis::RedisResult<()> = conn
                        .set_ex(Self::key(thread_id, user_id), username, self.ttl.as_secs())
                        .await;
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to store typing marker");
                    }
                    return;
                }
                Err(e) => warn!(error = %e, "Redis unavailable, tracking typing in memory"),
            }
        }

        let mut local = self.local.lock().await;
        local
            .entry(thread_id)
            .or_default()
            .insert(user_id, (username.to_string(), Instant::now()));
        debug!(thread_id = %thread_id, user_id = %user_id, "Typing marker set");
    }

    /// Users currently typing in the thread, excluding `viewer` and anyone outside `participants`.
    pub async fn typers(
        &self,
        thread_id: Uuid,
        viewer: Uuid,
        participants: &HashSet<Uuid>,
    ) -> Vec<Typer> {
        let mut typers = match &self.pool {
            Some(pool) => match pool.get().await {
                Ok(mut conn) => Self::redis_typers(&mut conn, thread_id).await,
                Err(_) => self.local_typers(thread_id).await,
            },
            None => self.local_typers(thread_id).await,
        };

        typers.retain(|t| t.id != viewer && participants.contains(&t.id));
        typers.sort_by(|a, b| a.username.cmp(&b.username));
        typers
    }

    async fn redis_typers(conn: &mut deadpool_redis::Connection, thread_id: Uuid) -> Vec<Typer> {
        let prefix = format!("{}{}:", TYPING_PREFIX, thread_id);
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", prefix))
            .query_async(&mut **conn)
            .await
            .unwrap_or_default();

        if keys.is_empty() {
            return Vec::new();
        }

        let names: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut **conn)
            .await
            .unwrap_or_default();

        keys.iter()
            .zip(names)
            .filter_map(|(key, name)| {
                let id = Uuid::parse_str(key.strip_prefix(&prefix)?).ok()?;
                Some(Typer {
                    id,
                    username: name?,
                })
            })
            .collect()
    }

    async fn local_typers(&self, thread_id: Uuid) -> Vec<Typer> {
        let mut local = self.local.lock().await;
        let ttl = self.ttl;
        local.retain(|_, entries| {
            entries.retain(|_, (_, at)| at.elapsed() < ttl);
            !entries.is_empty()
        });

        local
            .get(&thread_id)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(id, (username, _))| Typer {
                        id: *id,
                        username: username.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    #[cfg(test)]
    async fn tracked_threads(&self) -> usize {
        self.local.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_viewer_is_excluded() {
        let tracker = TypingTracker::new(None, 4);
        let thread = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        tracker.signal(thread, alice, "alice").await;
        tracker.signal(thread, bob, "bob").await;

        let seen_by_alice = tracker
            .typers(thread, alice, &HashSet::from([alice, bob]))
            .await;
        assert_eq!(
            seen_by_alice,
            vec![Typer {
                id: bob,
                username: "bob".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let tracker = TypingTracker::new(None, 4);
        let user = Uuid::new_v4();

        tracker.signal(Uuid::new_v4(), user, "alice").await;

        let everyone = HashSet::from([user]);
        assert!(tracker
            .typers(Uuid::new_v4(), Uuid::new_v4(), &everyone)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_former_members_are_hidden() {
        let tracker = TypingTracker::new(None, 4);
        let thread = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        let removed = Uuid::new_v4();

        tracker.signal(thread, removed, "carol").await;

        assert!(tracker
            .typers(thread, viewer, &HashSet::from([viewer]))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_markers_expire() {
        let tracker = TypingTracker {
            pool: None,
            ttl: Duration::from_millis(20),
            local: Mutex::new(HashMap::new()),
        };
        let thread = Uuid::new_v4();
        let alice = Uuid::new_v4();
        tracker.signal(thread, alice, "alice").await;
        tracker.signal(Uuid::new_v4(), alice, "alice").await;

        tokio::time::sleep(Duration::from_millis(40)).await;

        let participants = HashSet::from([alice]);
        assert!(tracker
            .typers(thread, Uuid::new_v4(), &participants)
            .await
            .is_empty());
        assert_eq!(tracker.tracked_threads().await, 0);
    }
}
