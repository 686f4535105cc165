//! Workspace presence and discussion polling.
//!
//! The server answers `GET /api/projects/{id}/sync_state` with the last login
//! of every member and the newest message id of every thread. The poller
//! compares that snapshot with what the caller last rendered and reports only
//! what moved.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::api::{ApiClient, ClientError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncState {
    /// Last login per member and lead; `null` when they never logged in.
    #[schema(value_type = Object)]
    pub members_status: BTreeMap<Uuid, Option<NaiveDateTime>>,
    /// Newest message id per thread; 0 for an empty thread.
    #[schema(value_type = Object)]
    pub threads_state: BTreeMap<Uuid, i64>,
}

/// What the caller currently has on screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalWorkspace {
    pub members: BTreeMap<Uuid, Option<NaiveDateTime>>,
    /// Last rendered message id per thread, 0 when none.
    pub threads: BTreeMap<Uuid, i64>,
}

impl LocalWorkspace {
    pub fn from_state(state: &SyncState) -> Self {
        Self {
            members: state.members_status.clone(),
            threads: state.threads_state.clone(),
        }
    }

    /// Adopts the parts of `remote` that `changes` flagged.
    pub fn absorb(&mut self, remote: &SyncState, changes: SyncDiff) {
        if changes.members_changed {
            self.members = remote.members_status.clone();
        }
        if changes.threads_changed {
            for (id, last) in self.threads.iter_mut() {
                *last = remote.threads_state.get(id).copied().unwrap_or(0);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncDiff {
    pub members_changed: bool,
    pub threads_changed: bool,
}

impl SyncDiff {
    pub fn any(&self) -> bool {
        self.members_changed || self.threads_changed
    }
}

/// Compares a fresh snapshot with the local view. Threads are compared only
/// while `watch_threads` is set.
pub fn diff(local: &LocalWorkspace, remote: &SyncState, watch_threads: bool) -> SyncDiff {
    let members_changed = remote.members_status.iter().any(|(id, seen)| match seen {
        Some(seen) => local.members.get(id).copied().flatten() != Some(*seen),
        None => false,
    });

    let threads_changed = watch_threads
        && local
            .threads
            .iter()
            .any(|(id, last)| remote.threads_state.get(id).copied().unwrap_or(0) != *last);

    SyncDiff {
        members_changed,
        threads_changed,
    }
}

/// Result of one poll attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ok,
    Err,
    Unauthorized,
    Forbidden,
}

impl PollOutcome {
    fn from_error(error: &ClientError) -> Self {
        if error.is_unauthorized() {
            PollOutcome::Unauthorized
        } else if error.is_forbidden() {
            PollOutcome::Forbidden
        } else {
            PollOutcome::Err
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub first: Duration,
    pub ok: Duration,
    pub hidden: Duration,
    pub error: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            first: Duration::from_secs(5),
            ok: Duration::from_secs(5),
            hidden: Duration::from_secs(10),
            error: Duration::from_secs(15),
        }
    }
}

impl PollIntervals {
    /// `None` means stop polling.
    pub fn next_delay(&self, outcome: PollOutcome, hidden: bool) -> Option<Duration> {
        match outcome {
            PollOutcome::Unauthorized | PollOutcome::Forbidden => None,
            _ if hidden => Some(self.hidden),
            PollOutcome::Ok => Some(self.ok),
            PollOutcome::Err => Some(self.error),
        }
    }
}

pub fn next_delay(outcome: PollOutcome, hidden: bool) -> Option<Duration> {
    PollIntervals::default().next_delay(outcome, hidden)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewState {
    /// The page is in a background tab; no requests are made.
    pub hidden: bool,
    /// The discussions panel is open, so thread activity matters.
    pub discussions_open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    Unauthorized,
    Forbidden,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    MembersUpdated(BTreeMap<Uuid, Option<NaiveDateTime>>),
    ReloadRequired,
    Stopped(StopReason),
}

pub struct WorkspacePoller {
    client: ApiClient,
    project_id: Uuid,
    local: LocalWorkspace,
    intervals: PollIntervals,
}

impl WorkspacePoller {
    pub fn new(client: ApiClient, project_id: Uuid, local: LocalWorkspace) -> Self {
        Self {
            client,
            project_id,
            local,
            intervals: PollIntervals::default(),
        }
    }

    pub fn with_intervals(mut self, intervals: PollIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    /// Starts polling on a tokio task. Events arrive on the returned receiver;
    /// the task ends after sending `Stopped`.
    pub fn spawn(
        self,
        view: watch::Receiver<ViewState>,
        shutdown: watch::Receiver<bool>,
    ) -> (mpsc::Receiver<SyncEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(self.run(view, shutdown, tx));
        (rx, handle)
    }

    async fn run(
        mut self,
        view: watch::Receiver<ViewState>,
        mut shutdown: watch::Receiver<bool>,
        tx: mpsc::Sender<SyncEvent>,
    ) {
        let mut delay = self.intervals.first;
        info!(project_id = %self.project_id, "Workspace polling started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = tx.send(SyncEvent::Stopped(StopReason::Shutdown)).await;
                        return;
                    }
                    continue;
                }
            }

            let state = *view.borrow();
            if state.hidden {
                delay = self.intervals.hidden;
                continue;
            }

            let outcome = match self.poll(state.discussions_open, &tx).await {
                Ok(()) => PollOutcome::Ok,
                Err(e) => {
                    warn!(project_id = %self.project_id, error = %e, "Workspace poll failed");
                    PollOutcome::from_error(&e)
                }
            };

            match self.intervals.next_delay(outcome, state.hidden) {
                Some(next) => delay = next,
                None => {
                    let reason = if outcome == PollOutcome::Unauthorized {
                        StopReason::Unauthorized
                    } else {
                        StopReason::Forbidden
                    };
                    let _ = tx.send(SyncEvent::Stopped(reason)).await;
                    return;
                }
            }

            if tx.is_closed() {
                debug!(project_id = %self.project_id, "Event receiver dropped; polling ends");
                return;
            }
        }
    }

    async fn poll(
        &mut self,
        watch_threads: bool,
        tx: &mpsc::Sender<SyncEvent>,
    ) -> Result<(), ClientError> {
        let remote: SyncState = self
            .client
            .get(&format!("projects/{}/sync_state", self.project_id))
            .await?;

        let changes = diff(&self.local, &remote, watch_threads);
        if changes.members_changed {
            let _ = tx
                .send(SyncEvent::MembersUpdated(remote.members_status.clone()))
                .await;
        }
        if changes.threads_changed {
            let _ = tx.send(SyncEvent::ReloadRequired).await;
        }
        if changes.any() {
            self.local.absorb(&remote, changes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, 1)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .unwrap()
    }

    fn fast() -> PollIntervals {
        PollIntervals {
            first: Duration::from_millis(10),
            ok: Duration::from_millis(10),
            hidden: Duration::from_millis(10),
            error: Duration::from_millis(10),
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_member_change_needs_a_present_remote_value() {
        let alice = Uuid::new_v4();
        let local = LocalWorkspace {
            members: BTreeMap::from([(alice, Some(at(9)))]),
            threads: BTreeMap::new(),
        };

        let mut remote = SyncState::default();
        remote.members_status.insert(alice, None);
        assert!(!diff(&local, &remote, false).members_changed);

        remote.members_status.insert(alice, Some(at(9)));
        assert!(!diff(&local, &remote, false).members_changed);

        remote.members_status.insert(alice, Some(at(11)));
        assert!(diff(&local, &remote, false).members_changed);
    }

    #[test]
    fn test_first_login_of_unknown_member_counts() {
        let bob = Uuid::new_v4();
        let mut remote = SyncState::default();
        remote.members_status.insert(bob, Some(at(8)));
        assert!(diff(&LocalWorkspace::default(), &remote, false).members_changed);
    }

    #[test]
    fn test_threads_compared_only_while_watched() {
        let thread = Uuid::new_v4();
        let local = LocalWorkspace {
            members: BTreeMap::new(),
            threads: BTreeMap::from([(thread, 4)]),
        };
        let mut remote = SyncState::default();
        remote.threads_state.insert(thread, 7);

        assert!(!diff(&local, &remote, false).threads_changed);
        assert!(diff(&local, &remote, true).threads_changed);
    }

    #[test]
    fn test_missing_remote_thread_reads_as_zero() {
        let thread = Uuid::new_v4();
        let empty = LocalWorkspace {
            members: BTreeMap::new(),
            threads: BTreeMap::from([(thread, 0)]),
        };
        assert!(!diff(&empty, &SyncState::default(), true).threads_changed);

        let purged = LocalWorkspace {
            members: BTreeMap::new(),
            threads: BTreeMap::from([(thread, 12)]),
        };
        assert!(diff(&purged, &SyncState::default(), true).threads_changed);
    }

    #[test]
    fn test_absorb_updates_only_flagged_parts() {
        let alice = Uuid::new_v4();
        let thread = Uuid::new_v4();
        let mut local = LocalWorkspace {
            members: BTreeMap::from([(alice, None)]),
            threads: BTreeMap::from([(thread, 1)]),
        };
        let remote = SyncState {
            members_status: BTreeMap::from([(alice, Some(at(10)))]),
            threads_state: BTreeMap::from([(thread, 5)]),
        };

        local.absorb(
            &remote,
            SyncDiff {
                members_changed: true,
                threads_changed: false,
            },
        );
        assert_eq!(local.members[&alice], Some(at(10)));
        assert_eq!(local.threads[&thread], 1);
    }

    #[test]
    fn test_next_delay() {
        assert_eq!(next_delay(PollOutcome::Ok, false), Some(Duration::from_secs(5)));
        assert_eq!(next_delay(PollOutcome::Err, false), Some(Duration::from_secs(15)));
        assert_eq!(next_delay(PollOutcome::Ok, true), Some(Duration::from_secs(10)));
        assert_eq!(next_delay(PollOutcome::Err, true), Some(Duration::from_secs(10)));
        assert_eq!(next_delay(PollOutcome::Unauthorized, false), None);
        assert_eq!(next_delay(PollOutcome::Forbidden, true), None);
    }

    #[tokio::test]
    async fn test_poller_reports_member_activity() {
        let alice = Uuid::new_v4();
        let project = Uuid::new_v4();
        let seen = at(12);
        let router = Router::new().route(
            "/api/projects/{id}/sync_state",
            get(move || async move {
                Json(SyncState {
                    members_status: BTreeMap::from([(alice, Some(seen))]),
                    threads_state: BTreeMap::new(),
                })
            }),
        );
        let client = ApiClient::new(&serve(router).await).unwrap();
        let (_view_tx, view_rx) = watch::channel(ViewState::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (mut events, handle) = WorkspacePoller::new(client, project, LocalWorkspace::default())
            .with_intervals(fast())
            .spawn(view_rx, shutdown_rx);

        let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert_eq!(
            first,
            Some(SyncEvent::MembersUpdated(BTreeMap::from([(alice, Some(seen))])))
        );

        shutdown_tx.send(true).unwrap();
        let last = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert_eq!(last, Some(SyncEvent::Stopped(StopReason::Shutdown)));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_poller_stops_on_forbidden() {
        let router = Router::new().route(
            "/api/projects/{id}/sync_state",
            get(|| async { StatusCode::FORBIDDEN }),
        );
        let client = ApiClient::new(&serve(router).await).unwrap();
        let (_view_tx, view_rx) = watch::channel(ViewState::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let (mut events, handle) =
            WorkspacePoller::new(client, Uuid::new_v4(), LocalWorkspace::default())
                .with_intervals(fast())
                .spawn(view_rx, shutdown_rx);

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(SyncEvent::Stopped(StopReason::Forbidden)));
        handle.await.unwrap();
    }
}
