//! Typed client for the portal API, used by tooling and integration tests.
//!
//! `api` wraps reqwest with shared token storage, `sync` diffs workspace
//! snapshots and drives the background poller, and `media` resolves stored
//! upload paths into absolute URLs.

pub mod api;
pub mod media;
pub mod sync;

pub use api::{ApiClient, ClientError, TokenStore};
pub use media::build_media_url;
pub use sync::{diff, next_delay, LocalWorkspace, SyncDiff, SyncEvent, SyncState, WorkspacePoller};
