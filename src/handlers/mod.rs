//! HTTP request handlers.

pub mod announcements;
pub mod audit_logs;
pub mod auth;
pub mod contact;
pub mod events;
pub mod forms;
pub mod gallery;
pub mod health;
pub mod join_requests;
pub mod projects;
pub mod roles;
pub mod sponsorships;
pub mod taxonomy;
pub mod tasks;
pub mod threads;
pub mod users;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One `{id, order}` pair of a drag-and-drop reorder.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReorderRequest {
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    #[schema(example = "updated")]
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}
