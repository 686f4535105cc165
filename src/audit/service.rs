//! Append-only audit trail writes and purges.

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::models::{AuditLog, NewAuditLog};
use crate::schema::audit_logs;

use super::types::AuditEventType;

/// One audit row before it is written.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub event_type: AuditEventType,
    pub actor_id: Option<Uuid>,
    pub target: String,
    pub ip_address: Option<String>,
    pub details: String,
    pub success: bool,
}

impl AuditEntry {
    pub fn new(event_type: AuditEventType, target: impl Into<String>) -> Self {
        Self {
            event_type,
            actor_id: None,
            target: target.into(),
            ip_address: None,
            details: String::new(),
            success: true,
        }
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuditService;

impl AuditService {
    #[instrument(skip(conn, entry), fields(event_type = %entry.event_type, target = %entry.target))]
    pub fn write(
        conn: &mut PgConnection,
        entry: AuditEntry,
    ) -> Result<AuditLog, diesel::result::Error> {
        let row = NewAuditLog {
            event_type: entry.event_type.as_str().to_string(),
            actor_id: entry.actor_id,
            target: entry.target,
            ip_address: entry.ip_address,
            details: entry.details,
            success: entry.success,
        };

        let log = diesel::insert_into(audit_logs::table)
            .values(&row)
            .returning(AuditLog::as_returning())
            .get_result(conn)?;

        debug!(audit_id = %log.id, "Audit entry written");
        Ok(log)
    }

    /// Writes the entry, logging instead of failing the request when the insert fails.
    pub fn record(conn: &mut PgConnection, entry: AuditEntry) {
        let event_type = entry.event_type;
        if let Err(e) = Self::write(conn, entry) {
            warn!(error = %e, event_type = %event_type, "Failed to write audit entry");
        }
    }

    #[instrument(skip(conn))]
    pub fn purge_older_than(
        conn: &mut PgConnection,
        days: i64,
    ) -> Result<usize, diesel::result::Error> {
        let Some(cutoff) = purge_cutoff(chrono::Utc::now().naive_utc(), days) else {
            debug!(days, "Cutoff predates storable timestamps, nothing to purge");
            return Ok(0);
        };

        let count = diesel::delete(audit_logs::table)
            .filter(audit_logs::created_at.lt(cutoff))
            .execute(conn)?;

        debug!(count, days, "Purged old audit entries");
        Ok(count)
    }
}

/// Earliest instant a Postgres `timestamp` can hold (4713 BC).
fn earliest_stored() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(-4712, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// `None` when no stored row can be older than `days`.
fn purge_cutoff(now: NaiveDateTime, days: i64) -> Option<NaiveDateTime> {
    let cutoff = now.checked_sub_signed(chrono::Duration::try_days(days)?)?;
    (cutoff > earliest_stored()?).then_some(cutoff)
}
