//! Audit event kinds.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    UserLogin,
    UserLogout,
    LoginFailed,
    UserCreated,
    UserModified,
    UserDeleted,
    ProfileSelfUpdate,

    RoleCreated,
    RoleModified,
    RoleDeleted,

    SigRenamed,
    FieldCreated,

    LogsCleaned,
}

impl AuditEventType {
    pub const ALL: [AuditEventType; 13] = [
        AuditEventType::UserLogin,
        AuditEventType::UserLogout,
        AuditEventType::LoginFailed,
        AuditEventType::UserCreated,
        AuditEventType::UserModified,
        AuditEventType::UserDeleted,
        AuditEventType::ProfileSelfUpdate,
        AuditEventType::RoleCreated,
        AuditEventType::RoleModified,
        AuditEventType::RoleDeleted,
        AuditEventType::SigRenamed,
        AuditEventType::FieldCreated,
        AuditEventType::LogsCleaned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::UserLogin => "USER_LOGIN",
            AuditEventType::UserLogout => "USER_LOGOUT",
            AuditEventType::LoginFailed => "LOGIN_FAILED",
            AuditEventType::UserCreated => "USER_CREATED",
            AuditEventType::UserModified => "USER_MODIFIED",
            AuditEventType::UserDeleted => "USER_DELETED",
            AuditEventType::ProfileSelfUpdate => "PROFILE_SELF_UPDATE",
            AuditEventType::RoleCreated => "ROLE_CREATED",
            AuditEventType::RoleModified => "ROLE_MODIFIED",
            AuditEventType::RoleDeleted => "ROLE_DELETED",
            AuditEventType::SigRenamed => "SIG_RENAMED",
            AuditEventType::FieldCreated => "FIELD_CREATED",
            AuditEventType::LogsCleaned => "LOGS_CLEANED",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_matches_stored_text() {
        for event in AuditEventType::ALL {
            let json = serde_json::to_value(event).unwrap();
            assert_eq!(json, event.as_str());
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(AuditEventType::SigRenamed.to_string(), "SIG_RENAMED");
    }
}
