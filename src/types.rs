//! Domain enums stored as text columns.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

text_enum! {
    ProjectStatus {
        Proposed => "PROPOSED",
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
        Halted => "HALTED",
    }
}

text_enum! {
    TaskStatus {
        Todo => "TODO",
        InProgress => "IN_PROGRESS",
        Done => "DONE",
    }
}

text_enum! {
    /// PENDING moves to APPROVED or REJECTED exactly once.
    JoinRequestStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
}

text_enum! {
    ProjectUpdateKind {
        Request => "REQUEST",
        Submission => "SUBMISSION",
    }
}

text_enum! {
    EventVisibility {
        Draft => "DRAFT",
        Published => "PUBLISHED",
    }
}

text_enum! {
    EventScope {
        Global => "GLOBAL",
        Sig => "SIG",
        Personal => "PERSONAL",
    }
}

text_enum! {
    /// Account category shown on the roster; authorization comes from roles.
    UserCategory {
        Admin => "ADMIN",
        Member => "MEMBER",
        Candidate => "CANDIDATE",
    }
}

text_enum! {
    FormTheme {
        Cyberpunk => "cyberpunk",
        Minimal => "minimal",
        Industrial => "industrial",
        Academic => "academic",
        Solaris => "solaris",
        Midnight => "midnight",
    }
}

text_enum! {
    FormFieldType {
        Text => "text",
        Textarea => "textarea",
        Number => "number",
        Date => "date",
        Select => "select",
        Radio => "radio",
        Checkbox => "checkbox",
    }
}

text_enum! {
    ProfileFieldType {
        Text => "text",
        Url => "url",
        Number => "number",
        Date => "date",
        Textarea => "textarea",
    }
}

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::Proposed
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Todo
    }
}

impl Default for EventVisibility {
    fn default() -> Self {
        EventVisibility::Draft
    }
}

impl Default for EventScope {
    fn default() -> Self {
        EventScope::Global
    }
}

impl Default for FormTheme {
    fn default() -> Self {
        FormTheme::Minimal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_and_parse_agree() {
        for status in ProjectStatus::ALL {
            assert_eq!(ProjectStatus::parse(status.as_str()), Some(*status));
        }
        for kind in FormFieldType::ALL {
            assert_eq!(FormFieldType::parse(kind.as_str()), Some(*kind));
        }
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert_eq!(JoinRequestStatus::parse("pending"), None);
        assert_eq!(FormTheme::parse("MINIMAL"), None);
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");

        let theme: FormTheme = serde_json::from_str("\"solaris\"").unwrap();
        assert_eq!(theme, FormTheme::Solaris);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(ProjectStatus::default(), ProjectStatus::Proposed);
        assert_eq!(EventScope::default(), EventScope::Global);
        assert_eq!(FormTheme::default().to_string(), "minimal");
    }
}
