use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    List,
    Book,
    Cancel,
    Chat,
    Unknown,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::List => "list",
            IntentKind::Book => "book",
            IntentKind::Cancel => "cancel",
            IntentKind::Chat => "chat",
            IntentKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "list" => IntentKind::List,
            "book" => IntentKind::Book,
            "cancel" => IntentKind::Cancel,
            "chat" => IntentKind::Chat,
            _ => IntentKind::Unknown,
        }
    }

    /// List, book and cancel start (or continue) a scheduling flow.
    pub fn is_primary(&self) -> bool {
        matches!(self, IntentKind::List | IntentKind::Book | IntentKind::Cancel)
    }
}

/// Date/time parameter as delivered by an NLU backend, before resolution
/// against the clinic calendar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum DateTimeParam {
    /// An ISO date (`2025-10-25`) or datetime (`2025-10-25T13:00:00+02:00`).
    Instant { value: String },
    Range { start: String, end: String },
    Parts { date: String, time: String },
}

impl DateTimeParam {
    pub fn instant(value: impl Into<String>) -> Self {
        DateTimeParam::Instant {
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationPolicy {
    /// Commit as soon as the requested slot checks out.
    Immediate,
    /// Ask the user first; commit only on a turn flagged `is_confirmation`.
    Explicit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedIntent {
    pub kind: IntentKind,
    pub doctor: Option<String>,
    pub datetime: Option<DateTimeParam>,
    #[serde(default)]
    pub is_confirmation: bool,
    pub suggested_reply: Option<String>,
}

impl ResolvedIntent {
    pub fn new(kind: IntentKind) -> Self {
        Self {
            kind,
            doctor: None,
            datetime: None,
            is_confirmation: false,
            suggested_reply: None,
        }
    }

    /// The named doctor, with blank names treated as absent.
    pub fn doctor_name(&self) -> Option<&str> {
        self.doctor
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn supplies_slot_info(&self) -> bool {
        self.doctor_name().is_some() || self.datetime.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!(IntentKind::parse("Book"), IntentKind::Book);
        assert_eq!(IntentKind::parse(" list "), IntentKind::List);
        assert_eq!(IntentKind::parse(""), IntentKind::Unknown);
        assert_eq!(IntentKind::parse("reschedule"), IntentKind::Unknown);
    }

    #[test]
    fn test_blank_doctor_is_absent() {
        let mut intent = ResolvedIntent::new(IntentKind::Chat);
        intent.doctor = Some("   ".to_string());
        assert_eq!(intent.doctor_name(), None);
        assert!(!intent.supplies_slot_info());

        intent.doctor = Some(" Dr. Lee ".to_string());
        assert_eq!(intent.doctor_name(), Some("Dr. Lee"));
        assert!(intent.supplies_slot_info());
    }
}
