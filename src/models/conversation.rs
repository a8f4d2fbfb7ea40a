use serde::{Deserialize, Serialize};

use super::intent::DateTimeParam;

/// Doctor and datetime collected so far for a booking or cancellation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotDraft {
    pub doctor: Option<String>,
    pub datetime: Option<DateTimeParam>,
}

impl SlotDraft {
    /// Fills in whatever the latest turn supplied; absent values never
    /// overwrite what is already collected.
    pub fn merge(&mut self, doctor: Option<&str>, datetime: Option<&DateTimeParam>) {
        if let Some(doctor) = doctor {
            self.doctor = Some(doctor.to_string());
        }
        if let Some(datetime) = datetime {
            self.datetime = Some(datetime.clone());
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingListDate {
        doctor: Option<String>,
    },
    AwaitingBookSlot(SlotDraft),
    AwaitingCancelSlot(SlotDraft),
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::AwaitingListDate { .. } => "list_date",
            ConversationState::AwaitingBookSlot(_) => "book_datetime",
            ConversationState::AwaitingCancelSlot(_) => "cancel_datetime",
        }
    }

    pub fn is_awaiting(&self) -> bool {
        !matches!(self, ConversationState::Idle)
    }
}
