use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Storage format for slot datetimes: local wall-clock, no offset.
pub const SLOT_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: i64,
    pub doctor: String,
    pub specialty: String,
    pub date_time: NaiveDateTime,
    pub status: SlotStatus,
    pub calendar_event_id: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Open,
    Booked,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Open => "open",
            SlotStatus::Booked => "booked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Some(SlotStatus::Open),
            "booked" => Some(SlotStatus::Booked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Doctor {
    pub name: String,
    pub specialty: String,
}
