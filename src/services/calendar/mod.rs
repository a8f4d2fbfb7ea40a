pub mod google;
pub mod local;

use async_trait::async_trait;
use chrono::NaiveDateTime;

/// An appointment as pushed to an external calendar. Times are clinic-local
/// wall-clock values interpreted in `timezone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub timezone: String,
    pub attendees: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("calendar event not found")]
    NotFound,

    #[error("calendar API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("calendar request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Creates the event and returns its provider-assigned id.
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, CalendarError>;
    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError>;
}
