use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{CalendarError, CalendarEvent, CalendarProvider};

/// Keeps events in process memory. Used when no Google credentials are
/// configured, and in tests.
#[derive(Default)]
pub struct LocalCalendar {
    events: Mutex<HashMap<String, CalendarEvent>>,
}

impl LocalCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(&self, event_id: &str) -> Option<CalendarEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CalendarProvider for LocalCalendar {
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, CalendarError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), event.clone());
        tracing::debug!(event_id = %id, summary = %event.summary, "stored local calendar event");
        Ok(id)
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(event_id)
            .map(|_| ())
            .ok_or(CalendarError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;

    #[tokio::test]
    async fn test_create_and_delete() {
        let calendar = LocalCalendar::new();
        let start =
            NaiveDateTime::parse_from_str("2025-10-25 13:00", "%Y-%m-%d %H:%M").unwrap();
        let event = CalendarEvent {
            summary: "Appointment with Dr. Lee".to_string(),
            description: String::new(),
            start,
            end: start,
            timezone: "Africa/Cairo".to_string(),
            attendees: vec![],
        };

        let id = calendar.create_event(&event).await.unwrap();
        assert_eq!(calendar.event(&id), Some(event));

        calendar.delete_event(&id).await.unwrap();
        assert!(calendar.is_empty());
        assert!(matches!(
            calendar.delete_event(&id).await,
            Err(CalendarError::NotFound)
        ));
    }
}
