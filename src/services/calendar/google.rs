use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{CalendarError, CalendarEvent, CalendarProvider};
use crate::models::SLOT_DATETIME_FORMAT;

const API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Google Calendar v3 over REST with a pre-issued OAuth bearer token.
pub struct GoogleCalendarProvider {
    access_token: String,
    calendar_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl GoogleCalendarProvider {
    pub fn new(access_token: String, calendar_id: String, timeout: Duration) -> Self {
        Self {
            access_token,
            calendar_id,
            base_url: API_BASE.to_string(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.base_url, self.calendar_id)
    }
}

fn event_body(event: &CalendarEvent) -> serde_json::Value {
    let attendees: Vec<_> = event
        .attendees
        .iter()
        .map(|email| json!({ "email": email }))
        .collect();

    json!({
        "summary": event.summary,
        "description": event.description,
        "start": {
            "dateTime": event.start.format(SLOT_DATETIME_FORMAT).to_string(),
            "timeZone": event.timezone,
        },
        "end": {
            "dateTime": event.end.format(SLOT_DATETIME_FORMAT).to_string(),
            "timeZone": event.timezone,
        },
        "attendees": attendees,
        "reminders": {
            "useDefault": false,
            "overrides": [
                { "method": "email", "minutes": 24 * 60 },
                { "method": "popup", "minutes": 30 },
            ],
        },
    })
}

#[async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, CalendarError> {
        let resp = self
            .client
            .post(self.events_url())
            .query(&[("sendUpdates", "all")])
            .bearer_auth(&self.access_token)
            .json(&event_body(event))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let data: serde_json::Value = resp.json().await?;
        data["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| CalendarError::Api {
                status: status.as_u16(),
                body: format!("missing event id in response: {data}"),
            })
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        let resp = self
            .client
            .delete(format!("{}/{}", self.events_url(), event_id))
            .query(&[("sendUpdates", "all")])
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = resp.status().as_u16();
        match status {
            200..=299 => Ok(()),
            404 | 410 => Err(CalendarError::NotFound),
            _ => Err(CalendarError::Api {
                status,
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;

    #[test]
    fn test_event_body_shape() {
        let start =
            NaiveDateTime::parse_from_str("2025-10-25 13:00", "%Y-%m-%d %H:%M").unwrap();
        let event = CalendarEvent {
            summary: "Appointment with Dr. Lee".to_string(),
            description: "Medical appointment with Dr. Lee (Dentistry).".to_string(),
            start,
            end: start + chrono::Duration::minutes(60),
            timezone: "Africa/Cairo".to_string(),
            attendees: vec!["lee@clinic.test".to_string()],
        };

        let body = event_body(&event);
        assert_eq!(body["start"]["dateTime"], "2025-10-25T13:00:00");
        assert_eq!(body["end"]["dateTime"], "2025-10-25T14:00:00");
        assert_eq!(body["end"]["timeZone"], "Africa/Cairo");
        assert_eq!(body["attendees"][0]["email"], "lee@clinic.test");
        assert_eq!(body["reminders"]["useDefault"], false);
    }

    #[test]
    fn test_events_url() {
        let provider = GoogleCalendarProvider::new(
            "token".to_string(),
            "primary".to_string(),
            Duration::from_secs(5),
        )
        .with_base_url("http://localhost:9999");
        assert_eq!(
            provider.events_url(),
            "http://localhost:9999/calendars/primary/events"
        );
    }
}
