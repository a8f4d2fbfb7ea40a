use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::NluAdapter;
use crate::models::{DateTimeParam, IntentKind, ResolvedIntent};

const API_BASE: &str = "https://dialogflow.googleapis.com";

/// Dialogflow ES `detectIntent` over REST. Dialogflow owns its own session
/// context, keyed by the same session id as ours.
pub struct DialogflowAdapter {
    project_id: String,
    access_token: String,
    language_code: String,
    client: reqwest::Client,
}

impl DialogflowAdapter {
    pub fn new(
        project_id: String,
        access_token: String,
        language_code: String,
        timeout: Duration,
    ) -> Self {
        Self {
            project_id,
            access_token,
            language_code,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    fn detect_intent_url(&self, session_id: &str) -> String {
        format!(
            "{}/v2/projects/{}/agent/sessions/{}:detectIntent",
            API_BASE, self.project_id, session_id
        )
    }
}

#[async_trait]
impl NluAdapter for DialogflowAdapter {
    async fn resolve(&self, session_id: &str, utterance: &str) -> anyhow::Result<ResolvedIntent> {
        let body = json!({
            "queryInput": {
                "text": {
                    "text": utterance,
                    "languageCode": self.language_code,
                }
            }
        });

        let resp = self
            .client
            .post(self.detect_intent_url(session_id))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("failed to call Dialogflow API")?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .context("failed to parse Dialogflow response")?;

        if !status.is_success() {
            anyhow::bail!("Dialogflow API error ({}): {}", status, data);
        }

        let intent = parse_query_result(&data["queryResult"]);
        tracing::debug!(
            session_id,
            display_name = data["queryResult"]["intent"]["displayName"].as_str().unwrap_or(""),
            kind = intent.kind.as_str(),
            "dialogflow matched intent"
        );
        Ok(intent)
    }
}

/// Maps an agent intent display name to a kind. Follow-up intents such as
/// "Book Schedule - provide datetime" share their parent's prefix.
pub fn kind_for_display_name(name: &str) -> IntentKind {
    let name = name.trim();
    if name.starts_with("List Schedules") {
        IntentKind::List
    } else if name.starts_with("Book Schedule") {
        IntentKind::Book
    } else if name.starts_with("Cancel Appointment") {
        IntentKind::Cancel
    } else if name == "Default Fallback Intent" || name.is_empty() {
        IntentKind::Unknown
    } else {
        IntentKind::Chat
    }
}

fn parse_query_result(result: &Value) -> ResolvedIntent {
    let display_name = result["intent"]["displayName"].as_str().unwrap_or("");
    let params = &result["parameters"];

    let mut intent = ResolvedIntent::new(kind_for_display_name(display_name));
    intent.doctor = first_non_empty(&params["doctor"])
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    intent.datetime = first_non_empty(&params["date-time"]).and_then(decode_datetime);
    intent.suggested_reply = result["fulfillmentText"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string());
    intent
}

/// Dialogflow sends list-valued parameters for some entities; the first
/// non-empty element wins.
fn first_non_empty(value: &Value) -> Option<&Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::Array(items) => items.iter().find_map(first_non_empty),
        Value::Object(map) if map.is_empty() => None,
        other => Some(other),
    }
}

/// Decodes the shapes of Dialogflow's `sys.date-time` entity.
pub fn decode_datetime(value: &Value) -> Option<DateTimeParam> {
    let field = |key: &str| {
        value[key]
            .as_str()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.to_string())
    };

    if let Some(s) = value.as_str() {
        return Some(DateTimeParam::instant(s));
    }
    if let Some(dt) = field("date_time") {
        return Some(DateTimeParam::instant(dt));
    }
    if let (Some(start), Some(end)) = (field("startDate"), field("endDate")) {
        return Some(DateTimeParam::Range { start, end });
    }
    if let (Some(start), Some(end)) = (field("startDateTime"), field("endDateTime")) {
        return Some(DateTimeParam::Range { start, end });
    }
    if let (Some(date), Some(time)) = (field("date"), field("time")) {
        return Some(DateTimeParam::Parts { date, time });
    }
    tracing::warn!(%value, "unrecognized date-time parameter shape");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_for_display_name() {
        assert_eq!(kind_for_display_name("List Schedules"), IntentKind::List);
        assert_eq!(
            kind_for_display_name("List Schedules - provide doctor"),
            IntentKind::List
        );
        assert_eq!(
            kind_for_display_name("Book Schedule - provide datetime"),
            IntentKind::Book
        );
        assert_eq!(kind_for_display_name("Cancel Appointment"), IntentKind::Cancel);
        assert_eq!(
            kind_for_display_name("Default Fallback Intent"),
            IntentKind::Unknown
        );
        assert_eq!(
            kind_for_display_name("Default Welcome Intent"),
            IntentKind::Chat
        );
    }

    #[test]
    fn test_decode_datetime_shapes() {
        assert_eq!(
            decode_datetime(&json!("2025-10-25T13:00:00+02:00")),
            Some(DateTimeParam::instant("2025-10-25T13:00:00+02:00"))
        );
        assert_eq!(
            decode_datetime(&json!({"date_time": "2025-10-25T13:00:00+02:00"})),
            Some(DateTimeParam::instant("2025-10-25T13:00:00+02:00"))
        );
        assert_eq!(
            decode_datetime(&json!({"startDate": "2025-10-25", "endDate": "2025-10-27"})),
            Some(DateTimeParam::Range {
                start: "2025-10-25".to_string(),
                end: "2025-10-27".to_string(),
            })
        );
        assert_eq!(
            decode_datetime(&json!({
                "startDateTime": "2025-10-25T09:00:00+02:00",
                "endDateTime": "2025-10-25T12:00:00+02:00"
            })),
            Some(DateTimeParam::Range {
                start: "2025-10-25T09:00:00+02:00".to_string(),
                end: "2025-10-25T12:00:00+02:00".to_string(),
            })
        );
        assert_eq!(
            decode_datetime(&json!({"date": "2025-10-25", "time": "13:00:00"})),
            Some(DateTimeParam::Parts {
                date: "2025-10-25".to_string(),
                time: "13:00:00".to_string(),
            })
        );
        assert_eq!(decode_datetime(&json!({"period": "morning"})), None);
    }

    #[test]
    fn test_parse_query_result() {
        let result = json!({
            "intent": { "displayName": "Book Schedule - provide doctor" },
            "fulfillmentText": "When would you like to come in?",
            "parameters": {
                "doctor": ["Dr. Lee"],
                "date-time": ""
            }
        });

        let intent = parse_query_result(&result);
        assert_eq!(intent.kind, IntentKind::Book);
        assert_eq!(intent.doctor.as_deref(), Some("Dr. Lee"));
        assert_eq!(intent.datetime, None);
        assert!(!intent.is_confirmation);
        assert_eq!(
            intent.suggested_reply.as_deref(),
            Some("When would you like to come in?")
        );
    }

    #[test]
    fn test_parse_query_result_without_intent() {
        let intent = parse_query_result(&json!({}));
        assert_eq!(intent.kind, IntentKind::Unknown);
        assert!(!intent.supplies_slot_info());
        assert_eq!(intent.suggested_reply, None);
    }

    #[test]
    fn test_detect_intent_url() {
        let adapter = DialogflowAdapter::new(
            "clinic-agent".to_string(),
            "token".to_string(),
            "en-US".to_string(),
            Duration::from_secs(5),
        );
        assert_eq!(
            adapter.detect_intent_url("abc"),
            "https://dialogflow.googleapis.com/v2/projects/clinic-agent/agent/sessions/abc:detectIntent"
        );
    }
}
