use std::env;

use chrono_tz::Tz;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub nlu_provider: String,
    pub llm_provider: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub dialogflow_project_id: String,
    pub dialogflow_access_token: String,
    pub dialogflow_language: String,
    pub google_calendar_token: String,
    pub google_calendar_id: String,
    pub clinic_timezone: Tz,
    pub appointment_minutes: i64,
    pub http_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "clinic.db".to_string()),
            nlu_provider: env::var("NLU_PROVIDER").unwrap_or_else(|_| "llm".to_string()),
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".to_string()),
            ollama_url: env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_model: env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string()),
            dialogflow_project_id: env::var("DIALOGFLOW_PROJECT_ID").unwrap_or_default(),
            dialogflow_access_token: env::var("DIALOGFLOW_ACCESS_TOKEN").unwrap_or_default(),
            dialogflow_language: env::var("DIALOGFLOW_LANGUAGE")
                .unwrap_or_else(|_| "en-US".to_string()),
            google_calendar_token: env::var("GOOGLE_CALENDAR_TOKEN").unwrap_or_default(),
            google_calendar_id: env::var("GOOGLE_CALENDAR_ID")
                .unwrap_or_else(|_| "primary".to_string()),
            clinic_timezone: env::var("CLINIC_TIMEZONE")
                .ok()
                .map(|v| parse_timezone(&v).unwrap_or_else(|| {
                    tracing::warn!("unknown CLINIC_TIMEZONE {v:?}, falling back to {DEFAULT_TIMEZONE}");
                    DEFAULT_TIMEZONE
                }))
                .unwrap_or(DEFAULT_TIMEZONE),
            appointment_minutes: env::var("APPOINTMENT_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|m| *m > 0)
                .unwrap_or(60),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

const DEFAULT_TIMEZONE: Tz = chrono_tz::Africa::Cairo;

/// Parses an IANA zone name such as `Africa/Cairo`.
pub fn parse_timezone(s: &str) -> Option<Tz> {
    s.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("Africa/Cairo"), Some(chrono_tz::Africa::Cairo));
        assert_eq!(parse_timezone(" Europe/Berlin "), Some(chrono_tz::Europe::Berlin));
        assert!(parse_timezone("").is_none());
        assert!(parse_timezone("+02:00").is_none());
    }

    #[test]
    fn test_clinic_zone_tracks_daylight_saving() {
        let cairo = parse_timezone("Africa/Cairo").unwrap();
        let winter = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2025, 7, 15, 12, 0, 0).unwrap();
        assert_eq!(winter.with_timezone(&cairo).format("%H:%M").to_string(), "14:00");
        assert_eq!(summer.with_timezone(&cairo).format("%H:%M").to_string(), "15:00");
    }
}
