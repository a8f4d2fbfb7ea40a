use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use super::NluAdapter;
use crate::models::{ConfirmationPolicy, DateTimeParam, Doctor, IntentKind, ResolvedIntent};
use crate::services::ai::{LlmProvider, Message};
use crate::services::schedule::ScheduleService;

/// Upper bound for the prompt-side history, in estimated tokens.
const MAX_HISTORY_TOKENS: usize = 3500;
/// Messages kept per session before the oldest are dropped.
const MAX_STORED_MESSAGES: usize = 40;
/// Sessions with a transcript; the least recently active one is evicted first.
const MAX_TRACKED_SESSIONS: usize = 500;

const CHAT_INSTRUCTION: &str = "Respond naturally to the user in plain text. Do NOT include any JSON in your response. Just have a friendly conversation.";
const CHAT_FALLBACK: &str = "I'm happy to help with scheduling or general questions!";

#[derive(Debug, Default, Deserialize)]
struct Extraction {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    doctor: Option<String>,
    #[serde(default)]
    datetime: Option<String>,
    #[serde(default)]
    is_confirmation: bool,
}

#[derive(Default)]
struct History {
    messages: Vec<Message>,
    last_turn: u64,
}

#[derive(Default)]
struct Histories {
    sessions: HashMap<String, History>,
    turn: u64,
}

/// Intent resolution backed by a chat-completion model. Keeps its own
/// per-session transcript so the model can carry context across turns.
pub struct LlmIntentResolver {
    llm: Arc<dyn LlmProvider>,
    schedule: Arc<ScheduleService>,
    timezone: Tz,
    max_sessions: usize,
    histories: Mutex<Histories>,
}

impl LlmIntentResolver {
    pub fn new(llm: Arc<dyn LlmProvider>, schedule: Arc<ScheduleService>, timezone: Tz) -> Self {
        Self {
            llm,
            schedule,
            timezone,
            max_sessions: MAX_TRACKED_SESSIONS,
            histories: Mutex::new(Histories::default()),
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    fn push_message(&self, session_id: &str, message: Message) {
        let mut histories = self.histories.lock().unwrap_or_else(PoisonError::into_inner);
        histories.turn += 1;
        let turn = histories.turn;

        if !histories.sessions.contains_key(session_id)
            && histories.sessions.len() >= self.max_sessions
        {
            let stalest = histories
                .sessions
                .iter()
                .min_by_key(|(_, h)| h.last_turn)
                .map(|(id, _)| id.clone());
            if let Some(id) = stalest {
                tracing::debug!(session_id = %id, "evicting least recent transcript");
                histories.sessions.remove(&id);
            }
        }

        let history = histories.sessions.entry(session_id.to_string()).or_default();
        history.last_turn = turn;
        history.messages.push(message);
        if history.messages.len() > MAX_STORED_MESSAGES {
            let excess = history.messages.len() - MAX_STORED_MESSAGES;
            history.messages.drain(..excess);
        }
    }

    fn history(&self, session_id: &str) -> Vec<Message> {
        self.histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .get(session_id)
            .map(|h| h.messages.clone())
            .unwrap_or_default()
    }

    fn local_now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone)
    }
}

#[async_trait]
impl NluAdapter for LlmIntentResolver {
    async fn resolve(&self, session_id: &str, utterance: &str) -> anyhow::Result<ResolvedIntent> {
        let now = self.local_now();
        let doctors = self.schedule.list_doctors();
        let system = system_prompt(&now, &doctors);

        self.push_message(session_id, Message::user(utterance));
        let mut messages = trim_history(&system, &self.history(session_id), MAX_HISTORY_TOKENS);
        let context_len = messages.len();

        messages.push(Message::user(extraction_prompt(&now, utterance)));
        let response = self.llm.chat(&system, &messages).await?;
        let mut intent = parse_extraction(&response);

        tracing::debug!(
            session_id,
            kind = intent.kind.as_str(),
            doctor = ?intent.doctor,
            confirmation = intent.is_confirmation,
            "llm extracted intent"
        );

        if !intent.kind.is_primary() {
            messages.truncate(context_len);
            messages.push(Message::user(CHAT_INSTRUCTION));
            let reply = match self.llm.chat(&system, &messages).await {
                Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
                Ok(_) => CHAT_FALLBACK.to_string(),
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "chat completion failed, using canned reply");
                    CHAT_FALLBACK.to_string()
                }
            };
            intent.suggested_reply = Some(reply);
        }

        Ok(intent)
    }

    fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy::Explicit
    }

    fn record_reply(&self, session_id: &str, reply: &str) {
        self.push_message(session_id, Message::assistant(reply));
    }
}

fn system_prompt(now: &DateTime<Tz>, doctors: &[Doctor]) -> String {
    let doctor_lines = if doctors.is_empty() {
        "- (no doctors are currently on the schedule)".to_string()
    } else {
        doctors
            .iter()
            .map(|d| format!("- {} ({})", d.name, d.specialty))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are a friendly and professional clinic scheduling assistant.
Today is {date}, and the local time is {time} ({location}).

You can:
- List available slots for doctors.
- Book appointments.
- Cancel appointments.
- Handle general chat politely.

Doctors in the clinic:
{doctor_lines}

When the user mentions a specialty (for example "dentist"), map it to the matching doctor from the list above.
If the user mentions a doctor or specialty that is not in the list, say that the clinic does not have that doctor.

Context rules:
1. Remember details from earlier messages. If a doctor was mentioned before and the user now gives only a date or time, use that doctor.
2. "today" means {date}; "tomorrow" means the day after.
3. Short replies like "yes", "ok" or "sure" after a confirmation question are confirmations.
4. Never ask for the user's name or email.
5. Before booking or cancelling, confirm the details with the user.
6. Keep replies warm and short (one or two sentences). Do not invent information."#,
        date = now.format("%A, %B %d, %Y"),
        time = now.format("%I:%M %p"),
        location = now.timezone().name(),
    )
}

fn extraction_prompt(now: &DateTime<Tz>, utterance: &str) -> String {
    let today = now.format("%Y-%m-%d");
    format!(
        r#"Analyze the whole conversation and extract the user's request. Fill missing details from earlier messages.

Rules:
1. "today" is {today}T00:00:00. Resolve other relative dates the same way.
2. A bare time like "11 am" combines with the date already discussed.
3. Clinic hours are 9:00 AM to 4:00 PM, so "1" or "1 pm" means 13:00.
4. is_confirmation is true ONLY when the assistant just asked the user to confirm a booking or cancellation and the user agrees.

Current user message: "{utterance}"

Respond with ONLY this JSON, nothing else:
{{
  "type": "list" | "book" | "cancel" | "chat",
  "doctor": "exact doctor name from the clinic list, or empty string",
  "datetime": "YYYY-MM-DDTHH:MM:SS, or empty string",
  "is_confirmation": true | false
}}"#
    )
}

fn estimate_tokens(text: &str) -> usize {
    (text.split_whitespace().count() as f64 * 1.3) as usize
}

/// Keeps the most recent messages that fit the token budget alongside the
/// system prompt, in chronological order.
fn trim_history(system_prompt: &str, history: &[Message], max_tokens: usize) -> Vec<Message> {
    let mut total = estimate_tokens(system_prompt);
    let mut kept = Vec::new();

    for msg in history.iter().rev() {
        if msg.content.trim().is_empty() {
            continue;
        }
        let tokens = estimate_tokens(&msg.content);
        if total + tokens >= max_tokens {
            break;
        }
        total += tokens;
        kept.push(msg.clone());
    }

    kept.reverse();
    kept
}

fn parse_extraction(response: &str) -> ResolvedIntent {
    let Some(extraction) = decode_extraction(response) else {
        tracing::warn!("failed to parse LLM extraction as JSON, treating as unknown");
        return ResolvedIntent::new(IntentKind::Unknown);
    };

    let kind = extraction
        .kind
        .as_deref()
        .map(IntentKind::parse)
        .unwrap_or(IntentKind::Unknown);

    let mut intent = ResolvedIntent::new(kind);
    intent.doctor = extraction
        .doctor
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    intent.datetime = extraction
        .datetime
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .map(DateTimeParam::instant);
    intent.is_confirmation = extraction.is_confirmation;
    intent
}

fn decode_extraction(response: &str) -> Option<Extraction> {
    // Try direct parse first
    if let Ok(extraction) = serde_json::from_str::<Extraction>(response) {
        return Some(extraction);
    }

    // Strip markdown code fences
    let trimmed = response.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(extraction) = serde_json::from_str::<Extraction>(cleaned) {
        return Some(extraction);
    }

    // Fall back to the outermost object embedded in prose
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Extraction>(&cleaned[start..=end]).ok()
}
