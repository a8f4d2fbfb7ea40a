use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};

use crate::models::{
    ConfirmationPolicy, ConversationState, IntentKind, ResolvedIntent, SlotDraft,
};
use crate::services::booking::BookingService;
use crate::services::dates::{resolve_instant, resolve_range};
use crate::services::nlu::NluAdapter;
use crate::services::schedule::{OpenSlots, ScheduleService, SlotCheck};
use crate::services::session::{SessionLocks, SessionStore};

const NLU_UNAVAILABLE_REPLY: &str = "I'm having trouble connecting. Please try again.";
const INTERNAL_ERROR_REPLY: &str = "I'm sorry, I encountered an internal error. Please try again.";
const DEFAULT_CHAT_REPLY: &str =
    "I'm happy to help with scheduling. You can ask me to list, book, or cancel appointments.";

/// The multi-turn slot-filling dialogue. Owns no state of its own beyond
/// the session store; every collaborator is injected.
pub struct ConversationEngine {
    nlu: Arc<dyn NluAdapter>,
    schedule: Arc<ScheduleService>,
    booking: Arc<BookingService>,
    sessions: Arc<dyn SessionStore>,
    locks: SessionLocks,
}

/// Booking and cancellation share one slot-filling flow and differ only in
/// wording and in which slot status lets them proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotFlow {
    Book,
    Cancel,
}

impl SlotFlow {
    fn state(self, draft: SlotDraft) -> ConversationState {
        match self {
            SlotFlow::Book => ConversationState::AwaitingBookSlot(draft),
            SlotFlow::Cancel => ConversationState::AwaitingCancelSlot(draft),
        }
    }

    fn standing_draft(self, state: ConversationState) -> Option<SlotDraft> {
        match (self, state) {
            (SlotFlow::Book, ConversationState::AwaitingBookSlot(draft))
            | (SlotFlow::Cancel, ConversationState::AwaitingCancelSlot(draft)) => Some(draft),
            _ => None,
        }
    }

    fn ask_doctor(self) -> String {
        match self {
            SlotFlow::Book => "Which doctor would you like to book an appointment with?",
            SlotFlow::Cancel => "Which doctor's appointment would you like to cancel?",
        }
        .to_string()
    }

    fn ask_datetime(self, doctor: &str) -> String {
        match self {
            SlotFlow::Book => format!("What date and time would you like to see {doctor}?"),
            SlotFlow::Cancel => format!("What date and time is your appointment with {doctor}?"),
        }
    }

    fn unparsable(self) -> String {
        match self {
            SlotFlow::Book => "I couldn't understand the date and time. Please specify when you'd like the appointment (e.g., 'tomorrow at 1:00 PM').",
            SlotFlow::Cancel => "I couldn't understand the date and time. Please specify when your appointment is.",
        }
        .to_string()
    }

    fn confirm_prompt(self, doctor: &str, at: NaiveDateTime) -> String {
        let when = at.format("%I:%M %p on %B %d");
        match self {
            SlotFlow::Book => format!(
                "Just to confirm, you'd like to book an appointment with {doctor} at {when}. Should I proceed?"
            ),
            SlotFlow::Cancel => format!(
                "Just to confirm, you'd like to cancel your appointment with {doctor} at {when}. Should I proceed?"
            ),
        }
    }

    fn proceeds_on(self, check: SlotCheck) -> bool {
        matches!(
            (self, check),
            (SlotFlow::Book, SlotCheck::Available) | (SlotFlow::Cancel, SlotCheck::Booked)
        )
    }
}

impl ConversationEngine {
    pub fn new(
        nlu: Arc<dyn NluAdapter>,
        schedule: Arc<ScheduleService>,
        booking: Arc<BookingService>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            nlu,
            schedule,
            booking,
            sessions,
            locks: SessionLocks::new(),
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Runs one turn, generating a session id when the caller has none.
    pub async fn submit_message(&self, session_id: Option<String>, text: &str) -> (String, String) {
        let session_id = session_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let reply = self.handle_turn(&session_id, text).await;
        (reply, session_id)
    }

    pub async fn handle_turn(&self, session_id: &str, utterance: &str) -> String {
        let _turn = self.locks.acquire(session_id).await;

        let intent = match self.nlu.resolve(session_id, utterance).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "NLU adapter unavailable");
                return NLU_UNAVAILABLE_REPLY.to_string();
            }
        };

        let reply = match self.dispatch(session_id, intent).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(session_id, error = ?e, "turn failed, clearing session");
                self.sessions.clear(session_id);
                INTERNAL_ERROR_REPLY.to_string()
            }
        };

        self.nlu.record_reply(session_id, &reply);
        reply
    }

    async fn dispatch(&self, session_id: &str, intent: ResolvedIntent) -> anyhow::Result<String> {
        let state = self.sessions.get(session_id);

        // An answer to a standing question continues that flow.
        let kind = if state.is_awaiting()
            && intent.supplies_slot_info()
            && !intent.kind.is_primary()
        {
            match &state {
                ConversationState::AwaitingListDate { .. } => IntentKind::List,
                ConversationState::AwaitingBookSlot(_) => IntentKind::Book,
                ConversationState::AwaitingCancelSlot(_) => IntentKind::Cancel,
                ConversationState::Idle => intent.kind,
            }
        } else {
            intent.kind
        };

        tracing::info!(
            session_id,
            intent = kind.as_str(),
            state = state.as_str(),
            doctor = ?intent.doctor_name(),
            "processing message"
        );

        match kind {
            IntentKind::List => self.handle_list(session_id, state, &intent),
            IntentKind::Book => self.handle_slot_flow(SlotFlow::Book, session_id, state, &intent).await,
            IntentKind::Cancel => {
                self.handle_slot_flow(SlotFlow::Cancel, session_id, state, &intent)
                    .await
            }
            IntentKind::Chat | IntentKind::Unknown => Ok(chat_reply(&state, intent)),
        }
    }

    fn handle_list(
        &self,
        session_id: &str,
        state: ConversationState,
        intent: &ResolvedIntent,
    ) -> anyhow::Result<String> {
        let mut doctor = match state {
            ConversationState::AwaitingListDate { doctor } => doctor,
            _ => {
                self.sessions.clear(session_id);
                None
            }
        };

        if let Some(name) = intent.doctor_name() {
            if !self.schedule.doctor_exists(name)? {
                self.sessions.clear(session_id);
                return Ok(not_in_clinic(name));
            }
            doctor = Some(name.to_string());
        }

        self.sessions.set(
            session_id,
            ConversationState::AwaitingListDate {
                doctor: doctor.clone(),
            },
        );

        let Some(param) = &intent.datetime else {
            return Ok(match &doctor {
                Some(name) => format!("For which date would you like to check {name}'s schedule?"),
                None => "For which date would you like to check the schedule?".to_string(),
            });
        };

        let (start, end) = match resolve_range(param) {
            Ok(range) => range,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "could not resolve list date");
                return Ok("I couldn't understand that date. Please try again (e.g., 'tomorrow' or 'October 25th').".to_string());
            }
        };

        let reply = match self.schedule.query_open_slots(start, end, doctor.as_deref()) {
            Ok(slots) => format_open_slots(doctor.as_deref(), start, end, &slots),
            Err(e) => {
                tracing::error!(session_id, error = %e, "slot query failed");
                "I'm sorry, I'm having trouble reading the schedule right now.".to_string()
            }
        };

        self.sessions.clear(session_id);
        Ok(reply)
    }

    async fn handle_slot_flow(
        &self,
        flow: SlotFlow,
        session_id: &str,
        state: ConversationState,
        intent: &ResolvedIntent,
    ) -> anyhow::Result<String> {
        let mut draft = match flow.standing_draft(state) {
            Some(draft) => draft,
            None => {
                self.sessions.clear(session_id);
                SlotDraft::default()
            }
        };
        draft.merge(intent.doctor_name(), intent.datetime.as_ref());
        self.sessions.set(session_id, flow.state(draft.clone()));

        let Some(doctor) = draft.doctor.clone() else {
            return Ok(flow.ask_doctor());
        };
        let Some(param) = draft.datetime.clone() else {
            return Ok(flow.ask_datetime(&doctor));
        };

        let at = match resolve_instant(&param) {
            Ok(at) => at,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "could not resolve appointment time");
                draft.datetime = None;
                self.sessions.set(session_id, flow.state(draft));
                return Ok(flow.unparsable());
            }
        };

        let check = match self.schedule.check_slot(&doctor, at) {
            Ok(check) => check,
            Err(e) => {
                tracing::error!(session_id, error = %e, "slot status check failed");
                self.sessions.clear(session_id);
                return Ok("An error occurred while checking the schedule. Please try again.".to_string());
            }
        };

        if flow.proceeds_on(check) {
            if self.nlu.confirmation_policy() == ConfirmationPolicy::Explicit
                && !intent.is_confirmation
            {
                return Ok(flow.confirm_prompt(&doctor, at));
            }

            let outcome = match flow {
                SlotFlow::Book => self.booking.book(&doctor, at).await,
                SlotFlow::Cancel => self.booking.cancel(&doctor, at).await,
            };
            if outcome.success {
                self.sessions.clear(session_id);
            }
            return Ok(outcome.message);
        }

        let when = at.format("%I:%M %p on %B %d");
        let reply = match (flow, check) {
            (SlotFlow::Book, SlotCheck::Booked) => format!(
                "Sorry, this slot is already booked. {doctor} is not available at {when}. Please choose another time."
            ),
            (SlotFlow::Book, _) => format!(
                "Sorry, {doctor} doesn't have a slot at {when}. Please choose another time."
            ),
            (SlotFlow::Cancel, _) => format!(
                "Your appointment with {doctor} at {when} was already cancelled or not found. Please check the date and time."
            ),
        };

        draft.datetime = None;
        self.sessions.set(session_id, flow.state(draft));
        Ok(reply)
    }
}

fn chat_reply(state: &ConversationState, intent: ResolvedIntent) -> String {
    match state {
        ConversationState::AwaitingListDate { .. } => {
            "Sorry, I didn't catch that. What date were you interested in?".to_string()
        }
        ConversationState::AwaitingBookSlot(_) => {
            "Sorry, I missed that. What was the doctor or time you wanted to book?".to_string()
        }
        ConversationState::AwaitingCancelSlot(_) => {
            "Sorry, I didn't get that. What was the doctor or time for the cancellation?"
                .to_string()
        }
        ConversationState::Idle => intent
            .suggested_reply
            .unwrap_or_else(|| DEFAULT_CHAT_REPLY.to_string()),
    }
}

fn not_in_clinic(name: &str) -> String {
    format!("I'm sorry, but we don't have {name} in our clinic.")
}

/// "October 25" for a single day, "October 25 to October 27" for a range
/// (end shown inclusively).
fn date_label(start: NaiveDateTime, end: NaiveDateTime) -> String {
    let last_day = (end - Duration::days(1)).date();
    if last_day <= start.date() {
        start.format("%B %d").to_string()
    } else {
        format!("{} to {}", start.format("%B %d"), last_day.format("%B %d"))
    }
}

fn format_open_slots(
    doctor: Option<&str>,
    start: NaiveDateTime,
    end: NaiveDateTime,
    slots: &OpenSlots,
) -> String {
    let date = date_label(start, end);

    if let (Some(name), Some(false)) = (doctor, slots.doctor_known) {
        return not_in_clinic(name);
    }

    if slots.times.is_empty() {
        return match doctor {
            Some(name) => format!("{name} has no available slots on {date}."),
            None => format!("There are no available slots on {date}."),
        };
    }

    let times = slots
        .times
        .iter()
        .map(|t| t.format("%I:%M %p").to_string())
        .collect::<Vec<_>>()
        .join(", ");

    match doctor {
        Some(name) => format!("{name} has the following open slots on {date}: {times}."),
        None => format!("The following slots are open on {date}: {times}."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_date_label() {
        assert_eq!(
            date_label(dt("2025-10-25 00:00"), dt("2025-10-26 00:00")),
            "October 25"
        );
        assert_eq!(
            date_label(dt("2025-10-25 00:00"), dt("2025-10-28 00:00")),
            "October 25 to October 27"
        );
    }

    #[test]
    fn test_format_open_slots() {
        let start = dt("2025-10-25 00:00");
        let end = dt("2025-10-26 00:00");
        let found = OpenSlots {
            times: vec![dt("2025-10-25 10:00"), dt("2025-10-25 14:00")],
            doctor_known: Some(true),
        };
        assert_eq!(
            format_open_slots(Some("Dr. Smith"), start, end, &found),
            "Dr. Smith has the following open slots on October 25: 10:00 AM, 02:00 PM."
        );

        let anyone = OpenSlots {
            doctor_known: None,
            ..found
        };
        assert_eq!(
            format_open_slots(None, start, end, &anyone),
            "The following slots are open on October 25: 10:00 AM, 02:00 PM."
        );

        let empty = OpenSlots {
            times: vec![],
            doctor_known: Some(true),
        };
        assert_eq!(
            format_open_slots(Some("Dr. Smith"), start, end, &empty),
            "Dr. Smith has no available slots on October 25."
        );
        assert_eq!(
            format_open_slots(None, start, end, &OpenSlots { times: vec![], doctor_known: None }),
            "There are no available slots on October 25."
        );

        let unknown = OpenSlots {
            times: vec![],
            doctor_known: Some(false),
        };
        assert_eq!(
            format_open_slots(Some("Dr. Who"), start, end, &unknown),
            "I'm sorry, but we don't have Dr. Who in our clinic."
        );
    }

    #[test]
    fn test_chat_reply_reprompts_pending_question() {
        let mut intent = ResolvedIntent::new(IntentKind::Chat);
        intent.suggested_reply = Some("Hello there!".to_string());

        assert_eq!(chat_reply(&ConversationState::Idle, intent.clone()), "Hello there!");
        assert_eq!(
            chat_reply(
                &ConversationState::AwaitingListDate { doctor: None },
                intent.clone()
            ),
            "Sorry, I didn't catch that. What date were you interested in?"
        );
        assert_eq!(
            chat_reply(
                &ConversationState::AwaitingCancelSlot(SlotDraft::default()),
                intent
            ),
            "Sorry, I didn't get that. What was the doctor or time for the cancellation?"
        );
        assert_eq!(
            chat_reply(
                &ConversationState::Idle,
                ResolvedIntent::new(IntentKind::Unknown)
            ),
            DEFAULT_CHAT_REPLY
        );
    }

    #[test]
    fn test_slot_flow_wording() {
        let at = dt("2025-10-25 13:00");
        assert_eq!(
            SlotFlow::Book.confirm_prompt("Dr. Lee", at),
            "Just to confirm, you'd like to book an appointment with Dr. Lee at 01:00 PM on October 25. Should I proceed?"
        );
        assert!(SlotFlow::Cancel.proceeds_on(SlotCheck::Booked));
        assert!(!SlotFlow::Cancel.proceeds_on(SlotCheck::Available));
        assert!(SlotFlow::Book.proceeds_on(SlotCheck::Available));
    }
}
