use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::SlotStatus;
use crate::services::calendar::{CalendarError, CalendarEvent, CalendarProvider};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingOutcome {
    pub success: bool,
    pub message: String,
}

impl BookingOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

pub struct BookingService {
    db: Arc<Mutex<Connection>>,
    calendar: Arc<dyn CalendarProvider>,
    appointment_minutes: i64,
    timezone: String,
}

impl BookingService {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        calendar: Arc<dyn CalendarProvider>,
        appointment_minutes: i64,
        timezone: String,
    ) -> Self {
        Self {
            db,
            calendar,
            appointment_minutes,
            timezone,
        }
    }

    /// Claims an open slot and mirrors it to the calendar. Any failure after
    /// the claim puts the slot back to open.
    pub async fn book(&self, doctor: &str, at: NaiveDateTime) -> BookingOutcome {
        let claimed = {
            let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
            claim(&db, doctor, at)
        };
        let slot = match claimed {
            Ok(Some(slot)) => slot,
            Ok(None) => return BookingOutcome::failed("This slot is no longer available."),
            Err(e) => {
                tracing::error!(doctor, %at, error = %e, "failed to claim slot");
                return BookingOutcome::failed(
                    "Failed to book appointment due to a database error.",
                );
            }
        };

        let event = CalendarEvent {
            summary: format!("Appointment with {}", slot.doctor),
            description: format!(
                "Medical appointment with {} ({}). Booked by the clinic assistant.",
                slot.doctor, slot.specialty
            ),
            start: at,
            end: at + Duration::minutes(self.appointment_minutes),
            timezone: self.timezone.clone(),
            attendees: slot.email.iter().cloned().collect(),
        };

        let event_id = match self.calendar.create_event(&event).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(doctor, %at, error = %e, "calendar event creation failed, releasing slot");
                let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(release_err) = queries::release_slot(&db, slot.id) {
                    tracing::error!(slot_id = slot.id, error = %release_err, "failed to release slot");
                }
                return BookingOutcome::failed(format!("Failed to create calendar event: {e}"));
            }
        };

        let stored = {
            let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
            queries::set_calendar_event(&db, slot.id, &event_id)
        };
        if let Err(e) = stored {
            tracing::error!(slot_id = slot.id, error = %e, "failed to store calendar event id, rolling back");
            self.roll_back(slot.id, &event_id).await;
            return BookingOutcome::failed("Failed to book appointment due to a database error.");
        }

        tracing::info!(doctor = %slot.doctor, %at, event_id = %event_id, "appointment booked");
        BookingOutcome::ok(format!(
            "Appointment booked successfully! The calendar for {} has been updated.",
            slot.doctor
        ))
    }

    /// Undoes a half-finished booking: drops the event just created and
    /// reopens the slot.
    async fn roll_back(&self, slot_id: i64, event_id: &str) {
        match self.calendar.delete_event(event_id).await {
            Ok(()) | Err(CalendarError::NotFound) => {}
            Err(e) => {
                tracing::error!(event_id, error = %e, "failed to delete orphaned calendar event");
            }
        }

        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = queries::release_slot(&db, slot_id) {
            tracing::error!(slot_id, error = %e, "failed to release slot");
        }
    }

    /// Removes the calendar event of a booked slot and reopens it.
    pub async fn cancel(&self, doctor: &str, at: NaiveDateTime) -> BookingOutcome {
        let found = {
            let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
            queries::get_slot(&db, doctor, &at)
        };
        let slot = match found {
            Ok(Some(slot)) if slot.status == SlotStatus::Booked => slot,
            Ok(_) => {
                return BookingOutcome::failed(
                    "I couldn't find a booked appointment for that doctor at that specific time.",
                )
            }
            Err(e) => {
                tracing::error!(doctor, %at, error = %e, "failed to look up booking");
                return BookingOutcome::failed(
                    "Failed to cancel the appointment due to a database error.",
                );
            }
        };

        match slot.calendar_event_id.as_deref() {
            Some(event_id) => match self.calendar.delete_event(event_id).await {
                Ok(()) => {}
                Err(CalendarError::NotFound) => {
                    tracing::info!(event_id, "calendar event already gone");
                }
                Err(e) => {
                    tracing::error!(event_id, error = %e, "calendar event deletion failed");
                    return BookingOutcome::failed(
                        "Failed to cancel the calendar event. Please try again.",
                    );
                }
            },
            None => {
                tracing::warn!(doctor = %slot.doctor, %at, "booked slot has no calendar event, cancelling in storage only");
            }
        }

        {
            let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = queries::release_slot(&db, slot.id) {
                tracing::error!(slot_id = slot.id, error = %e, "failed to reopen slot");
                return BookingOutcome::failed(
                    "Failed to cancel the appointment due to a database error.",
                );
            }
        }

        tracing::info!(doctor = %slot.doctor, %at, "appointment cancelled");
        BookingOutcome::ok(format!(
            "Your appointment with {} at {} has been successfully cancelled.",
            slot.doctor,
            at.format("%I:%M %p")
        ))
    }
}

fn claim(
    conn: &Connection,
    doctor: &str,
    at: NaiveDateTime,
) -> anyhow::Result<Option<crate::models::Slot>> {
    let Some(slot) = queries::get_slot(conn, doctor, &at)? else {
        return Ok(None);
    };
    if !queries::claim_open_slot(conn, slot.id)? {
        return Ok(None);
    }
    Ok(Some(slot))
}
