use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Doctor, SlotStatus};

/// Open times in a queried range. `doctor_known` is `None` when the query
/// was not filtered by doctor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSlots {
    pub times: Vec<NaiveDateTime>,
    pub doctor_known: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCheck {
    Available,
    Booked,
    NotFound,
}

pub struct ScheduleService {
    db: Arc<Mutex<Connection>>,
}

impl ScheduleService {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub fn query_open_slots(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        doctor: Option<&str>,
    ) -> anyhow::Result<OpenSlots> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);

        let doctor_known = match doctor {
            Some(name) => {
                if !queries::doctor_exists(&db, name)? {
                    return Ok(OpenSlots {
                        times: vec![],
                        doctor_known: Some(false),
                    });
                }
                Some(true)
            }
            None => None,
        };

        let times = queries::open_slots_between(&db, &start, &end, doctor)?;
        tracing::debug!(?doctor, %start, %end, found = times.len(), "queried open slots");
        Ok(OpenSlots {
            times,
            doctor_known,
        })
    }

    pub fn doctor_exists(&self, name: &str) -> anyhow::Result<bool> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        queries::doctor_exists(&db, name)
    }

    pub fn check_slot(&self, doctor: &str, at: NaiveDateTime) -> anyhow::Result<SlotCheck> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        let check = match queries::get_slot(&db, doctor, &at)? {
            Some(slot) if slot.status == SlotStatus::Open => SlotCheck::Available,
            Some(_) => SlotCheck::Booked,
            None => SlotCheck::NotFound,
        };
        Ok(check)
    }

    /// Distinct doctors ordered by name. Storage failures yield an empty list.
    pub fn list_doctors(&self) -> Vec<Doctor> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        match queries::list_doctors(&db) {
            Ok(doctors) => doctors,
            Err(e) => {
                tracing::error!(error = %e, "failed to list doctors");
                vec![]
            }
        }
    }
}
