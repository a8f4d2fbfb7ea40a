use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Doctor, Slot, SlotStatus, SLOT_DATETIME_FORMAT};

fn fmt_slot_time(dt: &NaiveDateTime) -> String {
    dt.format(SLOT_DATETIME_FORMAT).to_string()
}

// ── Doctors ──

pub fn list_doctors(conn: &Connection) -> anyhow::Result<Vec<Doctor>> {
    let mut stmt = conn.prepare(
        "SELECT doctor, MAX(specialty) FROM schedules GROUP BY doctor ORDER BY doctor",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(Doctor {
            name: row.get(0)?,
            specialty: row.get(1)?,
        })
    })?;

    let mut doctors = vec![];
    for row in rows {
        doctors.push(row?);
    }
    Ok(doctors)
}

pub fn doctor_exists(conn: &Connection, name: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM schedules WHERE doctor = ?1",
        params![name.trim()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ── Slots ──

/// Open slot times in `[start, end)`, earliest first.
pub fn open_slots_between(
    conn: &Connection,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    doctor: Option<&str>,
) -> anyhow::Result<Vec<NaiveDateTime>> {
    let start_str = fmt_slot_time(start);
    let end_str = fmt_slot_time(end);

    let raw: Vec<String> = match doctor {
        Some(doctor) => {
            let mut stmt = conn.prepare(
                "SELECT date_time FROM schedules
                 WHERE doctor = ?1 AND status = 'open' AND date_time >= ?2 AND date_time < ?3
                 ORDER BY date_time ASC",
            )?;
            let rows = stmt.query_map(params![doctor.trim(), start_str, end_str], |row| row.get(0))?;
            let times = rows.collect::<Result<Vec<String>, _>>()?;
            times
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT date_time FROM schedules
                 WHERE status = 'open' AND date_time >= ?1 AND date_time < ?2
                 ORDER BY date_time ASC",
            )?;
            let rows = stmt.query_map(params![start_str, end_str], |row| row.get(0))?;
            let times = rows.collect::<Result<Vec<String>, _>>()?;
            times
        }
    };

    raw.iter()
        .map(|s| {
            NaiveDateTime::parse_from_str(s, SLOT_DATETIME_FORMAT)
                .map_err(|e| anyhow::anyhow!("malformed slot datetime {s:?}: {e}"))
        })
        .collect()
}

pub fn get_slot(
    conn: &Connection,
    doctor: &str,
    date_time: &NaiveDateTime,
) -> anyhow::Result<Option<Slot>> {
    let row = conn
        .query_row(
            "SELECT id, doctor, specialty, date_time, status, calendar_event_id, email
             FROM schedules WHERE doctor = ?1 AND date_time = ?2",
            params![doctor.trim(), fmt_slot_time(date_time)],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((id, doctor, specialty, date_time_str, status_str, calendar_event_id, email)) = row
    else {
        return Ok(None);
    };

    let date_time = NaiveDateTime::parse_from_str(&date_time_str, SLOT_DATETIME_FORMAT)
        .map_err(|e| anyhow::anyhow!("malformed slot datetime {date_time_str:?}: {e}"))?;
    let status = SlotStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown slot status {status_str:?}"))?;

    Ok(Some(Slot {
        id,
        doctor,
        specialty,
        date_time,
        status,
        calendar_event_id,
        email,
    }))
}

/// Flips an open slot to booked. Returns false when the slot is missing or
/// was already taken.
pub fn claim_open_slot(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE schedules SET status = 'booked' WHERE id = ?1 AND status = 'open'",
        params![id],
    )?;
    Ok(count > 0)
}

pub fn set_calendar_event(conn: &Connection, id: i64, event_id: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE schedules SET calendar_event_id = ?1 WHERE id = ?2",
        params![event_id, id],
    )?;
    Ok(())
}

/// Returns a slot to open and drops its calendar reference.
pub fn release_slot(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE schedules SET status = 'open', calendar_event_id = NULL WHERE id = ?1",
        params![id],
    )?;
    Ok(count > 0)
}

// ── Import ──

pub struct NewSlot<'a> {
    pub doctor: &'a str,
    pub specialty: &'a str,
    pub date_time: NaiveDateTime,
    pub status: SlotStatus,
    pub email: Option<&'a str>,
}

pub fn upsert_slot(conn: &Connection, slot: &NewSlot) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO schedules (doctor, specialty, date_time, status, email)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(doctor, date_time) DO UPDATE SET
           specialty = excluded.specialty,
           status = excluded.status,
           email = excluded.email",
        params![
            slot.doctor.trim(),
            slot.specialty,
            fmt_slot_time(&slot.date_time),
            slot.status.as_str(),
            slot.email,
        ],
    )?;
    Ok(())
}

pub fn clear_schedule(conn: &Connection) -> anyhow::Result<usize> {
    let count = conn.execute("DELETE FROM schedules", [])?;
    tracing::info!(removed = count, "cleared schedule table");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn seed(conn: &Connection, doctor: &str, specialty: &str, at: &str, status: SlotStatus) {
        upsert_slot(
            conn,
            &NewSlot {
                doctor,
                specialty,
                date_time: dt(at),
                status,
                email: None,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_doctor_lookup_is_case_insensitive() {
        let conn = db::init_db(":memory:").unwrap();
        seed(&conn, "Dr. Smith", "Cardiology", "2025-10-25 10:00", SlotStatus::Open);

        assert!(doctor_exists(&conn, "dr. smith").unwrap());
        assert!(doctor_exists(&conn, " DR. SMITH ").unwrap());
        assert!(!doctor_exists(&conn, "Dr. Who").unwrap());
    }

    #[test]
    fn test_open_slots_half_open_range() {
        let conn = db::init_db(":memory:").unwrap();
        seed(&conn, "Dr. Smith", "Cardiology", "2025-10-25 14:00", SlotStatus::Open);
        seed(&conn, "Dr. Smith", "Cardiology", "2025-10-25 10:00", SlotStatus::Open);
        seed(&conn, "Dr. Smith", "Cardiology", "2025-10-25 11:00", SlotStatus::Booked);
        seed(&conn, "Dr. Smith", "Cardiology", "2025-10-26 00:00", SlotStatus::Open);
        seed(&conn, "Dr. Lee", "Dentistry", "2025-10-25 09:00", SlotStatus::Open);

        let start = dt("2025-10-25 00:00");
        let end = dt("2025-10-26 00:00");

        let smith = open_slots_between(&conn, &start, &end, Some("dr. smith")).unwrap();
        assert_eq!(smith, vec![dt("2025-10-25 10:00"), dt("2025-10-25 14:00")]);

        let everyone = open_slots_between(&conn, &start, &end, None).unwrap();
        assert_eq!(everyone.len(), 3);
        assert_eq!(everyone[0], dt("2025-10-25 09:00"));
    }

    #[test]
    fn test_claim_and_release() {
        let conn = db::init_db(":memory:").unwrap();
        seed(&conn, "Dr. Lee", "Dentistry", "2025-10-25 13:00", SlotStatus::Open);

        let slot = get_slot(&conn, "DR. LEE", &dt("2025-10-25 13:00")).unwrap().unwrap();
        assert_eq!(slot.status, SlotStatus::Open);

        assert!(claim_open_slot(&conn, slot.id).unwrap());
        assert!(!claim_open_slot(&conn, slot.id).unwrap(), "second claim must fail");
        set_calendar_event(&conn, slot.id, "evt-1").unwrap();

        let booked = get_slot(&conn, "Dr. Lee", &dt("2025-10-25 13:00")).unwrap().unwrap();
        assert_eq!(booked.status, SlotStatus::Booked);
        assert_eq!(booked.calendar_event_id.as_deref(), Some("evt-1"));

        assert!(release_slot(&conn, slot.id).unwrap());
        let reopened = get_slot(&conn, "Dr. Lee", &dt("2025-10-25 13:00")).unwrap().unwrap();
        assert_eq!(reopened.status, SlotStatus::Open);
        assert_eq!(reopened.calendar_event_id, None);
    }

    #[test]
    fn test_list_doctors_distinct_and_sorted() {
        let conn = db::init_db(":memory:").unwrap();
        seed(&conn, "Dr. Smith", "Cardiology", "2025-10-25 10:00", SlotStatus::Open);
        seed(&conn, "Dr. Smith", "Cardiology", "2025-10-25 11:00", SlotStatus::Open);
        seed(&conn, "Dr. John", "Dentistry", "2025-10-25 10:00", SlotStatus::Open);

        let doctors = list_doctors(&conn).unwrap();
        assert_eq!(
            doctors,
            vec![
                Doctor {
                    name: "Dr. John".to_string(),
                    specialty: "Dentistry".to_string()
                },
                Doctor {
                    name: "Dr. Smith".to_string(),
                    specialty: "Cardiology".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_upsert_replaces_existing_slot() {
        let conn = db::init_db(":memory:").unwrap();
        seed(&conn, "Dr. Lee", "Dentistry", "2025-10-25 13:00", SlotStatus::Open);
        seed(&conn, "dr. lee", "Dentistry", "2025-10-25 13:00", SlotStatus::Booked);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schedules", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let slot = get_slot(&conn, "Dr. Lee", &dt("2025-10-25 13:00")).unwrap().unwrap();
        assert_eq!(slot.status, SlotStatus::Booked);
    }
}
