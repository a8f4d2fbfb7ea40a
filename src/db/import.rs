use anyhow::Context;
use rusqlite::Connection;
use serde::Deserialize;

use super::queries::{self, NewSlot};
use crate::models::{DateTimeParam, SlotStatus};
use crate::services::dates::resolve_instant;

/// One schedule row as exported from the clinic's spreadsheet.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRow {
    pub doctor: String,
    pub specialty: String,
    pub date_time: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

pub fn parse_rows(json: &str) -> anyhow::Result<Vec<ScheduleRow>> {
    serde_json::from_str(json).context("schedule file must be a JSON array of rows")
}

/// Writes all rows in a single transaction. Any invalid row aborts the
/// whole import.
pub fn import_rows(conn: &mut Connection, rows: &[ScheduleRow], replace: bool) -> anyhow::Result<usize> {
    let tx = conn.transaction().context("failed to start import transaction")?;

    if replace {
        queries::clear_schedule(&tx)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let line = i + 1;
        anyhow::ensure!(!row.doctor.trim().is_empty(), "row {line}: doctor is empty");

        let date_time = resolve_instant(&DateTimeParam::instant(row.date_time.as_str()))
            .with_context(|| format!("row {line}: invalid date_time {:?}", row.date_time))?;
        let status = match row.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => SlotStatus::parse(raw)
                .ok_or_else(|| anyhow::anyhow!("row {line}: unknown status {raw:?}"))?,
            None => SlotStatus::Open,
        };
        let email = row.email.as_deref().map(str::trim).filter(|e| !e.is_empty());

        queries::upsert_slot(
            &tx,
            &NewSlot {
                doctor: row.doctor.trim(),
                specialty: row.specialty.trim(),
                date_time,
                status,
                email,
            },
        )
        .with_context(|| format!("row {line}: failed to write slot"))?;
    }

    tx.commit().context("failed to commit import")?;
    tracing::info!(rows = rows.len(), replace, "imported schedule");
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::db;

    const SAMPLE: &str = r#"[
        {"doctor": "Dr. Smith", "specialty": "Cardiology", "date_time": "2025-10-25T10:00:00"},
        {"doctor": "Dr. Smith", "specialty": "Cardiology", "date_time": "2025-10-25 14:00", "status": "Open"},
        {"doctor": "Dr. Lee", "specialty": "Dentistry", "date_time": "2025-10-25T13:00:00", "status": "Booked", "email": "lee@clinic.test"}
    ]"#;

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM schedules", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_import_rows() {
        let mut conn = db::init_db(":memory:").unwrap();
        let rows = parse_rows(SAMPLE).unwrap();
        assert_eq!(import_rows(&mut conn, &rows, false).unwrap(), 3);
        assert_eq!(count(&conn), 3);

        let at = NaiveDateTime::parse_from_str("2025-10-25 13:00", "%Y-%m-%d %H:%M").unwrap();
        let slot = queries::get_slot(&conn, "Dr. Lee", &at).unwrap().unwrap();
        assert_eq!(slot.status, SlotStatus::Booked);
        assert_eq!(slot.email.as_deref(), Some("lee@clinic.test"));

        // Re-importing upserts instead of duplicating.
        import_rows(&mut conn, &rows, false).unwrap();
        assert_eq!(count(&conn), 3);
    }

    #[test]
    fn test_replace_clears_existing() {
        let mut conn = db::init_db(":memory:").unwrap();
        import_rows(&mut conn, &parse_rows(SAMPLE).unwrap(), false).unwrap();

        let one = parse_rows(
            r#"[{"doctor": "Dr. Mark", "specialty": "General", "date_time": "2025-10-26T09:00:00"}]"#,
        )
        .unwrap();
        import_rows(&mut conn, &one, true).unwrap();
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_bad_row_rolls_back() {
        let mut conn = db::init_db(":memory:").unwrap();
        let rows = parse_rows(
            r#"[
                {"doctor": "Dr. Mark", "specialty": "General", "date_time": "2025-10-26T09:00:00"},
                {"doctor": "Dr. Mark", "specialty": "General", "date_time": "next tuesday"}
            ]"#,
        )
        .unwrap();

        let err = import_rows(&mut conn, &rows, false).unwrap_err();
        assert!(err.to_string().contains("row 2"));
        assert_eq!(count(&conn), 0);
    }
}
