pub mod import;
pub mod migrations;
pub mod queries;

use std::time::Duration;

use anyhow::Context;
use rusqlite::Connection;

/// How long a writer waits on a lock held by the other process. The server
/// and `import_schedule` may open the same file at once.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the schedule database and brings its schema up to date.
/// `:memory:` gives a throwaway database for tests.
pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = if path == ":memory:" {
        Connection::open_in_memory()
    } else {
        Connection::open(path)
    }
    .with_context(|| format!("failed to open schedule database at {path}"))?;

    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    if path != ":memory:" {
        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .context("failed to enable WAL")?;
        tracing::debug!(path, journal_mode = %mode, "opened schedule database");
    }

    migrations::run_migrations(&conn)?;
    Ok(conn)
}
