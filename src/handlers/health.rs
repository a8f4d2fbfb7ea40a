use std::sync::{Arc, PoisonError};

use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// Liveness plus a round trip to the schedule database.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    let db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
    match db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
        Ok(_) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!(error = %e, "health check database query failed");
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
    }
}
