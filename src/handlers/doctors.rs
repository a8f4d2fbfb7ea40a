use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::models::Doctor;
use crate::state::AppState;

#[derive(Serialize)]
pub struct DoctorsResponse {
    pub doctors: Vec<Doctor>,
}

pub async fn list_doctors(State(state): State<Arc<AppState>>) -> Json<DoctorsResponse> {
    Json(DoctorsResponse {
        doctors: state.schedule.list_doctors(),
    })
}
