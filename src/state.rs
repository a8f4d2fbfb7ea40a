use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::services::conversation::ConversationEngine;
use crate::services::schedule::ScheduleService;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub engine: ConversationEngine,
    pub schedule: Arc<ScheduleService>,
}
