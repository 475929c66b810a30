use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::session::AttendanceSession;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Ordered roster entry for the session currently being edited.
#[derive(Debug, Clone)]
pub struct RosterStudent {
    pub id: String,
    pub display_name: String,
    pub roll_number: String,
}

/// The one attendance session open for editing. The handler layer owns it
/// until an explicit save; opening another (class, date) replaces it.
pub struct OpenSession {
    pub class_id: String,
    pub date_key: String,
    pub roster: Vec<RosterStudent>,
    pub entries: AttendanceSession,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Option<OpenSession>,
}
