use std::path::PathBuf;

use crate::config::PortalConfig;
use crate::entry::WorkingCopy;
use crate::session::Session;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: PortalConfig,
    pub session: Session,
    /// The admin's unsaved marks for the exam currently open for entry.
    pub working_copy: Option<WorkingCopy>,
}
