use crate::config::PortalConfig;
use crate::error::PortalError;
use crate::store;
use rusqlite::Connection;
use serde_json::json;

/// Who is driving the daemon. Built only by the login handlers and passed to
/// everything else; nothing reads it from ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Anonymous,
    Admin,
    Student(String),
}

impl Session {
    pub fn kind(&self) -> &'static str {
        match self {
            Session::Anonymous => "anonymous",
            Session::Admin => "admin",
            Session::Student(_) => "student",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Session::Student(id) => json!({ "kind": self.kind(), "studentId": id }),
            _ => json!({ "kind": self.kind() }),
        }
    }
}

pub fn admin_login(cfg: &PortalConfig, user: &str, password: &str) -> Result<Session, PortalError> {
    if user.trim() == cfg.admin_user && password == cfg.effective_admin_password() {
        Ok(Session::Admin)
    } else {
        Err(PortalError::AuthenticationFailure)
    }
}

pub fn student_login(
    conn: &Connection,
    student_id: &str,
    password: &str,
) -> Result<Session, PortalError> {
    match store::get_student(conn, student_id.trim())? {
        Some(s) if s.password == password => Ok(Session::Student(s.student_id)),
        _ => Err(PortalError::AuthenticationFailure),
    }
}

pub fn require_admin(session: &Session) -> Result<(), PortalError> {
    match session {
        Session::Admin => Ok(()),
        _ => Err(PortalError::Forbidden("admin session required")),
    }
}

pub fn require_student(session: &Session) -> Result<&str, PortalError> {
    match session {
        Session::Student(id) => Ok(id.as_str()),
        _ => Err(PortalError::Forbidden("student session required")),
    }
}
