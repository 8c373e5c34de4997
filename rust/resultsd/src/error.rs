use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("student id already exists: {student_id}")]
    UniquenessViolation { student_id: String },

    /// Deliberately carries no detail: unknown ids and wrong passwords look the same.
    #[error("invalid credentials")]
    AuthenticationFailure,

    #[error("{source}")]
    PersistenceFailure {
        code: &'static str,
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    BadParams(String),

    #[error("{0}")]
    Forbidden(&'static str),
}

impl PortalError {
    pub fn code(&self) -> &'static str {
        match self {
            PortalError::UniquenessViolation { .. } => "duplicate_student",
            PortalError::AuthenticationFailure => "auth_failed",
            PortalError::PersistenceFailure { code, .. } => *code,
            PortalError::NotFound(_) => "not_found",
            PortalError::BadParams(_) => "bad_params",
            PortalError::Forbidden(_) => "forbidden",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            PortalError::UniquenessViolation { student_id } => {
                Some(json!({ "studentId": student_id }))
            }
            PortalError::PersistenceFailure { table, .. } => Some(json!({ "table": table })),
            _ => None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        PortalError::BadParams(message.into())
    }
}

/// Adapter for `map_err` on store calls: `.map_err(persistence("db_query_failed", "marks"))`.
pub fn persistence(
    code: &'static str,
    table: &'static str,
) -> impl FnOnce(rusqlite::Error) -> PortalError {
    move |source| PortalError::PersistenceFailure {
        code,
        table,
        source,
    }
}
