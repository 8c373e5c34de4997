use crate::error::{persistence, PortalError};
use crate::store::{self, ExamRow, MarkRecord, StudentRow};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Attendance state given to marks seeded for a new exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeedPolicy {
    #[default]
    Present,
    Absent,
}

impl SeedPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Some(SeedPolicy::Present),
            "absent" => Some(SeedPolicy::Absent),
            _ => None,
        }
    }
}

pub fn seed_marks(exam_id: i64, students: &[StudentRow], policy: SeedPolicy) -> Vec<MarkRecord> {
    students
        .iter()
        .map(|s| MarkRecord {
            student_id: s.student_id.clone(),
            exam_id,
            mcq: 0,
            structured: 0,
            essay: 0,
            absent: policy == SeedPolicy::Absent,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ProvisionedExam {
    pub exam: ExamRow,
    pub seeded: usize,
}

/// Inserts the exam and one mark per currently enrolled student, atomically.
pub fn create_exam(
    conn: &Connection,
    name: &str,
    policy: SeedPolicy,
) -> Result<ProvisionedExam, PortalError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PortalError::bad_params("exam name must not be empty"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(persistence("db_tx_failed", "exams"))?;
    let exam = store::insert_exam(&tx, name)?;
    let students = store::list_students(&tx)?;
    let marks = seed_marks(exam.id, &students, policy);
    let seeded = store::insert_marks(&tx, &marks)?;
    tx.commit().map_err(persistence("db_tx_failed", "exams"))?;

    log::info!(
        "created exam {} ({}) with {} seeded marks, policy {:?}",
        exam.id,
        exam.name,
        seeded,
        policy
    );
    Ok(ProvisionedExam { exam, seeded })
}
