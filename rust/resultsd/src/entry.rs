use crate::calc::{ExamRef, MarkRow};
use crate::error::PortalError;
use crate::store::MarkRecord;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Mcq,
    Structured,
    Essay,
}

impl Section {
    pub fn parse(field: &str) -> Option<Self> {
        match field.trim().to_ascii_lowercase().as_str() {
            "mcq" | "mcq_score" => Some(Section::Mcq),
            "structured" | "structured_score" => Some(Section::Structured),
            "essay" | "essay_score" => Some(Section::Essay),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkEdit {
    /// `None` is a blank cell: representable while editing, never persisted.
    Score {
        section: Section,
        value: Option<i64>,
    },
    Absent(bool),
}

/// Upper bound for one section score; keeps section and ranking sums far from overflow.
pub const MAX_SECTION_SCORE: i64 = i32::MAX as i64;

pub fn check_score(v: i64) -> Result<i64, PortalError> {
    if v < 0 {
        return Err(PortalError::bad_params("negative marks are not allowed"));
    }
    if v > MAX_SECTION_SCORE {
        return Err(PortalError::bad_params(format!(
            "score must not exceed {}",
            MAX_SECTION_SCORE
        )));
    }
    Ok(v)
}

/// Blank text is a blank cell; anything else must be a whole number in `0..=MAX_SECTION_SCORE`.
pub fn parse_score_text(raw: &str) -> Result<Option<i64>, PortalError> {
    let t = raw.trim();
    if t.is_empty() {
        return Ok(None);
    }
    let v: i64 = t
        .parse()
        .map_err(|_| PortalError::bad_params(format!("score must be a whole number: {}", t)))?;
    check_score(v).map(Some)
}

pub fn matches_search(name: Option<&str>, id: &str, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }
    id.to_lowercase().contains(&term)
        || name
            .map(|n| n.to_lowercase().contains(&term))
            .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingMark {
    pub student_id: String,
    pub student_name: Option<String>,
    pub exam_id: i64,
    pub mcq: Option<i64>,
    pub structured: Option<i64>,
    pub essay: Option<i64>,
    pub absent: bool,
}

impl WorkingMark {
    fn from_row(row: MarkRow) -> Self {
        WorkingMark {
            student_id: row.student_id,
            student_name: row.student_name,
            exam_id: row.exam_id,
            mcq: Some(row.mcq),
            structured: Some(row.structured),
            essay: Some(row.essay),
            absent: row.absent,
        }
    }

    /// What the entry table shows as the running total; blanks count as 0, absent shows nothing.
    pub fn live_total(&self) -> Option<i64> {
        if self.absent {
            return None;
        }
        Some(
            self.mcq
                .unwrap_or(0)
                .saturating_add(self.structured.unwrap_or(0))
                .saturating_add(self.essay.unwrap_or(0)),
        )
    }

    fn with_edit(&self, edit: MarkEdit) -> Self {
        let mut next = self.clone();
        match edit {
            MarkEdit::Score { section, value } => {
                match section {
                    Section::Mcq => next.mcq = value,
                    Section::Structured => next.structured = value,
                    Section::Essay => next.essay = value,
                }
                // A typed score means the student sat the paper.
                if value.is_some() {
                    next.absent = false;
                }
            }
            MarkEdit::Absent(absent) => next.absent = absent,
        }
        next
    }

    fn to_record(&self) -> MarkRecord {
        MarkRecord {
            student_id: self.student_id.clone(),
            exam_id: self.exam_id,
            mcq: self.mcq.unwrap_or(0),
            structured: self.structured.unwrap_or(0),
            essay: self.essay.unwrap_or(0),
            absent: self.absent,
        }
    }
}

/// An admin's unsaved view of one exam's marks. Edits never mutate in place:
/// each `apply` returns the next copy.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingCopy {
    pub token: String,
    pub exam: ExamRef,
    pub rows: Vec<WorkingMark>,
    pub dirty: bool,
}

impl WorkingCopy {
    pub fn from_marks(exam: ExamRef, marks: Vec<MarkRow>) -> Self {
        WorkingCopy {
            token: Uuid::new_v4().to_string(),
            exam,
            rows: marks.into_iter().map(WorkingMark::from_row).collect(),
            dirty: false,
        }
    }

    pub fn row(&self, student_id: &str) -> Option<&WorkingMark> {
        self.rows.iter().find(|r| r.student_id == student_id)
    }

    pub fn apply(&self, student_id: &str, edit: MarkEdit) -> Result<WorkingCopy, PortalError> {
        let Some(idx) = self.rows.iter().position(|r| r.student_id == student_id) else {
            return Err(PortalError::NotFound("student mark"));
        };
        let mut rows = self.rows.clone();
        rows[idx] = self.rows[idx].with_edit(edit);
        Ok(WorkingCopy {
            token: self.token.clone(),
            exam: self.exam.clone(),
            rows,
            dirty: true,
        })
    }

    pub fn search(&self, term: &str) -> Vec<&WorkingMark> {
        self.rows
            .iter()
            .filter(|r| matches_search(r.student_name.as_deref(), &r.student_id, term))
            .collect()
    }

    /// The batch to submit: joined fields dropped, blanks normalized to 0.
    pub fn prepare_save(&self) -> Vec<MarkRecord> {
        self.rows.iter().map(WorkingMark::to_record).collect()
    }

    pub fn mark_saved(&self) -> WorkingCopy {
        WorkingCopy {
            dirty: false,
            ..self.clone()
        }
    }
}
