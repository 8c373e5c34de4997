use crate::error::PortalError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const OVERALL_SCOPE_LABEL: &str = "Overall Average";
const UNKNOWN_EXAM_LABEL: &str = "Unknown Paper";
const UNKNOWN_STUDENT_NAME: &str = "Unknown";

/// Which part of a mark feeds charts and rankings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoreMode {
    #[default]
    Total,
    Mcq,
    Structured,
    Essay,
}

impl ScoreMode {
    pub fn parse(raw: Option<&str>) -> Result<Self, PortalError> {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            None => Ok(ScoreMode::Total),
            Some(s) if s.is_empty() || s == "total" => Ok(ScoreMode::Total),
            Some(s) if s == "mcq" => Ok(ScoreMode::Mcq),
            Some(s) if s == "structured" => Ok(ScoreMode::Structured),
            Some(s) if s == "essay" => Ok(ScoreMode::Essay),
            Some(other) => Err(PortalError::bad_params(format!(
                "mode must be one of: total, mcq, structured, essay (got {})",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScoreMode::Total => "total",
            ScoreMode::Mcq => "mcq",
            ScoreMode::Structured => "structured",
            ScoreMode::Essay => "essay",
        }
    }
}

/// A persisted mark joined with its student's and exam's display names.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRow {
    pub student_id: String,
    pub student_name: Option<String>,
    pub exam_id: i64,
    pub exam_name: Option<String>,
    pub mcq: i64,
    pub structured: i64,
    pub essay: i64,
    pub absent: bool,
}

impl MarkRow {
    /// `None` for an absent mark so it never reads as a real zero attempt.
    pub fn total(&self) -> Option<i64> {
        if self.absent {
            None
        } else {
            Some(self.mcq.saturating_add(self.structured).saturating_add(self.essay))
        }
    }
}

pub fn score_for(mark: &MarkRow, mode: ScoreMode) -> i64 {
    if mark.absent {
        return 0;
    }
    match mode {
        ScoreMode::Total => mark
            .mcq
            .saturating_add(mark.structured)
            .saturating_add(mark.essay),
        ScoreMode::Mcq => mark.mcq,
        ScoreMode::Structured => mark.structured,
        ScoreMode::Essay => mark.essay,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub exam_id: i64,
    pub exam_label: String,
    pub score: i64,
    pub absent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PerformanceBand {
    Excellent,
    Good,
    Average,
    Weak,
    Critical,
}

pub fn band_for(score: f64, class_average: f64) -> PerformanceBand {
    let diff = score - class_average;
    if diff >= 10.0 {
        PerformanceBand::Excellent
    } else if diff >= 0.0 {
        PerformanceBand::Good
    } else if diff >= -10.0 {
        PerformanceBand::Average
    } else if diff >= -20.0 {
        PerformanceBand::Weak
    } else {
        PerformanceBand::Critical
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub exam_id: i64,
    pub exam_label: String,
    pub score: i64,
    pub absent: bool,
    pub class_average: f64,
    pub personal_average: f64,
    pub band: PerformanceBand,
}

/// One-decimal display rounding: `Int(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Orders one student's marks by `ordered_exams`, skipping exams the student has no mark for.
pub fn compute_series(
    student_marks: &[MarkRow],
    ordered_exams: &[ExamRef],
    mode: ScoreMode,
) -> Vec<SeriesPoint> {
    ordered_exams
        .iter()
        .filter_map(|exam| {
            let mark = student_marks.iter().find(|m| m.exam_id == exam.id)?;
            let label = if exam.name.trim().is_empty() {
                mark.exam_name
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_EXAM_LABEL.to_string())
            } else {
                exam.name.clone()
            };
            Some(SeriesPoint {
                exam_id: exam.id,
                exam_label: label,
                score: score_for(mark, mode),
                absent: mark.absent,
            })
        })
        .collect()
}

/// Mean over non-absent marks of one exam; 0 when nobody sat it.
pub fn class_average(all_marks: &[MarkRow], exam_id: i64, mode: ScoreMode) -> f64 {
    let mut sum: i64 = 0;
    let mut count: usize = 0;
    for m in all_marks.iter().filter(|m| m.exam_id == exam_id && !m.absent) {
        sum = sum.saturating_add(score_for(m, mode));
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

pub fn personal_average(student_marks: &[MarkRow], published_count: usize, mode: ScoreMode) -> f64 {
    if published_count == 0 {
        return 0.0;
    }
    let sum = student_marks
        .iter()
        .fold(0i64, |acc, m| acc.saturating_add(score_for(m, mode)));
    sum as f64 / published_count as f64
}

pub fn compute_trend(
    student_id: &str,
    all_marks: &[MarkRow],
    ordered_exams: &[ExamRef],
    published_count: usize,
    mode: ScoreMode,
) -> Vec<TrendPoint> {
    let student_marks: Vec<MarkRow> = all_marks
        .iter()
        .filter(|m| m.student_id == student_id)
        .cloned()
        .collect();
    let personal = round_off_1_decimal(personal_average(&student_marks, published_count, mode));

    compute_series(&student_marks, ordered_exams, mode)
        .into_iter()
        .map(|p| {
            let avg = round_off_1_decimal(class_average(all_marks, p.exam_id, mode));
            TrendPoint {
                band: band_for(p.score as f64, avg),
                exam_id: p.exam_id,
                exam_label: p.exam_label,
                score: p.score,
                absent: p.absent,
                class_average: avg,
                personal_average: personal,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingScope {
    AllPublished,
    Exam(i64),
}

impl RankingScope {
    pub fn from_exam_id(exam_id: Option<i64>) -> Self {
        match exam_id {
            Some(id) => RankingScope::Exam(id),
            None => RankingScope::AllPublished,
        }
    }

    pub fn divisor(self, published_count: usize) -> usize {
        match self {
            RankingScope::AllPublished => published_count,
            RankingScope::Exam(_) => 1,
        }
    }

    fn includes(self, mark: &MarkRow) -> bool {
        match self {
            RankingScope::AllPublished => true,
            RankingScope::Exam(id) => mark.exam_id == id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub student_id: String,
    pub student_name: String,
    pub aggregate_value: f64,
}

/// Groups by student in first-encounter order, then stable-sorts descending,
/// so ties keep the order in which students were first seen.
pub fn compute_ranking(
    marks: &[MarkRow],
    scope: RankingScope,
    divisor: usize,
    mode: ScoreMode,
) -> Vec<RankingEntry> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, String, i64)> = Vec::new();

    for m in marks.iter().filter(|m| scope.includes(m)) {
        let slot = *index.entry(m.student_id.as_str()).or_insert_with(|| {
            groups.push((
                m.student_id.as_str(),
                m.student_name
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_STUDENT_NAME.to_string()),
                0,
            ));
            groups.len() - 1
        });
        groups[slot].2 = groups[slot].2.saturating_add(score_for(m, mode));
    }

    let mut ranking: Vec<RankingEntry> = groups
        .into_iter()
        .map(|(id, name, sum)| RankingEntry {
            student_id: id.to_string(),
            student_name: name,
            aggregate_value: if divisor > 0 {
                sum as f64 / divisor as f64
            } else {
                0.0
            },
        })
        .collect();
    ranking.sort_by(|a, b| {
        b.aggregate_value
            .partial_cmp(&a.aggregate_value)
            .unwrap_or(Ordering::Equal)
    });
    ranking
}

/// 1-based position of `student_id` in `ranking`.
pub fn rank_of(ranking: &[RankingEntry], student_id: &str) -> Option<usize> {
    ranking
        .iter()
        .position(|r| r.student_id == student_id)
        .map(|i| i + 1)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardModel {
    pub student_id: String,
    pub student_name: Option<String>,
    pub mode: ScoreMode,
    pub selected_exam_id: Option<i64>,
    pub scope_label: String,
    pub published_exam_count: usize,
    pub personal_average: f64,
    pub series: Vec<TrendPoint>,
    pub ranking: Vec<RankingEntry>,
    pub my_rank: Option<usize>,
}

/// Builds chart series and ranking in one pass so both use the same `mode`.
/// `published_exams` must be ordered oldest first and `marks` limited to those exams.
pub fn build_dashboard(
    student_id: &str,
    student_name: Option<String>,
    marks: &[MarkRow],
    published_exams: &[ExamRef],
    mode: ScoreMode,
    selected_exam_id: Option<i64>,
) -> Result<DashboardModel, PortalError> {
    let scope = RankingScope::from_exam_id(selected_exam_id);
    let scope_label = match scope {
        RankingScope::AllPublished => OVERALL_SCOPE_LABEL.to_string(),
        RankingScope::Exam(id) => published_exams
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.name.clone())
            .ok_or(PortalError::NotFound("published exam"))?,
    };

    let published_count = published_exams.len();
    let series = compute_trend(student_id, marks, published_exams, published_count, mode);
    let own: Vec<MarkRow> = marks
        .iter()
        .filter(|m| m.student_id == student_id)
        .cloned()
        .collect();
    let personal = round_off_1_decimal(personal_average(&own, published_count, mode));
    let ranking = compute_ranking(marks, scope, scope.divisor(published_count), mode);
    let my_rank = rank_of(&ranking, student_id);

    Ok(DashboardModel {
        student_id: student_id.to_string(),
        student_name,
        mode,
        selected_exam_id,
        scope_label,
        published_exam_count: published_count,
        personal_average: personal,
        series,
        ranking,
        my_rank,
    })
}
