use crate::calc::{self, ExamRef, MarkRow, RankingScope, ScoreMode};
use crate::error::PortalError;
use crate::ipc::error::{ok, portal_err};
use crate::ipc::helpers::{db_conn, optional_i64, optional_str, require_student};
use crate::ipc::types::{AppState, Request};
use crate::session::Session;
use crate::store;
use rusqlite::Connection;
use serde_json::json;

/// Published exams (oldest first) and their marks. Read failures degrade to
/// empty so a dashboard still renders.
fn load_published(conn: &Connection) -> (Vec<ExamRef>, Vec<MarkRow>) {
    let exams: Vec<ExamRef> = match store::list_published_exams(conn) {
        Ok(rows) => rows.iter().map(|e| e.to_ref()).collect(),
        Err(e) => {
            log::warn!("published exams unavailable: {}", e);
            return (Vec::new(), Vec::new());
        }
    };
    let ids: Vec<i64> = exams.iter().map(|e| e.id).collect();
    let marks = store::marks_for_exams(conn, &ids).unwrap_or_else(|e| {
        log::warn!("published marks unavailable: {}", e);
        Vec::new()
    });
    (exams, marks)
}

fn parse_mode(req: &Request) -> Result<ScoreMode, serde_json::Value> {
    ScoreMode::parse(optional_str(req, "mode")).map_err(|e| portal_err(&req.id, &e))
}

fn handle_dashboard_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match require_student(state, req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let mode = match parse_mode(req) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let exam_id = match optional_i64(req, "examId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let student_name = match store::get_student(conn, &student_id) {
        Ok(Some(s)) => Some(s.name),
        Ok(None) => None,
        Err(e) => {
            log::warn!("student name unavailable: {}", e);
            None
        }
    };
    let (exams, marks) = load_published(conn);

    match calc::build_dashboard(&student_id, student_name, &marks, &exams, mode, exam_id) {
        Ok(model) => ok(&req.id, json!({ "dashboard": model })),
        Err(e) => portal_err(&req.id, &e),
    }
}

fn handle_results_ranking(state: &mut AppState, req: &Request) -> serde_json::Value {
    let viewer = match &state.session {
        Session::Anonymous => {
            return portal_err(&req.id, &PortalError::Forbidden("sign in required"));
        }
        Session::Admin => None,
        Session::Student(id) => Some(id.clone()),
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let mode = match parse_mode(req) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let exam_id = match optional_i64(req, "examId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let (exams, marks) = load_published(conn);
    let scope = RankingScope::from_exam_id(exam_id);
    let scope_label = match scope {
        RankingScope::AllPublished => calc::OVERALL_SCOPE_LABEL.to_string(),
        RankingScope::Exam(id) => match exams.iter().find(|e| e.id == id) {
            Some(e) => e.name.clone(),
            None => return portal_err(&req.id, &PortalError::NotFound("published exam")),
        },
    };

    let ranking = calc::compute_ranking(&marks, scope, scope.divisor(exams.len()), mode);
    let rows: Vec<serde_json::Value> = ranking
        .iter()
        .enumerate()
        .map(|(i, r)| {
            json!({
                "rank": i + 1,
                "studentId": r.student_id,
                "studentName": r.student_name,
                "aggregateValue": r.aggregate_value,
            })
        })
        .collect();
    let my_rank = viewer.and_then(|id| calc::rank_of(&ranking, &id));

    ok(
        &req.id,
        json!({
            "mode": mode,
            "scopeLabel": scope_label,
            "publishedExamCount": exams.len(),
            "ranking": rows,
            "myRank": my_rank,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.open" => Some(handle_dashboard_open(state, req)),
        "results.ranking" => Some(handle_results_ranking(state, req)),
        _ => None,
    }
}
