use crate::entry::{check_score, parse_score_text, MarkEdit, Section, WorkingCopy, WorkingMark};
use crate::error::PortalError;
use crate::ipc::error::{err, ok, portal_err};
use crate::ipc::helpers::{db_conn, optional_str, require_admin, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn row_json(row: &WorkingMark) -> serde_json::Value {
    json!({
        "studentId": row.student_id,
        "studentName": row.student_name,
        "mcq": row.mcq,
        "structured": row.structured,
        "essay": row.essay,
        "absent": row.absent,
        "liveTotal": row.live_total(),
    })
}

fn copy_json(wc: &WorkingCopy, search: &str) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = wc.search(search).into_iter().map(row_json).collect();
    json!({
        "token": wc.token,
        "exam": wc.exam,
        "dirty": wc.dirty,
        "rows": rows,
    })
}

fn current_copy<'a>(state: &'a AppState, req: &Request) -> Result<&'a WorkingCopy, serde_json::Value> {
    state
        .working_copy
        .as_ref()
        .ok_or_else(|| portal_err(&req.id, &PortalError::NotFound("open exam")))
}

fn handle_marks_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let exam_id = match required_i64(req, "examId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let exam = match store::get_exam(conn, exam_id) {
        Ok(Some(e)) => e,
        Ok(None) => return err(&req.id, "not_found", "exam not found", None),
        Err(e) => return portal_err(&req.id, &e),
    };
    let marks = match store::marks_for_exam(conn, exam_id) {
        Ok(m) => m,
        Err(e) => return portal_err(&req.id, &e),
    };

    let wc = WorkingCopy::from_marks(exam.to_ref(), marks);
    let resp = ok(&req.id, copy_json(&wc, ""));
    state.working_copy = Some(wc);
    resp
}

/// Accepts a JSON number, a string as typed into the cell, or null for blank.
fn parse_score_value(value: Option<&serde_json::Value>) -> Result<Option<i64>, PortalError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => parse_score_text(s),
        Some(v) => match v.as_i64() {
            Some(n) => check_score(n).map(Some),
            None => Err(PortalError::bad_params("score must be a whole number")),
        },
    }
}

fn parse_edit(req: &Request, field: &str) -> Result<MarkEdit, PortalError> {
    let value = req.params.get("value");
    if field.eq_ignore_ascii_case("absent") {
        return value
            .and_then(|v| v.as_bool())
            .map(MarkEdit::Absent)
            .ok_or_else(|| PortalError::bad_params("absent must be true or false"));
    }
    let section = Section::parse(field).ok_or_else(|| {
        PortalError::bad_params(format!(
            "field must be one of: mcq, structured, essay, absent (got {})",
            field
        ))
    })?;
    Ok(MarkEdit::Score {
        section,
        value: parse_score_value(value)?,
    })
}

fn handle_marks_edit(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let field = match required_str(req, "field") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let wc = match current_copy(state, req) {
        Ok(wc) => wc,
        Err(resp) => return resp,
    };

    let next = match parse_edit(req, &field).and_then(|edit| wc.apply(&student_id, edit)) {
        Ok(next) => next,
        Err(e) => return portal_err(&req.id, &e),
    };
    let row = next.row(&student_id).map(row_json);
    let resp = ok(&req.id, json!({ "row": row, "dirty": next.dirty }));
    state.working_copy = Some(next);
    resp
}

fn handle_marks_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let wc = match current_copy(state, req) {
        Ok(wc) => wc,
        Err(resp) => return resp,
    };
    ok(&req.id, copy_json(wc, optional_str(req, "search").unwrap_or("")))
}

fn handle_marks_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let wc = match current_copy(state, req) {
        Ok(wc) => wc,
        Err(resp) => return resp,
    };

    let records = wc.prepare_save();
    // On failure the working copy is left as is so the admin can retry.
    let saved = match store::upsert_marks(conn, &records) {
        Ok(n) => n,
        Err(e) => return portal_err(&req.id, &e),
    };
    log::info!("saved {} marks for exam {}", saved, wc.exam.id);

    let next = wc.mark_saved();
    let resp = ok(
        &req.id,
        json!({ "ok": true, "examId": next.exam.id, "saved": saved }),
    );
    state.working_copy = Some(next);
    resp
}

fn handle_marks_discard(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let discarded = state.working_copy.take().is_some();
    ok(&req.id, json!({ "discarded": discarded }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.open" => Some(handle_marks_open(state, req)),
        "marks.edit" => Some(handle_marks_edit(state, req)),
        "marks.view" => Some(handle_marks_view(state, req)),
        "marks.save" => Some(handle_marks_save(state, req)),
        "marks.discard" => Some(handle_marks_discard(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_values_accept_numbers_text_and_blank() {
        assert_eq!(parse_score_value(Some(&json!(17))).expect("num"), Some(17));
        assert_eq!(parse_score_value(Some(&json!(" 9 "))).expect("text"), Some(9));
        assert_eq!(parse_score_value(Some(&json!(""))).expect("blank"), None);
        assert_eq!(parse_score_value(Some(&json!(null))).expect("null"), None);
        assert_eq!(parse_score_value(None).expect("missing"), None);
        assert!(parse_score_value(Some(&json!(-3))).is_err());
        assert!(parse_score_value(Some(&json!(2.5))).is_err());
        assert!(parse_score_value(Some(&json!("abc"))).is_err());
        assert!(parse_score_value(Some(&json!(i64::MAX))).is_err());
        assert!(parse_score_value(Some(&json!(u64::MAX))).is_err());
    }
}
