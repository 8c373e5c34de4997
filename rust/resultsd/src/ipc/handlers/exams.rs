use crate::ipc::error::{err, ok, portal_err};
use crate::ipc::helpers::{db_conn, optional_str, require_admin, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::provision;
use crate::store::{self, ExamOrder};
use serde_json::json;

fn handle_exams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let order = match optional_str(req, "order") {
        Some("oldest") => ExamOrder::OldestFirst,
        _ => ExamOrder::NewestFirst,
    };
    let exams = store::list_exams(conn, order).unwrap_or_else(|e| {
        log::warn!("exams.list degraded to empty: {}", e);
        Vec::new()
    });
    ok(&req.id, json!({ "exams": exams }))
}

fn handle_exams_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match provision::create_exam(conn, &name, state.config.seed_policy) {
        Ok(p) => ok(
            &req.id,
            json!({ "exam": p.exam, "seededMarks": p.seeded }),
        ),
        Err(e) => portal_err(&req.id, &e),
    }
}

fn set_published(state: &mut AppState, req: &Request, exam_id: i64, published: bool) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(e) = store::set_exam_published(conn, exam_id, published) {
        return portal_err(&req.id, &e);
    }
    log::info!(
        "exam {} {}",
        exam_id,
        if published { "published" } else { "unpublished" }
    );
    ok(&req.id, json!({ "examId": exam_id, "published": published }))
}

fn handle_exams_set_published(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let exam_id = match required_i64(req, "examId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(published) = req.params.get("published").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing/invalid published", None);
    };
    set_published(state, req, exam_id, published)
}

fn handle_exams_toggle_published(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let current = match store::get_exam(conn, exam_id) {
        Ok(Some(exam)) => exam.published,
        Ok(None) => return err(&req.id, "not_found", "exam not found", None),
        Err(e) => return portal_err(&req.id, &e),
    };
    set_published(state, req, exam_id, !current)
}

fn handle_exams_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let marks_deleted = match store::delete_exam(conn, exam_id) {
        Ok(n) => n,
        Err(e) => return portal_err(&req.id, &e),
    };
    log::info!("deleted exam {} and {} marks", exam_id, marks_deleted);

    if state
        .working_copy
        .as_ref()
        .map(|wc| wc.exam.id == exam_id)
        .unwrap_or(false)
    {
        state.working_copy = None;
    }

    ok(
        &req.id,
        json!({ "ok": true, "examId": exam_id, "marksDeleted": marks_deleted }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.list" => Some(handle_exams_list(state, req)),
        "exams.create" => Some(handle_exams_create(state, req)),
        "exams.setPublished" => Some(handle_exams_set_published(state, req)),
        "exams.togglePublished" => Some(handle_exams_toggle_published(state, req)),
        "exams.delete" => Some(handle_exams_delete(state, req)),
        _ => None,
    }
}
