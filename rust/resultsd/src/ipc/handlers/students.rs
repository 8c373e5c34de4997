use crate::entry::matches_search;
use crate::error::PortalError;
use crate::ipc::error::{ok, portal_err};
use crate::ipc::helpers::{db_conn, optional_str, require_admin, required_raw_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, StudentRow};
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let search = optional_str(req, "search").unwrap_or("");

    let students = store::list_students(conn).unwrap_or_else(|e| {
        log::warn!("students.list degraded to empty: {}", e);
        Vec::new()
    });
    let rows: Vec<serde_json::Value> = students
        .iter()
        .filter(|s| matches_search(Some(&s.name), &s.student_id, search))
        .map(|s| json!({ "studentId": s.student_id, "name": s.name }))
        .collect();
    ok(&req.id, json!({ "students": rows }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let password = match required_raw_str(req, "password") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let row = StudentRow {
        student_id,
        name,
        password,
    };
    match store::insert_student(conn, &row) {
        Ok(()) => {
            log::info!("registered student {}", row.student_id);
            ok(
                &req.id,
                json!({ "student": { "studentId": row.student_id, "name": row.name } }),
            )
        }
        Err(e) => {
            if let PortalError::UniquenessViolation { .. } = e {
                log::warn!("{}", e);
            }
            portal_err(&req.id, &e)
        }
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let marks_deleted = match store::delete_student(conn, &student_id) {
        Ok(n) => n,
        Err(e) => return portal_err(&req.id, &e),
    };
    log::info!(
        "deleted student {} and {} marks",
        student_id,
        marks_deleted
    );

    // The open working copy must not resubmit marks for a student that no longer exists.
    state.working_copy = state.working_copy.take().map(|mut wc| {
        wc.rows.retain(|r| r.student_id != student_id);
        wc
    });

    ok(
        &req.id,
        json!({ "ok": true, "studentId": student_id, "marksDeleted": marks_deleted }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
