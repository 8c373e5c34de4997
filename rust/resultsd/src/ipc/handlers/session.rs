use crate::ipc::error::{ok, portal_err};
use crate::ipc::helpers::{db_conn, required_raw_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::session::{self, Session};
use serde_json::json;

fn handle_admin_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user = match required_str(req, "user") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let password = match required_raw_str(req, "password") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match session::admin_login(&state.config, &user, &password) {
        Ok(s) => {
            log::info!("admin signed in");
            state.session = s;
            state.working_copy = None;
            ok(&req.id, json!({ "session": state.session.to_json() }))
        }
        Err(e) => {
            log::warn!("admin sign-in rejected");
            portal_err(&req.id, &e)
        }
    }
}

fn handle_student_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let password = match required_raw_str(req, "password") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match session::student_login(conn, &student_id, &password) {
        Ok(s) => {
            log::info!("student {} signed in", student_id);
            state.session = s;
            state.working_copy = None;
            ok(&req.id, json!({ "session": state.session.to_json() }))
        }
        Err(e) => {
            log::warn!("student sign-in rejected");
            portal_err(&req.id, &e)
        }
    }
}

fn handle_session_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "session": state.session.to_json() }))
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session = Session::Anonymous;
    state.working_copy = None;
    ok(&req.id, json!({ "session": state.session.to_json() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.adminLogin" => Some(handle_admin_login(state, req)),
        "session.studentLogin" => Some(handle_student_login(state, req)),
        "session.get" => Some(handle_session_get(state, req)),
        "session.logout" => Some(handle_logout(state, req)),
        _ => None,
    }
}
