use crate::config;
use crate::ipc::error::{err, ok, portal_err};
use crate::ipc::helpers::{db_conn, require_admin};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    ok(&req.id, json!({ "config": state.config.redacted_json() }))
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(patch) = req.params.get("patch") else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let next = match state.config.patched(patch) {
        Ok(c) => c,
        Err(e) => return portal_err(&req.id, &e),
    };
    if let Err(e) = config::save(conn, &next) {
        return portal_err(&req.id, &e);
    }
    log::info!("portal config updated");
    let resp = ok(&req.id, json!({ "config": next.redacted_json() }));
    state.config = next;
    resp
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        _ => None,
    }
}
