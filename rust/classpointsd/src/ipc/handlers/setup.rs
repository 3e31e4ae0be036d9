use crate::config;
use crate::ipc::helpers::{to_json, with_db, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn setup_get(conn: &Connection, _params: &Value) -> HandlerResult {
    let section = config::load_section(conn)?;
    Ok(json!({ "gamification": section }))
}

fn setup_update(conn: &Connection, params: &Value) -> HandlerResult {
    if let Some(section) = params.get("section").and_then(|v| v.as_str()) {
        if section != "gamification" {
            return Err(HandlerErr::bad_params("unknown section"));
        }
    }
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    match config::update(conn, patch)? {
        Ok(cfg) => {
            tracing::info!(fields = patch.len(), "gamification settings updated");
            Ok(json!({ "gamification": to_json(&cfg)? }))
        }
        Err(msg) => Err(HandlerErr::bad_params(msg)),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(with_db(state, req, setup_get)),
        "setup.update" => Some(with_db(state, req, setup_update)),
        _ => None,
    }
}
