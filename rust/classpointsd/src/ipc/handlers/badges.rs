use crate::badges;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, load_config, now_param, to_json, with_db, HandlerResult};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

/// The catalog is static, so it is served before any workspace is selected.
fn handle_badges_catalog(_state: &mut AppState, req: &Request) -> Value {
    let infos: Vec<_> = badges::catalog().iter().map(|d| d.info()).collect();
    match to_json(&infos) {
        Ok(v) => ok(&req.id, json!({ "badges": v })),
        Err(e) => e.response(&req.id),
    }
}

fn badges_evaluate(conn: &Connection, params: &Value) -> HandlerResult {
    let student_id = get_required_str(params, "studentId")?;
    let now = now_param(params)?;
    let cfg = load_config(conn)?;
    let unlocked = badges::evaluate(conn, student_id, cfg.leaderboard_tie_break, now)?;
    let infos: Vec<_> = unlocked
        .iter()
        .filter_map(|t| badges::definition(*t))
        .map(|d| d.info())
        .collect();
    Ok(json!({ "newlyUnlocked": to_json(&infos)? }))
}

fn badges_list(conn: &Connection, params: &Value) -> HandlerResult {
    let student_id = get_required_str(params, "studentId")?;
    crate::students::ensure_student(conn, student_id)?;
    let rows = badges::list_unlocked(conn, student_id)?;
    Ok(json!({ "badges": to_json(&rows)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "badges.catalog" => Some(handle_badges_catalog(state, req)),
        "badges.evaluate" => Some(with_db(state, req, badges_evaluate)),
        "badges.list" => Some(with_db(state, req, badges_list)),
        _ => None,
    }
}
