use crate::goals::{self, NewGoal};
use crate::ipc::helpers::{
    date_param, get_optional_str, get_required_str, load_config, now_param, to_json, with_db,
    HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::GoalStatus;
use rusqlite::Connection;
use serde_json::{json, Value};

fn goals_create(conn: &Connection, params: &Value) -> HandlerResult {
    let student_id = get_required_str(params, "studentId")?;
    let Some(goal_value) = params.get("goal") else {
        return Err(HandlerErr::bad_params("missing goal"));
    };
    let new: NewGoal = serde_json::from_value(goal_value.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid goal: {}", e)))?;
    let now = now_param(params)?;
    let goal = goals::create_goal(conn, student_id, &new, now)?;
    Ok(json!({ "goal": to_json(&goal)? }))
}

fn goals_check_in(conn: &Connection, params: &Value) -> HandlerResult {
    let goal_id = get_required_str(params, "goalId")?;
    let now = now_param(params)?;
    let cfg = load_config(conn)?;
    let date = date_param(params, "date", &cfg, now)?;
    let outcome = goals::check_in(conn, goal_id, date, cfg.goal_completion_bonus, now)?;
    to_json(&outcome)
}

fn goals_list(conn: &Connection, params: &Value) -> HandlerResult {
    let student_id = get_required_str(params, "studentId")?;
    let status = match get_optional_str(params, "status") {
        Some(raw) => Some(GoalStatus::parse(raw).ok_or_else(|| {
            HandlerErr::bad_params("status must be one of: active, completed, failed")
        })?),
        None => None,
    };
    let now = now_param(params)?;
    let cfg = load_config(conn)?;
    let today = date_param(params, "today", &cfg, now)?;
    let rows = goals::list_goals(conn, student_id, status, today)?;
    Ok(json!({ "goals": to_json(&rows)? }))
}

fn goals_get(conn: &Connection, params: &Value) -> HandlerResult {
    let goal_id = get_required_str(params, "goalId")?;
    let now = now_param(params)?;
    let cfg = load_config(conn)?;
    let today = date_param(params, "today", &cfg, now)?;
    let goal = goals::get_goal(conn, goal_id, today)?;
    Ok(json!({ "goal": to_json(&goal)? }))
}

fn goals_delete(conn: &Connection, params: &Value) -> HandlerResult {
    let goal_id = get_required_str(params, "goalId")?;
    goals::delete_goal(conn, goal_id)?;
    Ok(json!({ "ok": true }))
}

fn goals_sweep(conn: &Connection, params: &Value) -> HandlerResult {
    let now = now_param(params)?;
    let cfg = load_config(conn)?;
    let today = date_param(params, "today", &cfg, now)?;
    let failed = goals::sweep_failed_goals(conn, today)?;
    Ok(json!({ "failed": to_json(&failed)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "goals.create" => Some(with_db(state, req, goals_create)),
        "goals.checkIn" => Some(with_db(state, req, goals_check_in)),
        "goals.list" => Some(with_db(state, req, goals_list)),
        "goals.get" => Some(with_db(state, req, goals_get)),
        "goals.delete" => Some(with_db(state, req, goals_delete)),
        "goals.sweep" => Some(with_db(state, req, goals_sweep)),
        _ => None,
    }
}
