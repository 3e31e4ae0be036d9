use crate::ipc::helpers::{
    get_optional_str, get_required_i64, get_required_str, load_config, now_param, to_json,
    with_db, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::leaderboard::{self, TieBreak};
use crate::ledger;
use crate::model::PointSource;
use rusqlite::Connection;
use serde_json::{json, Value};

fn parse_source(params: &Value) -> Result<PointSource, HandlerErr> {
    let raw = get_required_str(params, "source")?;
    PointSource::parse(raw).ok_or_else(|| {
        HandlerErr::bad_params(format!(
            "source must be one of: attendance, praise_given, praise_received, goal, assignment, shop, admin (got {})",
            raw
        ))
    })
}

fn movement(params: &Value) -> Result<(&str, i64, PointSource, String), HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let amount = get_required_i64(params, "amount")?;
    let source = parse_source(params)?;
    let description = get_optional_str(params, "description")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    Ok((student_id, amount, source, description))
}

fn ledger_award(conn: &Connection, params: &Value) -> HandlerResult {
    let (student_id, amount, source, description) = movement(params)?;
    let now = now_param(params)?;
    let entry = ledger::award(conn, student_id, amount, source, &description, now)?;
    let balance = ledger::get_balance(conn, student_id)?;
    Ok(json!({ "entry": to_json(&entry)?, "balance": balance }))
}

fn ledger_charge(conn: &Connection, params: &Value) -> HandlerResult {
    let (student_id, amount, source, description) = movement(params)?;
    let now = now_param(params)?;
    let entry = ledger::charge(conn, student_id, amount, source, &description, now)?;
    let balance = ledger::get_balance(conn, student_id)?;
    Ok(json!({ "entry": to_json(&entry)?, "balance": balance }))
}

fn ledger_balance(conn: &Connection, params: &Value) -> HandlerResult {
    let student_id = get_required_str(params, "studentId")?;
    Ok(json!({ "balance": ledger::get_balance(conn, student_id)? }))
}

fn ledger_entries(conn: &Connection, params: &Value) -> HandlerResult {
    let student_id = get_required_str(params, "studentId")?;
    let entries = ledger::list_entries(conn, student_id)?;
    Ok(json!({ "entries": to_json(&entries)? }))
}

fn ledger_reconcile(conn: &Connection, params: &Value) -> HandlerResult {
    let student_id = get_required_str(params, "studentId")?;
    let report = ledger::reconcile(conn, student_id)?;
    to_json(&report)
}

fn leaderboard_get(conn: &Connection, params: &Value) -> HandlerResult {
    let tie_break = match get_optional_str(params, "tieBreak") {
        Some(raw) => TieBreak::parse(raw)
            .ok_or_else(|| HandlerErr::bad_params("tieBreak must be one of: store_order, earliest_balance, name"))?,
        None => load_config(conn)?.leaderboard_tie_break,
    };
    let rows = leaderboard::rank_all(conn, tie_break)?;
    Ok(json!({ "tieBreak": to_json(&tie_break)?, "rows": to_json(&rows)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "ledger.award" => Some(with_db(state, req, ledger_award)),
        "ledger.charge" => Some(with_db(state, req, ledger_charge)),
        "ledger.balance" => Some(with_db(state, req, ledger_balance)),
        "ledger.entries" => Some(with_db(state, req, ledger_entries)),
        "ledger.reconcile" => Some(with_db(state, req, ledger_reconcile)),
        "leaderboard.get" => Some(with_db(state, req, leaderboard_get)),
        _ => None,
    }
}
