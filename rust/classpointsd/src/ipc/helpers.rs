use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::clock::{self, Clock, FixedClock, SystemClock};
use crate::config::{self, GamificationConfig};
pub use crate::ipc::error::HandlerErr;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

pub type HandlerResult = Result<serde_json::Value, HandlerErr>;

/// Runs `f` against the open workspace and wraps its result in the response envelope.
pub fn with_db<F>(state: &mut AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> HandlerResult,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            tracing::debug!(method = %req.method, code = e.code, message = %e.message, "request failed");
            e.response(&req.id)
        }
    }
}

pub fn to_json<T: Serialize>(value: &T) -> HandlerResult {
    Ok(serde_json::to_value(value)?)
}

pub fn get_required_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing or non-integer {}", key)))
}

pub fn get_bool_or(params: &serde_json::Value, key: &str, default: bool) -> Result<bool, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

/// A clock pinned to `params.now` when the caller supplies one (kiosk replay, tests), else the
/// system clock.
pub fn clock_param(params: &serde_json::Value) -> Result<Box<dyn Clock>, HandlerErr> {
    match get_optional_str(params, "now") {
        Some(s) => Ok(Box::new(FixedClock(clock::parse_ts(s)?))),
        None => Ok(Box::new(SystemClock)),
    }
}

pub fn now_param(params: &serde_json::Value) -> Result<DateTime<Utc>, HandlerErr> {
    Ok(clock_param(params)?.now())
}

/// `params[key]` as a calendar date, defaulting to the classroom's local date at `now`.
pub fn date_param(
    params: &serde_json::Value,
    key: &str,
    cfg: &GamificationConfig,
    now: DateTime<Utc>,
) -> Result<NaiveDate, HandlerErr> {
    match get_optional_str(params, key) {
        Some(s) => Ok(clock::parse_date(s)?),
        None => Ok(FixedClock(now).today(cfg.utc_offset_minutes)),
    }
}

pub fn load_config(conn: &Connection) -> Result<GamificationConfig, HandlerErr> {
    Ok(config::load(conn)?)
}
