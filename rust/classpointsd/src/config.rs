use chrono::NaiveTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::db;
use crate::leaderboard::TieBreak;

pub const SETTINGS_KEY: &str = "setup.gamification";

/// Points amounts and policies for the rewards engine, stored as one settings section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamificationConfig {
    pub attendance_points: i64,
    pub early_bonus_points: i64,
    /// Local wall-clock time (HH:MM) before which a check-in earns the early bonus.
    pub early_cutoff: String,
    pub praise_given_points: i64,
    pub praise_received_points: i64,
    pub goal_completion_bonus: i64,
    pub coupon_validity_months: u32,
    pub leaderboard_tie_break: TieBreak,
    pub utc_offset_minutes: i32,
}

impl Default for GamificationConfig {
    fn default() -> Self {
        Self {
            attendance_points: 10,
            early_bonus_points: 5,
            early_cutoff: "08:30".to_string(),
            praise_given_points: 5,
            praise_received_points: 2,
            goal_completion_bonus: 30,
            coupon_validity_months: 1,
            leaderboard_tie_break: TieBreak::StoreOrder,
            utc_offset_minutes: 0,
        }
    }
}

impl GamificationConfig {
    pub fn early_cutoff_time(&self) -> NaiveTime {
        NaiveTime::parse_from_str(&self.early_cutoff, "%H:%M")
            .unwrap_or_else(|_| NaiveTime::from_hms_opt(8, 30, 0).unwrap_or(NaiveTime::MIN))
    }
}

fn default_section() -> Value {
    serde_json::to_value(GamificationConfig::default()).unwrap_or_else(|_| json!({}))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

/// Validates `patch` field by field and writes accepted values into `current`.
pub fn merge_patch(current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match k.as_str() {
            "attendancePoints"
            | "earlyBonusPoints"
            | "praiseGivenPoints"
            | "praiseReceivedPoints"
            | "goalCompletionBonus" => {
                obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 10_000)?));
            }
            "earlyCutoff" => {
                let s = parse_string_max(v, k, 5)?;
                if NaiveTime::parse_from_str(&s, "%H:%M").is_err() {
                    return Err("earlyCutoff must be HH:MM".into());
                }
                obj.insert(k.clone(), Value::String(s));
            }
            "couponValidityMonths" => {
                obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 12)?));
            }
            "leaderboardTieBreak" => {
                let s = parse_string_max(v, k, 24)?.to_ascii_lowercase();
                if TieBreak::parse(&s).is_none() {
                    return Err(
                        "leaderboardTieBreak must be one of: store_order, earliest_balance, name"
                            .into(),
                    );
                }
                obj.insert(k.clone(), Value::String(s));
            }
            "utcOffsetMinutes" => {
                obj.insert(k.clone(), Value::from(parse_i64_range(v, k, -720, 840)?));
            }
            _ => return Err(format!("unknown gamification field: {}", k)),
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection) -> anyhow::Result<Value> {
    let mut current = default_section();
    if let Some(saved) = db::settings_get_json(conn, SETTINGS_KEY)? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed saved values fall back to defaults.
            if let Err(e) = merge_patch(&mut current, saved_obj) {
                tracing::warn!(error = %e, "ignoring invalid saved gamification settings");
                current = default_section();
            }
        }
    }
    Ok(current)
}

pub fn load(conn: &Connection) -> anyhow::Result<GamificationConfig> {
    Ok(serde_json::from_value(load_section(conn)?)?)
}

/// Applies a validated patch and persists the merged section. Returns the new config.
pub fn update(conn: &Connection, patch: &Map<String, Value>) -> anyhow::Result<Result<GamificationConfig, String>> {
    let mut current = load_section(conn)?;
    if let Err(msg) = merge_patch(&mut current, patch) {
        return Ok(Err(msg));
    }
    db::settings_set_json(conn, SETTINGS_KEY, &current)?;
    Ok(Ok(serde_json::from_value(current)?))
}
