//! Personal goal tracker: once-per-day check-ins, streaks, and the one-way completion transition.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;

use crate::clock::{date_column, fmt_date, fmt_ts, opt_ts_column, ts_column};
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::ledger::{self, LedgerEntry};
use crate::model::{GoalStatus, PointSource};
use crate::students;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Streaks {
    pub current: u32,
    pub longest: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGoal {
    pub id: String,
    pub student_id: String,
    pub title: String,
    pub target_count: i64,
    pub current_count: i64,
    pub unit: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub check_dates: Vec<NaiveDate>,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub streaks: Streaks,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoal {
    pub title: String,
    pub target_count: i64,
    #[serde(default)]
    pub unit: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInOutcome {
    pub accepted: bool,
    pub status: GoalStatus,
    pub current_count: i64,
    /// The completion bonus, present only on the check-in that completed the goal.
    pub award: Option<LedgerEntry>,
}

/// Current and longest runs of consecutive days in `dates`.
///
/// The current streak is the run ending today or yesterday; an older run no longer counts.
pub fn streaks(dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> Streaks {
    let mut longest = 0u32;
    let mut run = 0u32;
    let mut prev: Option<NaiveDate> = None;
    for d in dates {
        run = match prev {
            Some(p) if *d - p == Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(*d);
    }
    let current = match prev {
        Some(last) if last == today || last == today - Duration::days(1) => run,
        _ => 0,
    };
    Streaks { current, longest }
}

const GOAL_COLUMNS: &str = "id, student_id, title, target_count, current_count, unit, start_date, end_date, status, created_at, completed_at";

fn row_to_goal(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentGoal> {
    Ok(StudentGoal {
        id: r.get(0)?,
        student_id: r.get(1)?,
        title: r.get(2)?,
        target_count: r.get(3)?,
        current_count: r.get(4)?,
        unit: r.get(5)?,
        start_date: date_column(r, 6)?,
        end_date: date_column(r, 7)?,
        status: r.get(8)?,
        created_at: ts_column(r, 9)?,
        completed_at: opt_ts_column(r, 10)?,
        check_dates: Vec::new(),
        streaks: Streaks::default(),
    })
}

fn load_check_dates(conn: &Connection, goal_id: &str) -> CoreResult<BTreeSet<NaiveDate>> {
    let mut stmt = conn.prepare("SELECT check_date FROM goal_check_dates WHERE goal_id = ?")?;
    let dates = stmt
        .query_map([goal_id], |r| date_column(r, 0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(dates)
}

fn hydrate(conn: &Connection, mut goal: StudentGoal, today: NaiveDate) -> CoreResult<StudentGoal> {
    let dates = load_check_dates(conn, &goal.id)?;
    goal.streaks = streaks(&dates, today);
    goal.check_dates = dates.into_iter().collect();
    Ok(goal)
}

fn load_goal_row(conn: &Connection, goal_id: &str) -> CoreResult<StudentGoal> {
    conn.query_row(
        &format!("SELECT {} FROM student_goals WHERE id = ?", GOAL_COLUMNS),
        [goal_id],
        row_to_goal,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("goal", goal_id))
}

pub fn get_goal(conn: &Connection, goal_id: &str, today: NaiveDate) -> CoreResult<StudentGoal> {
    let goal = load_goal_row(conn, goal_id)?;
    hydrate(conn, goal, today)
}

pub fn create_goal(
    conn: &Connection,
    student_id: &str,
    new: &NewGoal,
    now: DateTime<Utc>,
) -> CoreResult<StudentGoal> {
    let title = new.title.trim();
    if title.is_empty() {
        return Err(CoreError::invalid("goal title must not be empty"));
    }
    if new.target_count < 1 {
        return Err(CoreError::invalid("targetCount must be at least 1"));
    }
    if new.end_date < new.start_date {
        return Err(CoreError::invalid("endDate must not be before startDate"));
    }
    students::ensure_student(conn, student_id)?;

    let goal = StudentGoal {
        id: Uuid::new_v4().to_string(),
        student_id: student_id.to_string(),
        title: title.to_string(),
        target_count: new.target_count,
        current_count: 0,
        unit: new.unit.trim().to_string(),
        start_date: new.start_date,
        end_date: new.end_date,
        check_dates: Vec::new(),
        status: GoalStatus::Active,
        created_at: now,
        completed_at: None,
        streaks: Streaks::default(),
    };
    conn.execute(
        &format!(
            "INSERT INTO student_goals({}) VALUES(?, ?, ?, ?, 0, ?, ?, ?, ?, ?, NULL)",
            GOAL_COLUMNS
        ),
        (
            &goal.id,
            &goal.student_id,
            &goal.title,
            goal.target_count,
            &goal.unit,
            fmt_date(goal.start_date),
            fmt_date(goal.end_date),
            goal.status,
            fmt_ts(now),
        ),
    )?;
    info!(student_id, goal_id = %goal.id, target = goal.target_count, "goal created");
    Ok(goal)
}

/// Records `date` for the goal, or fails if that day is already checked.
fn insert_check_date(conn: &Connection, goal_id: &str, date: NaiveDate) -> CoreResult<()> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO goal_check_dates(goal_id, check_date) VALUES(?, ?)",
        (goal_id, fmt_date(date)),
    )?;
    if n == 0 {
        return Err(CoreError::GoalAlreadyCheckedToday);
    }
    Ok(())
}

/// Checks the goal in for `date`.
///
/// A second check-in on the same day, or any check-in on a completed or failed goal, is a
/// no-op reported as `accepted = false`. The check-in that reaches the target flips the goal
/// to `completed` and pays `completion_bonus` in the same transaction.
pub fn check_in(
    conn: &Connection,
    goal_id: &str,
    date: NaiveDate,
    completion_bonus: i64,
    now: DateTime<Utc>,
) -> CoreResult<CheckInOutcome> {
    let tx = db::write_tx(conn)?;
    let goal = load_goal_row(&tx, goal_id)?;
    let unchanged = CheckInOutcome {
        accepted: false,
        status: goal.status,
        current_count: goal.current_count,
        award: None,
    };
    if goal.status.is_terminal() {
        return Ok(unchanged);
    }
    if date < goal.start_date || date > goal.end_date {
        return Err(CoreError::invalid(format!(
            "{} is outside the goal period {}..{}",
            fmt_date(date),
            fmt_date(goal.start_date),
            fmt_date(goal.end_date)
        )));
    }
    match insert_check_date(&tx, goal_id, date) {
        Ok(()) => {}
        Err(CoreError::GoalAlreadyCheckedToday) => return Ok(unchanged),
        Err(e) => return Err(e),
    }

    let current_count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM goal_check_dates WHERE goal_id = ?",
        [goal_id],
        |r| r.get(0),
    )?;
    tx.execute(
        "UPDATE student_goals SET current_count = ? WHERE id = ?",
        (current_count, goal_id),
    )?;

    let mut status = GoalStatus::Active;
    let mut award = None;
    if current_count >= goal.target_count {
        let flipped = tx.execute(
            "UPDATE student_goals SET status = ?, completed_at = ? WHERE id = ? AND status = ?",
            (GoalStatus::Completed, fmt_ts(now), goal_id, GoalStatus::Active),
        )?;
        status = GoalStatus::Completed;
        if flipped == 1 && completion_bonus > 0 {
            award = ledger::award_once_in(
                &tx,
                &goal.student_id,
                completion_bonus,
                PointSource::Goal,
                &format!("Goal completed: {}", goal.title),
                &format!("goal:{}", goal.id),
                now,
            )?;
        }
    }
    tx.commit()?;

    if status == GoalStatus::Completed {
        info!(
            student_id = %goal.student_id,
            goal_id,
            bonus = award.as_ref().map(|e| e.amount).unwrap_or(0),
            "goal completed"
        );
    }
    Ok(CheckInOutcome {
        accepted: true,
        status,
        current_count,
        award,
    })
}

pub fn list_goals(
    conn: &Connection,
    student_id: &str,
    status: Option<GoalStatus>,
    today: NaiveDate,
) -> CoreResult<Vec<StudentGoal>> {
    students::ensure_student(conn, student_id)?;
    let rows = match status {
        Some(s) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM student_goals WHERE student_id = ? AND status = ? ORDER BY created_at, rowid",
                GOAL_COLUMNS
            ))?;
            let rows = stmt
                .query_map((student_id, s), row_to_goal)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM student_goals WHERE student_id = ? ORDER BY created_at, rowid",
                GOAL_COLUMNS
            ))?;
            let rows = stmt
                .query_map([student_id], row_to_goal)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    rows.into_iter().map(|g| hydrate(conn, g, today)).collect()
}

/// Removes the goal and its check dates. Ledger entries it produced stay untouched.
pub fn delete_goal(conn: &Connection, goal_id: &str) -> CoreResult<()> {
    let tx = db::write_tx(conn)?;
    load_goal_row(&tx, goal_id)?;
    tx.execute("DELETE FROM goal_check_dates WHERE goal_id = ?", [goal_id])?;
    tx.execute("DELETE FROM student_goals WHERE id = ?", [goal_id])?;
    tx.commit()?;
    info!(goal_id, "goal deleted");
    Ok(())
}

/// Fails every active goal whose end date is before `today`. Safe to run at any frequency.
pub fn sweep_failed_goals(conn: &Connection, today: NaiveDate) -> CoreResult<Vec<StudentGoal>> {
    let tx = db::write_tx(conn)?;
    let overdue = {
        let mut stmt = tx.prepare(&format!(
            "SELECT {} FROM student_goals WHERE status = ? AND end_date < ? ORDER BY end_date, rowid",
            GOAL_COLUMNS
        ))?;
        let rows = stmt
            .query_map((GoalStatus::Active, fmt_date(today)), row_to_goal)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    let mut failed = Vec::new();
    for mut goal in overdue {
        let n = tx.execute(
            "UPDATE student_goals SET status = ? WHERE id = ? AND status = ?",
            (GoalStatus::Failed, &goal.id, GoalStatus::Active),
        )?;
        if n == 1 {
            goal.status = GoalStatus::Failed;
            failed.push(hydrate(&tx, goal, today)?);
        }
    }
    tx.commit()?;
    if !failed.is_empty() {
        info!(count = failed.len(), today = %today, "overdue goals marked failed");
    }
    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn set(days: &[&str]) -> BTreeSet<NaiveDate> {
        days.iter().map(|s| d(s)).collect()
    }

    #[test]
    fn empty_history_has_no_streak() {
        assert_eq!(streaks(&BTreeSet::new(), d("2026-03-10")), Streaks::default());
    }

    #[test]
    fn current_streak_counts_run_ending_today_or_yesterday() {
        let dates = set(&["2026-03-01", "2026-03-02", "2026-03-03", "2026-03-08", "2026-03-09"]);
        assert_eq!(
            streaks(&dates, d("2026-03-09")),
            Streaks { current: 2, longest: 3 }
        );
        assert_eq!(
            streaks(&dates, d("2026-03-10")),
            Streaks { current: 2, longest: 3 }
        );
        assert_eq!(
            streaks(&dates, d("2026-03-11")),
            Streaks { current: 0, longest: 3 }
        );
    }

    #[test]
    fn backfilled_day_joins_two_runs() {
        let mut dates = set(&["2026-03-01", "2026-03-02", "2026-03-04", "2026-03-05"]);
        assert_eq!(streaks(&dates, d("2026-03-05")).longest, 2);
        dates.insert(d("2026-03-03"));
        assert_eq!(
            streaks(&dates, d("2026-03-05")),
            Streaks { current: 5, longest: 5 }
        );
    }

    #[test]
    fn streak_crosses_month_boundary() {
        let dates = set(&["2026-02-27", "2026-02-28", "2026-03-01"]);
        assert_eq!(streaks(&dates, d("2026-03-01")).current, 3);
    }
}
