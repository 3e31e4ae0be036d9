//! Points ledger: append-only entries plus the cached `students.points` balance.
//!
//! Every write appends one entry and moves the cached balance inside the same `IMMEDIATE`
//! transaction. The `*_in` variants take a connection that is already inside such a
//! transaction so other modules can compose a ledger write with their own state change.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{fmt_ts, ts_column};
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::model::{Direction, PointSource};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub student_id: String,
    pub direction: Direction,
    pub amount: i64,
    pub source: PointSource,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub award_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn signed_amount(&self) -> i64 {
        self.direction.sign() * self.amount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub cached: i64,
    pub replayed: i64,
    pub corrected: bool,
}

/// Deterministic key for a once-per-period award, e.g. `(student, attendance, 2026-03-02)`.
pub fn award_key(student_id: &str, source: PointSource, period: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(student_id.as_bytes());
    hasher.update(b"|");
    hasher.update(source.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(period.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn row_to_entry(r: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: r.get(0)?,
        student_id: r.get(1)?,
        direction: r.get(2)?,
        amount: r.get(3)?,
        source: r.get(4)?,
        description: r.get(5)?,
        award_key: r.get(6)?,
        created_at: ts_column(r, 7)?,
    })
}

fn cached_balance(conn: &Connection, student_id: &str) -> CoreResult<i64> {
    conn.query_row(
        "SELECT points FROM students WHERE id = ?",
        [student_id],
        |r| r.get::<_, i64>(0),
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("student", student_id))
}

/// Fails before anything is written if crediting `amount` would overflow the stored balance.
fn check_credit(balance: i64, amount: i64) -> CoreResult<()> {
    match balance.checked_add(amount) {
        Some(_) => Ok(()),
        None => Err(CoreError::BalanceOverflow { balance, amount }),
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation
    )
}

/// Appends the entry, then moves the cached balance. Caller owns the transaction.
fn append(conn: &Connection, entry: &LedgerEntry) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO ledger_entries(id, student_id, direction, amount, source, description, award_key, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &entry.id,
            &entry.student_id,
            entry.direction,
            entry.amount,
            entry.source,
            &entry.description,
            &entry.award_key,
            fmt_ts(entry.created_at),
        ),
    )?;
    conn.execute(
        "UPDATE students SET points = points + ? WHERE id = ?",
        (entry.signed_amount(), &entry.student_id),
    )?;
    Ok(())
}

fn new_entry(
    student_id: &str,
    direction: Direction,
    amount: i64,
    source: PointSource,
    description: &str,
    award_key: Option<String>,
    now: DateTime<Utc>,
) -> LedgerEntry {
    LedgerEntry {
        id: Uuid::new_v4().to_string(),
        student_id: student_id.to_string(),
        direction,
        amount,
        source,
        description: description.to_string(),
        award_key,
        created_at: now,
    }
}

pub fn award_in(
    conn: &Connection,
    student_id: &str,
    amount: i64,
    source: PointSource,
    description: &str,
    now: DateTime<Utc>,
) -> CoreResult<LedgerEntry> {
    if amount <= 0 {
        return Err(CoreError::InvalidAmount(amount));
    }
    check_credit(cached_balance(conn, student_id)?, amount)?;
    let entry = new_entry(student_id, Direction::Earn, amount, source, description, None, now);
    append(conn, &entry)?;
    Ok(entry)
}

/// Credits `amount` points to an existing student, unless the balance would overflow.
pub fn award(
    conn: &Connection,
    student_id: &str,
    amount: i64,
    source: PointSource,
    description: &str,
    now: DateTime<Utc>,
) -> CoreResult<LedgerEntry> {
    let tx = db::write_tx(conn)?;
    let entry = award_in(&tx, student_id, amount, source, description, now)?;
    tx.commit()?;
    info!(
        student_id,
        amount,
        source = source.as_str(),
        "points awarded"
    );
    Ok(entry)
}

pub fn charge_in(
    conn: &Connection,
    student_id: &str,
    amount: i64,
    source: PointSource,
    description: &str,
    now: DateTime<Utc>,
) -> CoreResult<LedgerEntry> {
    if amount <= 0 {
        return Err(CoreError::InvalidAmount(amount));
    }
    let balance = cached_balance(conn, student_id)?;
    if balance < amount {
        return Err(CoreError::InsufficientBalance {
            balance,
            required: amount,
        });
    }
    let entry = new_entry(student_id, Direction::Spend, amount, source, description, None, now);
    append(conn, &entry)?;
    Ok(entry)
}

/// Debits `amount` points, or fails with `InsufficientBalance` without writing anything.
pub fn charge(
    conn: &Connection,
    student_id: &str,
    amount: i64,
    source: PointSource,
    description: &str,
    now: DateTime<Utc>,
) -> CoreResult<LedgerEntry> {
    let tx = db::write_tx(conn)?;
    let entry = match charge_in(&tx, student_id, amount, source, description, now) {
        Ok(e) => e,
        Err(e) => {
            if let CoreError::InsufficientBalance { balance, required } = &e {
                debug!(student_id, balance, required, "charge rejected");
            }
            return Err(e);
        }
    };
    tx.commit()?;
    info!(
        student_id,
        amount,
        source = source.as_str(),
        "points charged"
    );
    Ok(entry)
}

/// Idempotent award keyed on `(student, source, period)`.
///
/// Returns `None` when an award for the same key already exists. The existence check and the
/// append share one transaction, and the unique index on `award_key` rejects any duplicate that
/// slips past the check.
pub fn award_once_in(
    conn: &Connection,
    student_id: &str,
    amount: i64,
    source: PointSource,
    description: &str,
    period: &str,
    now: DateTime<Utc>,
) -> CoreResult<Option<LedgerEntry>> {
    if amount <= 0 {
        return Err(CoreError::InvalidAmount(amount));
    }
    let balance = cached_balance(conn, student_id)?;
    let key = award_key(student_id, source, period);
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM ledger_entries WHERE award_key = ?",
            [&key],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Ok(None);
    }
    check_credit(balance, amount)?;
    let entry = new_entry(
        student_id,
        Direction::Earn,
        amount,
        source,
        description,
        Some(key),
        now,
    );
    match append(conn, &entry) {
        Ok(()) => Ok(Some(entry)),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn award_once(
    conn: &Connection,
    student_id: &str,
    amount: i64,
    source: PointSource,
    description: &str,
    period: &str,
    now: DateTime<Utc>,
) -> CoreResult<Option<LedgerEntry>> {
    let tx = db::write_tx(conn)?;
    let entry = award_once_in(&tx, student_id, amount, source, description, period, now)?;
    tx.commit()?;
    match &entry {
        Some(_) => info!(
            student_id,
            amount,
            source = source.as_str(),
            period,
            "once-per-period points awarded"
        ),
        None => debug!(
            student_id,
            source = source.as_str(),
            period,
            "once-per-period award already granted"
        ),
    }
    Ok(entry)
}

pub fn has_award(
    conn: &Connection,
    student_id: &str,
    source: PointSource,
    period: &str,
) -> CoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM ledger_entries WHERE award_key = ?",
            [award_key(student_id, source, period)],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn get_balance(conn: &Connection, student_id: &str) -> CoreResult<i64> {
    cached_balance(conn, student_id)
}

/// Entries for one student, oldest first.
pub fn list_entries(conn: &Connection, student_id: &str) -> CoreResult<Vec<LedgerEntry>> {
    cached_balance(conn, student_id)?;
    let mut stmt = conn.prepare(
        "SELECT id, student_id, direction, amount, source, description, award_key, created_at
         FROM ledger_entries
         WHERE student_id = ?
         ORDER BY created_at, rowid",
    )?;
    let rows = stmt
        .query_map([student_id], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Balance recomputed from the entries alone.
pub fn replay_balance(conn: &Connection, student_id: &str) -> CoreResult<i64> {
    cached_balance(conn, student_id)?;
    let sum: i64 = conn.query_row(
        "SELECT COALESCE(SUM(CASE direction WHEN 'earn' THEN amount ELSE -amount END), 0)
         FROM ledger_entries
         WHERE student_id = ?",
        [student_id],
        |r| r.get(0),
    )?;
    Ok(sum)
}

/// Rewrites the cached balance from a replay of the entries if the two have drifted.
pub fn reconcile(conn: &Connection, student_id: &str) -> CoreResult<Reconciliation> {
    let tx = db::write_tx(conn)?;
    let cached = cached_balance(&tx, student_id)?;
    let replayed = replay_balance(&tx, student_id)?;
    let corrected = cached != replayed;
    if corrected {
        tx.execute(
            "UPDATE students SET points = ? WHERE id = ?",
            (replayed, student_id),
        )?;
        warn!(student_id, cached, replayed, "cached balance drifted; corrected from ledger");
    }
    tx.commit()?;
    Ok(Reconciliation {
        cached,
        replayed,
        corrected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn award_key_is_deterministic_and_scoped() {
        let a = award_key("s1", PointSource::Attendance, "2026-03-02");
        assert_eq!(a, award_key("s1", PointSource::Attendance, "2026-03-02"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, award_key("s2", PointSource::Attendance, "2026-03-02"));
        assert_ne!(a, award_key("s1", PointSource::PraiseGiven, "2026-03-02"));
        assert_ne!(a, award_key("s1", PointSource::Attendance, "2026-03-03"));
    }

    #[test]
    fn credit_check_rejects_overflowing_balances() {
        assert!(check_credit(10, 5).is_ok());
        assert!(check_credit(0, i64::MAX).is_ok());
        assert!(matches!(
            check_credit(10, i64::MAX),
            Err(CoreError::BalanceOverflow { balance: 10, amount: i64::MAX })
        ));
    }
}
