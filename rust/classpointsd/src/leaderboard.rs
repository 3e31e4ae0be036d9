use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::CoreResult;
use crate::students;

/// How students with equal balances are ordered on the leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Whatever order the store lists students in (insertion order here).
    StoreOrder,
    /// The student who has held the balance longest, i.e. whose latest ledger entry is oldest.
    EarliestBalance,
    /// Alphabetical by name.
    Name,
}

impl TieBreak {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "store_order" => Some(Self::StoreOrder),
            "earliest_balance" => Some(Self::EarliestBalance),
            "name" => Some(Self::Name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub rank: usize,
    pub student_id: String,
    pub name: String,
    pub points: i64,
}

#[derive(Debug, Clone)]
struct Candidate {
    student_id: String,
    name: String,
    points: i64,
    last_entry_at: Option<String>,
}

fn order(mut rows: Vec<Candidate>, tie_break: TieBreak) -> Vec<LeaderboardRow> {
    // Stable sort: rows arrive in store order, which is the final fallback for every policy.
    rows.sort_by(|a, b| {
        b.points.cmp(&a.points).then_with(|| match tie_break {
            TieBreak::StoreOrder => std::cmp::Ordering::Equal,
            TieBreak::EarliestBalance => a.last_entry_at.cmp(&b.last_entry_at),
            TieBreak::Name => a.name.cmp(&b.name),
        })
    });
    rows.into_iter()
        .enumerate()
        .map(|(i, c)| LeaderboardRow {
            rank: i + 1,
            student_id: c.student_id,
            name: c.name,
            points: c.points,
        })
        .collect()
}

pub fn rank_all(conn: &Connection, tie_break: TieBreak) -> CoreResult<Vec<LeaderboardRow>> {
    let mut last_entry: HashMap<String, String> = HashMap::new();
    if tie_break == TieBreak::EarliestBalance {
        let mut stmt = conn.prepare(
            "SELECT student_id, MAX(created_at) FROM ledger_entries GROUP BY student_id",
        )?;
        let pairs = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        last_entry.extend(pairs);
    }
    let candidates = students::list_students(conn)?
        .into_iter()
        .map(|s| Candidate {
            last_entry_at: last_entry.get(&s.id).cloned(),
            student_id: s.id,
            name: s.name,
            points: s.points,
        })
        .collect();
    Ok(order(candidates, tie_break))
}

/// 1-indexed position of `student_id`, or `None` if the student is not listed.
pub fn rank_of(conn: &Connection, student_id: &str, tie_break: TieBreak) -> CoreResult<Option<usize>> {
    Ok(rank_all(conn, tie_break)?
        .into_iter()
        .find(|row| row.student_id == student_id)
        .map(|row| row.rank))
}
