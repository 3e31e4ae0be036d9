//! Activity facts reader: flattens one student's raw activity into a `BadgeCheckData` snapshot.
//!
//! Each fact family is read with its own single-table query and combined in memory; nothing
//! here writes to the store.

use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::CoreResult;
use crate::leaderboard::{self, TieBreak};
use crate::model::GoalStatus;
use crate::students;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub attempts: usize,
    pub average: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeCheckData {
    pub quizzes_created: usize,
    pub quizzes_verified: usize,
    /// One 0-100 score per completed attempt.
    pub attempt_scores: Vec<i64>,
    pub total_attempts: usize,
    /// Distinct quizzes written by other students that this student attempted.
    pub others_quizzes_solved: usize,
    pub leaderboard_rank: Option<usize>,
    pub subject_stats: BTreeMap<String, SubjectStats>,
    pub emotion_counts: BTreeMap<String, usize>,
    pub completed_goals: usize,
    pub public_photo_attendance: usize,
    pub praises_sent: usize,
    pub attendance_days: usize,
}

impl BadgeCheckData {
    pub fn scores_at_least(&self, min: i64) -> usize {
        self.attempt_scores.iter().filter(|s| **s >= min).count()
    }

    pub fn emotion_count(&self, emotion: &str) -> usize {
        self.emotion_counts.get(emotion).copied().unwrap_or(0)
    }

    pub fn distinct_emotions(&self) -> usize {
        self.emotion_counts.values().filter(|n| **n > 0).count()
    }
}

fn count(conn: &Connection, sql: &str, student_id: &str) -> CoreResult<usize> {
    let n: i64 = conn.query_row(sql, [student_id], |r| r.get(0))?;
    Ok(usize::try_from(n).unwrap_or(0))
}

struct QuizMeta {
    author_id: String,
    subject: String,
}

fn quiz_meta(conn: &Connection, quiz_ids: &[String]) -> CoreResult<HashMap<String, QuizMeta>> {
    let mut out = HashMap::new();
    if quiz_ids.is_empty() {
        return Ok(out);
    }
    let placeholders = vec!["?"; quiz_ids.len()].join(", ");
    let sql = format!(
        "SELECT id, author_id, subject FROM quizzes WHERE id IN ({})",
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(quiz_ids.iter()), |r| {
        Ok((
            r.get::<_, String>(0)?,
            QuizMeta {
                author_id: r.get(1)?,
                subject: r.get(2)?,
            },
        ))
    })?;
    for row in rows {
        let (id, meta) = row?;
        out.insert(id, meta);
    }
    Ok(out)
}

pub fn read_badge_check_data(
    conn: &Connection,
    student_id: &str,
    tie_break: TieBreak,
) -> CoreResult<BadgeCheckData> {
    students::ensure_student(conn, student_id)?;
    let mut data = BadgeCheckData {
        quizzes_created: count(
            conn,
            "SELECT COUNT(*) FROM quizzes WHERE author_id = ?",
            student_id,
        )?,
        quizzes_verified: count(
            conn,
            "SELECT COUNT(*) FROM quizzes WHERE author_id = ? AND verified = 1",
            student_id,
        )?,
        completed_goals: {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM student_goals WHERE student_id = ? AND status = ?",
                (student_id, GoalStatus::Completed),
                |r| r.get(0),
            )?;
            usize::try_from(n).unwrap_or(0)
        },
        public_photo_attendance: count(
            conn,
            "SELECT COUNT(*) FROM attendance WHERE student_id = ? AND photo_public = 1",
            student_id,
        )?,
        attendance_days: count(
            conn,
            "SELECT COUNT(*) FROM attendance WHERE student_id = ?",
            student_id,
        )?,
        praises_sent: count(
            conn,
            "SELECT COUNT(*) FROM praises WHERE from_student_id = ?",
            student_id,
        )?,
        leaderboard_rank: leaderboard::rank_of(conn, student_id, tie_break)?,
        ..BadgeCheckData::default()
    };

    let mut stmt = conn.prepare(
        "SELECT quiz_id, score FROM quiz_attempts WHERE student_id = ? ORDER BY completed_at",
    )?;
    let attempts = stmt
        .query_map([student_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut quiz_ids: Vec<String> = attempts.iter().map(|(id, _)| id.clone()).collect();
    quiz_ids.sort();
    quiz_ids.dedup();
    let meta = quiz_meta(conn, &quiz_ids)?;

    let mut others_solved: HashSet<&str> = HashSet::new();
    let mut subject_sums: BTreeMap<String, (usize, i64)> = BTreeMap::new();
    for (quiz_id, score) in &attempts {
        data.attempt_scores.push(*score);
        let Some(m) = meta.get(quiz_id) else {
            continue;
        };
        if m.author_id != student_id {
            others_solved.insert(quiz_id.as_str());
        }
        let e = subject_sums.entry(m.subject.clone()).or_insert((0, 0));
        e.0 += 1;
        e.1 += *score;
    }
    data.total_attempts = attempts.len();
    data.others_quizzes_solved = others_solved.len();
    data.subject_stats = subject_sums
        .into_iter()
        .map(|(subject, (n, sum))| {
            (
                subject,
                SubjectStats {
                    attempts: n,
                    average: sum as f64 / n as f64,
                },
            )
        })
        .collect();

    let mut stmt = conn.prepare(
        "SELECT emotion, COUNT(*) FROM emotion_logs WHERE student_id = ? GROUP BY emotion",
    )?;
    let emotions = stmt
        .query_map([student_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    data.emotion_counts = emotions
        .into_iter()
        .map(|(e, n)| (e, usize::try_from(n).unwrap_or(0)))
        .collect();

    Ok(data)
}
