//! Writers for the raw activity facts the badge engine reads.
//!
//! Attendance and praise also pay points. Those awards are once-per-period and go through
//! `ledger::award_once_in`, keyed by the calendar day, so a double-submitted check-in or praise
//! cannot pay twice.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{self, fmt_date, fmt_ts};
use crate::config::GamificationConfig;
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::ledger::{self, LedgerEntry};
use crate::model::PointSource;
use crate::students;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceOutcome {
    /// False when the student had already checked in on this calendar day.
    pub recorded: bool,
    pub date: NaiveDate,
    pub early: bool,
    pub awards: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PraiseOutcome {
    pub praise_id: String,
    pub awards: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    pub author_id: String,
    pub subject: String,
    pub title: String,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub id: String,
    pub quiz_id: String,
    pub student_id: String,
    pub correct: i64,
    pub total: i64,
    pub score: i64,
    pub completed_at: DateTime<Utc>,
}

/// Rounded percentage of correct answers.
pub fn attempt_score(correct: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    let (correct, total) = (i128::from(correct), i128::from(total));
    ((correct * 100 + total / 2) / total) as i64
}

#[allow(clippy::too_many_arguments)]
fn push_award(
    conn: &Connection,
    awards: &mut Vec<LedgerEntry>,
    student_id: &str,
    amount: i64,
    source: PointSource,
    description: &str,
    period: &str,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    if amount <= 0 {
        return Ok(());
    }
    if let Some(e) =
        ledger::award_once_in(conn, student_id, amount, source, description, period, now)?
    {
        awards.push(e);
    }
    Ok(())
}

/// Records the day's attendance check-in and pays the attendance (and early) points.
pub fn record_attendance(
    conn: &Connection,
    cfg: &GamificationConfig,
    student_id: &str,
    checked_at: DateTime<Utc>,
    photo_public: bool,
) -> CoreResult<AttendanceOutcome> {
    let date = clock::local_date(checked_at, cfg.utc_offset_minutes);
    let local_time = (checked_at + chrono::Duration::minutes(i64::from(cfg.utc_offset_minutes))).time();
    let early = local_time < cfg.early_cutoff_time();
    let day = fmt_date(date);

    let tx = db::write_tx(conn)?;
    students::ensure_student(&tx, student_id)?;
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO attendance(id, student_id, date, checked_at, photo_public)
         VALUES(?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            student_id,
            &day,
            fmt_ts(checked_at),
            i64::from(photo_public),
        ),
    )?;
    if inserted == 0 {
        debug!(student_id, date = %day, "attendance already recorded");
        return Ok(AttendanceOutcome {
            recorded: false,
            date,
            early: false,
            awards: Vec::new(),
        });
    }

    let mut awards = Vec::new();
    push_award(
        &tx,
        &mut awards,
        student_id,
        cfg.attendance_points,
        PointSource::Attendance,
        &format!("Attendance {}", day),
        &day,
        checked_at,
    )?;
    if early {
        push_award(
            &tx,
            &mut awards,
            student_id,
            cfg.early_bonus_points,
            PointSource::Attendance,
            &format!("Early check-in bonus {}", day),
            &format!("early:{}", day),
            checked_at,
        )?;
    }
    tx.commit()?;
    info!(student_id, date = %day, early, "attendance recorded");
    Ok(AttendanceOutcome {
        recorded: true,
        date,
        early,
        awards,
    })
}

/// Stores a praise and pays the giver's first-praise-of-the-day and the receiver's points.
///
/// The receiver is paid once per giver per day.
pub fn send_praise(
    conn: &Connection,
    cfg: &GamificationConfig,
    from_student_id: &str,
    to_student_id: &str,
    message: &str,
    now: DateTime<Utc>,
) -> CoreResult<PraiseOutcome> {
    let message = message.trim();
    if message.is_empty() {
        return Err(CoreError::invalid("praise message must not be empty"));
    }
    if from_student_id == to_student_id {
        return Err(CoreError::invalid("students cannot praise themselves"));
    }
    let day = fmt_date(clock::local_date(now, cfg.utc_offset_minutes));

    let tx = db::write_tx(conn)?;
    students::ensure_student(&tx, from_student_id)?;
    students::ensure_student(&tx, to_student_id)?;
    let praise_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO praises(id, from_student_id, to_student_id, message, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (&praise_id, from_student_id, to_student_id, message, fmt_ts(now)),
    )?;

    let mut awards = Vec::new();
    push_award(
        &tx,
        &mut awards,
        from_student_id,
        cfg.praise_given_points,
        PointSource::PraiseGiven,
        &format!("First praise of {}", day),
        &day,
        now,
    )?;
    push_award(
        &tx,
        &mut awards,
        to_student_id,
        cfg.praise_received_points,
        PointSource::PraiseReceived,
        &format!("Praised on {}", day),
        &format!("{}:{}", from_student_id, day),
        now,
    )?;
    tx.commit()?;
    info!(
        from = from_student_id,
        to = to_student_id,
        awards = awards.len(),
        "praise sent"
    );
    Ok(PraiseOutcome { praise_id, awards })
}

pub fn create_quiz(
    conn: &Connection,
    author_id: &str,
    subject: &str,
    title: &str,
    now: DateTime<Utc>,
) -> CoreResult<Quiz> {
    let subject = subject.trim().to_ascii_lowercase();
    let title = title.trim();
    if subject.is_empty() || title.is_empty() {
        return Err(CoreError::invalid("quiz subject and title must not be empty"));
    }
    students::ensure_student(conn, author_id)?;
    let quiz = Quiz {
        id: Uuid::new_v4().to_string(),
        author_id: author_id.to_string(),
        subject,
        title: title.to_string(),
        verified: false,
    };
    conn.execute(
        "INSERT INTO quizzes(id, author_id, subject, title, verified, created_at) VALUES(?, ?, ?, ?, 0, ?)",
        (&quiz.id, &quiz.author_id, &quiz.subject, &quiz.title, fmt_ts(now)),
    )?;
    Ok(quiz)
}

/// Marks a quiz as checked by the teacher.
pub fn verify_quiz(conn: &Connection, quiz_id: &str) -> CoreResult<Quiz> {
    let n = conn.execute("UPDATE quizzes SET verified = 1 WHERE id = ?", [quiz_id])?;
    if n == 0 {
        return Err(CoreError::not_found("quiz", quiz_id));
    }
    conn.query_row(
        "SELECT id, author_id, subject, title, verified FROM quizzes WHERE id = ?",
        [quiz_id],
        |r| {
            Ok(Quiz {
                id: r.get(0)?,
                author_id: r.get(1)?,
                subject: r.get(2)?,
                title: r.get(3)?,
                verified: r.get::<_, i64>(4)? != 0,
            })
        },
    )
    .map_err(CoreError::from)
}

/// Stores the fact "`correct` out of `total`" for one finished attempt.
pub fn record_quiz_attempt(
    conn: &Connection,
    quiz_id: &str,
    student_id: &str,
    correct: i64,
    total: i64,
    now: DateTime<Utc>,
) -> CoreResult<QuizAttempt> {
    if total <= 0 || correct < 0 || correct > total {
        return Err(CoreError::invalid(format!(
            "invalid result {} out of {}",
            correct, total
        )));
    }
    students::ensure_student(conn, student_id)?;
    let quiz_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM quizzes WHERE id = ?", [quiz_id], |r| r.get(0))
        .optional()?;
    if quiz_exists.is_none() {
        return Err(CoreError::not_found("quiz", quiz_id));
    }
    let attempt = QuizAttempt {
        id: Uuid::new_v4().to_string(),
        quiz_id: quiz_id.to_string(),
        student_id: student_id.to_string(),
        correct,
        total,
        score: attempt_score(correct, total),
        completed_at: now,
    };
    conn.execute(
        "INSERT INTO quiz_attempts(id, quiz_id, student_id, correct, total, score, completed_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &attempt.id,
            &attempt.quiz_id,
            &attempt.student_id,
            attempt.correct,
            attempt.total,
            attempt.score,
            fmt_ts(now),
        ),
    )?;
    Ok(attempt)
}

pub fn record_emotion(
    conn: &Connection,
    student_id: &str,
    emotion: &str,
    date: NaiveDate,
) -> CoreResult<()> {
    let emotion = emotion.trim().to_ascii_lowercase();
    if emotion.is_empty() {
        return Err(CoreError::invalid("emotion must not be empty"));
    }
    students::ensure_student(conn, student_id)?;
    conn.execute(
        "INSERT INTO emotion_logs(id, student_id, emotion, logged_on) VALUES(?, ?, ?, ?)",
        (Uuid::new_v4().to_string(), student_id, &emotion, fmt_date(date)),
    )?;
    Ok(())
}
