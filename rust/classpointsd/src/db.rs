use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "classpoints.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!("failed to create workspace {}", workspace.to_string_lossy())
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    init_schema(&conn).context("failed to initialize schema")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    conn.busy_timeout(Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            points INTEGER NOT NULL DEFAULT 0 CHECK(points >= 0),
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // Append-only. award_key is set only for once-per-period awards.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_entries(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            direction TEXT NOT NULL CHECK(direction IN ('earn', 'spend')),
            amount INTEGER NOT NULL CHECK(amount > 0),
            source TEXT NOT NULL,
            description TEXT NOT NULL,
            award_key TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_entries_student ON ledger_entries(student_id, created_at)",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_entries_award_key
         ON ledger_entries(award_key) WHERE award_key IS NOT NULL",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_badges(
            student_id TEXT NOT NULL,
            badge_type TEXT NOT NULL,
            unlocked_at TEXT NOT NULL,
            PRIMARY KEY(student_id, badge_type),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_goals(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            title TEXT NOT NULL,
            target_count INTEGER NOT NULL CHECK(target_count > 0),
            current_count INTEGER NOT NULL DEFAULT 0,
            unit TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_goals_student ON student_goals(student_id, status)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS goal_check_dates(
            goal_id TEXT NOT NULL,
            check_date TEXT NOT NULL,
            PRIMARY KEY(goal_id, check_date),
            FOREIGN KEY(goal_id) REFERENCES student_goals(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS shop_items(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            price INTEGER NOT NULL CHECK(price > 0),
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS coupons(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            item_id TEXT,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            price INTEGER NOT NULL,
            purchased_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            used_at TEXT,
            status TEXT NOT NULL,
            ledger_entry_id TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(ledger_entry_id) REFERENCES ledger_entries(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_coupons_student ON coupons(student_id, status)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_coupons_status_expiry ON coupons(status, expires_at)",
        [],
    )?;

    // Raw activity facts. The engine reads these; the surrounding UI owns their content.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            checked_at TEXT NOT NULL,
            photo_public INTEGER NOT NULL DEFAULT 0,
            UNIQUE(student_id, date),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS praises(
            id TEXT PRIMARY KEY,
            from_student_id TEXT NOT NULL,
            to_student_id TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(from_student_id) REFERENCES students(id),
            FOREIGN KEY(to_student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_praises_from ON praises(from_student_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS quizzes(
            id TEXT PRIMARY KEY,
            author_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            title TEXT NOT NULL,
            verified INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(author_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quizzes_author ON quizzes(author_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS quiz_attempts(
            id TEXT PRIMARY KEY,
            quiz_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            correct INTEGER NOT NULL,
            total INTEGER NOT NULL,
            score INTEGER NOT NULL,
            completed_at TEXT NOT NULL,
            FOREIGN KEY(quiz_id) REFERENCES quizzes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quiz_attempts_student ON quiz_attempts(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS emotion_logs(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            emotion TEXT NOT NULL,
            logged_on TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_emotion_logs_student ON emotion_logs(student_id)",
        [],
    )?;

    Ok(())
}

/// Starts a transaction that takes the write lock immediately, so every read inside it is
/// current for the duration of the read-modify-write.
pub fn write_tx(conn: &Connection) -> rusqlite::Result<Transaction<'_>> {
    Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
