use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::clock::{fmt_ts, ts_column};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    /// Cached balance; only the ledger writes it.
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

fn row_to_student(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        name: r.get(1)?,
        points: r.get(2)?,
        created_at: ts_column(r, 3)?,
    })
}

pub fn create_student(conn: &Connection, name: &str, now: DateTime<Utc>) -> CoreResult<Student> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::invalid("student name must not be empty"));
    }
    let student = Student {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        points: 0,
        created_at: now,
    };
    conn.execute(
        "INSERT INTO students(id, name, points, created_at) VALUES(?, ?, 0, ?)",
        (&student.id, &student.name, fmt_ts(now)),
    )?;
    Ok(student)
}

pub fn get_student(conn: &Connection, student_id: &str) -> CoreResult<Student> {
    conn.query_row(
        "SELECT id, name, points, created_at FROM students WHERE id = ?",
        [student_id],
        row_to_student,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("student", student_id))
}

/// All students in store (insertion) order.
pub fn list_students(conn: &Connection) -> CoreResult<Vec<Student>> {
    let mut stmt =
        conn.prepare("SELECT id, name, points, created_at FROM students ORDER BY rowid")?;
    let rows = stmt
        .query_map([], row_to_student)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn ensure_student(conn: &Connection, student_id: &str) -> CoreResult<()> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(CoreError::not_found("student", student_id)),
    }
}
