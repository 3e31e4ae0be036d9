use crate::ipc::helpers::{get_required_str, now_param, to_json, with_db, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::students;
use rusqlite::Connection;
use serde_json::{json, Value};

fn students_create(conn: &Connection, params: &Value) -> HandlerResult {
    let name = get_required_str(params, "name")?;
    let now = now_param(params)?;
    let student = students::create_student(conn, name, now)?;
    Ok(json!({ "student": to_json(&student)? }))
}

fn students_list(conn: &Connection, _params: &Value) -> HandlerResult {
    let rows = students::list_students(conn)?;
    Ok(json!({ "students": to_json(&rows)? }))
}

fn students_get(conn: &Connection, params: &Value) -> HandlerResult {
    let student_id = get_required_str(params, "studentId")?;
    let student = students::get_student(conn, student_id)?;
    Ok(json!({ "student": to_json(&student)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(with_db(state, req, students_create)),
        "students.list" => Some(with_db(state, req, students_list)),
        "students.get" => Some(with_db(state, req, students_get)),
        _ => None,
    }
}
