use crate::activity;
use crate::ipc::helpers::{
    date_param, get_bool_or, get_optional_str, get_required_i64, get_required_str, load_config,
    now_param, to_json, with_db, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn activity_attendance(conn: &Connection, params: &Value) -> HandlerResult {
    let student_id = get_required_str(params, "studentId")?;
    let photo_public = get_bool_or(params, "photoPublic", false)?;
    let now = now_param(params)?;
    let cfg = load_config(conn)?;
    let outcome = activity::record_attendance(conn, &cfg, student_id, now, photo_public)?;
    to_json(&outcome)
}

fn activity_praise(conn: &Connection, params: &Value) -> HandlerResult {
    let from = get_required_str(params, "fromStudentId")?;
    let to = get_required_str(params, "toStudentId")?;
    let message = get_required_str(params, "message")?;
    let now = now_param(params)?;
    let cfg = load_config(conn)?;
    let outcome = activity::send_praise(conn, &cfg, from, to, message, now)?;
    to_json(&outcome)
}

fn activity_quiz_create(conn: &Connection, params: &Value) -> HandlerResult {
    let author_id = get_required_str(params, "authorId")?;
    let subject = get_required_str(params, "subject")?;
    let title = get_required_str(params, "title")?;
    let now = now_param(params)?;
    let quiz = activity::create_quiz(conn, author_id, subject, title, now)?;
    Ok(json!({ "quiz": to_json(&quiz)? }))
}

fn activity_quiz_verify(conn: &Connection, params: &Value) -> HandlerResult {
    let quiz_id = get_required_str(params, "quizId")?;
    let quiz = activity::verify_quiz(conn, quiz_id)?;
    Ok(json!({ "quiz": to_json(&quiz)? }))
}

fn activity_quiz_attempt(conn: &Connection, params: &Value) -> HandlerResult {
    let quiz_id = get_required_str(params, "quizId")?;
    let student_id = get_required_str(params, "studentId")?;
    let correct = get_required_i64(params, "correct")?;
    let total = get_required_i64(params, "total")?;
    let now = now_param(params)?;
    let attempt = activity::record_quiz_attempt(conn, quiz_id, student_id, correct, total, now)?;
    Ok(json!({ "attempt": to_json(&attempt)? }))
}

fn activity_emotion(conn: &Connection, params: &Value) -> HandlerResult {
    let student_id = get_required_str(params, "studentId")?;
    let emotion = get_optional_str(params, "emotion").unwrap_or("");
    let now = now_param(params)?;
    let cfg = load_config(conn)?;
    let date = date_param(params, "date", &cfg, now)?;
    activity::record_emotion(conn, student_id, emotion, date)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "activity.attendance" => Some(with_db(state, req, activity_attendance)),
        "activity.praise" => Some(with_db(state, req, activity_praise)),
        "activity.quizCreate" => Some(with_db(state, req, activity_quiz_create)),
        "activity.quizVerify" => Some(with_db(state, req, activity_quiz_verify)),
        "activity.quizAttempt" => Some(with_db(state, req, activity_quiz_attempt)),
        "activity.emotion" => Some(with_db(state, req, activity_emotion)),
        _ => None,
    }
}
