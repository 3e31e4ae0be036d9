use chrono::{DateTime, NaiveDate, Utc};
use classpointsd::goals::{self, NewGoal, Streaks};
use classpointsd::model::{GoalStatus, PointSource};
use classpointsd::{db, ledger, students, CoreError};
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("timestamp")
        .with_timezone(&Utc)
}

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
}

fn open(prefix: &str) -> Connection {
    db::open_db(&temp_dir(prefix)).expect("open workspace")
}

fn reading_goal(target: i64) -> NewGoal {
    NewGoal {
        title: "Read every day".to_string(),
        target_count: target,
        unit: "days".to_string(),
        start_date: d("2026-03-01"),
        end_date: d("2026-03-31"),
    }
}

#[test]
fn one_check_in_per_calendar_day() {
    let conn = open("classpoints-goal-daily");
    let now = at("2026-03-01T07:00:00Z");
    let s = students::create_student(&conn, "Jiwoo", now).expect("student");
    let goal = goals::create_goal(&conn, &s.id, &reading_goal(5), now).expect("goal");
    assert_eq!(goal.status, GoalStatus::Active);
    assert_eq!(goal.current_count, 0);

    let first = goals::check_in(&conn, &goal.id, d("2026-03-02"), 30, now).expect("check in");
    assert!(first.accepted);
    assert_eq!(first.current_count, 1);

    let again = goals::check_in(&conn, &goal.id, d("2026-03-02"), 30, now).expect("same day");
    assert!(!again.accepted);
    assert_eq!(again.current_count, 1);
    assert_eq!(again.status, GoalStatus::Active);

    let stored = goals::get_goal(&conn, &goal.id, d("2026-03-02")).expect("goal");
    assert_eq!(stored.current_count, 1);
    assert_eq!(stored.check_dates, vec![d("2026-03-02")]);
}

#[test]
fn reaching_the_target_completes_and_pays_exactly_once() {
    let conn = open("classpoints-goal-complete");
    let now = at("2026-03-01T07:00:00Z");
    let s = students::create_student(&conn, "Hana", now).expect("student");
    let goal = goals::create_goal(&conn, &s.id, &reading_goal(3), now).expect("goal");

    for day in ["2026-03-03", "2026-03-04"] {
        let out = goals::check_in(&conn, &goal.id, d(day), 30, now).expect("check in");
        assert!(out.accepted);
        assert!(out.award.is_none());
    }
    let done = goals::check_in(&conn, &goal.id, d("2026-03-05"), 30, now).expect("complete");
    assert!(done.accepted);
    assert_eq!(done.status, GoalStatus::Completed);
    assert_eq!(done.current_count, 3);
    let award = done.award.expect("completion bonus");
    assert_eq!(award.amount, 30);
    assert_eq!(award.source, PointSource::Goal);
    assert_eq!(award.description, "Goal completed: Read every day");

    // Completed goals no longer accept check-ins.
    let after = goals::check_in(&conn, &goal.id, d("2026-03-06"), 30, now).expect("after");
    assert!(!after.accepted);
    assert_eq!(after.status, GoalStatus::Completed);
    assert_eq!(after.current_count, 3);

    assert_eq!(ledger::get_balance(&conn, &s.id).expect("balance"), 30);
    let goal_entries: Vec<_> = ledger::list_entries(&conn, &s.id)
        .expect("entries")
        .into_iter()
        .filter(|e| e.source == PointSource::Goal)
        .collect();
    assert_eq!(goal_entries.len(), 1);

    let stored = goals::get_goal(&conn, &goal.id, d("2026-03-05")).expect("goal");
    assert!(stored.completed_at.is_some());
    assert_eq!(
        stored.streaks,
        Streaks {
            current: 3,
            longest: 3
        }
    );
}

#[test]
fn check_in_outside_the_goal_period_is_rejected() {
    let conn = open("classpoints-goal-period");
    let now = at("2026-03-01T07:00:00Z");
    let s = students::create_student(&conn, "Min", now).expect("student");
    let goal = goals::create_goal(&conn, &s.id, &reading_goal(2), now).expect("goal");

    assert!(matches!(
        goals::check_in(&conn, &goal.id, d("2026-02-28"), 30, now),
        Err(CoreError::InvalidInput(_))
    ));
    assert!(matches!(
        goals::check_in(&conn, &goal.id, d("2026-04-01"), 30, now),
        Err(CoreError::InvalidInput(_))
    ));
    assert_eq!(
        goals::get_goal(&conn, &goal.id, d("2026-03-01")).expect("goal").current_count,
        0
    );
}

#[test]
fn invalid_goals_are_rejected() {
    let conn = open("classpoints-goal-validation");
    let now = at("2026-03-01T07:00:00Z");
    let s = students::create_student(&conn, "Yul", now).expect("student");

    let mut zero = reading_goal(0);
    assert!(goals::create_goal(&conn, &s.id, &zero, now).is_err());
    zero.target_count = 1;
    zero.end_date = d("2026-02-01");
    assert!(goals::create_goal(&conn, &s.id, &zero, now).is_err());
    assert!(matches!(
        goals::create_goal(&conn, "nobody", &reading_goal(1), now),
        Err(CoreError::NotFound { kind: "student", .. })
    ));
    assert!(matches!(
        goals::check_in(&conn, "missing", d("2026-03-02"), 30, now),
        Err(CoreError::NotFound { kind: "goal", .. })
    ));
}

#[test]
fn sweep_fails_overdue_goals_once() {
    let conn = open("classpoints-goal-sweep");
    let now = at("2026-03-01T07:00:00Z");
    let s = students::create_student(&conn, "Bo", now).expect("student");
    let overdue = goals::create_goal(&conn, &s.id, &reading_goal(10), now).expect("overdue");
    let completed = goals::create_goal(&conn, &s.id, &reading_goal(1), now).expect("completed");
    goals::check_in(&conn, &completed.id, d("2026-03-10"), 30, now).expect("complete");

    assert!(goals::sweep_failed_goals(&conn, d("2026-03-31")).expect("sweep").is_empty());

    let failed = goals::sweep_failed_goals(&conn, d("2026-04-01")).expect("sweep");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, overdue.id);
    assert_eq!(failed[0].status, GoalStatus::Failed);
    assert!(goals::sweep_failed_goals(&conn, d("2026-04-02")).expect("again").is_empty());

    let out = goals::check_in(&conn, &overdue.id, d("2026-03-31"), 30, now).expect("no-op");
    assert!(!out.accepted);
    assert_eq!(out.status, GoalStatus::Failed);

    let active = goals::list_goals(&conn, &s.id, Some(GoalStatus::Active), d("2026-04-02"))
        .expect("list");
    assert!(active.is_empty());
    let all = goals::list_goals(&conn, &s.id, None, d("2026-04-02")).expect("list");
    assert_eq!(all.len(), 2);
}

#[test]
fn deleting_a_goal_keeps_its_bonus() {
    let conn = open("classpoints-goal-delete");
    let now = at("2026-03-01T07:00:00Z");
    let s = students::create_student(&conn, "Ara", now).expect("student");
    let goal = goals::create_goal(&conn, &s.id, &reading_goal(1), now).expect("goal");
    goals::check_in(&conn, &goal.id, d("2026-03-02"), 25, now).expect("complete");

    goals::delete_goal(&conn, &goal.id).expect("delete");
    assert!(matches!(
        goals::get_goal(&conn, &goal.id, d("2026-03-02")),
        Err(CoreError::NotFound { .. })
    ));
    assert_eq!(ledger::get_balance(&conn, &s.id).expect("balance"), 25);
}
