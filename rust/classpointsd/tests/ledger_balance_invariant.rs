use chrono::{DateTime, Duration, Utc};
use classpointsd::model::{Direction, PointSource};
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

fn open(prefix: &str) -> Connection {
    db::open_db(&temp_dir(prefix)).expect("open workspace")
}

fn signed_sum(conn: &Connection, student_id: &str) -> i64 {
    ledger::list_entries(conn, student_id)
        .expect("entries")
        .iter()
        .map(|e| e.signed_amount())
        .sum()
}

#[test]
fn balance_matches_signed_sum_after_every_operation() {
    let conn = open("classpoints-ledger-invariant");
    let t0 = at("2026-03-02T08:00:00Z");
    let s = students::create_student(&conn, "Jiwoo", t0).expect("student");

    let ops: Vec<(bool, i64)> = vec![
        (true, 10),
        (true, 25),
        (false, 30),
        (false, 10),
        (true, 7),
        (false, 2),
        (false, 1),
        (true, 100),
        (false, 99),
    ];
    for (i, (earn, amount)) in ops.into_iter().enumerate() {
        let now = t0 + Duration::minutes(i as i64);
        let res = if earn {
            ledger::award(&conn, &s.id, amount, PointSource::Assignment, "hw", now)
        } else {
            ledger::charge(&conn, &s.id, amount, PointSource::Shop, "snack", now)
        };
        let balance = ledger::get_balance(&conn, &s.id).expect("balance");
        assert!(balance >= 0);
        assert_eq!(balance, signed_sum(&conn, &s.id), "after op {} ({:?})", i, res.is_ok());
        assert_eq!(balance, ledger::replay_balance(&conn, &s.id).expect("replay"));
    }
    // 10 + 25 - 30 = 5; charge 10 rejected; +7 = 12; -2 = 10; -1 = 9; +100 = 109; -99 = 10
    assert_eq!(ledger::get_balance(&conn, &s.id).expect("balance"), 10);
}

#[test]
fn overspend_is_rejected_without_writing() {
    let conn = open("classpoints-ledger-overspend");
    let now = at("2026-03-02T08:00:00Z");
    let s = students::create_student(&conn, "Hana", now).expect("student");
    ledger::award(&conn, &s.id, 5, PointSource::Admin, "seed", now).expect("award");

    let before = ledger::list_entries(&conn, &s.id).expect("entries");
    let err = ledger::charge(&conn, &s.id, 10, PointSource::Shop, "too much", now)
        .expect_err("charge must fail");
    match err {
        CoreError::InsufficientBalance { balance, required } => {
            assert_eq!(balance, 5);
            assert_eq!(required, 10);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(ledger::get_balance(&conn, &s.id).expect("balance"), 5);
    assert_eq!(ledger::list_entries(&conn, &s.id).expect("entries"), before);
}

#[test]
fn charging_the_exact_balance_leaves_zero() {
    let conn = open("classpoints-ledger-exact");
    let now = at("2026-03-02T08:00:00Z");
    let s = students::create_student(&conn, "Seo", now).expect("student");
    ledger::award(&conn, &s.id, 12, PointSource::Attendance, "a", now).expect("award");
    let e = ledger::charge(&conn, &s.id, 12, PointSource::Shop, "all in", now).expect("charge");
    assert_eq!(e.direction, Direction::Spend);
    assert_eq!(ledger::get_balance(&conn, &s.id).expect("balance"), 0);
}

#[test]
fn non_positive_amounts_and_unknown_students_are_rejected() {
    let conn = open("classpoints-ledger-validation");
    let now = at("2026-03-02T08:00:00Z");
    let s = students::create_student(&conn, "Min", now).expect("student");

    assert!(matches!(
        ledger::award(&conn, &s.id, 0, PointSource::Admin, "", now),
        Err(CoreError::InvalidAmount(0))
    ));
    assert!(matches!(
        ledger::charge(&conn, &s.id, -3, PointSource::Admin, "", now),
        Err(CoreError::InvalidAmount(-3))
    ));
    assert!(matches!(
        ledger::award(&conn, "nobody", 5, PointSource::Admin, "", now),
        Err(CoreError::NotFound { kind: "student", .. })
    ));
    assert!(ledger::list_entries(&conn, &s.id).expect("entries").is_empty());
}

#[test]
fn award_once_pays_a_period_only_once() {
    let conn = open("classpoints-ledger-once");
    let now = at("2026-03-02T08:00:00Z");
    let s = students::create_student(&conn, "Yul", now).expect("student");

    let first = ledger::award_once(
        &conn,
        &s.id,
        10,
        PointSource::Attendance,
        "Attendance 2026-03-02",
        "2026-03-02",
        now,
    )
    .expect("first award");
    assert!(first.is_some());
    let retry = ledger::award_once(
        &conn,
        &s.id,
        10,
        PointSource::Attendance,
        "Attendance 2026-03-02",
        "2026-03-02",
        now + Duration::seconds(1),
    )
    .expect("retry");
    assert!(retry.is_none());
    assert!(ledger::has_award(&conn, &s.id, PointSource::Attendance, "2026-03-02").expect("has"));

    let next_day = ledger::award_once(
        &conn,
        &s.id,
        10,
        PointSource::Attendance,
        "Attendance 2026-03-03",
        "2026-03-03",
        now + Duration::days(1),
    )
    .expect("next day");
    assert!(next_day.is_some());
    assert_eq!(ledger::get_balance(&conn, &s.id).expect("balance"), 20);
    assert_eq!(ledger::list_entries(&conn, &s.id).expect("entries").len(), 2);
}

#[test]
fn duplicate_award_key_is_rejected_by_the_store() {
    let conn = open("classpoints-ledger-unique-key");
    let now = at("2026-03-02T08:00:00Z");
    let s = students::create_student(&conn, "Ara", now).expect("student");
    let e = ledger::award_once(&conn, &s.id, 5, PointSource::PraiseGiven, "p", "2026-03-02", now)
        .expect("award")
        .expect("first award is paid");

    let dup = conn.execute(
        "INSERT INTO ledger_entries(id, student_id, direction, amount, source, description, award_key, created_at)
         VALUES('dup', ?, 'earn', 5, 'praise_given', 'p', ?, '2026-03-02T08:00:01.000Z')",
        (&s.id, e.award_key.as_deref()),
    );
    assert!(dup.is_err(), "unique award_key index must reject duplicates");
}

#[test]
fn entries_are_listed_oldest_first() {
    let conn = open("classpoints-ledger-order");
    let t0 = at("2026-03-02T08:00:00Z");
    let s = students::create_student(&conn, "Dan", t0).expect("student");
    ledger::award(&conn, &s.id, 3, PointSource::Admin, "third", t0 + Duration::hours(2)).expect("a");
    ledger::award(&conn, &s.id, 1, PointSource::Admin, "first", t0).expect("b");
    ledger::award(&conn, &s.id, 2, PointSource::Admin, "second", t0 + Duration::hours(1)).expect("c");
    let descs: Vec<String> = ledger::list_entries(&conn, &s.id)
        .expect("entries")
        .into_iter()
        .map(|e| e.description)
        .collect();
    assert_eq!(descs, vec!["first", "second", "third"]);
}

#[test]
fn reconcile_rewrites_a_drifted_cached_balance() {
    let conn = open("classpoints-ledger-reconcile");
    let now = at("2026-03-02T08:00:00Z");
    let s = students::create_student(&conn, "Bo", now).expect("student");
    ledger::award(&conn, &s.id, 40, PointSource::Admin, "seed", now).expect("award");
    ledger::charge(&conn, &s.id, 15, PointSource::Shop, "pen", now).expect("charge");

    let clean = ledger::reconcile(&conn, &s.id).expect("reconcile");
    assert!(!clean.corrected);
    assert_eq!(clean.replayed, 25);

    conn.execute("UPDATE students SET points = 999 WHERE id = ?", [&s.id])
        .expect("simulate drift");
    let fixed = ledger::reconcile(&conn, &s.id).expect("reconcile");
    assert!(fixed.corrected);
    assert_eq!(fixed.cached, 999);
    assert_eq!(fixed.replayed, 25);
    assert_eq!(ledger::get_balance(&conn, &s.id).expect("balance"), 25);
}

#[test]
fn award_past_the_largest_balance_is_rejected_and_leaves_the_balance_readable() {
    let conn = open("classpoints-ledger-overflow");
    let now = at("2026-03-02T08:00:00Z");
    let s = students::create_student(&conn, "Max", now).expect("student");
    ledger::award(&conn, &s.id, 10, PointSource::Admin, "seed", now).expect("award");

    let err = ledger::award(&conn, &s.id, i64::MAX, PointSource::Admin, "huge", now)
        .expect_err("overflowing award");
    assert!(matches!(
        err,
        CoreError::BalanceOverflow { balance: 10, amount: i64::MAX }
    ));
    assert_eq!(err.code(), "bad_params");

    let once = ledger::award_once(&conn, &s.id, i64::MAX, PointSource::Attendance, "huge", "2026-03-02", now);
    assert!(matches!(once, Err(CoreError::BalanceOverflow { .. })));
    assert!(!ledger::has_award(&conn, &s.id, PointSource::Attendance, "2026-03-02").expect("lookup"));

    assert_eq!(ledger::get_balance(&conn, &s.id).expect("balance"), 10);
    assert_eq!(ledger::replay_balance(&conn, &s.id).expect("replay"), 10);
    assert_eq!(ledger::list_entries(&conn, &s.id).expect("entries").len(), 1);
    assert!(!ledger::reconcile(&conn, &s.id).expect("reconcile").corrected);

    ledger::award(&conn, &s.id, 1, PointSource::Admin, "still works", now).expect("award");
    ledger::charge(&conn, &s.id, 11, PointSource::Shop, "spend all", now).expect("charge");
    assert_eq!(ledger::get_balance(&conn, &s.id).expect("balance"), 0);
}
