//! Badge rule engine.
//!
//! The catalog is a closed set of plain records keyed by `BadgeType`. Predicates only look at
//! cumulative facts, so a badge that is eligible once stays unlocked; re-running `evaluate` on
//! every page load is safe.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::clock::{fmt_ts, ts_column};
use crate::db;
use crate::error::CoreResult;
use crate::facts::{self, BadgeCheckData};
use crate::leaderboard::TieBreak;
use crate::model::Rarity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeType {
    FirstQuiz,
    QuizMaker,
    QuizMaster,
    VerifiedAuthor,
    FirstAttempt,
    Marathoner,
    Explorer,
    PerfectScore,
    HighAchiever,
    SubjectExpert,
    #[serde(rename = "top_3")]
    Top3,
    TopRanker,
    Sunshine,
    SelfAware,
    GoalGetter,
    GoalCrusher,
    Photogenic,
    Cheerleader,
    KindHeart,
    Regular,
}

impl BadgeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstQuiz => "first_quiz",
            Self::QuizMaker => "quiz_maker",
            Self::QuizMaster => "quiz_master",
            Self::VerifiedAuthor => "verified_author",
            Self::FirstAttempt => "first_attempt",
            Self::Marathoner => "marathoner",
            Self::Explorer => "explorer",
            Self::PerfectScore => "perfect_score",
            Self::HighAchiever => "high_achiever",
            Self::SubjectExpert => "subject_expert",
            Self::Top3 => "top_3",
            Self::TopRanker => "top_ranker",
            Self::Sunshine => "sunshine",
            Self::SelfAware => "self_aware",
            Self::GoalGetter => "goal_getter",
            Self::GoalCrusher => "goal_crusher",
            Self::Photogenic => "photogenic",
            Self::Cheerleader => "cheerleader",
            Self::KindHeart => "kind_heart",
            Self::Regular => "regular",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        CATALOG
            .iter()
            .map(|d| d.badge_type)
            .find(|t| t.as_str() == s)
    }
}

pub struct BadgeDefinition {
    pub badge_type: BadgeType,
    pub rarity: Rarity,
    pub name: &'static str,
    pub description: &'static str,
    pub emoji: &'static str,
    pub predicate: fn(&BadgeCheckData) -> bool,
}

/// Display view of a catalog entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeInfo {
    pub badge_type: BadgeType,
    pub rarity: Rarity,
    pub name: &'static str,
    pub description: &'static str,
    pub emoji: &'static str,
}

impl BadgeDefinition {
    pub fn info(&self) -> BadgeInfo {
        BadgeInfo {
            badge_type: self.badge_type,
            rarity: self.rarity,
            name: self.name,
            description: self.description,
            emoji: self.emoji,
        }
    }
}

const SUBJECT_EXPERT_MIN_ATTEMPTS: usize = 5;

pub static CATALOG: &[BadgeDefinition] = &[
    BadgeDefinition {
        badge_type: BadgeType::FirstQuiz,
        rarity: Rarity::Common,
        name: "Question Starter",
        description: "Write your first quiz",
        emoji: "✏️",
        predicate: |d| d.quizzes_created >= 1,
    },
    BadgeDefinition {
        badge_type: BadgeType::QuizMaker,
        rarity: Rarity::Rare,
        name: "Quiz Maker",
        description: "Write 5 quizzes",
        emoji: "📝",
        predicate: |d| d.quizzes_created >= 5,
    },
    BadgeDefinition {
        badge_type: BadgeType::QuizMaster,
        rarity: Rarity::Epic,
        name: "Quiz Master",
        description: "Write 20 quizzes",
        emoji: "📚",
        predicate: |d| d.quizzes_created >= 20,
    },
    BadgeDefinition {
        badge_type: BadgeType::VerifiedAuthor,
        rarity: Rarity::Rare,
        name: "Trusted Author",
        description: "Have 3 of your quizzes verified by the teacher",
        emoji: "✅",
        predicate: |d| d.quizzes_verified >= 3,
    },
    BadgeDefinition {
        badge_type: BadgeType::FirstAttempt,
        rarity: Rarity::Common,
        name: "First Try",
        description: "Finish your first quiz attempt",
        emoji: "🎯",
        predicate: |d| d.total_attempts >= 1,
    },
    BadgeDefinition {
        badge_type: BadgeType::Marathoner,
        rarity: Rarity::Epic,
        name: "Marathoner",
        description: "Finish 50 quiz attempts",
        emoji: "🏃",
        predicate: |d| d.total_attempts >= 50,
    },
    BadgeDefinition {
        badge_type: BadgeType::Explorer,
        rarity: Rarity::Rare,
        name: "Explorer",
        description: "Solve 10 quizzes written by classmates",
        emoji: "🧭",
        predicate: |d| d.others_quizzes_solved >= 10,
    },
    BadgeDefinition {
        badge_type: BadgeType::PerfectScore,
        rarity: Rarity::Rare,
        name: "Perfect!",
        description: "Score 100 on a quiz",
        emoji: "💯",
        predicate: |d| d.attempt_scores.iter().any(|s| *s >= 100),
    },
    BadgeDefinition {
        badge_type: BadgeType::HighAchiever,
        rarity: Rarity::Epic,
        name: "High Achiever",
        description: "Score 90 or more on 5 quizzes",
        emoji: "🌟",
        predicate: |d| d.scores_at_least(90) >= 5,
    },
    BadgeDefinition {
        badge_type: BadgeType::SubjectExpert,
        rarity: Rarity::Epic,
        name: "Subject Expert",
        description: "Average 90 or more over 5 attempts in one subject",
        emoji: "🎓",
        predicate: |d| {
            d.subject_stats
                .values()
                .any(|s| s.attempts >= SUBJECT_EXPERT_MIN_ATTEMPTS && s.average >= 90.0)
        },
    },
    BadgeDefinition {
        badge_type: BadgeType::Top3,
        rarity: Rarity::Epic,
        name: "Podium",
        description: "Reach the top 3 of the points leaderboard",
        emoji: "🥉",
        predicate: |d| matches!(d.leaderboard_rank, Some(r) if r <= 3),
    },
    BadgeDefinition {
        badge_type: BadgeType::TopRanker,
        rarity: Rarity::Legendary,
        name: "Number One",
        description: "Reach first place on the points leaderboard",
        emoji: "👑",
        predicate: |d| d.leaderboard_rank == Some(1),
    },
    BadgeDefinition {
        badge_type: BadgeType::Sunshine,
        rarity: Rarity::Common,
        name: "Sunshine",
        description: "Check in feeling happy 10 times",
        emoji: "☀️",
        predicate: |d| d.emotion_count("happy") >= 10,
    },
    BadgeDefinition {
        badge_type: BadgeType::SelfAware,
        rarity: Rarity::Rare,
        name: "Feelings Explorer",
        description: "Log 5 different emotions",
        emoji: "🌈",
        predicate: |d| d.distinct_emotions() >= 5,
    },
    BadgeDefinition {
        badge_type: BadgeType::GoalGetter,
        rarity: Rarity::Common,
        name: "Goal Getter",
        description: "Complete a personal goal",
        emoji: "🏁",
        predicate: |d| d.completed_goals >= 1,
    },
    BadgeDefinition {
        badge_type: BadgeType::GoalCrusher,
        rarity: Rarity::Epic,
        name: "Goal Crusher",
        description: "Complete 5 personal goals",
        emoji: "🚀",
        predicate: |d| d.completed_goals >= 5,
    },
    BadgeDefinition {
        badge_type: BadgeType::Photogenic,
        rarity: Rarity::Rare,
        name: "Say Cheese",
        description: "Share your check-in photo 10 times",
        emoji: "📸",
        predicate: |d| d.public_photo_attendance >= 10,
    },
    BadgeDefinition {
        badge_type: BadgeType::Cheerleader,
        rarity: Rarity::Rare,
        name: "Cheerleader",
        description: "Praise classmates 10 times",
        emoji: "📣",
        predicate: |d| d.praises_sent >= 10,
    },
    BadgeDefinition {
        badge_type: BadgeType::KindHeart,
        rarity: Rarity::Legendary,
        name: "Kind Heart",
        description: "Praise classmates 50 times",
        emoji: "💖",
        predicate: |d| d.praises_sent >= 50,
    },
    BadgeDefinition {
        badge_type: BadgeType::Regular,
        rarity: Rarity::Common,
        name: "Regular",
        description: "Check in on 20 school days",
        emoji: "📅",
        predicate: |d| d.attendance_days >= 20,
    },
];

pub fn catalog() -> &'static [BadgeDefinition] {
    CATALOG
}

pub fn definition(badge_type: BadgeType) -> Option<&'static BadgeDefinition> {
    CATALOG.iter().find(|d| d.badge_type == badge_type)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentBadge {
    pub student_id: String,
    pub badge_type: BadgeType,
    pub unlocked_at: DateTime<Utc>,
}

/// Catalog entries not in `unlocked` whose predicate holds for `data`, in catalog order.
pub fn newly_eligible(data: &BadgeCheckData, unlocked: &HashSet<BadgeType>) -> Vec<BadgeType> {
    CATALOG
        .iter()
        .filter(|d| !unlocked.contains(&d.badge_type))
        .filter(|d| (d.predicate)(data))
        .map(|d| d.badge_type)
        .collect()
}

pub fn list_unlocked(conn: &Connection, student_id: &str) -> CoreResult<Vec<StudentBadge>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, badge_type, unlocked_at
         FROM student_badges
         WHERE student_id = ?
         ORDER BY unlocked_at, rowid",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, ts_column(r, 2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(rows.len());
    for (sid, raw_type, unlocked_at) in rows {
        match BadgeType::parse(&raw_type) {
            Some(badge_type) => out.push(StudentBadge {
                student_id: sid,
                badge_type,
                unlocked_at,
            }),
            None => warn!(student_id, badge_type = %raw_type, "skipping unknown badge type"),
        }
    }
    Ok(out)
}

/// Evaluates every locked badge for the student and persists the ones that became eligible.
///
/// Returns only the badge types this call inserted.
pub fn evaluate(
    conn: &Connection,
    student_id: &str,
    tie_break: TieBreak,
    now: DateTime<Utc>,
) -> CoreResult<Vec<BadgeType>> {
    let data = facts::read_badge_check_data(conn, student_id, tie_break)?;
    let unlocked: HashSet<BadgeType> = list_unlocked(conn, student_id)?
        .into_iter()
        .map(|b| b.badge_type)
        .collect();
    let candidates = newly_eligible(&data, &unlocked);
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let tx = db::write_tx(conn)?;
    let mut inserted = Vec::new();
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO student_badges(student_id, badge_type, unlocked_at)
             VALUES(?, ?, ?)",
        )?;
        let unlocked_at = fmt_ts(now);
        for badge_type in candidates {
            // A concurrent evaluation may have inserted it first; only count our own rows.
            if stmt.execute((student_id, badge_type.as_str(), &unlocked_at))? == 1 {
                inserted.push(badge_type);
            }
        }
    }
    tx.commit()?;

    for badge_type in &inserted {
        info!(student_id, badge = badge_type.as_str(), "badge unlocked");
    }
    Ok(inserted)
}
