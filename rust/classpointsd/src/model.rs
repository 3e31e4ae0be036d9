use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Stored as TEXT using the same lowercase keys the IPC layer speaks.
macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                <$ty>::parse(s).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} value: {}", stringify!($ty), s).into())
                })
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Earn,
    Spend,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "earn" => Some(Self::Earn),
            "spend" => Some(Self::Spend),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Earn => "earn",
            Self::Spend => "spend",
        }
    }

    /// Sign applied to the amount when replaying a balance.
    pub fn sign(self) -> i64 {
        match self {
            Self::Earn => 1,
            Self::Spend => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointSource {
    Attendance,
    PraiseGiven,
    PraiseReceived,
    Goal,
    Assignment,
    Shop,
    Admin,
}

impl PointSource {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "attendance" => Some(Self::Attendance),
            "praise_given" => Some(Self::PraiseGiven),
            "praise_received" => Some(Self::PraiseReceived),
            "goal" => Some(Self::Goal),
            "assignment" => Some(Self::Assignment),
            "shop" => Some(Self::Shop),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attendance => "attendance",
            Self::PraiseGiven => "praise_given",
            Self::PraiseReceived => "praise_received",
            Self::Goal => "goal",
            Self::Assignment => "assignment",
            Self::Shop => "shop",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Completed,
    Failed,
}

impl GoalStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponStatus {
    Unused,
    Pending,
    Approved,
    Expired,
}

impl CouponStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unused" => Some(Self::Unused),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Expired)
    }
}

text_column!(Direction);
text_column!(PointSource);
text_column!(GoalStatus);
text_column!(CouponStatus);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_round_trip_through_keys() {
        for s in [
            PointSource::Attendance,
            PointSource::PraiseGiven,
            PointSource::PraiseReceived,
            PointSource::Goal,
            PointSource::Assignment,
            PointSource::Shop,
            PointSource::Admin,
        ] {
            assert_eq!(PointSource::parse(s.as_str()), Some(s));
        }
        assert_eq!(PointSource::parse("bonus"), None);
    }

    #[test]
    fn only_approved_and_expired_coupons_are_terminal() {
        assert!(!CouponStatus::Unused.is_terminal());
        assert!(!CouponStatus::Pending.is_terminal());
        assert!(CouponStatus::Approved.is_terminal());
        assert!(CouponStatus::Expired.is_terminal());
    }
}
