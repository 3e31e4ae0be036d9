use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Per-operation outcomes of the rewards engine. None of these are fatal to the process.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not enough points: balance {balance}, required {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    #[error("cannot {action} a coupon that is {from}")]
    InvalidTransition { from: String, action: &'static str },

    #[error("goal already checked on this date")]
    GoalAlreadyCheckedToday,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("amount must be a positive integer, got {0}")]
    InvalidAmount(i64),

    #[error("awarding {amount} points to a balance of {balance} exceeds the largest balance")]
    BalanceOverflow { balance: i64, amount: i64 },

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Stable machine-readable code used in IPC error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::GoalAlreadyCheckedToday => "already_checked",
            Self::NotFound { .. } => "not_found",
            Self::InvalidAmount(_) | Self::BalanceOverflow { .. } | Self::InvalidInput(_) => {
                "bad_params"
            }
            Self::Store(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientBalance { balance, required } => Some(serde_json::json!({
                "balance": balance,
                "required": required,
            })),
            Self::BalanceOverflow { balance, amount } => Some(serde_json::json!({
                "balance": balance,
                "amount": amount,
            })),
            Self::InvalidTransition { from, action } => Some(serde_json::json!({
                "from": from,
                "action": action,
            })),
            _ => None,
        }
    }
}
