use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenStatus {
    Wait,
    Ongoing,
    Done,
}

/// Per-user queue ticket encoding waiting position and admission state.
///
/// Status only ever moves forward: WAIT -> ONGOING -> DONE. Tokens are
/// retained after reaching DONE for audit; transitions validate the current
/// status and return a typed failure instead of mutating silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: Uuid,
    pub user_id: Uuid,
    pub waiting_number: i64,
    pub status: TokenStatus,
    pub expired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Token {
    pub fn new_waiting(user_id: Uuid, waiting_number: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            waiting_number,
            status: TokenStatus::Wait,
            expired_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// WAIT -> ONGOING. Sets the admission deadline to `now + ttl`.
    pub fn promote(&self, now: DateTime<Utc>, ttl: Duration) -> AppResult<Token> {
        if self.status != TokenStatus::Wait {
            return Err(AppError::InvalidState(format!(
                "cannot promote token {} from {:?}",
                self.id, self.status
            )));
        }
        let mut promoted = self.clone();
        promoted.status = TokenStatus::Ongoing;
        promoted.expired_at = Some(now + ttl);
        promoted.updated_at = now;
        Ok(promoted)
    }

    /// ONGOING -> DONE.
    pub fn expire(&self, now: DateTime<Utc>) -> AppResult<Token> {
        if self.status != TokenStatus::Ongoing {
            return Err(AppError::InvalidState(format!(
                "cannot expire token {} from {:?}",
                self.id, self.status
            )));
        }
        let mut done = self.clone();
        done.status = TokenStatus::Done;
        done.updated_at = now;
        Ok(done)
    }

    /// An ONGOING token past its deadline. WAIT and DONE tokens carry no
    /// deadline and are never "expired" in this sense.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == TokenStatus::Ongoing
            && self.expired_at.map(|at| at < now).unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TokenStatus::Wait | TokenStatus::Ongoing)
    }
}
