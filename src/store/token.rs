use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::token::{Token, TokenStatus};
use crate::utils::error::{AppError, AppResult};

/// Durable rows for queue tokens. Listing by status is ordered by
/// (created_at, id) so ranks stay total-ordered under created_at ties;
/// `update_status_bulk` applies the whole id list or nothing.
pub trait TokenStore: Send + Sync {
    fn insert(&self, token: Token) -> AppResult<()>;

    fn update(&self, token: Token) -> AppResult<()>;

    fn find(&self, token_id: Uuid) -> AppResult<Option<Token>>;

    /// The single token (if any) for `user_id` whose status is in `statuses`.
    fn find_by_user_in(&self, user_id: Uuid, statuses: &[TokenStatus]) -> AppResult<Option<Token>>;

    fn list_by_status(&self, status: TokenStatus, limit: Option<usize>) -> AppResult<Vec<Token>>;

    fn count_by_status(&self, status: TokenStatus) -> AppResult<usize>;

    /// Atomic batch transition. `expired_at` of `Some(_)` overwrites the
    /// deadline on every row; `None` leaves existing deadlines in place. An
    /// unknown id fails the whole batch with no row touched.
    fn update_status_bulk(
        &self,
        ids: &[Uuid],
        status: TokenStatus,
        expired_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<()>;
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    rows: RwLock<HashMap<Uuid, Token>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, Token>> {
        self.rows.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Token>> {
        self.rows.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenStore for InMemoryTokenStore {
    fn insert(&self, token: Token) -> AppResult<()> {
        let mut rows = self.write();
        if rows.contains_key(&token.id) {
            return Err(AppError::Internal(format!(
                "token {} already exists",
                token.id
            )));
        }
        rows.insert(token.id, token);
        Ok(())
    }

    fn update(&self, token: Token) -> AppResult<()> {
        let mut rows = self.write();
        if !rows.contains_key(&token.id) {
            return Err(AppError::Internal(format!("token {} missing", token.id)));
        }
        rows.insert(token.id, token);
        Ok(())
    }

    fn find(&self, token_id: Uuid) -> AppResult<Option<Token>> {
        Ok(self.read().get(&token_id).cloned())
    }

    fn find_by_user_in(&self, user_id: Uuid, statuses: &[TokenStatus]) -> AppResult<Option<Token>> {
        Ok(self
            .read()
            .values()
            .find(|t| t.user_id == user_id && statuses.contains(&t.status))
            .cloned())
    }

    fn list_by_status(&self, status: TokenStatus, limit: Option<usize>) -> AppResult<Vec<Token>> {
        let mut tokens: Vec<Token> = self
            .read()
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        tokens.sort_by_key(|t| (t.created_at, t.id));
        if let Some(limit) = limit {
            tokens.truncate(limit);
        }
        Ok(tokens)
    }

    fn count_by_status(&self, status: TokenStatus) -> AppResult<usize> {
        Ok(self.read().values().filter(|t| t.status == status).count())
    }

    fn update_status_bulk(
        &self,
        ids: &[Uuid],
        status: TokenStatus,
        expired_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut rows = self.write();
        // Validate everything before touching anything; a batch commits
        // whole or not at all.
        for id in ids {
            if !rows.contains_key(id) {
                return Err(AppError::Internal(format!(
                    "bulk status update refers to unknown token {id}"
                )));
            }
        }
        for id in ids {
            if let Some(token) = rows.get_mut(id) {
                token.status = status;
                if let Some(at) = expired_at {
                    token.expired_at = Some(at);
                }
                token.updated_at = now;
            }
        }
        Ok(())
    }
}
