use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::models::token::TokenStatus;
use crate::store::token::TokenStore;
use crate::sync::{KeyedLock, LockKey};
use crate::utils::error::{AppError, AppResult};

/// Proof that a token was ONGOING and unexpired when checked. Carries no
/// business payload.
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Per-request gate in front of protected operations: only ONGOING,
/// unexpired tokens pass.
pub struct AdmissionGate {
    store: Arc<dyn TokenStore>,
    locks: Arc<KeyedLock>,
}

impl AdmissionGate {
    pub fn new(store: Arc<dyn TokenStore>, locks: Arc<KeyedLock>) -> Self {
        Self { store, locks }
    }

    pub async fn admit(&self, token_id: Uuid) -> AppResult<Admission> {
        let token = self.store.find(token_id)?.ok_or_else(|| {
            AppError::Unauthenticated(format!("no queue token {token_id}"))
        })?;

        let now = Utc::now();
        if token.is_expired(now) {
            // Demote on the way out so the caller knows to re-register. The
            // write runs under the user lock like every other token
            // mutation; re-read in case the sweep demoted it first.
            let _guard = self.locks.acquire(LockKey::User(token.user_id)).await?;
            if let Some(current) = self.store.find(token_id)? {
                if current.is_expired(now) {
                    self.store.update(current.expire(now)?)?;
                }
            }
            return Err(AppError::Expired {
                expired_at: token.expired_at.unwrap_or(now),
            });
        }

        if token.status != TokenStatus::Ongoing {
            return Err(AppError::InvalidState(format!(
                "token {token_id} is {:?}, not admitted",
                token.status
            )));
        }

        debug!(token_id = %token_id, user_id = %token.user_id, "Admission granted");
        Ok(Admission {
            user_id: token.user_id,
            expires_at: token.expired_at.unwrap_or(now),
        })
    }
}
