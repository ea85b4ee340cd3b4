use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::models::token::{Token, TokenStatus};
use crate::store::token::TokenStore;
use crate::sync::{KeyedLock, LockKey};
use crate::utils::error::{AppError, AppResult};

/// What one sweep cycle applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub promoted: usize,
}

/// Issues queue tokens, computes waiting rank, and runs the periodic
/// promote/expire sweep. Capacity and token TTL come from [`QueueConfig`] at
/// construction.
pub struct QueueManager {
    store: Arc<dyn TokenStore>,
    locks: Arc<KeyedLock>,
    config: QueueConfig,
}

impl QueueManager {
    pub fn new(store: Arc<dyn TokenStore>, locks: Arc<KeyedLock>, config: QueueConfig) -> Self {
        Self {
            store,
            locks,
            config,
        }
    }

    /// Create a WAIT token for `user_id`. A user with a live (WAIT or
    /// ONGOING) token cannot register again until it reaches DONE.
    pub async fn register(&self, user_id: Uuid) -> AppResult<Token> {
        let _guard = self.locks.acquire(LockKey::User(user_id)).await?;

        let live = self
            .store
            .find_by_user_in(user_id, &[TokenStatus::Wait, TokenStatus::Ongoing])?;
        if live.is_some() {
            return Err(AppError::AlreadyRegistered { user_id });
        }

        let now = Utc::now();
        let mut token = Token::new_waiting(user_id, 0, now);
        self.store.insert(token.clone())?;

        token.waiting_number = self.rank_among_waiting(token.id)?;
        self.store.update(token.clone())?;

        info!(user_id = %user_id, token_id = %token.id, waiting_number = token.waiting_number, "Registered in queue");
        Ok(token)
    }

    /// Current 1-based rank among WAIT tokens, ordered by (created_at, id).
    /// The id tiebreak keeps the order total, so no two waiting tokens ever
    /// report the same rank.
    pub async fn rank_of(&self, token_id: Uuid) -> AppResult<i64> {
        let token = self
            .store
            .find(token_id)?
            .ok_or_else(|| AppError::NotFound(format!("token {token_id}")))?;

        match token.status {
            TokenStatus::Wait => self.rank_among_waiting(token_id),
            TokenStatus::Ongoing => Err(AppError::InvalidState(format!(
                "token {token_id} is already admitted"
            ))),
            TokenStatus::Done => Err(AppError::InvalidState(format!(
                "token {token_id} already left the queue"
            ))),
        }
    }

    fn rank_among_waiting(&self, token_id: Uuid) -> AppResult<i64> {
        let waiting = self.store.list_by_status(TokenStatus::Wait, None)?;
        waiting
            .iter()
            .position(|t| t.id == token_id)
            .map(|idx| idx as i64 + 1)
            .ok_or_else(|| AppError::NotFound(format!("waiting token {token_id}")))
    }

    /// Periodic sweep: expire stale ONGOING tokens to DONE, then promote the
    /// oldest WAIT tokens into the freed capacity. Each phase commits as one
    /// atomic batch; a failed batch is discarded whole and retried on the
    /// next tick. The sweep lock serializes concurrent scheduler instances
    /// so capacity is never oversubscribed.
    pub async fn sweep_expired(&self) -> AppResult<SweepReport> {
        let _guard = self.locks.acquire(LockKey::Sweep).await?;
        let now = Utc::now();

        let stale: Vec<Token> = self
            .store
            .list_by_status(TokenStatus::Ongoing, None)?
            .into_iter()
            .filter(|t| t.is_expired(now))
            .collect();
        if !stale.is_empty() {
            for token in &stale {
                token.expire(now)?;
            }
            let ids: Vec<Uuid> = stale.iter().map(|t| t.id).collect();
            self.store
                .update_status_bulk(&ids, TokenStatus::Done, None, now)?;
        }

        let ongoing = self.store.count_by_status(TokenStatus::Ongoing)?;
        let available = self.config.max_concurrent.saturating_sub(ongoing);

        let mut promoted = 0;
        if available > 0 {
            let next = self.store.list_by_status(TokenStatus::Wait, Some(available))?;
            if !next.is_empty() {
                for token in &next {
                    token.promote(now, self.config.token_ttl)?;
                }
                let ids: Vec<Uuid> = next.iter().map(|t| t.id).collect();
                self.store.update_status_bulk(
                    &ids,
                    TokenStatus::Ongoing,
                    Some(now + self.config.token_ttl),
                    now,
                )?;
                promoted = ids.len();
            }
        }

        let report = SweepReport {
            expired: stale.len(),
            promoted,
        };
        if report.expired > 0 || report.promoted > 0 {
            info!(expired = report.expired, promoted = report.promoted, "Queue sweep applied");
        } else {
            debug!("Queue sweep found nothing to do");
        }
        Ok(report)
    }

    /// Validate that a token still exists, has not already left the queue,
    /// and has not outlived its admission window. An expired token is
    /// demoted to DONE as a side effect so the caller learns to re-register
    /// rather than retry.
    pub async fn check_ongoing(&self, token_id: Uuid) -> AppResult<Token> {
        let token = self
            .store
            .find(token_id)?
            .ok_or_else(|| AppError::NotFound(format!("token {token_id}")))?;

        if token.status == TokenStatus::Done {
            return Err(AppError::InvalidState(format!(
                "token {token_id} already left the queue"
            )));
        }

        let now = Utc::now();
        if token.is_expired(now) {
            // The demotion is a write, so it runs under the user lock like
            // every other token mutation; re-read in case the sweep won.
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
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockConfig;
    use crate::store::token::InMemoryTokenStore;
    use chrono::Duration;

    fn manager(max_concurrent: usize) -> (QueueManager, Arc<InMemoryTokenStore>) {
        let store = Arc::new(InMemoryTokenStore::new());
        let locks = Arc::new(KeyedLock::new(&LockConfig::default()));
        let config = QueueConfig {
            max_concurrent,
            token_ttl: Duration::minutes(5),
        };
        (
            QueueManager::new(store.clone(), locks, config),
            store,
        )
    }

    #[tokio::test]
    async fn first_registration_waits_at_rank_one() {
        let (queue, _) = manager(5);
        let token = queue.register(Uuid::new_v4()).await.unwrap();
        assert_eq!(token.status, TokenStatus::Wait);
        assert_eq!(token.waiting_number, 1);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let (queue, _) = manager(5);
        let user = Uuid::new_v4();
        queue.register(user).await.unwrap();

        let err = queue.register(user).await.unwrap_err();
        assert_eq!(err.code(), "ALREADY_REGISTERED");
    }

    #[tokio::test]
    async fn registration_reopens_once_the_token_is_done() {
        let (queue, store) = manager(1);
        let user = Uuid::new_v4();
        let token = queue.register(user).await.unwrap();
        queue.sweep_expired().await.unwrap();
        assert!(queue.register(user).await.is_err());

        // Push the admitted token past its deadline and sweep it out.
        let mut admitted = store.find(token.id).unwrap().unwrap();
        admitted.expired_at = Some(Utc::now() - Duration::seconds(1));
        store.update(admitted).unwrap();
        queue.sweep_expired().await.unwrap();

        assert!(queue.register(user).await.is_ok());
    }

    #[tokio::test]
    async fn sweep_promotes_oldest_waiters_up_to_capacity() {
        let (queue, store) = manager(5);
        let first = queue.register(Uuid::new_v4()).await.unwrap();

        let report = queue.sweep_expired().await.unwrap();
        assert_eq!(report, SweepReport { expired: 0, promoted: 1 });

        let promoted = store.find(first.id).unwrap().unwrap();
        assert_eq!(promoted.status, TokenStatus::Ongoing);
        assert!(promoted.expired_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn ongoing_count_never_exceeds_capacity() {
        let (queue, store) = manager(3);
        for _ in 0..10 {
            queue.register(Uuid::new_v4()).await.unwrap();
        }
        queue.sweep_expired().await.unwrap();
        assert_eq!(store.count_by_status(TokenStatus::Ongoing).unwrap(), 3);
        assert_eq!(store.count_by_status(TokenStatus::Wait).unwrap(), 7);
    }

    #[tokio::test]
    async fn sweep_is_idempotent_between_ticks() {
        let (queue, store) = manager(3);
        for _ in 0..5 {
            queue.register(Uuid::new_v4()).await.unwrap();
        }
        let first = queue.sweep_expired().await.unwrap();
        assert_eq!(first.promoted, 3);

        let second = queue.sweep_expired().await.unwrap();
        assert_eq!(second, SweepReport::default());
        assert_eq!(store.count_by_status(TokenStatus::Ongoing).unwrap(), 3);
    }

    #[tokio::test]
    async fn sweep_expires_stale_tokens_then_backfills() {
        let (queue, store) = manager(2);
        let a = queue.register(Uuid::new_v4()).await.unwrap();
        let b = queue.register(Uuid::new_v4()).await.unwrap();
        let c = queue.register(Uuid::new_v4()).await.unwrap();
        queue.sweep_expired().await.unwrap();

        for id in [a.id, b.id] {
            let mut token = store.find(id).unwrap().unwrap();
            token.expired_at = Some(Utc::now() - Duration::seconds(1));
            store.update(token).unwrap();
        }

        let report = queue.sweep_expired().await.unwrap();
        assert_eq!(report.expired, 2);
        assert_eq!(report.promoted, 1);
        assert_eq!(store.find(a.id).unwrap().unwrap().status, TokenStatus::Done);
        assert_eq!(store.find(c.id).unwrap().unwrap().status, TokenStatus::Ongoing);
    }

    #[tokio::test]
    async fn ranks_follow_arrival_order_and_stay_distinct() {
        let (queue, _) = manager(0);
        let mut tokens = Vec::new();
        for _ in 0..4 {
            tokens.push(queue.register(Uuid::new_v4()).await.unwrap());
        }

        let mut ranks = Vec::new();
        for token in &tokens {
            ranks.push(queue.rank_of(token.id).await.unwrap());
        }
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn rank_moves_up_as_the_line_drains() {
        let (queue, _) = manager(1);
        let _head = queue.register(Uuid::new_v4()).await.unwrap();
        let tail = queue.register(Uuid::new_v4()).await.unwrap();
        assert_eq!(queue.rank_of(tail.id).await.unwrap(), 2);

        queue.sweep_expired().await.unwrap();
        assert_eq!(queue.rank_of(tail.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn check_ongoing_demotes_an_expired_token() {
        let (queue, store) = manager(1);
        let token = queue.register(Uuid::new_v4()).await.unwrap();
        queue.sweep_expired().await.unwrap();

        let mut admitted = store.find(token.id).unwrap().unwrap();
        admitted.expired_at = Some(Utc::now() - Duration::seconds(1));
        store.update(admitted).unwrap();

        let err = queue.check_ongoing(token.id).await.unwrap_err();
        assert_eq!(err.code(), "EXPIRED");
        assert_eq!(
            store.find(token.id).unwrap().unwrap().status,
            TokenStatus::Done
        );
    }

    #[tokio::test]
    async fn check_ongoing_distinguishes_missing_from_expired() {
        let (queue, _) = manager(1);
        let err = queue.check_ongoing(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn check_ongoing_rejects_a_retired_token() {
        let (queue, store) = manager(1);
        let token = queue.register(Uuid::new_v4()).await.unwrap();
        queue.sweep_expired().await.unwrap();

        let admitted = store.find(token.id).unwrap().unwrap();
        store.update(admitted.expire(Utc::now()).unwrap()).unwrap();

        let err = queue.check_ongoing(token.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[tokio::test]
    async fn expired_check_demotes_under_the_user_lock() {
        let store = Arc::new(InMemoryTokenStore::new());
        let locks = Arc::new(KeyedLock::new(&LockConfig {
            wait_timeout: std::time::Duration::from_millis(50),
        }));
        let queue = QueueManager::new(
            store.clone(),
            locks.clone(),
            QueueConfig {
                max_concurrent: 1,
                token_ttl: Duration::minutes(5),
            },
        );

        let user = Uuid::new_v4();
        let token = queue.register(user).await.unwrap();
        queue.sweep_expired().await.unwrap();
        let mut admitted = store.find(token.id).unwrap().unwrap();
        admitted.expired_at = Some(Utc::now() - Duration::seconds(1));
        store.update(admitted).unwrap();

        // While another holder owns the user lock the demotion cannot run;
        // the check surfaces the transient timeout and writes nothing.
        let held = locks.acquire(LockKey::User(user)).await.unwrap();
        let err = queue.check_ongoing(token.id).await.unwrap_err();
        assert_eq!(err.code(), "LOCK_TIMEOUT");
        assert_eq!(
            store.find(token.id).unwrap().unwrap().status,
            TokenStatus::Ongoing
        );
        drop(held);

        let err = queue.check_ongoing(token.id).await.unwrap_err();
        assert_eq!(err.code(), "EXPIRED");
        assert_eq!(
            store.find(token.id).unwrap().unwrap().status,
            TokenStatus::Done
        );
    }
}
