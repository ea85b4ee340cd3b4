use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::models::point::{LedgerEntry, PointBalance};
use crate::utils::error::AppResult;

/// Durable per-user balance plus the append-only ledger. Exclusive access
/// per user is the caller's obligation (the keyed lock); the store itself
/// only promises consistent individual reads and writes.
pub trait BalanceStore: Send + Sync {
    /// `None` for users never seen; the ledger initializes them lazily.
    fn balance(&self, user_id: Uuid) -> AppResult<Option<PointBalance>>;

    fn upsert(&self, balance: PointBalance) -> AppResult<()>;

    fn append_entry(&self, entry: LedgerEntry) -> AppResult<()>;

    /// Entries for one user, ordered by timestamp ascending (insertion order
    /// breaks ties).
    fn entries_for(&self, user_id: Uuid) -> AppResult<Vec<LedgerEntry>>;

    /// The USE entry (if any) carrying this finalize-intent reference.
    fn entry_with_reference(&self, reference: Uuid) -> AppResult<Option<LedgerEntry>>;
}

#[derive(Default)]
pub struct InMemoryBalanceStore {
    inner: RwLock<BalanceRows>,
}

#[derive(Default)]
struct BalanceRows {
    balances: HashMap<Uuid, PointBalance>,
    entries: Vec<LedgerEntry>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BalanceStore for InMemoryBalanceStore {
    fn balance(&self, user_id: Uuid) -> AppResult<Option<PointBalance>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(inner.balances.get(&user_id).cloned())
    }

    fn upsert(&self, balance: PointBalance) -> AppResult<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.balances.insert(balance.user_id, balance);
        Ok(())
    }

    fn append_entry(&self, entry: LedgerEntry) -> AppResult<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.entries.push(entry);
        Ok(())
    }

    fn entries_for(&self, user_id: Uuid) -> AppResult<Vec<LedgerEntry>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<LedgerEntry> = inner
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    fn entry_with_reference(&self, reference: Uuid) -> AppResult<Option<LedgerEntry>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .entries
            .iter()
            .find(|e| e.reference == Some(reference))
            .cloned())
    }
}
