use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current point balance for a user. Lazily initialized to zero on first
/// access; the ledger entries are the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointBalance {
    pub user_id: Uuid,
    pub point: i64,
    pub updated_at: DateTime<Utc>,
}

impl PointBalance {
    pub fn zero(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            point: 0,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryKind {
    Charge,
    Use,
}

/// Append-only audit record for a balance-affecting event. Never mutated or
/// deleted. `reference` ties a USE entry to the finalize intent that caused
/// it so crash recovery can match debits to seat transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub kind: LedgerEntryKind,
    pub reference: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn charge(user_id: Uuid, amount: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            kind: LedgerEntryKind::Charge,
            reference: None,
            created_at: now,
        }
    }

    pub fn usage(
        user_id: Uuid,
        amount: i64,
        reference: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            kind: LedgerEntryKind::Use,
            reference,
            created_at: now,
        }
    }

    /// Contribution of this entry to the balance: charges add, uses subtract.
    pub fn signed_amount(&self) -> i64 {
        match self.kind {
            LedgerEntryKind::Charge => self.amount,
            LedgerEntryKind::Use => -self.amount,
        }
    }
}
