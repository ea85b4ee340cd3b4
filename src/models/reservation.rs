use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::seat::{ConcertSnapshot, Seat};

/// One row of reservation history, written once per seat on successful
/// payment. Snapshots the concert metadata so later edits to the concert
/// never alter what was sold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub seat_id: Uuid,
    pub seat_no: i32,
    pub concert_name: String,
    pub performer: String,
    pub venue: String,
    pub price: i64,
    pub start_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ReservationRecord {
    pub fn from_snapshot(seat: &Seat, snapshot: &ConcertSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: seat.user_id.unwrap_or_default(),
            seat_id: seat.id,
            seat_no: seat.seat_no,
            concert_name: snapshot.name.clone(),
            performer: snapshot.performer.clone(),
            venue: snapshot.venue.clone(),
            price: seat.price,
            start_at: snapshot.start_at,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentState {
    Pending,
    Committed,
}

/// Journal row making the ledger debit and the seat transition one
/// recoverable unit. Written Pending before the debit; marked Committed only
/// after the seats are RESERVED and the history rows exist. Recovery matches
/// Pending intents against USE ledger entries that reference them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeIntent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub total: i64,
    pub state: IntentState,
    pub created_at: DateTime<Utc>,
}

impl FinalizeIntent {
    pub fn pending(user_id: Uuid, seat_ids: Vec<Uuid>, total: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            seat_ids,
            total,
            state: IntentState::Pending,
            created_at: now,
        }
    }
}
