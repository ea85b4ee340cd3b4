use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Free,
    Held,
    Reserved,
}

/// A seat within a concert option. At most one non-expired HELD/RESERVED
/// claim exists per seat at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: Uuid,
    pub concert_option_id: Uuid,
    pub seat_no: i32,
    pub price: i64,
    pub status: SeatStatus,
    pub user_id: Option<Uuid>,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Seat {
    pub fn free(concert_option_id: Uuid, seat_no: i32, price: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            concert_option_id,
            seat_no,
            price,
            status: SeatStatus::Free,
            user_id: None,
            hold_expires_at: None,
            updated_at: now,
        }
    }

    /// A HELD seat whose hold window has lapsed. RESERVED seats never lapse.
    pub fn hold_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Held
            && self.hold_expires_at.map(|at| at < now).unwrap_or(false)
    }

    /// Whether a new hold may claim this seat right now.
    pub fn available_for_hold(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SeatStatus::Free => true,
            SeatStatus::Held => self.hold_lapsed(now),
            SeatStatus::Reserved => false,
        }
    }

    /// FREE (or lapsed HELD) -> HELD for `user_id` until `expires_at`.
    pub fn hold(&self, user_id: Uuid, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> AppResult<Seat> {
        if !self.available_for_hold(now) {
            return Err(AppError::SeatUnavailable { seat_id: self.id });
        }
        let mut held = self.clone();
        held.status = SeatStatus::Held;
        held.user_id = Some(user_id);
        held.hold_expires_at = Some(expires_at);
        held.updated_at = now;
        Ok(held)
    }

    /// HELD -> FREE once the hold window has lapsed.
    pub fn release(&self, now: DateTime<Utc>) -> AppResult<Seat> {
        if self.status != SeatStatus::Held {
            return Err(AppError::InvalidState(format!(
                "cannot release seat {} from {:?}",
                self.id, self.status
            )));
        }
        let mut freed = self.clone();
        freed.status = SeatStatus::Free;
        freed.user_id = None;
        freed.hold_expires_at = None;
        freed.updated_at = now;
        Ok(freed)
    }
}

/// Immutable concert metadata looked up by option id when writing
/// reservation history. Later edits to live concert data never reach
/// records already written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcertSnapshot {
    pub concert_option_id: Uuid,
    pub name: String,
    pub performer: String,
    pub venue: String,
    pub start_at: DateTime<Utc>,
}
