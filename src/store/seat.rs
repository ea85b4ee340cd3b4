use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::reservation::{FinalizeIntent, IntentState, ReservationRecord};
use crate::models::seat::{ConcertSnapshot, Seat, SeatStatus};
use crate::utils::error::{AppError, AppResult};

/// Durable seat-hold state, immutable reservation history, concert metadata
/// snapshots and the finalize-intent journal.
pub trait SeatStore: Send + Sync {
    fn insert_seat(&self, seat: Seat) -> AppResult<()>;

    fn seat(&self, seat_id: Uuid) -> AppResult<Option<Seat>>;

    fn update_seat(&self, seat: Seat) -> AppResult<()>;

    fn seats_by_user_and_status(&self, user_id: Uuid, status: SeatStatus) -> AppResult<Vec<Seat>>;

    fn seats_by_status(&self, status: SeatStatus) -> AppResult<Vec<Seat>>;

    /// Atomic batch HELD -> RESERVED for seats held by `user_id`. A seat
    /// that is missing, not HELD, or held by someone else fails the whole
    /// batch with no seat touched. Hold expiry is deliberately not checked
    /// here: recovery must be able to complete a paid batch whose holds
    /// lapsed while the process was down.
    fn reserve_bulk(&self, seat_ids: &[Uuid], user_id: Uuid, now: DateTime<Utc>)
        -> AppResult<Vec<Seat>>;

    fn insert_snapshot(&self, snapshot: ConcertSnapshot) -> AppResult<()>;

    fn snapshot(&self, concert_option_id: Uuid) -> AppResult<Option<ConcertSnapshot>>;

    fn append_record(&self, record: ReservationRecord) -> AppResult<()>;

    fn records_for(&self, user_id: Uuid) -> AppResult<Vec<ReservationRecord>>;

    fn insert_intent(&self, intent: FinalizeIntent) -> AppResult<()>;

    fn pending_intents(&self) -> AppResult<Vec<FinalizeIntent>>;

    fn mark_intent_committed(&self, intent_id: Uuid) -> AppResult<()>;

    fn remove_intent(&self, intent_id: Uuid) -> AppResult<()>;
}

#[derive(Default)]
pub struct InMemorySeatStore {
    inner: RwLock<SeatRows>,
}

#[derive(Default)]
struct SeatRows {
    seats: HashMap<Uuid, Seat>,
    snapshots: HashMap<Uuid, ConcertSnapshot>,
    records: Vec<ReservationRecord>,
    intents: HashMap<Uuid, FinalizeIntent>,
}

impl InMemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SeatRows> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SeatRows> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl SeatStore for InMemorySeatStore {
    fn insert_seat(&self, seat: Seat) -> AppResult<()> {
        self.write().seats.insert(seat.id, seat);
        Ok(())
    }

    fn seat(&self, seat_id: Uuid) -> AppResult<Option<Seat>> {
        Ok(self.read().seats.get(&seat_id).cloned())
    }

    fn update_seat(&self, seat: Seat) -> AppResult<()> {
        let mut rows = self.write();
        if !rows.seats.contains_key(&seat.id) {
            return Err(AppError::Internal(format!("seat {} missing", seat.id)));
        }
        rows.seats.insert(seat.id, seat);
        Ok(())
    }

    fn seats_by_user_and_status(&self, user_id: Uuid, status: SeatStatus) -> AppResult<Vec<Seat>> {
        let mut seats: Vec<Seat> = self
            .read()
            .seats
            .values()
            .filter(|s| s.user_id == Some(user_id) && s.status == status)
            .cloned()
            .collect();
        seats.sort_by_key(|s| s.id);
        Ok(seats)
    }

    fn seats_by_status(&self, status: SeatStatus) -> AppResult<Vec<Seat>> {
        let mut seats: Vec<Seat> = self
            .read()
            .seats
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        seats.sort_by_key(|s| s.id);
        Ok(seats)
    }

    fn reserve_bulk(
        &self,
        seat_ids: &[Uuid],
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Seat>> {
        let mut rows = self.write();
        for id in seat_ids {
            match rows.seats.get(id) {
                Some(seat) if seat.status == SeatStatus::Held && seat.user_id == Some(user_id) => {}
                Some(_) => return Err(AppError::SeatUnavailable { seat_id: *id }),
                None => {
                    return Err(AppError::Internal(format!(
                        "reserve refers to unknown seat {id}"
                    )))
                }
            }
        }
        let mut reserved = Vec::with_capacity(seat_ids.len());
        for id in seat_ids {
            if let Some(seat) = rows.seats.get_mut(id) {
                seat.status = SeatStatus::Reserved;
                seat.hold_expires_at = None;
                seat.updated_at = now;
                reserved.push(seat.clone());
            }
        }
        Ok(reserved)
    }

    fn insert_snapshot(&self, snapshot: ConcertSnapshot) -> AppResult<()> {
        self.write()
            .snapshots
            .insert(snapshot.concert_option_id, snapshot);
        Ok(())
    }

    fn snapshot(&self, concert_option_id: Uuid) -> AppResult<Option<ConcertSnapshot>> {
        Ok(self.read().snapshots.get(&concert_option_id).cloned())
    }

    fn append_record(&self, record: ReservationRecord) -> AppResult<()> {
        self.write().records.push(record);
        Ok(())
    }

    fn records_for(&self, user_id: Uuid) -> AppResult<Vec<ReservationRecord>> {
        let mut records: Vec<ReservationRecord> = self
            .read()
            .records
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn insert_intent(&self, intent: FinalizeIntent) -> AppResult<()> {
        self.write().intents.insert(intent.id, intent);
        Ok(())
    }

    fn pending_intents(&self) -> AppResult<Vec<FinalizeIntent>> {
        let mut intents: Vec<FinalizeIntent> = self
            .read()
            .intents
            .values()
            .filter(|i| i.state == IntentState::Pending)
            .cloned()
            .collect();
        intents.sort_by_key(|i| i.created_at);
        Ok(intents)
    }

    fn mark_intent_committed(&self, intent_id: Uuid) -> AppResult<()> {
        let mut rows = self.write();
        match rows.intents.get_mut(&intent_id) {
            Some(intent) => {
                intent.state = IntentState::Committed;
                Ok(())
            }
            None => Err(AppError::Internal(format!(
                "finalize intent {intent_id} missing"
            ))),
        }
    }

    fn remove_intent(&self, intent_id: Uuid) -> AppResult<()> {
        self.write().intents.remove(&intent_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_bulk_rejects_foreign_holds_atomically() {
        let store = InMemorySeatStore::new();
        let now = Utc::now();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let mine = Seat::free(Uuid::new_v4(), 1, 500, now)
            .hold(owner, now + chrono::Duration::minutes(5), now)
            .unwrap();
        let theirs = Seat::free(Uuid::new_v4(), 2, 500, now)
            .hold(stranger, now + chrono::Duration::minutes(5), now)
            .unwrap();
        store.insert_seat(mine.clone()).unwrap();
        store.insert_seat(theirs.clone()).unwrap();

        let result = store.reserve_bulk(&[mine.id, theirs.id], owner, now);
        assert!(result.is_err());
        assert_eq!(
            store.seat(mine.id).unwrap().unwrap().status,
            SeatStatus::Held
        );
    }
}
