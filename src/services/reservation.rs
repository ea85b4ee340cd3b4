use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::reservation::{FinalizeIntent, ReservationRecord};
use crate::models::seat::{Seat, SeatStatus};
use crate::services::ledger::PointLedger;
use crate::store::seat::SeatStore;
use crate::sync::{KeyedLock, LockKey};
use crate::utils::error::{AppError, AppResult};

/// Temporary seat holds, finalized atomically with a ledger debit.
///
/// The debit and the seat transition form one recoverable unit: finalize
/// journals a pending intent before debiting, tags the USE ledger entry with
/// the intent id, and commits the intent only after the seats are RESERVED
/// and the history rows exist. `recover_pending` replays whatever a crash
/// left behind.
pub struct SeatReservationCoordinator {
    seats: Arc<dyn SeatStore>,
    ledger: Arc<PointLedger>,
    locks: Arc<KeyedLock>,
}

impl SeatReservationCoordinator {
    pub fn new(seats: Arc<dyn SeatStore>, ledger: Arc<PointLedger>, locks: Arc<KeyedLock>) -> Self {
        Self {
            seats,
            ledger,
            locks,
        }
    }

    /// Hold every seat in `seat_ids` for `user_id` until `now + ttl`, or
    /// hold none of them. Seat locks are taken in sorted order.
    pub async fn hold_seats(
        &self,
        user_id: Uuid,
        seat_ids: &[Uuid],
        ttl: Duration,
    ) -> AppResult<Vec<Seat>> {
        if seat_ids.is_empty() {
            return Err(AppError::ValidationError(
                "at least one seat is required".to_string(),
            ));
        }
        let mut unique = seat_ids.to_vec();
        unique.sort();
        unique.dedup();
        if unique.len() != seat_ids.len() {
            return Err(AppError::ValidationError(
                "duplicate seat in hold request".to_string(),
            ));
        }

        let keys: Vec<LockKey> = seat_ids.iter().map(|id| LockKey::Seat(*id)).collect();
        let _guards = self.locks.acquire_many(keys).await?;

        let now = Utc::now();
        let mut current = Vec::with_capacity(seat_ids.len());
        for id in seat_ids {
            let seat = self
                .seats
                .seat(*id)?
                .ok_or_else(|| AppError::NotFound(format!("seat {id}")))?;
            if !seat.available_for_hold(now) {
                return Err(AppError::SeatUnavailable { seat_id: *id });
            }
            current.push(seat);
        }

        // Everything validated under the locks; now the whole batch applies.
        let expires_at = now + ttl;
        let mut held = Vec::with_capacity(current.len());
        for seat in current {
            let claimed = seat.hold(user_id, expires_at, now)?;
            self.seats.update_seat(claimed.clone())?;
            held.push(claimed);
        }

        info!(user_id = %user_id, seats = held.len(), expires_at = %expires_at, "Seats held");
        Ok(held)
    }

    /// Pay for the caller's live holds and turn them into reservations.
    /// A failed debit leaves every seat HELD and no ledger entry behind.
    pub async fn finalize(&self, user_id: Uuid) -> AppResult<Vec<ReservationRecord>> {
        let candidates = self.live_holds(user_id)?;
        if candidates.is_empty() {
            return Err(AppError::NotFound(format!(
                "no held seats for user {user_id}"
            )));
        }

        let candidate_ids: Vec<Uuid> = candidates.iter().map(|s| s.id).collect();
        let keys: Vec<LockKey> = candidate_ids.iter().map(|id| LockKey::Seat(*id)).collect();
        let _guards = self.locks.acquire_many(keys).await?;

        // Re-read under the locks; a hold may have lapsed in between. Seats
        // held after the lock snapshot are left for the next finalize call.
        let held: Vec<Seat> = self
            .live_holds(user_id)?
            .into_iter()
            .filter(|s| candidate_ids.contains(&s.id))
            .collect();
        if held.is_empty() {
            return Err(AppError::NotFound(format!(
                "no held seats for user {user_id}"
            )));
        }

        // Concert metadata must exist before any money moves.
        for seat in &held {
            if self.seats.snapshot(seat.concert_option_id)?.is_none() {
                return Err(AppError::Internal(format!(
                    "no concert snapshot for option {}",
                    seat.concert_option_id
                )));
            }
        }

        let now = Utc::now();
        let seat_ids: Vec<Uuid> = held.iter().map(|s| s.id).collect();
        let total: i64 = held.iter().map(|s| s.price).sum();

        let intent = FinalizeIntent::pending(user_id, seat_ids.clone(), total, now);
        let intent_id = intent.id;
        self.seats.insert_intent(intent)?;

        if let Err(err) = self
            .ledger
            .use_with_reference(user_id, total, Some(intent_id))
            .await
        {
            // No debit happened; drop the intent and leave the seats HELD.
            self.seats.remove_intent(intent_id)?;
            return Err(err);
        }

        let records = self.complete_reservation(&seat_ids, user_id)?;
        self.seats.mark_intent_committed(intent_id)?;

        info!(user_id = %user_id, seats = records.len(), total, "Reservation finalized");
        Ok(records)
    }

    /// Crash recovery: a pending intent with a matching USE ledger entry was
    /// paid, so its seat transition is completed; one without was never
    /// debited and is discarded. Run at startup before the sweeper starts.
    pub async fn recover_pending(&self) -> AppResult<usize> {
        let pending = self.seats.pending_intents()?;
        let mut recovered = 0;

        for intent in pending {
            let keys: Vec<LockKey> = intent.seat_ids.iter().map(|id| LockKey::Seat(*id)).collect();
            let _guards = self.locks.acquire_many(keys).await?;

            match self.ledger.entry_for_reference(intent.id)? {
                Some(_) => {
                    warn!(intent_id = %intent.id, user_id = %intent.user_id, "Completing interrupted finalize");
                    self.complete_reservation(&intent.seat_ids, intent.user_id)?;
                    self.seats.mark_intent_committed(intent.id)?;
                }
                None => {
                    warn!(intent_id = %intent.id, user_id = %intent.user_id, "Discarding unpaid finalize intent");
                    self.seats.remove_intent(intent.id)?;
                }
            }
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Periodic sweep: HELD seats whose window lapsed go back to FREE.
    pub async fn release_expired_holds(&self) -> AppResult<usize> {
        let now = Utc::now();
        let lapsed: Vec<Seat> = self
            .seats
            .seats_by_status(SeatStatus::Held)?
            .into_iter()
            .filter(|s| s.hold_lapsed(now))
            .collect();

        let mut released = 0;
        for seat in lapsed {
            let _guard = self.locks.acquire(LockKey::Seat(seat.id)).await?;
            // Re-read under the lock; finalize may have won the race.
            if let Some(current) = self.seats.seat(seat.id)? {
                if current.hold_lapsed(now) {
                    self.seats.update_seat(current.release(now)?)?;
                    released += 1;
                }
            }
        }

        if released > 0 {
            info!(released, "Expired seat holds released");
        }
        Ok(released)
    }

    fn live_holds(&self, user_id: Uuid) -> AppResult<Vec<Seat>> {
        let now = Utc::now();
        Ok(self
            .seats
            .seats_by_user_and_status(user_id, SeatStatus::Held)?
            .into_iter()
            .filter(|s| !s.hold_lapsed(now))
            .collect())
    }

    /// Transition the paid seats to RESERVED and write their history rows.
    /// Idempotent so recovery can resume at any point: already-reserved
    /// seats are skipped, as are seats that already have a record.
    fn complete_reservation(
        &self,
        seat_ids: &[Uuid],
        user_id: Uuid,
    ) -> AppResult<Vec<ReservationRecord>> {
        let now = Utc::now();
        let still_held: Vec<Uuid> = seat_ids
            .iter()
            .copied()
            .filter(|id| {
                matches!(
                    self.seats.seat(*id),
                    Ok(Some(seat)) if seat.status == SeatStatus::Held
                )
            })
            .collect();
        if !still_held.is_empty() {
            self.seats.reserve_bulk(&still_held, user_id, now)?;
        }

        let existing: Vec<Uuid> = self
            .seats
            .records_for(user_id)?
            .iter()
            .map(|r| r.seat_id)
            .collect();

        let mut records = Vec::with_capacity(seat_ids.len());
        for id in seat_ids {
            let seat = self
                .seats
                .seat(*id)?
                .ok_or_else(|| AppError::Internal(format!("reserved seat {id} missing")))?;
            if existing.contains(id) {
                continue;
            }
            let snapshot = self
                .seats
                .snapshot(seat.concert_option_id)?
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "no concert snapshot for option {}",
                        seat.concert_option_id
                    ))
                })?;
            let record = ReservationRecord::from_snapshot(&seat, &snapshot, now);
            self.seats.append_record(record.clone())?;
            records.push(record);
        }
        Ok(records)
    }
}
