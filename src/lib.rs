//! Waiting-room admission control for a high-demand seat reservation
//! system, with a point ledger guaranteeing exactly-once, race-free debits.
//!
//! Flow: a client registers and receives a WAIT token; the background sweep
//! promotes the oldest waiters to ONGOING up to capacity and expires stale
//! admissions to DONE; the admission gate checks tokens in front of
//! protected calls; once admitted, the client holds seats and pays, at
//! which point the debit and the seat transition commit as one recoverable
//! unit.
//!
//! Storage is behind the collaborator traits in [`store`]; the in-memory
//! backends there serve tests and single-process deployments. Serialization
//! is per key (user, seat, sweeper) via [`sync::KeyedLock`].

pub mod config;
pub mod models;
pub mod services;
pub mod store;
pub mod sweep;
pub mod sync;
pub mod utils;

pub use config::Config;
pub use services::{Admission, AdmissionGate, PointLedger, QueueManager, SeatReservationCoordinator, SweepReport};
pub use utils::error::{AppError, AppResult, ErrorKind};
