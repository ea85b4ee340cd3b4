pub mod point;
pub mod reservation;
pub mod seat;
pub mod token;

pub use point::{LedgerEntry, LedgerEntryKind, PointBalance};
pub use reservation::{FinalizeIntent, IntentState, ReservationRecord};
pub use seat::{ConcertSnapshot, Seat, SeatStatus};
pub use token::{Token, TokenStatus};
