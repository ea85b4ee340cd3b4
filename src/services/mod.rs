pub mod admission;
pub mod ledger;
pub mod queue;
pub mod reservation;

pub use admission::{Admission, AdmissionGate};
pub use ledger::PointLedger;
pub use queue::{QueueManager, SweepReport};
pub use reservation::SeatReservationCoordinator;
