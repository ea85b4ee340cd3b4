pub mod point;
pub mod seat;
pub mod token;

pub use point::{BalanceStore, InMemoryBalanceStore};
pub use seat::{InMemorySeatStore, SeatStore};
pub use token::{InMemoryTokenStore, TokenStore};
