pub mod borrowing;
pub mod commands;
pub mod errors;
pub mod events;
pub mod fine;
pub mod inventory;
pub mod member;
pub mod policy;
pub mod value_objects;

pub use borrowing::Borrowing;
pub use errors::*;
pub use events::*;
pub use fine::Fine;
pub use inventory::{ReservationToken, Title};
pub use member::MemberAccount;
pub use policy::LendingPolicy;
pub use value_objects::*;
