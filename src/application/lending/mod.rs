mod errors;
mod fines;
mod inventory_ledger;
mod lending_service;
mod overdue_detection;

pub use errors::{LendingError, Result};
pub use fines::{current_fine, list_unpaid_fines, mark_fine_paid};
pub use inventory_ledger::{
    Availability, adjust_copies, available_count, register_title, retire_title,
};
pub use lending_service::{
    ServiceDependencies, authorize, borrowing_history_for_member, borrowing_history_for_title,
    checkout, get_borrowing, list_overdue, return_book,
};
pub use overdue_detection::refresh_overdue_fines;
