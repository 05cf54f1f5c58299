pub mod ledger_entry;
pub mod rate_setting;
pub mod sale;
pub mod transfer;
pub mod user;
pub mod withdrawal;

pub use ledger_entry::{EntryKind, EntryStatus};
pub use sale::{PaymentMethod, SaleStatus};
pub use transfer::TransferStatus;
pub use user::{UserRole, UserStatus};
pub use withdrawal::{WithdrawalMethod, WithdrawalStatus};
