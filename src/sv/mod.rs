pub mod audit;
pub mod ledger;
pub mod rates;
pub mod referral;
pub mod sale;
pub mod stats;
#[cfg(test)]
pub mod test_utils;
pub mod transfer;
pub mod user;
pub mod withdrawal;

pub use audit::Audit;
pub use ledger::Ledger;
pub use rates::Rates;
pub use referral::Referral;
pub use sale::Sale;
pub use stats::Stats;
pub use transfer::Transfer;
pub use user::User;
pub use withdrawal::Withdrawal;
