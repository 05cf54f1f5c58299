use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::money::{self, Money};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid amount: {0}")]
  InvalidAmount(String),
  #[error("insufficient funds: available {available}, requested {requested}")]
  InsufficientFunds { available: Money, requested: Money },
  #[error("{entity} #{id} cannot move from `{from}` to `{to}`")]
  InvalidStateTransition {
    entity: &'static str,
    id: i32,
    from: String,
    to: String,
  },
  #[error("ledger entry #{0} is already reversed")]
  AlreadyReversed(i32),
  #[error("referral code `{0}` is already taken")]
  DuplicateReferralCode(String),

  #[error("user not found")]
  UserNotFound,
  #[error("referral code not found")]
  ReferralNotFound,
  #[error("sale not found")]
  SaleNotFound,
  #[error("transfer not found")]
  TransferNotFound,
  #[error("withdrawal not found")]
  WithdrawalNotFound,
  #[error("ledger entry not found")]
  EntryNotFound,

  #[error("user #{0} is not active")]
  UserNotActive(i32),
  #[error("forbidden: {0}")]
  Forbidden(String),
  #[error("invalid arguments: {0}")]
  InvalidArgs(String),

  #[error("database error: {0}")]
  Db(#[from] DbErr),
  #[error("internal error: {0}")]
  Internal(String),
}

impl Error {
  /// Stable machine-readable kind, shared by every `*NotFound` variant.
  pub fn kind(&self) -> &'static str {
    match self {
      Error::InvalidAmount(_) => "invalid_amount",
      Error::InsufficientFunds { .. } => "insufficient_funds",
      Error::InvalidStateTransition { .. } => "invalid_state_transition",
      Error::AlreadyReversed(_) => "already_reversed",
      Error::UserNotFound
      | Error::ReferralNotFound
      | Error::SaleNotFound
      | Error::TransferNotFound
      | Error::WithdrawalNotFound
      | Error::EntryNotFound => "not_found",
      Error::UserNotActive(_) => "user_not_active",
      Error::Forbidden(_) => "forbidden",
      Error::InvalidArgs(_) => "invalid_args",
      // never reaches a caller, see `User::create_with_codes`
      Error::DuplicateReferralCode(_) | Error::Db(_) | Error::Internal(_) => {
        "internal_error"
      }
    }
  }

  pub fn is_unique_violation(&self) -> bool {
    matches!(
      self,
      Error::Db(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
    )
  }
}

impl From<money::ParseError> for Error {
  fn from(err: money::ParseError) -> Self {
    Error::InvalidAmount(err.to_string())
  }
}
