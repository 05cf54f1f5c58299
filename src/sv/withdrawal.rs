use sea_orm::{ActiveEnum, sea_query::Expr};
use serde::{Deserialize, Serialize};

use crate::{
  config::Config,
  entity::{
    EntryKind, UserRole, WithdrawalMethod, WithdrawalStatus, withdrawal,
  },
  prelude::*,
  state::{AppState, UserLocks},
  sv::{
    ledger::{self, NewEntry, find_user},
    user::{require_active, require_admin},
  },
  utils::{Page, PageQuery},
};

/// Where the money goes. Stored as JSON next to the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentDetails {
  Bank {
    bank_name: String,
    account_holder: String,
    account_number: String,
    routing_number: String,
  },
  Zelle {
    holder_name: String,
    contact: String,
  },
}

impl PaymentDetails {
  pub fn method(&self) -> WithdrawalMethod {
    match self {
      PaymentDetails::Bank { .. } => WithdrawalMethod::Bank,
      PaymentDetails::Zelle { .. } => WithdrawalMethod::Zelle,
    }
  }

  fn validate(&self) -> Result<()> {
    let fields: Vec<(&str, &String)> = match self {
      PaymentDetails::Bank {
        bank_name,
        account_holder,
        account_number,
        routing_number,
      } => vec![
        ("bank_name", bank_name),
        ("account_holder", account_holder),
        ("account_number", account_number),
        ("routing_number", routing_number),
      ],
      PaymentDetails::Zelle { holder_name, contact } => {
        vec![("holder_name", holder_name), ("contact", contact)]
      }
    };

    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
      Some((name, _)) => Err(Error::InvalidArgs(format!("`{name}` is required"))),
      None => Ok(()),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  Completed,
  Rejected,
}

impl From<Outcome> for WithdrawalStatus {
  fn from(outcome: Outcome) -> Self {
    match outcome {
      Outcome::Completed => WithdrawalStatus::Completed,
      Outcome::Rejected => WithdrawalStatus::Rejected,
    }
  }
}

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
  pub user_id: i32,
  pub amount: Money,
  pub details: PaymentDetails,
}

pub struct Withdrawal<'a> {
  db: &'a DatabaseConnection,
  locks: &'a UserLocks,
  config: &'a Config,
}

impl<'a> Withdrawal<'a> {
  pub fn new(app: &'a AppState) -> Self {
    Self { db: &app.db, locks: &app.locks, config: &app.config }
  }

  /// Opens a pending request. The amount stays reserved until an admin
  /// resolves it; no ledger entry is written yet.
  pub async fn request(&self, new: NewWithdrawal) -> Result<withdrawal::Model> {
    new
      .amount
      .transactable()
      .map_err(|err| Error::InvalidAmount(format!("withdrawal {err}")))?;
    if new.amount < self.config.min_withdrawal {
      return Err(Error::InvalidAmount(format!(
        "minimum withdrawal is {}",
        self.config.min_withdrawal
      )));
    }
    new.details.validate()?;
    let payment_details =
      json::to_string(&new.details).map_err(|e| Error::Internal(e.to_string()))?;

    let _guard = self.locks.acquire(&[new.user_id]).await;
    let txn = self.db.begin().await?;

    let user = require_active(&txn, new.user_id).await?;
    if user.role == UserRole::Admin {
      return Err(Error::Forbidden("admins cannot withdraw".into()));
    }
    ledger::lock_user(&txn, user.id).await?;

    let available = ledger::sheet(&txn, user.id).await?.available;
    if available < new.amount {
      return Err(Error::InsufficientFunds { available, requested: new.amount });
    }

    let withdrawal = withdrawal::ActiveModel {
      id: NotSet,
      user_id: Set(user.id),
      amount: Set(new.amount.minor()),
      method: Set(new.details.method()),
      payment_details: Set(payment_details),
      status: Set(WithdrawalStatus::Pending),
      note: Set(None),
      resolved_by: Set(None),
      created_at: Set(now()),
      resolved_at: Set(None),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    info!(
      withdrawal_id = withdrawal.id,
      user_id = user.id,
      "withdrawal of {} via {:?} requested",
      new.amount,
      withdrawal.method
    );
    Ok(withdrawal)
  }

  /// Admin resolution. Completing posts the `withdrawal` debit, rejecting
  /// only releases the reservation.
  pub async fn resolve(
    &self,
    admin_id: i32,
    withdrawal_id: i32,
    outcome: Outcome,
    note: Option<String>,
  ) -> Result<withdrawal::Model> {
    require_admin(self.db, admin_id).await?;
    let withdrawal = self.by_id(withdrawal_id).await?;
    let to = WithdrawalStatus::from(outcome);
    if withdrawal.status != WithdrawalStatus::Pending {
      return Err(invalid_transition(&withdrawal, to));
    }

    let _guard = self.locks.acquire(&[withdrawal.user_id]).await;
    let txn = self.db.begin().await?;

    let result = withdrawal::Entity::update_many()
      .col_expr(withdrawal::Column::Status, Expr::value(to))
      .col_expr(withdrawal::Column::Note, Expr::value(note))
      .col_expr(withdrawal::Column::ResolvedBy, Expr::value(Some(admin_id)))
      .col_expr(withdrawal::Column::ResolvedAt, Expr::value(Some(now())))
      .filter(withdrawal::Column::Id.eq(withdrawal_id))
      .filter(withdrawal::Column::Status.eq(WithdrawalStatus::Pending))
      .exec(&txn)
      .await?;
    if result.rows_affected == 0 {
      let current = reload(&txn, withdrawal_id).await?;
      return Err(invalid_transition(&current, to));
    }

    if to == WithdrawalStatus::Completed {
      ledger::post(
        &txn,
        NewEntry::new(
          withdrawal.user_id,
          EntryKind::Withdrawal,
          -Money::from_minor(withdrawal.amount),
        )
        .withdrawal(withdrawal_id),
      )
      .await?;
    }

    let withdrawal = reload(&txn, withdrawal_id).await?;
    txn.commit().await?;

    info!(
      withdrawal_id,
      admin_id,
      user_id = withdrawal.user_id,
      "withdrawal of {} {:?}",
      Money::from_minor(withdrawal.amount),
      withdrawal.status
    );
    Ok(withdrawal)
  }

  pub async fn by_id(&self, withdrawal_id: i32) -> Result<withdrawal::Model> {
    reload(self.db, withdrawal_id).await
  }

  pub async fn by_user(
    &self,
    user_id: i32,
    query: PageQuery,
  ) -> Result<Page<withdrawal::Model>> {
    find_user(self.db, user_id).await?;
    self.page(Some(user_id), None, query).await
  }

  pub async fn list(
    &self,
    status: Option<WithdrawalStatus>,
    query: PageQuery,
  ) -> Result<Page<withdrawal::Model>> {
    self.page(None, status, query).await
  }

  async fn page(
    &self,
    user_id: Option<i32>,
    status: Option<WithdrawalStatus>,
    query: PageQuery,
  ) -> Result<Page<withdrawal::Model>> {
    let (page, per_page) = query.resolve(self.config);

    let mut select = withdrawal::Entity::find();
    if let Some(user_id) = user_id {
      select = select.filter(withdrawal::Column::UserId.eq(user_id));
    }
    if let Some(status) = status {
      select = select.filter(withdrawal::Column::Status.eq(status));
    }
    let paginator =
      select.order_by_desc(withdrawal::Column::Id).paginate(self.db, per_page);

    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;
    Ok(Page { items, page, per_page, total })
  }
}

async fn reload<C: ConnectionTrait>(
  conn: &C,
  withdrawal_id: i32,
) -> Result<withdrawal::Model> {
  withdrawal::Entity::find_by_id(withdrawal_id)
    .one(conn)
    .await?
    .ok_or(Error::WithdrawalNotFound)
}

fn invalid_transition(
  withdrawal: &withdrawal::Model,
  to: WithdrawalStatus,
) -> Error {
  Error::InvalidStateTransition {
    entity: "withdrawal",
    id: withdrawal.id,
    from: withdrawal.status.to_value(),
    to: to.to_value(),
  }
}
