use sea_orm::sea_query::{Alias, Expr, Func, SimpleExpr};
use serde::Serialize;

use crate::{
  config::Config,
  entity::{
    EntryKind, EntryStatus, TransferStatus, WithdrawalStatus, ledger_entry,
    transfer, user, withdrawal,
  },
  prelude::*,
  state::{AppState, UserLocks},
  utils::{Page, PageQuery},
};

/// An entry to append. Credits carry positive amounts, debits negative ones.
#[derive(Debug, Clone)]
pub struct NewEntry {
  pub user_id: i32,
  pub kind: EntryKind,
  pub amount: Money,
  pub related_transaction_id: Option<i32>,
  pub transfer_id: Option<i32>,
  pub withdrawal_id: Option<i32>,
}

impl NewEntry {
  pub fn new(user_id: i32, kind: EntryKind, amount: Money) -> Self {
    Self {
      user_id,
      kind,
      amount,
      related_transaction_id: None,
      transfer_id: None,
      withdrawal_id: None,
    }
  }

  pub fn sale(mut self, sale_id: i32) -> Self {
    self.related_transaction_id = Some(sale_id);
    self
  }

  pub fn transfer(mut self, transfer_id: i32) -> Self {
    self.transfer_id = Some(transfer_id);
    self
  }

  pub fn withdrawal(mut self, withdrawal_id: i32) -> Self {
    self.withdrawal_id = Some(withdrawal_id);
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceSheet {
  pub user_id: i32,
  /// Sum of every ledger row of the user.
  pub balance: Money,
  /// Held by pending withdrawals and pending outgoing transfers.
  pub reserved: Money,
  pub available: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
  #[serde(flatten)]
  pub entry: ledger_entry::Model,
  pub status: EntryStatus,
}

pub struct Ledger<'a> {
  db: &'a DatabaseConnection,
  locks: &'a UserLocks,
  config: &'a Config,
}

impl<'a> Ledger<'a> {
  pub fn new(app: &'a AppState) -> Self {
    Self { db: &app.db, locks: &app.locks, config: &app.config }
  }

  /// Appends a single entry and returns its id.
  pub async fn post_entry(&self, entry: NewEntry) -> Result<i32> {
    let _guard = if entry.kind.is_debit() {
      Some(self.locks.acquire(&[entry.user_id]).await)
    } else {
      None
    };

    let txn = self.db.begin().await?;
    let posted = post(&txn, entry).await?;
    txn.commit().await?;

    debug!(
      entry_id = posted.id,
      user_id = posted.user_id,
      amount = posted.amount,
      "posted {:?} entry",
      posted.kind
    );
    Ok(posted.id)
  }

  pub async fn balance(&self, user_id: i32) -> Result<Money> {
    find_user(self.db, user_id).await?;
    balance(self.db, user_id).await
  }

  pub async fn sheet(&self, user_id: i32) -> Result<BalanceSheet> {
    find_user(self.db, user_id).await?;
    sheet(self.db, user_id).await
  }

  pub async fn available(&self, user_id: i32) -> Result<Money> {
    Ok(self.sheet(user_id).await?.available)
  }

  /// Posts the offsetting entry for `entry_id` and returns the new entry id.
  pub async fn reverse(&self, entry_id: i32) -> Result<i32> {
    let original = ledger_entry::Entity::find_by_id(entry_id)
      .one(self.db)
      .await?
      .ok_or(Error::EntryNotFound)?;

    let _guard = self.locks.acquire(&[original.user_id]).await;

    let txn = self.db.begin().await?;
    let reversal = reverse(&txn, entry_id).await?;
    txn.commit().await?;

    info!(
      entry_id,
      reversal_id = reversal.id,
      user_id = reversal.user_id,
      amount = reversal.amount,
      "reversed ledger entry"
    );
    Ok(reversal.id)
  }

  /// Newest-first page of a user's entries with their derived status.
  pub async fn entries(
    &self,
    user_id: i32,
    query: PageQuery,
  ) -> Result<Page<EntryView>> {
    find_user(self.db, user_id).await?;
    let (page, per_page) = query.resolve(self.config);

    let paginator = ledger_entry::Entity::find()
      .filter(ledger_entry::Column::UserId.eq(user_id))
      .order_by_desc(ledger_entry::Column::Id)
      .paginate(self.db, per_page);

    let total = paginator.num_items().await?;
    let entries = paginator.fetch_page(page - 1).await?;

    let ids: Vec<i32> = entries.iter().map(|entry| entry.id).collect();
    let reversed = reversed_ids(self.db, ids).await?;

    let items = entries
      .into_iter()
      .map(|entry| {
        let status = status_of(&entry, &reversed);
        EntryView { entry, status }
      })
      .collect();

    Ok(Page { items, page, per_page, total })
  }
}

/// Appends `entry` on `conn`. Debits are checked against the available
/// balance read on the same connection, so callers must hold the user lock.
pub(crate) async fn post<C: ConnectionTrait>(
  conn: &C,
  entry: NewEntry,
) -> Result<ledger_entry::Model> {
  let amount = entry.amount;
  if amount.is_zero() {
    return Err(Error::InvalidAmount("ledger entries must be non-zero".into()));
  }
  if amount > Money::MAX || -amount > Money::MAX {
    return Err(Error::InvalidAmount(format!(
      "ledger entries are limited to {}",
      Money::MAX
    )));
  }

  match entry.kind {
    EntryKind::Reversal => {
      return Err(Error::InvalidArgs(
        "reversal entries are only posted by reversing an entry".into(),
      ));
    }
    kind if kind.is_credit() && amount.is_negative() => {
      return Err(Error::InvalidAmount(format!(
        "{kind:?} entries must be positive"
      )));
    }
    kind if kind.is_debit() && amount.is_positive() => {
      return Err(Error::InvalidAmount(format!(
        "{kind:?} entries must be negative"
      )));
    }
    _ => {}
  }

  lock_user(conn, entry.user_id).await?;

  if entry.kind.is_debit() {
    let available = sheet(conn, entry.user_id).await?.available;
    if available.checked_add(amount).is_none_or(|rest| rest < Money::ZERO) {
      return Err(Error::InsufficientFunds { available, requested: -amount });
    }
  }

  let model = ledger_entry::ActiveModel {
    id: NotSet,
    user_id: Set(entry.user_id),
    amount: Set(amount.minor()),
    kind: Set(entry.kind),
    related_transaction_id: Set(entry.related_transaction_id),
    transfer_id: Set(entry.transfer_id),
    withdrawal_id: Set(entry.withdrawal_id),
    reverses_entry_id: Set(None),
    created_at: Set(now()),
  };

  Ok(model.insert(conn).await?)
}

/// Posts an equal and opposite entry referencing `entry_id`.
///
/// Reversals skip the funds check: cancelling a sale whose cashback was
/// already spent leaves the client negative rather than failing.
pub(crate) async fn reverse<C: ConnectionTrait>(
  conn: &C,
  entry_id: i32,
) -> Result<ledger_entry::Model> {
  let original = ledger_entry::Entity::find_by_id(entry_id)
    .one(conn)
    .await?
    .ok_or(Error::EntryNotFound)?;

  if original.kind == EntryKind::Reversal {
    return Err(Error::InvalidArgs("a reversal cannot be reversed".into()));
  }
  if is_reversed(conn, entry_id).await? {
    return Err(Error::AlreadyReversed(entry_id));
  }

  let reversal = ledger_entry::ActiveModel {
    id: NotSet,
    user_id: Set(original.user_id),
    amount: Set(-original.amount),
    kind: Set(EntryKind::Reversal),
    related_transaction_id: Set(original.related_transaction_id),
    transfer_id: Set(original.transfer_id),
    withdrawal_id: Set(original.withdrawal_id),
    reverses_entry_id: Set(Some(original.id)),
    created_at: Set(now()),
  };

  reversal.insert(conn).await.map_err(|err| {
    let err = Error::from(err);
    if err.is_unique_violation() {
      Error::AlreadyReversed(entry_id)
    } else {
      err
    }
  })
}

/// Which of `ids` have a reversal row pointing at them.
pub(crate) async fn reversed_ids<C: ConnectionTrait>(
  conn: &C,
  ids: Vec<i32>,
) -> Result<HashSet<i32>> {
  Ok(
    ledger_entry::Entity::find()
      .select_only()
      .column(ledger_entry::Column::ReversesEntryId)
      .filter(ledger_entry::Column::ReversesEntryId.is_in(ids))
      .into_tuple::<Option<i32>>()
      .all(conn)
      .await?
      .into_iter()
      .flatten()
      .collect(),
  )
}

/// Both halves of a reversal pair read as `Reversed`; they net to zero, so
/// the `Posted` rows alone sum to the balance.
pub(crate) fn status_of(
  entry: &ledger_entry::Model,
  reversed: &HashSet<i32>,
) -> EntryStatus {
  if entry.reverses_entry_id.is_some() || reversed.contains(&entry.id) {
    EntryStatus::Reversed
  } else {
    EntryStatus::Posted
  }
}

pub(crate) async fn is_reversed<C: ConnectionTrait>(
  conn: &C,
  entry_id: i32,
) -> Result<bool> {
  let count = ledger_entry::Entity::find()
    .filter(ledger_entry::Column::ReversesEntryId.eq(entry_id))
    .count(conn)
    .await?;
  Ok(count > 0)
}

pub(crate) async fn balance<C: ConnectionTrait>(
  conn: &C,
  user_id: i32,
) -> Result<Money> {
  let total = ledger_entry::Entity::find()
    .select_only()
    .expr_as(sum_of(ledger_entry::Column::Amount), "total")
    .filter(ledger_entry::Column::UserId.eq(user_id))
    .into_tuple::<i64>()
    .one(conn)
    .await?
    .unwrap_or(0);
  Ok(Money::from_minor(total))
}

/// Funds promised to pending withdrawals and pending outgoing transfers.
pub(crate) async fn reserved<C: ConnectionTrait>(
  conn: &C,
  user_id: i32,
) -> Result<Money> {
  let withdrawals = withdrawal::Entity::find()
    .select_only()
    .expr_as(sum_of(withdrawal::Column::Amount), "total")
    .filter(withdrawal::Column::UserId.eq(user_id))
    .filter(withdrawal::Column::Status.eq(WithdrawalStatus::Pending))
    .into_tuple::<i64>()
    .one(conn)
    .await?
    .unwrap_or(0);

  let transfers = transfer::Entity::find()
    .select_only()
    .expr_as(sum_of(transfer::Column::Amount), "total")
    .filter(transfer::Column::FromUserId.eq(user_id))
    .filter(transfer::Column::Status.eq(TransferStatus::Pending))
    .into_tuple::<i64>()
    .one(conn)
    .await?
    .unwrap_or(0);

  Ok(Money::from_minor(withdrawals + transfers))
}

pub(crate) async fn sheet<C: ConnectionTrait>(
  conn: &C,
  user_id: i32,
) -> Result<BalanceSheet> {
  let balance = balance(conn, user_id).await?;
  let reserved = reserved(conn, user_id).await?;
  Ok(BalanceSheet { user_id, balance, reserved, available: balance - reserved })
}

/// Loads the user row, locking it where the backend supports row locks.
pub(crate) async fn lock_user<C: ConnectionTrait>(
  conn: &C,
  user_id: i32,
) -> Result<user::Model> {
  user::Entity::find_by_id(user_id)
    .lock_exclusive()
    .one(conn)
    .await?
    .ok_or(Error::UserNotFound)
}

pub(crate) async fn find_user<C: ConnectionTrait>(
  conn: &C,
  user_id: i32,
) -> Result<user::Model> {
  user::Entity::find_by_id(user_id).one(conn).await?.ok_or(Error::UserNotFound)
}

/// `CAST(COALESCE(SUM(col), 0) AS BIGINT)`
pub(crate) fn sum_of<C: ColumnTrait>(col: C) -> SimpleExpr {
  Func::cast_as(
    Func::coalesce([Expr::col(col).sum(), Expr::val(0i64).into()]),
    Alias::new("BIGINT"),
  )
  .into()
}
