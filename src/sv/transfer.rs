use sea_orm::{ActiveEnum, Condition, sea_query::Expr};

use crate::{
  config::Config,
  entity::{EntryKind, TransferStatus, transfer},
  prelude::*,
  state::{AppState, UserLocks},
  sv::{
    ledger::{self, NewEntry, find_user},
    user::{require_active, require_admin},
  },
  utils::{Page, PageQuery},
};

#[derive(Debug, Clone)]
pub struct NewTransfer {
  pub from_user_id: i32,
  pub to_user_id: i32,
  pub amount: Money,
  pub description: Option<String>,
}

pub struct Transfer<'a> {
  db: &'a DatabaseConnection,
  locks: &'a UserLocks,
  config: &'a Config,
}

impl<'a> Transfer<'a> {
  pub fn new(app: &'a AppState) -> Self {
    Self { db: &app.db, locks: &app.locks, config: &app.config }
  }

  /// Moves funds between two users. Without moderation the transfer is
  /// completed at once; with it the amount is held until an admin approves.
  pub async fn initiate(&self, new: NewTransfer) -> Result<transfer::Model> {
    new
      .amount
      .transactable()
      .map_err(|err| Error::InvalidAmount(format!("transfer {err}")))?;
    if new.from_user_id == new.to_user_id {
      return Err(Error::InvalidArgs("cannot transfer to yourself".into()));
    }
    let description = new
      .description
      .map(|text| text.trim().to_owned())
      .filter(|text| !text.is_empty());

    let _guard = self.locks.acquire(&[new.from_user_id]).await;
    let txn = self.db.begin().await?;

    require_active(&txn, new.from_user_id).await?;
    require_active(&txn, new.to_user_id).await?;
    ledger::lock_user(&txn, new.from_user_id).await?;

    let available = ledger::sheet(&txn, new.from_user_id).await?.available;
    if available < new.amount {
      return Err(Error::InsufficientFunds { available, requested: new.amount });
    }

    let status = if self.config.transfer_moderation {
      TransferStatus::Pending
    } else {
      TransferStatus::Completed
    };
    let now = now();

    let transfer = transfer::ActiveModel {
      id: NotSet,
      from_user_id: Set(new.from_user_id),
      to_user_id: Set(new.to_user_id),
      amount: Set(new.amount.minor()),
      description: Set(description),
      status: Set(status),
      created_at: Set(now),
      resolved_at: Set((status == TransferStatus::Completed).then_some(now)),
    }
    .insert(&txn)
    .await?;

    if status == TransferStatus::Completed {
      post_pair(&txn, &transfer).await?;
    }
    txn.commit().await?;

    info!(
      transfer_id = transfer.id,
      from = transfer.from_user_id,
      to = transfer.to_user_id,
      "transfer of {} is {:?}",
      new.amount,
      transfer.status
    );
    Ok(transfer)
  }

  /// Admin approval of a moderated transfer. Funds are checked again since
  /// the sender's balance may have moved while it waited.
  pub async fn approve(
    &self,
    admin_id: i32,
    transfer_id: i32,
  ) -> Result<transfer::Model> {
    require_admin(self.db, admin_id).await?;
    let transfer = self.by_id(transfer_id).await?;
    if transfer.status != TransferStatus::Pending {
      return Err(invalid_transition(&transfer, TransferStatus::Completed));
    }

    let _guard =
      self.locks.acquire(&[transfer.from_user_id, transfer.to_user_id]).await;
    let txn = self.db.begin().await?;

    require_active(&txn, transfer.from_user_id).await?;
    require_active(&txn, transfer.to_user_id).await?;

    transition(&txn, &transfer, TransferStatus::Completed).await?;
    post_pair(&txn, &transfer).await?;

    let transfer = reload(&txn, transfer_id).await?;
    txn.commit().await?;

    info!(transfer_id, admin_id, "transfer approved");
    Ok(transfer)
  }

  /// Cancels a pending transfer, releasing the held amount.
  pub async fn cancel(&self, transfer_id: i32) -> Result<transfer::Model> {
    let transfer = self.by_id(transfer_id).await?;
    if transfer.status != TransferStatus::Pending {
      return Err(invalid_transition(&transfer, TransferStatus::Cancelled));
    }

    let _guard = self.locks.acquire(&[transfer.from_user_id]).await;
    let txn = self.db.begin().await?;
    transition(&txn, &transfer, TransferStatus::Cancelled).await?;
    let transfer = reload(&txn, transfer_id).await?;
    txn.commit().await?;

    info!(transfer_id, "transfer cancelled");
    Ok(transfer)
  }

  pub async fn by_id(&self, transfer_id: i32) -> Result<transfer::Model> {
    reload(self.db, transfer_id).await
  }

  /// Sent and received transfers of a user, newest first.
  pub async fn by_user(
    &self,
    user_id: i32,
    query: PageQuery,
  ) -> Result<Page<transfer::Model>> {
    find_user(self.db, user_id).await?;

    let (page, per_page) = query.resolve(self.config);
    let paginator = transfer::Entity::find()
      .filter(
        Condition::any()
          .add(transfer::Column::FromUserId.eq(user_id))
          .add(transfer::Column::ToUserId.eq(user_id)),
      )
      .order_by_desc(transfer::Column::Id)
      .paginate(self.db, per_page);

    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;
    Ok(Page { items, page, per_page, total })
  }
}

async fn post_pair<C: ConnectionTrait>(
  conn: &C,
  transfer: &transfer::Model,
) -> Result<()> {
  let amount = Money::from_minor(transfer.amount);
  ledger::post(
    conn,
    NewEntry::new(transfer.from_user_id, EntryKind::TransferOut, -amount)
      .transfer(transfer.id),
  )
  .await?;
  ledger::post(
    conn,
    NewEntry::new(transfer.to_user_id, EntryKind::TransferIn, amount)
      .transfer(transfer.id),
  )
  .await?;
  Ok(())
}

async fn transition<C: ConnectionTrait>(
  conn: &C,
  transfer: &transfer::Model,
  to: TransferStatus,
) -> Result<()> {
  let result = transfer::Entity::update_many()
    .col_expr(transfer::Column::Status, Expr::value(to))
    .col_expr(transfer::Column::ResolvedAt, Expr::value(Some(now())))
    .filter(transfer::Column::Id.eq(transfer.id))
    .filter(transfer::Column::Status.eq(TransferStatus::Pending))
    .exec(conn)
    .await?;

  if result.rows_affected == 0 {
    let current = reload(conn, transfer.id).await?;
    return Err(invalid_transition(&current, to));
  }
  Ok(())
}

async fn reload<C: ConnectionTrait>(
  conn: &C,
  transfer_id: i32,
) -> Result<transfer::Model> {
  transfer::Entity::find_by_id(transfer_id)
    .one(conn)
    .await?
    .ok_or(Error::TransferNotFound)
}

fn invalid_transition(transfer: &transfer::Model, to: TransferStatus) -> Error {
  Error::InvalidStateTransition {
    entity: "transfer",
    id: transfer.id,
    from: transfer.status.to_value(),
    to: to.to_value(),
  }
}

#[cfg(test)]
mod tests {
  use futures::future::join_all;

  use super::*;
  use crate::{
    entity::{UserRole, UserStatus},
    state::Services,
    sv::test_utils::test_db::{self, fund},
  };

  fn cents(minor: i64) -> Money {
    Money::from_minor(minor)
  }

  fn new_transfer(from: i32, to: i32, amount: i64) -> NewTransfer {
    NewTransfer {
      from_user_id: from,
      to_user_id: to,
      amount: cents(amount),
      description: Some("dinner".into()),
    }
  }

  async fn moderated() -> AppState {
    test_db::app_with(Config { transfer_moderation: true, ..Config::default() })
      .await
  }

  #[tokio::test]
  async fn test_transfer_completes_immediately() {
    let app = test_db::app().await;
    let alice = test_db::user(&app, UserRole::Client).await;
    let bob = test_db::user(&app, UserRole::Client).await;
    fund(&app, alice.id, 1_000).await;

    let transfer =
      app.transfers().initiate(new_transfer(alice.id, bob.id, 400)).await.unwrap();

    assert_eq!(transfer.status, TransferStatus::Completed);
    assert!(transfer.resolved_at.is_some());
    assert_eq!(app.ledger().balance(alice.id).await.unwrap(), cents(600));
    assert_eq!(app.ledger().balance(bob.id).await.unwrap(), cents(400));

    let page =
      app.ledger().entries(bob.id, PageQuery::default()).await.unwrap();
    assert_eq!(page.items[0].entry.kind, EntryKind::TransferIn);
    assert_eq!(page.items[0].entry.transfer_id, Some(transfer.id));
  }

  #[tokio::test]
  async fn test_transfer_rejections() {
    let app = test_db::app().await;
    let alice = test_db::user(&app, UserRole::Client).await;
    let bob = test_db::user(&app, UserRole::Client).await;
    fund(&app, alice.id, 1_000).await;
    let transfers = app.transfers();

    let overdraft = transfers.initiate(new_transfer(alice.id, bob.id, 1_001)).await;
    assert!(matches!(
      overdraft,
      Err(Error::InsufficientFunds { available, requested })
        if available == cents(1_000) && requested == cents(1_001)
    ));

    let zero = transfers.initiate(new_transfer(alice.id, bob.id, 0)).await;
    assert!(matches!(zero, Err(Error::InvalidAmount(_))));

    let huge =
      transfers.initiate(new_transfer(alice.id, bob.id, i64::MAX)).await;
    assert!(matches!(huge, Err(Error::InvalidAmount(_))));

    let own = transfers.initiate(new_transfer(alice.id, alice.id, 10)).await;
    assert!(matches!(own, Err(Error::InvalidArgs(_))));

    let missing = transfers.initiate(new_transfer(alice.id, 404, 10)).await;
    assert!(matches!(missing, Err(Error::UserNotFound)));

    // nothing moved
    assert_eq!(app.ledger().balance(alice.id).await.unwrap(), cents(1_000));
    assert_eq!(app.ledger().balance(bob.id).await.unwrap(), Money::ZERO);
  }

  #[tokio::test]
  async fn test_blocked_sender_rejected() {
    let app = test_db::app().await;
    let admin = test_db::user(&app, UserRole::Admin).await;
    let alice = test_db::user(&app, UserRole::Client).await;
    let bob = test_db::user(&app, UserRole::Client).await;
    fund(&app, alice.id, 1_000).await;
    app.users().set_status(admin.id, alice.id, UserStatus::Blocked).await.unwrap();

    let result =
      app.transfers().initiate(new_transfer(alice.id, bob.id, 100)).await;
    assert!(matches!(result, Err(Error::UserNotActive(id)) if id == alice.id));
  }

  #[tokio::test]
  async fn test_concurrent_transfers_never_overdraw() {
    let app = test_db::app().await;
    let alice = test_db::user(&app, UserRole::Client).await;
    let bob = test_db::user(&app, UserRole::Client).await;
    let carol = test_db::user(&app, UserRole::Client).await;
    fund(&app, alice.id, 1_000).await;

    let transfers = app.transfers();
    let results = join_all((0..6).map(|i| {
      let to = if i % 2 == 0 { bob.id } else { carol.id };
      transfers.initiate(new_transfer(alice.id, to, 300))
    }))
    .await;

    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 3);
    assert!(
      results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, Error::InsufficientFunds { .. }))
    );
    assert_eq!(app.ledger().balance(alice.id).await.unwrap(), cents(100));

    let received = app.ledger().balance(bob.id).await.unwrap()
      + app.ledger().balance(carol.id).await.unwrap();
    assert_eq!(received, cents(900));
  }

  #[tokio::test]
  async fn test_moderated_transfer_reserves_until_approved() {
    let app = moderated().await;
    let admin = test_db::user(&app, UserRole::Admin).await;
    let alice = test_db::user(&app, UserRole::Client).await;
    let bob = test_db::user(&app, UserRole::Client).await;
    fund(&app, alice.id, 1_000).await;

    let transfer =
      app.transfers().initiate(new_transfer(alice.id, bob.id, 700)).await.unwrap();
    assert_eq!(transfer.status, TransferStatus::Pending);
    assert_eq!(transfer.resolved_at, None);

    let sheet = app.ledger().sheet(alice.id).await.unwrap();
    assert_eq!(sheet.balance, cents(1_000));
    assert_eq!(sheet.reserved, cents(700));
    assert_eq!(sheet.available, cents(300));

    // the held amount cannot be spent twice
    let second =
      app.transfers().initiate(new_transfer(alice.id, bob.id, 400)).await;
    assert!(matches!(second, Err(Error::InsufficientFunds { .. })));

    let not_admin = app.transfers().approve(bob.id, transfer.id).await;
    assert!(matches!(not_admin, Err(Error::Forbidden(_))));

    let approved = app.transfers().approve(admin.id, transfer.id).await.unwrap();
    assert_eq!(approved.status, TransferStatus::Completed);

    let sheet = app.ledger().sheet(alice.id).await.unwrap();
    assert_eq!(sheet.balance, cents(300));
    assert_eq!(sheet.reserved, Money::ZERO);
    assert_eq!(app.ledger().balance(bob.id).await.unwrap(), cents(700));

    let again = app.transfers().approve(admin.id, transfer.id).await;
    assert!(matches!(again, Err(Error::InvalidStateTransition { .. })));
  }

  #[tokio::test]
  async fn test_cancel_releases_reservation() {
    let app = moderated().await;
    let alice = test_db::user(&app, UserRole::Client).await;
    let bob = test_db::user(&app, UserRole::Client).await;
    fund(&app, alice.id, 1_000).await;

    let transfer =
      app.transfers().initiate(new_transfer(alice.id, bob.id, 700)).await.unwrap();
    let cancelled = app.transfers().cancel(transfer.id).await.unwrap();

    assert_eq!(cancelled.status, TransferStatus::Cancelled);
    assert!(cancelled.resolved_at.is_some());
    assert_eq!(app.ledger().available(alice.id).await.unwrap(), cents(1_000));
    assert_eq!(app.ledger().balance(bob.id).await.unwrap(), Money::ZERO);

    let twice = app.transfers().cancel(transfer.id).await;
    assert!(matches!(
      twice,
      Err(Error::InvalidStateTransition { ref from, .. }) if from == "cancelled"
    ));
    assert!(matches!(
      app.transfers().cancel(12_345).await,
      Err(Error::TransferNotFound)
    ));
  }

  #[tokio::test]
  async fn test_completed_transfer_cannot_be_cancelled() {
    let app = test_db::app().await;
    let alice = test_db::user(&app, UserRole::Client).await;
    let bob = test_db::user(&app, UserRole::Client).await;
    fund(&app, alice.id, 500).await;

    let transfer =
      app.transfers().initiate(new_transfer(alice.id, bob.id, 500)).await.unwrap();
    let result = app.transfers().cancel(transfer.id).await;
    assert!(matches!(result, Err(Error::InvalidStateTransition { .. })));
  }

  #[tokio::test]
  async fn test_by_user_lists_both_directions() {
    let app = test_db::app().await;
    let alice = test_db::user(&app, UserRole::Client).await;
    let bob = test_db::user(&app, UserRole::Merchant).await;
    fund(&app, alice.id, 1_000).await;
    fund(&app, bob.id, 1_000).await;

    let out =
      app.transfers().initiate(new_transfer(alice.id, bob.id, 100)).await.unwrap();
    let back =
      app.transfers().initiate(new_transfer(bob.id, alice.id, 50)).await.unwrap();

    let page =
      app.transfers().by_user(alice.id, PageQuery::default()).await.unwrap();
    let ids: Vec<i32> = page.items.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![back.id, out.id]);
    assert_eq!(page.total, 2);
  }
}
