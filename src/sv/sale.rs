use sea_orm::{ActiveEnum, Condition, sea_query::Expr};
use serde::Serialize;

use crate::{
  config::Config,
  entity::{
    EntryKind, PaymentMethod, SaleStatus, UserRole, ledger_entry, sale,
  },
  prelude::*,
  state::{AppState, UserLocks},
  sv::{
    ledger::{self, NewEntry, find_user},
    rates, referral,
    user::require_active,
  },
  utils::{Page, PageQuery},
};

#[derive(Debug, Clone)]
pub struct NewSale {
  pub merchant_id: i32,
  pub client_id: i32,
  pub gross_amount: Money,
  pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaleDetail {
  #[serde(flatten)]
  pub sale: sale::Model,
  pub entries: Vec<ledger_entry::Model>,
}

pub struct Sale<'a> {
  db: &'a DatabaseConnection,
  locks: &'a UserLocks,
  config: &'a Config,
}

impl<'a> Sale<'a> {
  pub fn new(app: &'a AppState) -> Self {
    Self { db: &app.db, locks: &app.locks, config: &app.config }
  }

  /// Records a sale with the rates in effect right now.
  ///
  /// The sale starts `pending` unless confirmation is switched off, in which
  /// case it completes within the same commit.
  pub async fn record(&self, new: NewSale) -> Result<sale::Model> {
    new
      .gross_amount
      .transactable()
      .map_err(|err| Error::InvalidAmount(format!("sale {err}")))?;
    if new.merchant_id == new.client_id {
      return Err(Error::InvalidArgs("merchant and client must differ".into()));
    }

    let merchant = require_active(self.db, new.merchant_id).await?;
    if merchant.role != UserRole::Merchant {
      return Err(Error::InvalidArgs(format!(
        "user #{} is not a merchant",
        merchant.id
      )));
    }
    let client = require_active(self.db, new.client_id).await?;
    if client.role != UserRole::Client {
      return Err(Error::InvalidArgs(format!(
        "user #{} is not a client",
        client.id
      )));
    }

    let txn = self.db.begin().await?;

    let rates = rates::current(&txn).await?;
    let gross = new.gross_amount;
    let now = now();

    let sale = sale::ActiveModel {
      id: NotSet,
      merchant_id: Set(merchant.id),
      client_id: Set(client.id),
      gross_amount: Set(gross.minor()),
      payment_method: Set(new.payment_method),
      rate_version: Set(rates.version),
      cashback_bps: Set(rates.set.cashback.bps() as i32),
      referral_commission_bps: Set(rates.set.referral_commission.bps() as i32),
      platform_fee_bps: Set(rates.set.platform_fee.bps() as i32),
      cashback_amount: Set(gross.apply_rate(rates.set.cashback).minor()),
      platform_fee_amount: Set(gross.apply_rate(rates.set.platform_fee).minor()),
      status: Set(SaleStatus::Pending),
      reason: Set(None),
      created_at: Set(now),
      updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    let sale = if self.config.sale_requires_confirmation {
      sale
    } else {
      complete_in(&txn, sale).await?
    };

    txn.commit().await?;

    info!(
      sale_id = sale.id,
      merchant_id = sale.merchant_id,
      client_id = sale.client_id,
      "recorded sale of {} ({:?}) at rates v{}, cashback {}",
      gross,
      sale.status,
      sale.rate_version,
      Money::from_minor(sale.cashback_amount)
    );
    Ok(sale)
  }

  /// Merchant confirmation: credits cashback and referral commission in one
  /// commit.
  pub async fn complete(&self, sale_id: i32) -> Result<sale::Model> {
    let sale = self.by_id(sale_id).await?;
    if sale.status != SaleStatus::Pending {
      return Err(invalid_transition(&sale, SaleStatus::Completed));
    }

    let txn = self.db.begin().await?;
    let sale = complete_in(&txn, sale).await?;
    txn.commit().await?;

    info!(sale_id, client_id = sale.client_id, "sale completed");
    Ok(sale)
  }

  /// Cancels a pending or completed sale. A completed sale has its cashback
  /// reversed; referral commission already paid stays with the referrer.
  pub async fn cancel(
    &self,
    sale_id: i32,
    reason: Option<String>,
  ) -> Result<sale::Model> {
    let sale = self.by_id(sale_id).await?;
    let from = match sale.status {
      status @ (SaleStatus::Pending | SaleStatus::Completed) => status,
      _ => return Err(invalid_transition(&sale, SaleStatus::Cancelled)),
    };

    let _guard = self.locks.acquire(&[sale.client_id]).await;
    let txn = self.db.begin().await?;

    transition(&txn, &sale, from, SaleStatus::Cancelled, reason).await?;

    let mut reversed = Money::ZERO;
    if from == SaleStatus::Completed
      && let Some(entry) = cashback_entry(&txn, &sale).await?
      && !ledger::is_reversed(&txn, entry.id).await?
    {
      let reversal = ledger::reverse(&txn, entry.id).await?;
      reversed = Money::from_minor(reversal.amount);
    }

    let sale = reload(&txn, sale_id).await?;
    txn.commit().await?;

    info!(
      sale_id,
      client_id = sale.client_id,
      "sale cancelled from {:?}, cashback adjustment {}",
      from,
      reversed
    );
    Ok(sale)
  }

  /// Refunds a completed sale. The client keeps the cashback.
  pub async fn refund(
    &self,
    sale_id: i32,
    reason: Option<String>,
  ) -> Result<sale::Model> {
    let sale = self.by_id(sale_id).await?;
    if sale.status != SaleStatus::Completed {
      return Err(invalid_transition(&sale, SaleStatus::Refunded));
    }

    let txn = self.db.begin().await?;
    transition(&txn, &sale, SaleStatus::Completed, SaleStatus::Refunded, reason)
      .await?;
    let sale = reload(&txn, sale_id).await?;
    txn.commit().await?;

    info!(sale_id, "sale refunded, cashback retained");
    Ok(sale)
  }

  pub async fn by_id(&self, sale_id: i32) -> Result<sale::Model> {
    reload(self.db, sale_id).await
  }

  pub async fn detail(&self, sale_id: i32) -> Result<SaleDetail> {
    let sale = self.by_id(sale_id).await?;
    let entries = ledger_entry::Entity::find()
      .filter(ledger_entry::Column::RelatedTransactionId.eq(sale_id))
      .order_by_asc(ledger_entry::Column::Id)
      .all(self.db)
      .await?;
    Ok(SaleDetail { sale, entries })
  }

  /// Sales where the user is either the merchant or the client.
  pub async fn by_user(
    &self,
    user_id: i32,
    query: PageQuery,
  ) -> Result<Page<sale::Model>> {
    find_user(self.db, user_id).await?;
    let condition = Condition::any()
      .add(sale::Column::MerchantId.eq(user_id))
      .add(sale::Column::ClientId.eq(user_id));
    self.page(condition, query).await
  }

  pub async fn list(
    &self,
    status: Option<SaleStatus>,
    query: PageQuery,
  ) -> Result<Page<sale::Model>> {
    let mut condition = Condition::all();
    if let Some(status) = status {
      condition = condition.add(sale::Column::Status.eq(status));
    }
    self.page(condition, query).await
  }

  async fn page(
    &self,
    condition: Condition,
    query: PageQuery,
  ) -> Result<Page<sale::Model>> {
    let (page, per_page) = query.resolve(self.config);
    let paginator = sale::Entity::find()
      .filter(condition)
      .order_by_desc(sale::Column::Id)
      .paginate(self.db, per_page);

    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;
    Ok(Page { items, page, per_page, total })
  }
}

/// Both parties must still be active when the sale completes.
async fn complete_in<C: ConnectionTrait>(
  conn: &C,
  sale: sale::Model,
) -> Result<sale::Model> {
  require_active(conn, sale.merchant_id).await?;
  require_active(conn, sale.client_id).await?;

  transition(conn, &sale, SaleStatus::Pending, SaleStatus::Completed, None)
    .await?;

  let cashback = Money::from_minor(sale.cashback_amount);
  if cashback.is_positive() {
    ledger::post(
      conn,
      NewEntry::new(sale.client_id, EntryKind::SaleCashback, cashback)
        .sale(sale.id),
    )
    .await?;
  }

  if let Some(commission) = referral::on_sale_completed(conn, &sale).await? {
    debug!(
      sale_id = sale.id,
      referrer_id = commission.user_id,
      amount = commission.amount,
      "referral commission posted"
    );
  }

  reload(conn, sale.id).await
}

/// Compare-and-swap on the status column, so of two racing transitions only
/// one can succeed.
async fn transition<C: ConnectionTrait>(
  conn: &C,
  sale: &sale::Model,
  from: SaleStatus,
  to: SaleStatus,
  reason: Option<String>,
) -> Result<()> {
  let mut update = sale::Entity::update_many()
    .col_expr(sale::Column::Status, Expr::value(to))
    .col_expr(sale::Column::UpdatedAt, Expr::value(now()));
  if let Some(reason) = reason {
    update = update.col_expr(sale::Column::Reason, Expr::value(reason));
  }

  let result = update
    .filter(sale::Column::Id.eq(sale.id))
    .filter(sale::Column::Status.eq(from))
    .exec(conn)
    .await?;

  if result.rows_affected == 0 {
    let current = reload(conn, sale.id).await?;
    return Err(invalid_transition(&current, to));
  }
  Ok(())
}

async fn cashback_entry<C: ConnectionTrait>(
  conn: &C,
  sale: &sale::Model,
) -> Result<Option<ledger_entry::Model>> {
  Ok(
    ledger_entry::Entity::find()
      .filter(ledger_entry::Column::RelatedTransactionId.eq(sale.id))
      .filter(ledger_entry::Column::UserId.eq(sale.client_id))
      .filter(ledger_entry::Column::Kind.eq(EntryKind::SaleCashback))
      .one(conn)
      .await?,
  )
}

async fn reload<C: ConnectionTrait>(conn: &C, sale_id: i32) -> Result<sale::Model> {
  sale::Entity::find_by_id(sale_id).one(conn).await?.ok_or(Error::SaleNotFound)
}

fn invalid_transition(sale: &sale::Model, to: SaleStatus) -> Error {
  Error::InvalidStateTransition {
    entity: "sale",
    id: sale.id,
    from: sale.status.to_value(),
    to: to.to_value(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::Config,
    entity::UserStatus,
    state::Services,
    sv::{
      rates::RateSet,
      test_utils::test_db::{self, referred},
    },
  };

  fn cents(minor: i64) -> Money {
    Money::from_minor(minor)
  }

  fn new_sale(merchant_id: i32, client_id: i32, gross: i64) -> NewSale {
    NewSale {
      merchant_id,
      client_id,
      gross_amount: cents(gross),
      payment_method: PaymentMethod::CreditCard,
    }
  }

  struct Scenario {
    app: AppState,
    merchant: i32,
    client: i32,
    referrer: i32,
  }

  /// Merchant M, client K referred by R, rates 2% / 1%.
  async fn scenario() -> Scenario {
    let app = test_db::app().await;
    let merchant = test_db::user(&app, UserRole::Merchant).await;
    let referrer = test_db::user(&app, UserRole::Client).await;
    let client = referred(&app, UserRole::Client, &referrer).await;
    Scenario {
      merchant: merchant.id,
      client: client.id,
      referrer: referrer.id,
      app,
    }
  }

  #[tokio::test]
  async fn test_record_captures_rates() {
    let s = scenario().await;
    let sale =
      s.app.sales().record(new_sale(s.merchant, s.client, 1_234)).await.unwrap();

    assert_eq!(sale.status, SaleStatus::Pending);
    assert_eq!(sale.rate_version, 1);
    assert_eq!(sale.cashback_bps, 200);
    assert_eq!(sale.referral_commission_bps, 100);
    // 12.34 * 2% = 0.2468 -> 0.25
    assert_eq!(sale.cashback_amount, 25);
    assert_eq!(sale.platform_fee_amount, 0);

    assert_eq!(s.app.ledger().balance(s.client).await.unwrap(), Money::ZERO);
  }

  #[tokio::test]
  async fn test_record_validation() {
    let s = scenario().await;
    let sales = s.app.sales();

    let zero = sales.record(new_sale(s.merchant, s.client, 0)).await;
    assert!(matches!(zero, Err(Error::InvalidAmount(_))));

    let negative = sales.record(new_sale(s.merchant, s.client, -100)).await;
    assert!(matches!(negative, Err(Error::InvalidAmount(_))));

    let swapped = sales.record(new_sale(s.client, s.merchant, 100)).await;
    assert!(matches!(swapped, Err(Error::InvalidArgs(_))));

    let same = sales.record(new_sale(s.merchant, s.merchant, 100)).await;
    assert!(matches!(same, Err(Error::InvalidArgs(_))));

    let missing = sales.record(new_sale(s.merchant, 9_999, 100)).await;
    assert!(matches!(missing, Err(Error::UserNotFound)));
  }

  #[tokio::test]
  async fn test_inactive_parties_rejected() {
    let s = scenario().await;
    let admin = test_db::user(&s.app, UserRole::Admin).await;
    s.app
      .users()
      .set_status(admin.id, s.merchant, UserStatus::Inactive)
      .await
      .unwrap();

    let result = s.app.sales().record(new_sale(s.merchant, s.client, 100)).await;
    assert!(matches!(result, Err(Error::UserNotActive(id)) if id == s.merchant));
  }

  #[tokio::test]
  async fn test_complete_then_cancel_keeps_commission() {
    let s = scenario().await;
    let sales = s.app.sales();
    let ledger = s.app.ledger();

    let sale = sales.record(new_sale(s.merchant, s.client, 10_000)).await.unwrap();
    let sale = sales.complete(sale.id).await.unwrap();
    assert_eq!(sale.status, SaleStatus::Completed);

    assert_eq!(ledger.balance(s.client).await.unwrap(), cents(200));
    assert_eq!(ledger.balance(s.referrer).await.unwrap(), cents(100));
    assert_eq!(ledger.balance(s.merchant).await.unwrap(), Money::ZERO);

    let sale = sales.cancel(sale.id, Some("wrong amount".into())).await.unwrap();
    assert_eq!(sale.status, SaleStatus::Cancelled);
    assert_eq!(sale.reason.as_deref(), Some("wrong amount"));

    assert_eq!(ledger.balance(s.client).await.unwrap(), Money::ZERO);
    assert_eq!(ledger.balance(s.referrer).await.unwrap(), cents(100));

    let detail = sales.detail(sale.id).await.unwrap();
    let kinds: Vec<EntryKind> = detail.entries.iter().map(|e| e.kind).collect();
    assert_eq!(
      kinds,
      vec![
        EntryKind::SaleCashback,
        EntryKind::ReferralCommission,
        EntryKind::Reversal
      ]
    );
  }

  #[tokio::test]
  async fn test_refund_keeps_cashback() {
    let s = scenario().await;
    let sales = s.app.sales();

    let sale = sales.record(new_sale(s.merchant, s.client, 10_000)).await.unwrap();
    sales.complete(sale.id).await.unwrap();

    let sale = sales.refund(sale.id, None).await.unwrap();
    assert_eq!(sale.status, SaleStatus::Refunded);
    assert_eq!(s.app.ledger().balance(s.client).await.unwrap(), cents(200));

    let detail = sales.detail(sale.id).await.unwrap();
    assert!(detail.entries.iter().all(|e| e.kind != EntryKind::Reversal));
  }

  #[tokio::test]
  async fn test_terminal_states_reject_transitions() {
    let s = scenario().await;
    let sales = s.app.sales();

    let refunded =
      sales.record(new_sale(s.merchant, s.client, 1_000)).await.unwrap();
    sales.complete(refunded.id).await.unwrap();
    sales.refund(refunded.id, None).await.unwrap();

    assert!(matches!(
      sales.cancel(refunded.id, None).await,
      Err(Error::InvalidStateTransition { .. })
    ));
    assert!(matches!(
      sales.refund(refunded.id, None).await,
      Err(Error::InvalidStateTransition { .. })
    ));

    let cancelled =
      sales.record(new_sale(s.merchant, s.client, 1_000)).await.unwrap();
    sales.cancel(cancelled.id, None).await.unwrap();

    match sales.cancel(cancelled.id, None).await {
      Err(Error::InvalidStateTransition { from, to, .. }) => {
        assert_eq!(from, "cancelled");
        assert_eq!(to, "cancelled");
      }
      other => panic!("expected InvalidStateTransition, got {other:?}"),
    }
    assert!(matches!(
      sales.complete(cancelled.id).await,
      Err(Error::InvalidStateTransition { .. })
    ));

    let pending = sales.record(new_sale(s.merchant, s.client, 1_000)).await.unwrap();
    assert!(matches!(
      sales.refund(pending.id, None).await,
      Err(Error::InvalidStateTransition { .. })
    ));

    assert!(matches!(sales.complete(777).await, Err(Error::SaleNotFound)));
  }

  #[tokio::test]
  async fn test_cancel_pending_posts_nothing() {
    let s = scenario().await;
    let sales = s.app.sales();

    let sale = sales.record(new_sale(s.merchant, s.client, 10_000)).await.unwrap();
    sales.cancel(sale.id, None).await.unwrap();

    assert!(sales.detail(sale.id).await.unwrap().entries.is_empty());
    assert_eq!(s.app.ledger().balance(s.referrer).await.unwrap(), Money::ZERO);
  }

  #[tokio::test]
  async fn test_complete_twice_credits_once() {
    let s = scenario().await;
    let sales = s.app.sales();

    let sale = sales.record(new_sale(s.merchant, s.client, 10_000)).await.unwrap();
    let (first, second) =
      futures::join!(sales.complete(sale.id), sales.complete(sale.id));

    assert!(first.is_ok() != second.is_ok());
    assert_eq!(s.app.ledger().balance(s.client).await.unwrap(), cents(200));
    assert_eq!(s.app.ledger().balance(s.referrer).await.unwrap(), cents(100));
  }

  #[tokio::test]
  async fn test_rate_change_does_not_touch_recorded_sale() {
    let s = scenario().await;
    let admin = test_db::user(&s.app, UserRole::Admin).await;
    let sales = s.app.sales();

    let sale = sales.record(new_sale(s.merchant, s.client, 10_000)).await.unwrap();
    s.app
      .rates()
      .set(
        admin.id,
        RateSet {
          cashback: Rate::from_bps(1_000).unwrap(),
          referral_commission: Rate::from_bps(500).unwrap(),
          platform_fee: Rate::from_bps(300).unwrap(),
        },
      )
      .await
      .unwrap();

    let sale = sales.complete(sale.id).await.unwrap();
    assert_eq!(sale.rate_version, 1);
    assert_eq!(s.app.ledger().balance(s.client).await.unwrap(), cents(200));
    assert_eq!(s.app.ledger().balance(s.referrer).await.unwrap(), cents(100));

    let later = sales.record(new_sale(s.merchant, s.client, 10_000)).await.unwrap();
    assert_eq!(later.rate_version, 2);
    assert_eq!(later.cashback_amount, 1_000);
    assert_eq!(later.platform_fee_amount, 300);
  }

  #[tokio::test]
  async fn test_auto_complete_when_confirmation_disabled() {
    let app = test_db::app_with(Config {
      sale_requires_confirmation: false,
      ..Config::default()
    })
    .await;
    let merchant = test_db::user(&app, UserRole::Merchant).await;
    let referrer = test_db::user(&app, UserRole::Client).await;
    let client = referred(&app, UserRole::Client, &referrer).await;

    let sale =
      app.sales().record(new_sale(merchant.id, client.id, 10_000)).await.unwrap();

    assert_eq!(sale.status, SaleStatus::Completed);
    assert_eq!(app.ledger().balance(client.id).await.unwrap(), cents(200));
    assert_eq!(app.ledger().balance(referrer.id).await.unwrap(), cents(100));
  }

  #[tokio::test]
  async fn test_tiny_sale_completes_without_entries() {
    let s = scenario().await;
    let sales = s.app.sales();

    // 0.20 * 2% rounds to zero cashback, 0.20 * 1% to zero commission
    let sale = sales.record(new_sale(s.merchant, s.client, 20)).await.unwrap();
    assert_eq!(sale.cashback_amount, 0);
    let sale = sales.complete(sale.id).await.unwrap();

    assert_eq!(sale.status, SaleStatus::Completed);
    assert!(sales.detail(sale.id).await.unwrap().entries.is_empty());
    // cancelling still works with nothing to reverse
    sales.cancel(sale.id, None).await.unwrap();
  }

  #[tokio::test]
  async fn test_cancel_after_manual_reversal() {
    let s = scenario().await;
    let sales = s.app.sales();

    let sale = sales.record(new_sale(s.merchant, s.client, 10_000)).await.unwrap();
    sales.complete(sale.id).await.unwrap();
    let cashback = sales.detail(sale.id).await.unwrap().entries[0].id;
    s.app.ledger().reverse(cashback).await.unwrap();

    sales.cancel(sale.id, None).await.unwrap();
    assert_eq!(s.app.ledger().balance(s.client).await.unwrap(), Money::ZERO);
  }

  #[tokio::test]
  async fn test_amount_limit() {
    let s = scenario().await;
    let admin = test_db::user(&s.app, UserRole::Admin).await;
    let sales = s.app.sales();
    s.app
      .rates()
      .set(
        admin.id,
        RateSet {
          cashback: Rate::from_bps(10_000).unwrap(),
          referral_commission: Rate::ZERO,
          platform_fee: Rate::ZERO,
        },
      )
      .await
      .unwrap();

    let over = Money::MAX.minor() + 1;
    let result = sales.record(new_sale(s.merchant, s.client, over)).await;
    assert!(matches!(result, Err(Error::InvalidAmount(_))));
    let result = sales.record(new_sale(s.merchant, s.client, i64::MAX)).await;
    assert!(matches!(result, Err(Error::InvalidAmount(_))));

    for _ in 0..2 {
      let sale = sales
        .record(new_sale(s.merchant, s.client, Money::MAX.minor()))
        .await
        .unwrap();
      sales.complete(sale.id).await.unwrap();
    }

    let sheet = s.app.ledger().sheet(s.client).await.unwrap();
    assert_eq!(sheet.balance, cents(Money::MAX.minor() * 2));
    assert_eq!(sheet.available, sheet.balance);
    s.app.stats().summary().await.unwrap();
  }

  #[tokio::test]
  async fn test_failed_commission_rolls_back_completion() {
    let s = scenario().await;
    let sales = s.app.sales();
    let sale = sales.record(new_sale(s.merchant, s.client, 10_000)).await.unwrap();

    s.app
      .db
      .execute_unprepared(
        "CREATE TRIGGER reject_commission BEFORE INSERT ON ledger_entries \
         WHEN NEW.kind = 'referral_commission' \
         BEGIN SELECT RAISE(ABORT, 'commission rejected'); END",
      )
      .await
      .unwrap();

    assert!(sales.complete(sale.id).await.is_err());
    assert_eq!(sales.by_id(sale.id).await.unwrap().status, SaleStatus::Pending);
    assert!(sales.detail(sale.id).await.unwrap().entries.is_empty());
    assert_eq!(s.app.ledger().balance(s.client).await.unwrap(), Money::ZERO);
    assert_eq!(s.app.ledger().balance(s.referrer).await.unwrap(), Money::ZERO);

    s.app
      .db
      .execute_unprepared("DROP TRIGGER reject_commission")
      .await
      .unwrap();
    let sale = sales.complete(sale.id).await.unwrap();
    assert_eq!(sale.status, SaleStatus::Completed);
    assert_eq!(s.app.ledger().balance(s.client).await.unwrap(), cents(200));
    assert_eq!(s.app.ledger().balance(s.referrer).await.unwrap(), cents(100));
  }

  #[tokio::test]
  async fn test_blocked_client_cannot_complete() {
    let s = scenario().await;
    let admin = test_db::user(&s.app, UserRole::Admin).await;
    let sales = s.app.sales();
    let sale = sales.record(new_sale(s.merchant, s.client, 10_000)).await.unwrap();

    s.app
      .users()
      .set_status(admin.id, s.client, UserStatus::Blocked)
      .await
      .unwrap();

    let result = sales.complete(sale.id).await;
    assert!(matches!(result, Err(Error::UserNotActive(id)) if id == s.client));
    assert_eq!(sales.by_id(sale.id).await.unwrap().status, SaleStatus::Pending);
    assert_eq!(s.app.ledger().balance(s.client).await.unwrap(), Money::ZERO);

    // still cancellable
    let sale = sales.cancel(sale.id, Some("blocked".into())).await.unwrap();
    assert_eq!(sale.status, SaleStatus::Cancelled);
  }

  #[tokio::test]
  async fn test_listings() {
    let s = scenario().await;
    let sales = s.app.sales();

    let first = sales.record(new_sale(s.merchant, s.client, 1_000)).await.unwrap();
    let second = sales.record(new_sale(s.merchant, s.client, 2_000)).await.unwrap();
    sales.complete(second.id).await.unwrap();

    let merchant = sales.by_user(s.merchant, PageQuery::default()).await.unwrap();
    let ids: Vec<i32> = merchant.items.iter().map(|sale| sale.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let client = sales.by_user(s.client, PageQuery::default()).await.unwrap();
    assert_eq!(client.total, 2);

    let referrer = sales.by_user(s.referrer, PageQuery::default()).await.unwrap();
    assert_eq!(referrer.total, 0);

    let pending =
      sales.list(Some(SaleStatus::Pending), PageQuery::default()).await.unwrap();
    assert_eq!(pending.total, 1);
    assert_eq!(pending.items[0].id, first.id);
  }
}
