use sea_orm::{
  ActiveEnum,
  sea_query::{Expr, Query},
};
use serde::Serialize;

use crate::{
  entity::{
    EntryKind, SaleStatus, UserRole, WithdrawalStatus, ledger_entry, sale, user,
    withdrawal,
  },
  prelude::*,
  sv::ledger::sum_of,
};

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
  pub users: BTreeMap<String, u64>,
  pub sales: BTreeMap<String, u64>,
  /// Gross of sales currently `completed`.
  pub completed_volume: Money,
  pub platform_fees: Money,
  /// Cashback still standing after reversals.
  pub cashback_issued: Money,
  pub cashback_reversed: Money,
  pub commission_issued: Money,
  /// Sum of every user balance.
  pub outstanding: Money,
  pub pending_withdrawals: u64,
  pub pending_withdrawal_amount: Money,
}

pub struct Stats<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> Stats<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  pub async fn summary(&self) -> Result<Summary> {
    let users: Vec<(UserRole, i64)> = user::Entity::find()
      .select_only()
      .column(user::Column::Role)
      .column_as(Expr::col(user::Column::Id).count(), "count")
      .group_by(user::Column::Role)
      .into_tuple()
      .all(self.db)
      .await?;

    let sales: Vec<(SaleStatus, i64)> = sale::Entity::find()
      .select_only()
      .column(sale::Column::Status)
      .column_as(Expr::col(sale::Column::Id).count(), "count")
      .group_by(sale::Column::Status)
      .into_tuple()
      .all(self.db)
      .await?;

    let (completed_volume, platform_fees): (i64, i64) = sale::Entity::find()
      .select_only()
      .expr_as(sum_of(sale::Column::GrossAmount), "gross")
      .expr_as(sum_of(sale::Column::PlatformFeeAmount), "fees")
      .filter(sale::Column::Status.eq(SaleStatus::Completed))
      .into_tuple()
      .one(self.db)
      .await?
      .unwrap_or_default();

    let cashback = self.entries_total(EntryKind::SaleCashback, false).await?;
    let cashback_reversed =
      self.entries_total(EntryKind::SaleCashback, true).await?;
    let commission = self.entries_total(EntryKind::ReferralCommission, false).await?
      - self.entries_total(EntryKind::ReferralCommission, true).await?;

    let outstanding: i64 = ledger_entry::Entity::find()
      .select_only()
      .expr_as(sum_of(ledger_entry::Column::Amount), "total")
      .into_tuple()
      .one(self.db)
      .await?
      .unwrap_or_default();

    let (pending_withdrawals, pending_withdrawal_amount): (i64, i64) =
      withdrawal::Entity::find()
        .select_only()
        .column_as(Expr::col(withdrawal::Column::Id).count(), "count")
        .expr_as(sum_of(withdrawal::Column::Amount), "total")
        .filter(withdrawal::Column::Status.eq(WithdrawalStatus::Pending))
        .into_tuple()
        .one(self.db)
        .await?
        .unwrap_or_default();

    Ok(Summary {
      users: users
        .into_iter()
        .map(|(role, count)| (role.to_value(), count as u64))
        .collect(),
      sales: sales
        .into_iter()
        .map(|(status, count)| (status.to_value(), count as u64))
        .collect(),
      completed_volume: Money::from_minor(completed_volume),
      platform_fees: Money::from_minor(platform_fees),
      cashback_issued: cashback - cashback_reversed,
      cashback_reversed,
      commission_issued: commission,
      outstanding: Money::from_minor(outstanding),
      pending_withdrawals: pending_withdrawals as u64,
      pending_withdrawal_amount: Money::from_minor(pending_withdrawal_amount),
    })
  }

  /// Total of `kind` entries; with `reversed` only those with a reversal.
  async fn entries_total(&self, kind: EntryKind, reversed: bool) -> Result<Money> {
    let mut select = ledger_entry::Entity::find()
      .select_only()
      .expr_as(sum_of(ledger_entry::Column::Amount), "total")
      .filter(ledger_entry::Column::Kind.eq(kind));

    if reversed {
      select = select.filter(
        Expr::col(ledger_entry::Column::Id).in_subquery(
          Query::select()
            .column(ledger_entry::Column::ReversesEntryId)
            .from(ledger_entry::Entity)
            .and_where(
              Expr::col(ledger_entry::Column::ReversesEntryId).is_not_null(),
            )
            .to_owned(),
        ),
      );
    }

    let total: i64 = select.into_tuple().one(self.db).await?.unwrap_or_default();
    Ok(Money::from_minor(total))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    entity::PaymentMethod,
    state::Services,
    sv::{
      sale::NewSale,
      test_utils::test_db::{self, fund, referred},
      withdrawal::{NewWithdrawal, PaymentDetails},
    },
  };

  #[tokio::test]
  async fn test_empty_summary() {
    let app = test_db::app().await;
    let summary = app.stats().summary().await.unwrap();

    assert!(summary.users.is_empty());
    assert!(summary.sales.is_empty());
    assert_eq!(summary.outstanding, Money::ZERO);
    assert_eq!(summary.pending_withdrawals, 0);
  }

  #[tokio::test]
  async fn test_summary_tracks_activity() {
    let app = test_db::app().await;
    let merchant = test_db::user(&app, UserRole::Merchant).await;
    let referrer = test_db::user(&app, UserRole::Client).await;
    let client = referred(&app, UserRole::Client, &referrer).await;

    let sale = |gross: i64| NewSale {
      merchant_id: merchant.id,
      client_id: client.id,
      gross_amount: Money::from_minor(gross),
      payment_method: PaymentMethod::Cash,
    };

    let kept = app.sales().record(sale(10_000)).await.unwrap();
    app.sales().complete(kept.id).await.unwrap();
    let undone = app.sales().record(sale(5_000)).await.unwrap();
    app.sales().complete(undone.id).await.unwrap();
    app.sales().cancel(undone.id, None).await.unwrap();
    app.sales().record(sale(1_000)).await.unwrap();

    fund(&app, merchant.id, 2_000).await;
    app
      .withdrawals()
      .request(NewWithdrawal {
        user_id: merchant.id,
        amount: Money::from_minor(800),
        details: PaymentDetails::Zelle {
          holder_name: "Loja".into(),
          contact: "+55 11 99999-0000".into(),
        },
      })
      .await
      .unwrap();

    let summary = app.stats().summary().await.unwrap();

    assert_eq!(summary.users.get("client"), Some(&2));
    assert_eq!(summary.users.get("merchant"), Some(&1));
    assert_eq!(summary.sales.get("completed"), Some(&1));
    assert_eq!(summary.sales.get("cancelled"), Some(&1));
    assert_eq!(summary.sales.get("pending"), Some(&1));
    assert_eq!(summary.completed_volume, Money::from_minor(10_000));

    // 200 kept, 100 reversed, plus the 2_000 funding entry
    assert_eq!(summary.cashback_issued, Money::from_minor(2_200));
    assert_eq!(summary.cashback_reversed, Money::from_minor(100));
    // commission survives the cancellation: 100 + 50
    assert_eq!(summary.commission_issued, Money::from_minor(150));
    assert_eq!(summary.outstanding, Money::from_minor(2_200 + 150));

    assert_eq!(summary.pending_withdrawals, 1);
    assert_eq!(summary.pending_withdrawal_amount, Money::from_minor(800));
  }
}
