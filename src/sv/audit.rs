use serde::Serialize;

use crate::{
  entity::{
    EntryKind, SaleStatus, TransferStatus, WithdrawalStatus, ledger_entry, sale,
    transfer, user, withdrawal,
  },
  prelude::*,
  sv::ledger,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
  MissingCashback,
  UnreversedCashback,
  UnbalancedTransfer,
  MissingWithdrawalEntry,
  UnexpectedEntries,
  NegativeAvailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
  pub kind: FindingKind,
  pub entity: &'static str,
  pub id: i32,
  pub detail: String,
}

impl Finding {
  fn new(
    kind: FindingKind,
    entity: &'static str,
    id: i32,
    detail: impl Into<String>,
  ) -> Self {
    Self { kind, entity, id, detail: detail.into() }
  }
}

/// Read-only consistency scan over sales, transfers, withdrawals and
/// balances.
pub struct Audit<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> Audit<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  pub async fn run(&self) -> Result<Vec<Finding>> {
    let entries = ledger_entry::Entity::find()
      .order_by_asc(ledger_entry::Column::Id)
      .all(self.db)
      .await?;
    let reversed: HashSet<i32> =
      entries.iter().filter_map(|entry| entry.reverses_entry_id).collect();

    let mut findings = Vec::new();
    self.sales(&entries, &reversed, &mut findings).await?;
    self.transfers(&entries, &mut findings).await?;
    self.withdrawals(&entries, &mut findings).await?;
    self.balances(&mut findings).await?;

    if findings.is_empty() {
      debug!("audit is clean");
    } else {
      warn!("audit produced {} findings", findings.len());
    }
    Ok(findings)
  }

  async fn sales(
    &self,
    entries: &[ledger_entry::Model],
    reversed: &HashSet<i32>,
    findings: &mut Vec<Finding>,
  ) -> Result<()> {
    let cashback: HashMap<i32, &ledger_entry::Model> = entries
      .iter()
      .filter(|entry| entry.kind == EntryKind::SaleCashback)
      .filter_map(|entry| Some((entry.related_transaction_id?, entry)))
      .collect();

    let sales = sale::Entity::find()
      .filter(sale::Column::CashbackAmount.gt(0))
      .filter(sale::Column::Status.ne(SaleStatus::Pending))
      .all(self.db)
      .await?;

    for sale in sales {
      let entry = cashback.get(&sale.id);
      match (sale.status, entry) {
        (SaleStatus::Completed | SaleStatus::Refunded, None) => {
          findings.push(Finding::new(
            FindingKind::MissingCashback,
            "sale",
            sale.id,
            format!("{:?} sale has no cashback entry", sale.status),
          ));
        }
        (SaleStatus::Completed | SaleStatus::Refunded, Some(entry))
          if entry.amount != sale.cashback_amount =>
        {
          findings.push(Finding::new(
            FindingKind::MissingCashback,
            "sale",
            sale.id,
            format!(
              "cashback entry #{} is {}, sale says {}",
              entry.id,
              Money::from_minor(entry.amount),
              Money::from_minor(sale.cashback_amount)
            ),
          ));
        }
        (SaleStatus::Cancelled, Some(entry)) if !reversed.contains(&entry.id) => {
          findings.push(Finding::new(
            FindingKind::UnreversedCashback,
            "sale",
            sale.id,
            format!("cashback entry #{} was never reversed", entry.id),
          ));
        }
        _ => {}
      }
    }
    Ok(())
  }

  async fn transfers(
    &self,
    entries: &[ledger_entry::Model],
    findings: &mut Vec<Finding>,
  ) -> Result<()> {
    let mut by_transfer: HashMap<i32, Vec<&ledger_entry::Model>> =
      HashMap::new();
    for entry in entries {
      if let Some(id) = entry.transfer_id
        && entry.kind != EntryKind::Reversal
      {
        by_transfer.entry(id).or_default().push(entry);
      }
    }

    for transfer in transfer::Entity::find().all(self.db).await? {
      let posted = by_transfer.remove(&transfer.id).unwrap_or_default();

      if transfer.status != TransferStatus::Completed {
        if !posted.is_empty() {
          findings.push(Finding::new(
            FindingKind::UnexpectedEntries,
            "transfer",
            transfer.id,
            format!("{:?} transfer has {} entries", transfer.status, posted.len()),
          ));
        }
        continue;
      }

      let out = posted.iter().any(|entry| {
        entry.kind == EntryKind::TransferOut
          && entry.user_id == transfer.from_user_id
          && entry.amount == -transfer.amount
      });
      let into = posted.iter().any(|entry| {
        entry.kind == EntryKind::TransferIn
          && entry.user_id == transfer.to_user_id
          && entry.amount == transfer.amount
      });
      if !(out && into && posted.len() == 2) {
        findings.push(Finding::new(
          FindingKind::UnbalancedTransfer,
          "transfer",
          transfer.id,
          format!("expected an out/in pair, found {} entries", posted.len()),
        ));
      }
    }
    Ok(())
  }

  async fn withdrawals(
    &self,
    entries: &[ledger_entry::Model],
    findings: &mut Vec<Finding>,
  ) -> Result<()> {
    let mut by_withdrawal: HashMap<i32, Vec<&ledger_entry::Model>> =
      HashMap::new();
    for entry in entries {
      if let Some(id) = entry.withdrawal_id
        && entry.kind != EntryKind::Reversal
      {
        by_withdrawal.entry(id).or_default().push(entry);
      }
    }

    for withdrawal in withdrawal::Entity::find().all(self.db).await? {
      let posted = by_withdrawal.remove(&withdrawal.id).unwrap_or_default();
      match withdrawal.status {
        WithdrawalStatus::Completed => {
          let found = posted.iter().any(|entry| {
            entry.kind == EntryKind::Withdrawal
              && entry.amount == -withdrawal.amount
          });
          if !found {
            findings.push(Finding::new(
              FindingKind::MissingWithdrawalEntry,
              "withdrawal",
              withdrawal.id,
              "completed withdrawal has no matching debit",
            ));
          }
        }
        status if !posted.is_empty() => {
          findings.push(Finding::new(
            FindingKind::UnexpectedEntries,
            "withdrawal",
            withdrawal.id,
            format!("{status:?} withdrawal has {} entries", posted.len()),
          ));
        }
        _ => {}
      }
    }
    Ok(())
  }

  async fn balances(&self, findings: &mut Vec<Finding>) -> Result<()> {
    let ids: Vec<i32> = user::Entity::find()
      .select_only()
      .column(user::Column::Id)
      .order_by_asc(user::Column::Id)
      .into_tuple()
      .all(self.db)
      .await?;

    for user_id in ids {
      let sheet = ledger::sheet(self.db, user_id).await?;
      if sheet.available.is_negative() {
        findings.push(Finding::new(
          FindingKind::NegativeAvailable,
          "user",
          user_id,
          format!(
            "balance {}, reserved {}, available {}",
            sheet.balance, sheet.reserved, sheet.available
          ),
        ));
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    entity::{PaymentMethod, UserRole, WithdrawalMethod},
    state::Services,
    sv::{
      sale::NewSale,
      test_utils::test_db::{self, fund},
      transfer::NewTransfer,
    },
  };

  fn sale_of(merchant_id: i32, client_id: i32, gross: i64) -> NewSale {
    NewSale {
      merchant_id,
      client_id,
      gross_amount: Money::from_minor(gross),
      payment_method: PaymentMethod::DebitCard,
    }
  }

  #[tokio::test]
  async fn test_clean_history_has_no_findings() {
    let app = test_db::app().await;
    let merchant = test_db::user(&app, UserRole::Merchant).await;
    let client = test_db::user(&app, UserRole::Client).await;
    let friend = test_db::user(&app, UserRole::Client).await;

    let sale = app.sales().record(sale_of(merchant.id, client.id, 50_000)).await.unwrap();
    app.sales().complete(sale.id).await.unwrap();
    app
      .transfers()
      .initiate(NewTransfer {
        from_user_id: client.id,
        to_user_id: friend.id,
        amount: Money::from_minor(400),
        description: None,
      })
      .await
      .unwrap();
    let cancelled =
      app.sales().record(sale_of(merchant.id, client.id, 10_000)).await.unwrap();
    app.sales().complete(cancelled.id).await.unwrap();
    app.sales().cancel(cancelled.id, None).await.unwrap();

    assert!(app.audit().run().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_detects_missing_cashback() {
    let app = test_db::app().await;
    let merchant = test_db::user(&app, UserRole::Merchant).await;
    let client = test_db::user(&app, UserRole::Client).await;

    let sale = app.sales().record(sale_of(merchant.id, client.id, 10_000)).await.unwrap();
    // flipped behind the service's back, no cashback posted
    sale::Entity::update_many()
      .col_expr(
        sale::Column::Status,
        sea_orm::sea_query::Expr::value(SaleStatus::Completed),
      )
      .filter(sale::Column::Id.eq(sale.id))
      .exec(&app.db)
      .await
      .unwrap();

    let findings = app.audit().run().await.unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, FindingKind::MissingCashback);
    assert_eq!(findings[0].id, sale.id);
  }

  #[tokio::test]
  async fn test_detects_withdrawal_and_balance_problems() {
    let app = test_db::app().await;
    let user = test_db::user(&app, UserRole::Client).await;

    withdrawal::ActiveModel {
      id: NotSet,
      user_id: Set(user.id),
      amount: Set(900),
      method: Set(WithdrawalMethod::Zelle),
      payment_details: Set("{}".into()),
      status: Set(WithdrawalStatus::Completed),
      note: Set(None),
      resolved_by: Set(None),
      created_at: Set(now()),
      resolved_at: Set(Some(now())),
    }
    .insert(&app.db)
    .await
    .unwrap();

    let pending = withdrawal::ActiveModel {
      id: NotSet,
      user_id: Set(user.id),
      amount: Set(700),
      method: Set(WithdrawalMethod::Zelle),
      payment_details: Set("{}".into()),
      status: Set(WithdrawalStatus::Pending),
      note: Set(None),
      resolved_by: Set(None),
      created_at: Set(now()),
      resolved_at: Set(None),
    }
    .insert(&app.db)
    .await
    .unwrap();
    fund(&app, user.id, 500).await;

    let findings = app.audit().run().await.unwrap();
    let kinds: Vec<FindingKind> = findings.iter().map(|f| f.kind).collect();
    assert_eq!(
      kinds,
      vec![FindingKind::MissingWithdrawalEntry, FindingKind::NegativeAvailable]
    );
    assert_eq!(findings[1].id, user.id);
    assert_ne!(findings[0].id, pending.id);
  }
}
