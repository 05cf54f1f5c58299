use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{ledger_entry, user};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
  #[sea_orm(string_value = "cash")]
  Cash,
  #[sea_orm(string_value = "credit_card")]
  CreditCard,
  #[sea_orm(string_value = "debit_card")]
  DebitCard,
  #[sea_orm(string_value = "pix")]
  Pix,
  #[sea_orm(string_value = "bank_transfer")]
  BankTransfer,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
  #[sea_orm(string_value = "pending")]
  #[default]
  Pending,
  #[sea_orm(string_value = "completed")]
  Completed,
  #[sea_orm(string_value = "cancelled")]
  Cancelled,
  #[sea_orm(string_value = "refunded")]
  Refunded,
}

/// A merchant sale. Amounts and rates are frozen at creation; only `status`,
/// `reason` and `updated_at` ever change.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub merchant_id: i32,
  pub client_id: i32,
  pub gross_amount: i64,
  pub payment_method: PaymentMethod,
  pub rate_version: i32,
  pub cashback_bps: i32,
  pub referral_commission_bps: i32,
  pub platform_fee_bps: i32,
  pub cashback_amount: i64,
  pub platform_fee_amount: i64,
  pub status: SaleStatus,
  pub reason: Option<String>,
  pub created_at: DateTime,
  pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::MerchantId",
    to = "user::Column::Id"
  )]
  Merchant,
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::ClientId",
    to = "user::Column::Id"
  )]
  Client,
  #[sea_orm(has_many = "ledger_entry::Entity")]
  LedgerEntries,
}

impl Related<ledger_entry::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::LedgerEntries.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
