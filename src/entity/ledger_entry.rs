use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{sale, user};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
  #[sea_orm(string_value = "sale_cashback")]
  SaleCashback,
  #[sea_orm(string_value = "referral_commission")]
  ReferralCommission,
  #[sea_orm(string_value = "transfer_in")]
  TransferIn,
  #[sea_orm(string_value = "transfer_out")]
  TransferOut,
  #[sea_orm(string_value = "withdrawal")]
  Withdrawal,
  #[sea_orm(string_value = "reversal")]
  Reversal,
}

impl EntryKind {
  pub fn is_debit(self) -> bool {
    matches!(self, EntryKind::TransferOut | EntryKind::Withdrawal)
  }

  pub fn is_credit(self) -> bool {
    matches!(
      self,
      EntryKind::SaleCashback
        | EntryKind::ReferralCommission
        | EntryKind::TransferIn
    )
  }
}

/// Derived on read. An original and the reversal row pointing at it are both
/// `reversed`, so the `posted` rows alone sum to the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
  Posted,
  Reversed,
}

/// Immutable ledger row. The table rejects UPDATE and DELETE.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub user_id: i32,
  pub amount: i64,
  pub kind: EntryKind,
  pub related_transaction_id: Option<i32>,
  pub transfer_id: Option<i32>,
  pub withdrawal_id: Option<i32>,
  pub reverses_entry_id: Option<i32>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::UserId",
    to = "user::Column::Id"
  )]
  User,
  #[sea_orm(
    belongs_to = "sale::Entity",
    from = "Column::RelatedTransactionId",
    to = "sale::Column::Id"
  )]
  Sale,
}

impl Related<user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::User.def()
  }
}

impl Related<sale::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Sale.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
