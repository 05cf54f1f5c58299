use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::ledger_entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
  #[sea_orm(string_value = "client")]
  Client,
  #[sea_orm(string_value = "merchant")]
  Merchant,
  #[sea_orm(string_value = "admin")]
  Admin,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
  #[sea_orm(string_value = "active")]
  #[default]
  Active,
  #[sea_orm(string_value = "inactive")]
  Inactive,
  #[sea_orm(string_value = "blocked")]
  Blocked,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub name: String,
  pub role: UserRole,
  pub status: UserStatus,
  #[sea_orm(unique)]
  pub referral_code: String,
  /// Set once at registration.
  pub referred_by: Option<i32>,
  pub created_at: DateTime,
}

impl Model {
  pub fn is_active(&self) -> bool {
    self.status == UserStatus::Active
  }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "Entity",
    from = "Column::ReferredBy",
    to = "Column::Id"
  )]
  Referrer,
  #[sea_orm(has_many = "ledger_entry::Entity")]
  LedgerEntries,
}

impl Related<ledger_entry::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::LedgerEntries.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
