use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::user;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
  #[sea_orm(string_value = "pending")]
  Pending,
  #[sea_orm(string_value = "completed")]
  Completed,
  #[sea_orm(string_value = "cancelled")]
  Cancelled,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transfers")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub from_user_id: i32,
  pub to_user_id: i32,
  pub amount: i64,
  pub description: Option<String>,
  pub status: TransferStatus,
  pub created_at: DateTime,
  pub resolved_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::FromUserId",
    to = "user::Column::Id"
  )]
  Sender,
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::ToUserId",
    to = "user::Column::Id"
  )]
  Recipient,
}

impl ActiveModelBehavior for ActiveModel {}
