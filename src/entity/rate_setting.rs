use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::user;

/// One version of the admin-configured rates. Rows are only ever inserted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rate_settings")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub cashback_bps: i32,
  pub referral_commission_bps: i32,
  pub platform_fee_bps: i32,
  pub set_by: Option<i32>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::SetBy",
    to = "user::Column::Id"
  )]
  SetBy,
}

impl Related<user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::SetBy.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
