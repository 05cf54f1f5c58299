use sea_orm_migration::prelude::*;

use super::m20260301_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(RateSettings::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(RateSettings::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(RateSettings::CashbackBps).integer().not_null())
          .col(
            ColumnDef::new(RateSettings::ReferralCommissionBps)
              .integer()
              .not_null(),
          )
          .col(
            ColumnDef::new(RateSettings::PlatformFeeBps).integer().not_null(),
          )
          .col(ColumnDef::new(RateSettings::SetBy).integer().null())
          .col(ColumnDef::new(RateSettings::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_rate_settings_set_by")
              .from(RateSettings::Table, RateSettings::SetBy)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::SetNull),
          )
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(RateSettings::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum RateSettings {
  Table,
  Id,
  CashbackBps,
  ReferralCommissionBps,
  PlatformFeeBps,
  SetBy,
  CreatedAt,
}
