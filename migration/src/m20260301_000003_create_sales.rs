use sea_orm_migration::prelude::*;

use super::{
  m20260301_000001_create_users::Users,
  m20260301_000002_create_rate_settings::RateSettings,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Sales::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Sales::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Sales::MerchantId).integer().not_null())
          .col(ColumnDef::new(Sales::ClientId).integer().not_null())
          .col(ColumnDef::new(Sales::GrossAmount).big_integer().not_null())
          .col(ColumnDef::new(Sales::PaymentMethod).string().not_null())
          .col(ColumnDef::new(Sales::RateVersion).integer().not_null())
          .col(ColumnDef::new(Sales::CashbackBps).integer().not_null())
          .col(
            ColumnDef::new(Sales::ReferralCommissionBps).integer().not_null(),
          )
          .col(ColumnDef::new(Sales::PlatformFeeBps).integer().not_null())
          .col(ColumnDef::new(Sales::CashbackAmount).big_integer().not_null())
          .col(
            ColumnDef::new(Sales::PlatformFeeAmount).big_integer().not_null(),
          )
          .col(
            ColumnDef::new(Sales::Status)
              .string()
              .not_null()
              .default("pending"),
          )
          .col(ColumnDef::new(Sales::Reason).string().null())
          .col(ColumnDef::new(Sales::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Sales::UpdatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_sales_merchant")
              .from(Sales::Table, Sales::MerchantId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_sales_client")
              .from(Sales::Table, Sales::ClientId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_sales_rate_version")
              .from(Sales::Table, Sales::RateVersion)
              .to(RateSettings::Table, RateSettings::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_sales_merchant")
          .table(Sales::Table)
          .col(Sales::MerchantId)
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_sales_client")
          .table(Sales::Table)
          .col(Sales::ClientId)
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_sales_status")
          .table(Sales::Table)
          .col(Sales::Status)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Sales::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Sales {
  Table,
  Id,
  MerchantId,
  ClientId,
  GrossAmount,
  PaymentMethod,
  RateVersion,
  CashbackBps,
  ReferralCommissionBps,
  PlatformFeeBps,
  CashbackAmount,
  PlatformFeeAmount,
  Status,
  Reason,
  CreatedAt,
  UpdatedAt,
}
