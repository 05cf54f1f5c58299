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
          .table(Withdrawals::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Withdrawals::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Withdrawals::UserId).integer().not_null())
          .col(ColumnDef::new(Withdrawals::Amount).big_integer().not_null())
          .col(ColumnDef::new(Withdrawals::Method).string().not_null())
          .col(ColumnDef::new(Withdrawals::PaymentDetails).text().not_null())
          .col(
            ColumnDef::new(Withdrawals::Status)
              .string()
              .not_null()
              .default("pending"),
          )
          .col(ColumnDef::new(Withdrawals::Note).string().null())
          .col(ColumnDef::new(Withdrawals::ResolvedBy).integer().null())
          .col(ColumnDef::new(Withdrawals::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Withdrawals::ResolvedAt).date_time().null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_withdrawals_user")
              .from(Withdrawals::Table, Withdrawals::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_withdrawals_resolved_by")
              .from(Withdrawals::Table, Withdrawals::ResolvedBy)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::SetNull),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_withdrawals_user_status")
          .table(Withdrawals::Table)
          .col(Withdrawals::UserId)
          .col(Withdrawals::Status)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Withdrawals::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum Withdrawals {
  Table,
  Id,
  UserId,
  Amount,
  Method,
  PaymentDetails,
  Status,
  Note,
  ResolvedBy,
  CreatedAt,
  ResolvedAt,
}
