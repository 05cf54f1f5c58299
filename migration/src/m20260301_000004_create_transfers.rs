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
          .table(Transfers::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Transfers::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Transfers::FromUserId).integer().not_null())
          .col(ColumnDef::new(Transfers::ToUserId).integer().not_null())
          .col(ColumnDef::new(Transfers::Amount).big_integer().not_null())
          .col(ColumnDef::new(Transfers::Description).string().null())
          .col(ColumnDef::new(Transfers::Status).string().not_null())
          .col(ColumnDef::new(Transfers::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Transfers::ResolvedAt).date_time().null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_transfers_from")
              .from(Transfers::Table, Transfers::FromUserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_transfers_to")
              .from(Transfers::Table, Transfers::ToUserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_transfers_from_status")
          .table(Transfers::Table)
          .col(Transfers::FromUserId)
          .col(Transfers::Status)
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_transfers_to")
          .table(Transfers::Table)
          .col(Transfers::ToUserId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Transfers::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Transfers {
  Table,
  Id,
  FromUserId,
  ToUserId,
  Amount,
  Description,
  Status,
  CreatedAt,
  ResolvedAt,
}
