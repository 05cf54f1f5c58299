use sea_orm_migration::prelude::*;

use super::{
  m20260301_000001_create_users::Users, m20260301_000003_create_sales::Sales,
  m20260301_000004_create_transfers::Transfers,
  m20260301_000005_create_withdrawals::Withdrawals,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(LedgerEntries::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(LedgerEntries::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(LedgerEntries::UserId).integer().not_null())
          .col(ColumnDef::new(LedgerEntries::Amount).big_integer().not_null())
          .col(ColumnDef::new(LedgerEntries::Kind).string().not_null())
          .col(
            ColumnDef::new(LedgerEntries::RelatedTransactionId)
              .integer()
              .null(),
          )
          .col(ColumnDef::new(LedgerEntries::TransferId).integer().null())
          .col(ColumnDef::new(LedgerEntries::WithdrawalId).integer().null())
          .col(ColumnDef::new(LedgerEntries::ReversesEntryId).integer().null())
          .col(ColumnDef::new(LedgerEntries::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_ledger_entries_user")
              .from(LedgerEntries::Table, LedgerEntries::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_ledger_entries_sale")
              .from(LedgerEntries::Table, LedgerEntries::RelatedTransactionId)
              .to(Sales::Table, Sales::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_ledger_entries_transfer")
              .from(LedgerEntries::Table, LedgerEntries::TransferId)
              .to(Transfers::Table, Transfers::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_ledger_entries_withdrawal")
              .from(LedgerEntries::Table, LedgerEntries::WithdrawalId)
              .to(Withdrawals::Table, Withdrawals::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_ledger_entries_reverses")
              .from(LedgerEntries::Table, LedgerEntries::ReversesEntryId)
              .to(LedgerEntries::Table, LedgerEntries::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_ledger_entries_user")
          .table(LedgerEntries::Table)
          .col(LedgerEntries::UserId)
          .col(LedgerEntries::Id)
          .to_owned(),
      )
      .await?;

    // one reversal per entry
    manager
      .create_index(
        Index::create()
          .name("idx_ledger_entries_reverses")
          .table(LedgerEntries::Table)
          .col(LedgerEntries::ReversesEntryId)
          .unique()
          .to_owned(),
      )
      .await?;

    // a sale posts each kind at most once per user
    manager
      .create_index(
        Index::create()
          .name("idx_ledger_entries_sale_kind")
          .table(LedgerEntries::Table)
          .col(LedgerEntries::RelatedTransactionId)
          .col(LedgerEntries::UserId)
          .col(LedgerEntries::Kind)
          .unique()
          .to_owned(),
      )
      .await?;

    let db = manager.get_connection();

    db.execute_unprepared(
      "CREATE TRIGGER ledger_entries_no_update BEFORE UPDATE ON ledger_entries \
       BEGIN SELECT RAISE(ABORT, 'ledger entries are append-only'); END",
    )
    .await?;

    db.execute_unprepared(
      "CREATE TRIGGER ledger_entries_no_delete BEFORE DELETE ON ledger_entries \
       BEGIN SELECT RAISE(ABORT, 'ledger entries are append-only'); END",
    )
    .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    let db = manager.get_connection();
    db.execute_unprepared("DROP TRIGGER IF EXISTS ledger_entries_no_update")
      .await?;
    db.execute_unprepared("DROP TRIGGER IF EXISTS ledger_entries_no_delete")
      .await?;

    manager
      .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum LedgerEntries {
  Table,
  Id,
  UserId,
  Amount,
  Kind,
  RelatedTransactionId,
  TransferId,
  WithdrawalId,
  ReversesEntryId,
  CreatedAt,
}
