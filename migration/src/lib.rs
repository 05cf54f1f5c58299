pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_users;
mod m20260301_000002_create_rate_settings;
mod m20260301_000003_create_sales;
mod m20260301_000004_create_transfers;
mod m20260301_000005_create_withdrawals;
mod m20260301_000006_create_ledger_entries;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20260301_000001_create_users::Migration),
      Box::new(m20260301_000002_create_rate_settings::Migration),
      Box::new(m20260301_000003_create_sales::Migration),
      Box::new(m20260301_000004_create_transfers::Migration),
      Box::new(m20260301_000005_create_withdrawals::Migration),
      Box::new(m20260301_000006_create_ledger_entries::Migration),
    ]
  }
}
