//! Shared test utilities for database setup

#[cfg(test)]
pub mod test_db {
  use migration::Migrator;
  use sea_orm::ConnectOptions;

  use crate::{
    config::Config,
    entity::{EntryKind, UserRole, user},
    prelude::*,
    state::{AppState, Services},
    sv::ledger::NewEntry,
  };

  /// In-memory SQLite with the real migrations applied. One connection, so
  /// every query sees the same database.
  pub async fn setup() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);

    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
  }

  pub async fn app() -> AppState {
    app_with(Config::default()).await
  }

  pub async fn app_with(config: Config) -> AppState {
    AppState::from_db(setup().await, config).await.unwrap()
  }

  pub async fn user(app: &AppState, role: UserRole) -> user::Model {
    app.users().create(&format!("{role:?}"), role, None).await.unwrap()
  }

  /// A user whose `referred_by` points at `referrer`.
  pub async fn referred(
    app: &AppState,
    role: UserRole,
    referrer: &user::Model,
  ) -> user::Model {
    let name = format!("{role:?} of {}", referrer.id);
    app.users().create(&name, role, Some(referrer.id)).await.unwrap()
  }

  /// Credits `minor` units as standalone cashback.
  pub async fn fund(app: &AppState, user_id: i32, minor: i64) -> i32 {
    app
      .ledger()
      .post_entry(NewEntry::new(
        user_id,
        EntryKind::SaleCashback,
        Money::from_minor(minor),
      ))
      .await
      .unwrap()
  }
}
