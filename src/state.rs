use anyhow::Context;
use migration::Migrator;
use sea_orm::ConnectOptions;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{config::Config, prelude::*, sv};

pub struct AppState {
  pub db: DatabaseConnection,
  pub config: Config,
  pub locks: UserLocks,
}

impl AppState {
  pub async fn new(config: Config) -> anyhow::Result<Self> {
    let mut options = ConnectOptions::new(config.database_url.clone());
    options.max_connections(config.db_max_connections).sqlx_logging(false);

    let db = Database::connect(options)
      .await
      .context("Failed to connect to database")?;

    Migrator::up(&db, None).await.context("Failed to run migrations")?;

    Self::from_db(db, config).await.context("Failed to initialise state")
  }

  /// Wraps an already migrated connection and seeds first-run data.
  pub async fn from_db(db: DatabaseConnection, config: Config) -> Result<Self> {
    let app = Self { db, config, locks: UserLocks::default() };

    let rates = app.rates().ensure_seeded(app.config.default_rates).await?;
    info!(
      "Rates v{}: cashback {}, referral commission {}, platform fee {}",
      rates.version,
      rates.set.cashback,
      rates.set.referral_commission,
      rates.set.platform_fee
    );

    if let Some(name) = app.config.bootstrap_admin.clone()
      && let Some(admin) = app.users().bootstrap_admin(&name).await?
    {
      info!("Bootstrapped admin `{}` with id {}", admin.name, admin.id);
    }

    Ok(app)
  }

  pub fn gc_locks(&self) -> usize {
    self.locks.gc()
  }
}

/// Service accessors, so handlers read `app.sales().complete(id)`.
pub trait Services {
  fn users(&self) -> sv::User<'_>;
  fn ledger(&self) -> sv::Ledger<'_>;
  fn sales(&self) -> sv::Sale<'_>;
  fn referrals(&self) -> sv::Referral<'_>;
  fn transfers(&self) -> sv::Transfer<'_>;
  fn withdrawals(&self) -> sv::Withdrawal<'_>;
  fn rates(&self) -> sv::Rates<'_>;
  fn stats(&self) -> sv::Stats<'_>;
  fn audit(&self) -> sv::Audit<'_>;
}

impl Services for AppState {
  fn users(&self) -> sv::User<'_> {
    sv::User::new(self)
  }

  fn ledger(&self) -> sv::Ledger<'_> {
    sv::Ledger::new(self)
  }

  fn sales(&self) -> sv::Sale<'_> {
    sv::Sale::new(self)
  }

  fn referrals(&self) -> sv::Referral<'_> {
    sv::Referral::new(self)
  }

  fn transfers(&self) -> sv::Transfer<'_> {
    sv::Transfer::new(self)
  }

  fn withdrawals(&self) -> sv::Withdrawal<'_> {
    sv::Withdrawal::new(self)
  }

  fn rates(&self) -> sv::Rates<'_> {
    sv::Rates::new(&self.db)
  }

  fn stats(&self) -> sv::Stats<'_> {
    sv::Stats::new(&self.db)
  }

  fn audit(&self) -> sv::Audit<'_> {
    sv::Audit::new(&self.db)
  }
}

/// Per-user async mutexes serialising read-then-debit sequences.
///
/// Always acquire before beginning a database transaction; with a single
/// pooled connection the reverse order deadlocks.
#[derive(Default)]
pub struct UserLocks {
  slots: DashMap<i32, Arc<Mutex<()>>>,
}

pub struct UserGuard {
  _guards: Vec<OwnedMutexGuard<()>>,
}

impl UserLocks {
  /// Locks every listed user in ascending id order.
  pub async fn acquire(&self, users: &[i32]) -> UserGuard {
    let mut ids = users.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let mut guards = Vec::with_capacity(ids.len());
    for id in ids {
      let slot = self.slots.entry(id).or_default().clone();
      guards.push(slot.lock_owned().await);
    }
    UserGuard { _guards: guards }
  }

  /// Drops slots nobody holds or waits on. Returns how many were dropped.
  pub fn gc(&self) -> usize {
    let before = self.slots.len();
    self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
    before - self.slots.len()
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }
}
