use serde::Serialize;

use crate::{entity::rate_setting, prelude::*, sv::user::require_admin};

/// The three percentages a sale captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateSet {
  pub cashback: Rate,
  pub referral_commission: Rate,
  pub platform_fee: Rate,
}

impl RateSet {
  pub fn validate(&self) -> Result<()> {
    if self.cashback.bps() + self.referral_commission.bps() > 10_000 {
      return Err(Error::InvalidArgs(
        "cashback and referral commission together exceed 100%".into(),
      ));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateVersion {
  pub version: i32,
  #[serde(flatten)]
  pub set: RateSet,
  pub set_by: Option<i32>,
  pub created_at: DateTime,
}

impl TryFrom<rate_setting::Model> for RateVersion {
  type Error = Error;

  fn try_from(model: rate_setting::Model) -> Result<Self> {
    let rate = |bps: i32| {
      u32::try_from(bps)
        .map_err(|_| Error::Internal(format!("negative rate in v{}", model.id)))
        .and_then(|bps| Ok(Rate::from_bps(bps)?))
    };
    Ok(Self {
      version: model.id,
      set: RateSet {
        cashback: rate(model.cashback_bps)?,
        referral_commission: rate(model.referral_commission_bps)?,
        platform_fee: rate(model.platform_fee_bps)?,
      },
      set_by: model.set_by,
      created_at: model.created_at,
    })
  }
}

pub struct Rates<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> Rates<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  /// The version in effect right now.
  pub async fn current(&self) -> Result<RateVersion> {
    current(self.db).await
  }

  /// Inserts version 1 from configuration when the table is empty.
  pub async fn ensure_seeded(&self, defaults: RateSet) -> Result<RateVersion> {
    let exists = rate_setting::Entity::find().one(self.db).await?.is_some();
    if !exists {
      defaults.validate()?;
      insert(self.db, defaults, None).await?;
      info!("Seeded default rates");
    }
    self.current().await
  }

  /// Admin action: publishes a new rate version. Existing sales keep the
  /// rates they captured.
  pub async fn set(&self, admin_id: i32, rates: RateSet) -> Result<RateVersion> {
    rates.validate()?;
    require_admin(self.db, admin_id).await?;

    let version = insert(self.db, rates, Some(admin_id)).await?;
    info!(
      version = version.version,
      admin_id,
      "rates updated: cashback {}, referral commission {}, platform fee {}",
      rates.cashback,
      rates.referral_commission,
      rates.platform_fee
    );
    Ok(version)
  }

  /// Every version, newest first.
  pub async fn history(&self) -> Result<Vec<RateVersion>> {
    rate_setting::Entity::find()
      .order_by_desc(rate_setting::Column::Id)
      .all(self.db)
      .await?
      .into_iter()
      .map(RateVersion::try_from)
      .collect()
  }
}

pub(crate) async fn current<C: ConnectionTrait>(conn: &C) -> Result<RateVersion> {
  rate_setting::Entity::find()
    .order_by_desc(rate_setting::Column::Id)
    .one(conn)
    .await?
    .ok_or_else(|| Error::Internal("no rate settings configured".into()))?
    .try_into()
}

async fn insert<C: ConnectionTrait>(
  conn: &C,
  rates: RateSet,
  set_by: Option<i32>,
) -> Result<RateVersion> {
  let model = rate_setting::ActiveModel {
    id: NotSet,
    cashback_bps: Set(rates.cashback.bps() as i32),
    referral_commission_bps: Set(rates.referral_commission.bps() as i32),
    platform_fee_bps: Set(rates.platform_fee.bps() as i32),
    set_by: Set(set_by),
    created_at: Set(now()),
  }
  .insert(conn)
  .await?;

  model.try_into()
}
