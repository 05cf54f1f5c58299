use serde::Serialize;
use uuid::Uuid;

use crate::{
  entity::{
    EntryKind, EntryStatus, UserRole, UserStatus, ledger_entry, sale, user,
  },
  prelude::*,
  state::AppState,
  sv::ledger::{self, NewEntry, find_user},
};

pub struct Referral<'a> {
  db: &'a DatabaseConnection,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferredUser {
  pub id: i32,
  pub name: String,
  pub role: UserRole,
  pub status: UserStatus,
  pub joined_at: DateTime,
  /// Commission earned from this user's sales, net of reversed entries.
  pub commission: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralSummary {
  pub user_id: i32,
  pub referral_code: String,
  pub referred_by: Option<i32>,
  pub referred: Vec<ReferredUser>,
  pub total_commission: Money,
}

impl<'a> Referral<'a> {
  pub fn new(app: &'a AppState) -> Self {
    Self { db: &app.db }
  }

  /// Who earns commission when `user_id` transacts. One level only.
  pub async fn resolve_referrer(&self, user_id: i32) -> Result<Option<i32>> {
    resolve_referrer(self.db, user_id).await
  }

  pub async fn by_code(&self, code: &str) -> Result<user::Model> {
    by_code(self.db, code).await
  }

  /// Users referred by `user_id` and what each of them earned the referrer.
  pub async fn summary(&self, user_id: i32) -> Result<ReferralSummary> {
    let owner = find_user(self.db, user_id).await?;

    let referred = user::Entity::find()
      .filter(user::Column::ReferredBy.eq(user_id))
      .order_by_asc(user::Column::Id)
      .all(self.db)
      .await?;

    let commissions = ledger_entry::Entity::find()
      .filter(ledger_entry::Column::UserId.eq(user_id))
      .filter(ledger_entry::Column::Kind.eq(EntryKind::ReferralCommission))
      .find_also_related(sale::Entity)
      .all(self.db)
      .await?;

    let ids: Vec<i32> = commissions.iter().map(|(entry, _)| entry.id).collect();
    let reversed = ledger::reversed_ids(self.db, ids).await?;

    let mut by_client: HashMap<i32, Money> = HashMap::new();
    for (entry, sale) in commissions {
      if ledger::status_of(&entry, &reversed) == EntryStatus::Reversed {
        continue;
      }
      if let Some(sale) = sale {
        *by_client.entry(sale.client_id).or_default() +=
          Money::from_minor(entry.amount);
      }
    }

    let referred: Vec<ReferredUser> = referred
      .into_iter()
      .map(|user| ReferredUser {
        commission: by_client.get(&user.id).copied().unwrap_or_default(),
        id: user.id,
        name: user.name,
        role: user.role,
        status: user.status,
        joined_at: user.created_at,
      })
      .collect();

    Ok(ReferralSummary {
      user_id,
      referral_code: owner.referral_code,
      referred_by: owner.referred_by,
      total_commission: by_client.into_values().sum(),
      referred,
    })
  }
}

/// A fresh uppercase code. Uniqueness is enforced on insert.
pub fn generate_code(len: usize) -> String {
  let mut code = Uuid::new_v4().simple().to_string().to_uppercase();
  code.truncate(len);
  code
}

pub(crate) async fn by_code<C: ConnectionTrait>(
  conn: &C,
  code: &str,
) -> Result<user::Model> {
  user::Entity::find()
    .filter(user::Column::ReferralCode.eq(code.trim().to_uppercase()))
    .one(conn)
    .await?
    .ok_or(Error::ReferralNotFound)
}

pub(crate) async fn resolve_referrer<C: ConnectionTrait>(
  conn: &C,
  user_id: i32,
) -> Result<Option<i32>> {
  Ok(find_user(conn, user_id).await?.referred_by)
}

/// Commission hook run inside the completing transaction of a sale.
///
/// Pays `gross × captured commission rate` to the client's direct referrer.
/// No referrer, an inactive referrer or a commission that rounds to zero is
/// a no-op.
pub(crate) async fn on_sale_completed<C: ConnectionTrait>(
  conn: &C,
  sale: &sale::Model,
) -> Result<Option<ledger_entry::Model>> {
  let Some(referrer_id) = resolve_referrer(conn, sale.client_id).await? else {
    return Ok(None);
  };

  let referrer = find_user(conn, referrer_id).await?;
  if !referrer.is_active() {
    info!(
      sale_id = sale.id,
      referrer_id, "referrer is {:?}, commission skipped", referrer.status
    );
    return Ok(None);
  }

  let rate = u32::try_from(sale.referral_commission_bps)
    .map_err(|_| Error::Internal(format!("sale #{} has a negative rate", sale.id)))
    .and_then(|bps| Ok(Rate::from_bps(bps)?))?;
  let commission = Money::from_minor(sale.gross_amount).apply_rate(rate);
  if commission.is_zero() {
    return Ok(None);
  }

  let entry = ledger::post(
    conn,
    NewEntry::new(referrer_id, EntryKind::ReferralCommission, commission)
      .sale(sale.id),
  )
  .await?;
  Ok(Some(entry))
}
