use crate::{
  config::Config,
  entity::{UserRole, UserStatus, user},
  prelude::*,
  state::AppState,
  sv::{ledger::find_user, referral},
};

#[derive(Debug, Clone)]
pub struct NewUser {
  pub name: String,
  pub role: UserRole,
  /// Code of the referring user, resolved once here and never again.
  pub referral_code: Option<String>,
}

pub struct User<'a> {
  db: &'a DatabaseConnection,
  config: &'a Config,
}

impl<'a> User<'a> {
  pub fn new(app: &'a AppState) -> Self {
    Self { db: &app.db, config: &app.config }
  }

  /// Public registration of clients and merchants.
  pub async fn register(&self, new: NewUser) -> Result<user::Model> {
    if new.role == UserRole::Admin {
      return Err(Error::Forbidden("admins cannot self-register".into()));
    }

    let referred_by = match new.referral_code.as_deref().map(str::trim) {
      Some(code) if !code.is_empty() => {
        let referrer = referral::by_code(self.db, code).await?;
        if !referrer.is_active() {
          return Err(Error::UserNotActive(referrer.id));
        }
        Some(referrer.id)
      }
      _ => None,
    };

    let user = self.create(&new.name, new.role, referred_by).await?;
    info!(
      user_id = user.id,
      referred_by = ?user.referred_by,
      "registered {:?} `{}` with code {}",
      user.role,
      user.name,
      user.referral_code
    );
    Ok(user)
  }

  /// Inserts a user with a freshly issued referral code.
  pub(crate) async fn create(
    &self,
    name: &str,
    role: UserRole,
    referred_by: Option<i32>,
  ) -> Result<user::Model> {
    let len = self.config.referral_code_length;
    let codes = std::iter::repeat_with(move || referral::generate_code(len));
    self.create_with_codes(name, role, referred_by, codes).await
  }

  /// Tries codes from `codes` until one is unique. A collision is retried up
  /// to the configured number of attempts, then reported as internal.
  pub(crate) async fn create_with_codes(
    &self,
    name: &str,
    role: UserRole,
    referred_by: Option<i32>,
    mut codes: impl Iterator<Item = String> + Send,
  ) -> Result<user::Model> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 100 {
      return Err(Error::InvalidArgs("name must be 1..=100 characters".into()));
    }

    for _ in 0..self.config.referral_code_attempts {
      let code = codes
        .next()
        .ok_or_else(|| Error::Internal("referral code source ran dry".into()))?;

      match self.insert(name, role, referred_by, code).await {
        Err(Error::DuplicateReferralCode(code)) => {
          warn!("Referral code collision on `{}`, regenerating", code);
        }
        result => return result,
      }
    }

    error!(
      "Gave up issuing a referral code after {} attempts",
      self.config.referral_code_attempts
    );
    Err(Error::Internal("could not issue a unique referral code".into()))
  }

  async fn insert(
    &self,
    name: &str,
    role: UserRole,
    referred_by: Option<i32>,
    code: String,
  ) -> Result<user::Model> {
    let taken = user::Entity::find()
      .filter(user::Column::ReferralCode.eq(&code))
      .one(self.db)
      .await?
      .is_some();
    if taken {
      return Err(Error::DuplicateReferralCode(code));
    }

    let model = user::ActiveModel {
      id: NotSet,
      name: Set(name.to_string()),
      role: Set(role),
      status: Set(UserStatus::Active),
      referral_code: Set(code.clone()),
      referred_by: Set(referred_by),
      created_at: Set(now()),
    };

    model.insert(self.db).await.map_err(|err| {
      let err = Error::from(err);
      if err.is_unique_violation() {
        Error::DuplicateReferralCode(code)
      } else {
        err
      }
    })
  }

  pub async fn by_id(&self, user_id: i32) -> Result<user::Model> {
    find_user(self.db, user_id).await
  }

  /// Admin action. `referred_by` is deliberately not settable here or
  /// anywhere else.
  pub async fn set_status(
    &self,
    admin_id: i32,
    user_id: i32,
    status: UserStatus,
  ) -> Result<user::Model> {
    require_admin(self.db, admin_id).await?;
    if admin_id == user_id && status != UserStatus::Active {
      return Err(Error::InvalidArgs("admins cannot deactivate themselves".into()));
    }

    let user = find_user(self.db, user_id).await?;
    let user = user::ActiveModel { status: Set(status), ..user.into() }
      .update(self.db)
      .await?;

    info!(user_id, admin_id, "user status set to {:?}", status);
    Ok(user)
  }

  /// Creates the first admin when none exists yet.
  pub async fn bootstrap_admin(&self, name: &str) -> Result<Option<user::Model>> {
    let exists = user::Entity::find()
      .filter(user::Column::Role.eq(UserRole::Admin))
      .one(self.db)
      .await?
      .is_some();
    if exists {
      return Ok(None);
    }
    Ok(Some(self.create(name, UserRole::Admin, None).await?))
  }
}

pub(crate) async fn require_active<C: ConnectionTrait>(
  conn: &C,
  user_id: i32,
) -> Result<user::Model> {
  let user = find_user(conn, user_id).await?;
  if !user.is_active() {
    return Err(Error::UserNotActive(user_id));
  }
  Ok(user)
}

pub(crate) async fn require_admin<C: ConnectionTrait>(
  conn: &C,
  user_id: i32,
) -> Result<user::Model> {
  let user = require_active(conn, user_id).await?;
  if user.role != UserRole::Admin {
    return Err(Error::Forbidden("admin role required".into()));
  }
  Ok(user)
}
