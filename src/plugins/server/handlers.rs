use std::sync::Arc;

use axum::{
  Json,
  extract::{FromRequestParts, Path, Query, State},
  http::{StatusCode, request::Parts},
  response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
  entity::{
    PaymentMethod, SaleStatus, UserRole, UserStatus, WithdrawalStatus,
    ledger_entry, sale, transfer, user, withdrawal,
  },
  prelude::*,
  state::{AppState, Services},
  sv::{
    audit::Finding,
    ledger::{BalanceSheet, EntryView},
    rates::{RateSet, RateVersion},
    referral::ReferralSummary,
    sale::{NewSale, SaleDetail},
    stats::Summary,
    transfer::NewTransfer,
    user::{NewUser, require_admin},
    withdrawal::{NewWithdrawal, Outcome, PaymentDetails},
  },
  utils::{Page, PageQuery},
};

type App = State<Arc<AppState>>;

#[derive(Serialize)]
pub struct Status {
  success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  error: Option<&'static str>,
  msg: Option<String>,
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = match self.kind() {
      "not_found" => StatusCode::NOT_FOUND,
      "insufficient_funds" | "invalid_state_transition" | "already_reversed" => {
        StatusCode::CONFLICT
      }
      "invalid_amount" | "invalid_args" => StatusCode::BAD_REQUEST,
      "user_not_active" => StatusCode::UNPROCESSABLE_ENTITY,
      "forbidden" => StatusCode::FORBIDDEN,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let msg = match status {
      StatusCode::INTERNAL_SERVER_ERROR => {
        error!("request failed: {self}");
        "internal error".to_string()
      }
      _ => self.to_string(),
    };

    let body = Status { success: false, error: Some(self.kind()), msg: Some(msg) };
    (status, Json(body)).into_response()
  }
}

/// Active admin named by the `x-actor-id` header.
pub struct Admin(pub user::Model);

impl FromRequestParts<Arc<AppState>> for Admin {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    app: &Arc<AppState>,
  ) -> Result<Self> {
    let id = parts
      .headers
      .get("x-actor-id")
      .and_then(|value| value.to_str().ok())
      .and_then(|value| value.trim().parse::<i32>().ok())
      .ok_or_else(|| Error::Forbidden("missing or malformed x-actor-id".into()))?;

    match require_admin(&app.db, id).await {
      Ok(admin) => Ok(Admin(admin)),
      Err(Error::UserNotFound | Error::UserNotActive(_)) => {
        Err(Error::Forbidden("admin role required".into()))
      }
      Err(err) => Err(err),
    }
  }
}

/// Major-unit amount as a JSON number or a decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Amount {
  Number(json::Number),
  Text(String),
}

impl Amount {
  fn money(&self) -> Result<Money> {
    let parsed = match self {
      Amount::Number(number) => Money::parse_major(&number.to_string()),
      Amount::Text(text) => Money::parse_major(text),
    };
    Ok(parsed?)
  }

  fn percent(&self) -> Result<Rate> {
    let parsed = match self {
      Amount::Number(number) => Rate::parse_percent(&number.to_string()),
      Amount::Text(text) => Rate::parse_percent(text),
    };
    parsed.map_err(|err| Error::InvalidArgs(err.to_string()))
  }
}

pub async fn health() -> Json<Status> {
  Json(Status { success: true, error: None, msg: None })
}

#[derive(Deserialize)]
pub struct RegisterReq {
  name: String,
  role: UserRole,
  referral_code: Option<String>,
}

pub async fn register(
  State(app): App,
  Json(req): Json<RegisterReq>,
) -> Result<(StatusCode, Json<user::Model>)> {
  let user = app
    .users()
    .register(NewUser {
      name: req.name,
      role: req.role,
      referral_code: req.referral_code,
    })
    .await?;
  Ok((StatusCode::CREATED, Json(user)))
}

pub async fn user(
  State(app): App,
  Path(id): Path<i32>,
) -> Result<Json<user::Model>> {
  Ok(Json(app.users().by_id(id).await?))
}

#[derive(Serialize)]
pub struct BalanceView {
  #[serde(flatten)]
  sheet: BalanceSheet,
  balance_display: String,
  available_display: String,
}

pub async fn balance(
  State(app): App,
  Path(id): Path<i32>,
) -> Result<Json<BalanceView>> {
  let sheet = app.ledger().sheet(id).await?;
  Ok(Json(BalanceView {
    balance_display: sheet.balance.to_string(),
    available_display: sheet.available.to_string(),
    sheet,
  }))
}

pub async fn ledger(
  State(app): App,
  Path(id): Path<i32>,
  Query(page): Query<PageQuery>,
) -> Result<Json<Page<EntryView>>> {
  Ok(Json(app.ledger().entries(id, page).await?))
}

pub async fn referrals(
  State(app): App,
  Path(id): Path<i32>,
) -> Result<Json<ReferralSummary>> {
  Ok(Json(app.referrals().summary(id).await?))
}

pub async fn user_transfers(
  State(app): App,
  Path(id): Path<i32>,
  Query(page): Query<PageQuery>,
) -> Result<Json<Page<transfer::Model>>> {
  Ok(Json(app.transfers().by_user(id, page).await?))
}

pub async fn user_withdrawals(
  State(app): App,
  Path(id): Path<i32>,
  Query(page): Query<PageQuery>,
) -> Result<Json<Page<withdrawal::Model>>> {
  Ok(Json(app.withdrawals().by_user(id, page).await?))
}

pub async fn user_sales(
  State(app): App,
  Path(id): Path<i32>,
  Query(page): Query<PageQuery>,
) -> Result<Json<Page<sale::Model>>> {
  Ok(Json(app.sales().by_user(id, page).await?))
}

#[derive(Deserialize)]
pub struct SaleReq {
  merchant_id: i32,
  client_id: i32,
  amount: Amount,
  payment_method: PaymentMethod,
}

pub async fn record_sale(
  State(app): App,
  Json(req): Json<SaleReq>,
) -> Result<(StatusCode, Json<sale::Model>)> {
  let sale = app
    .sales()
    .record(NewSale {
      merchant_id: req.merchant_id,
      client_id: req.client_id,
      gross_amount: req.amount.money()?,
      payment_method: req.payment_method,
    })
    .await?;
  Ok((StatusCode::CREATED, Json(sale)))
}

pub async fn sale(
  State(app): App,
  Path(id): Path<i32>,
) -> Result<Json<SaleDetail>> {
  Ok(Json(app.sales().detail(id).await?))
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ReasonReq {
  reason: Option<String>,
}

pub async fn complete_sale(
  State(app): App,
  Path(id): Path<i32>,
) -> Result<Json<sale::Model>> {
  Ok(Json(app.sales().complete(id).await?))
}

pub async fn cancel_sale(
  State(app): App,
  Path(id): Path<i32>,
  Json(req): Json<ReasonReq>,
) -> Result<Json<sale::Model>> {
  Ok(Json(app.sales().cancel(id, req.reason).await?))
}

pub async fn refund_sale(
  State(app): App,
  Path(id): Path<i32>,
  Json(req): Json<ReasonReq>,
) -> Result<Json<sale::Model>> {
  Ok(Json(app.sales().refund(id, req.reason).await?))
}

#[derive(Deserialize)]
pub struct TransferReq {
  from_user_id: i32,
  to_user_id: i32,
  amount: Amount,
  description: Option<String>,
}

pub async fn transfer(
  State(app): App,
  Json(req): Json<TransferReq>,
) -> Result<(StatusCode, Json<transfer::Model>)> {
  let transfer = app
    .transfers()
    .initiate(NewTransfer {
      from_user_id: req.from_user_id,
      to_user_id: req.to_user_id,
      amount: req.amount.money()?,
      description: req.description,
    })
    .await?;
  Ok((StatusCode::CREATED, Json(transfer)))
}

pub async fn cancel_transfer(
  State(app): App,
  Path(id): Path<i32>,
) -> Result<Json<transfer::Model>> {
  Ok(Json(app.transfers().cancel(id).await?))
}

#[derive(Deserialize)]
pub struct WithdrawalReq {
  user_id: i32,
  amount: Amount,
  details: PaymentDetails,
}

pub async fn request_withdrawal(
  State(app): App,
  Json(req): Json<WithdrawalReq>,
) -> Result<(StatusCode, Json<withdrawal::Model>)> {
  let withdrawal = app
    .withdrawals()
    .request(NewWithdrawal {
      user_id: req.user_id,
      amount: req.amount.money()?,
      details: req.details,
    })
    .await?;
  Ok((StatusCode::CREATED, Json(withdrawal)))
}

pub async fn rates(State(app): App, _: Admin) -> Result<Json<RateVersion>> {
  Ok(Json(app.rates().current().await?))
}

#[derive(Deserialize)]
pub struct RatesReq {
  cashback: Amount,
  referral_commission: Amount,
  platform_fee: Amount,
}

pub async fn set_rates(
  State(app): App,
  Admin(admin): Admin,
  Json(req): Json<RatesReq>,
) -> Result<(StatusCode, Json<RateVersion>)> {
  let set = RateSet {
    cashback: req.cashback.percent()?,
    referral_commission: req.referral_commission.percent()?,
    platform_fee: req.platform_fee.percent()?,
  };
  Ok((StatusCode::CREATED, Json(app.rates().set(admin.id, set).await?)))
}

pub async fn rate_history(
  State(app): App,
  _: Admin,
) -> Result<Json<Vec<RateVersion>>> {
  Ok(Json(app.rates().history().await?))
}

#[derive(Deserialize)]
pub struct SaleFilter {
  status: Option<SaleStatus>,
}

pub async fn list_sales(
  State(app): App,
  _: Admin,
  Query(filter): Query<SaleFilter>,
  Query(page): Query<PageQuery>,
) -> Result<Json<Page<sale::Model>>> {
  Ok(Json(app.sales().list(filter.status, page).await?))
}

#[derive(Deserialize)]
pub struct WithdrawalFilter {
  status: Option<WithdrawalStatus>,
}

pub async fn list_withdrawals(
  State(app): App,
  _: Admin,
  Query(filter): Query<WithdrawalFilter>,
  Query(page): Query<PageQuery>,
) -> Result<Json<Page<withdrawal::Model>>> {
  Ok(Json(app.withdrawals().list(filter.status, page).await?))
}

#[derive(Deserialize)]
pub struct ResolveReq {
  outcome: Outcome,
  note: Option<String>,
}

pub async fn resolve_withdrawal(
  State(app): App,
  Admin(admin): Admin,
  Path(id): Path<i32>,
  Json(req): Json<ResolveReq>,
) -> Result<Json<withdrawal::Model>> {
  let withdrawal =
    app.withdrawals().resolve(admin.id, id, req.outcome, req.note).await?;
  Ok(Json(withdrawal))
}

pub async fn approve_transfer(
  State(app): App,
  Admin(admin): Admin,
  Path(id): Path<i32>,
) -> Result<Json<transfer::Model>> {
  Ok(Json(app.transfers().approve(admin.id, id).await?))
}

pub async fn reverse_entry(
  State(app): App,
  Admin(admin): Admin,
  Path(id): Path<i32>,
) -> Result<(StatusCode, Json<ledger_entry::Model>)> {
  let reversal = app.ledger().reverse(id).await?;
  info!(entry_id = id, admin_id = admin.id, "manual reversal");
  let entry = ledger_entry::Entity::find_by_id(reversal)
    .one(&app.db)
    .await?
    .ok_or(Error::EntryNotFound)?;
  Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Deserialize)]
pub struct StatusReq {
  status: UserStatus,
}

pub async fn set_user_status(
  State(app): App,
  Admin(admin): Admin,
  Path(id): Path<i32>,
  Json(req): Json<StatusReq>,
) -> Result<Json<user::Model>> {
  Ok(Json(app.users().set_status(admin.id, id, req.status).await?))
}

pub async fn summary(State(app): App, _: Admin) -> Result<Json<Summary>> {
  Ok(Json(app.stats().summary().await?))
}

pub async fn audit(State(app): App, _: Admin) -> Result<Json<Vec<Finding>>> {
  Ok(Json(app.audit().run().await?))
}
