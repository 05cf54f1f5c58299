use std::{env, fmt::Display, str::FromStr};

use anyhow::{Context, anyhow};

use crate::{
  money::{Money, Rate},
  sv::rates::RateSet,
};

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub db_max_connections: u32,
  pub port: u16,
  pub rate_limit_per_second: u64,
  pub rate_limit_burst: u32,
  /// Seeds rate version 1 on an empty database, never consulted afterwards.
  pub default_rates: RateSet,
  /// When false, a recorded sale completes in the same commit.
  pub sale_requires_confirmation: bool,
  /// When true, transfers wait in `pending` for an admin.
  pub transfer_moderation: bool,
  pub min_withdrawal: Money,
  pub referral_code_length: usize,
  pub referral_code_attempts: u32,
  pub ledger_page_size: u64,
  pub ledger_max_page_size: u64,
  pub bootstrap_admin: Option<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      database_url: "sqlite:cashback.db?mode=rwc".into(),
      db_max_connections: 1,
      port: 3000,
      rate_limit_per_second: 2,
      rate_limit_burst: 100,
      default_rates: RateSet {
        cashback: Rate::from_bps(200).unwrap_or_default(),
        referral_commission: Rate::from_bps(100).unwrap_or_default(),
        platform_fee: Rate::ZERO,
      },
      sale_requires_confirmation: true,
      transfer_moderation: false,
      min_withdrawal: Money::from_minor(500),
      referral_code_length: 8,
      referral_code_attempts: 5,
      ledger_page_size: 20,
      ledger_max_page_size: 100,
      bootstrap_admin: None,
    }
  }
}

impl Config {
  pub fn from_env() -> anyhow::Result<Self> {
    let default = Self::default();

    let database_url =
      env::var("DATABASE_URL").unwrap_or(default.database_url);
    // sqlite serialises writers anyway, extra connections only add BUSY errors
    let pool_default =
      if database_url.starts_with("sqlite") { 1 } else { 8 };

    let config = Self {
      db_max_connections: parse_var("DB_MAX_CONNECTIONS", pool_default)?,
      database_url,
      port: parse_var("PORT", default.port)?,
      rate_limit_per_second: parse_var(
        "RATE_LIMIT_PER_SECOND",
        default.rate_limit_per_second,
      )?,
      rate_limit_burst: parse_var("RATE_LIMIT_BURST", default.rate_limit_burst)?,
      default_rates: RateSet {
        cashback: percent_var(
          "DEFAULT_CASHBACK_RATE",
          default.default_rates.cashback,
        )?,
        referral_commission: percent_var(
          "DEFAULT_REFERRAL_COMMISSION_RATE",
          default.default_rates.referral_commission,
        )?,
        platform_fee: percent_var(
          "DEFAULT_PLATFORM_FEE_RATE",
          default.default_rates.platform_fee,
        )?,
      },
      sale_requires_confirmation: parse_var(
        "SALE_REQUIRES_CONFIRMATION",
        default.sale_requires_confirmation,
      )?,
      transfer_moderation: parse_var(
        "TRANSFER_MODERATION",
        default.transfer_moderation,
      )?,
      min_withdrawal: match env::var("MIN_WITHDRAWAL") {
        Ok(raw) => Money::from_minor(
          raw.trim().parse().context("MIN_WITHDRAWAL must be minor units")?,
        ),
        Err(_) => default.min_withdrawal,
      },
      referral_code_length: parse_var(
        "REFERRAL_CODE_LENGTH",
        default.referral_code_length,
      )?,
      referral_code_attempts: parse_var(
        "REFERRAL_CODE_ATTEMPTS",
        default.referral_code_attempts,
      )?,
      ledger_page_size: parse_var("LEDGER_PAGE_SIZE", default.ledger_page_size)?,
      ledger_max_page_size: parse_var(
        "LEDGER_MAX_PAGE_SIZE",
        default.ledger_max_page_size,
      )?,
      bootstrap_admin: env::var("BOOTSTRAP_ADMIN")
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty()),
    };

    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> anyhow::Result<()> {
    if !(4..=32).contains(&self.referral_code_length) {
      return Err(anyhow!("REFERRAL_CODE_LENGTH must be within 4..=32"));
    }
    if self.referral_code_attempts == 0 {
      return Err(anyhow!("REFERRAL_CODE_ATTEMPTS must be at least 1"));
    }
    if self.ledger_page_size == 0
      || self.ledger_page_size > self.ledger_max_page_size
    {
      return Err(anyhow!(
        "LEDGER_PAGE_SIZE must be within 1..=LEDGER_MAX_PAGE_SIZE"
      ));
    }
    if self.min_withdrawal.is_negative() {
      return Err(anyhow!("MIN_WITHDRAWAL must not be negative"));
    }
    self.default_rates.validate().map_err(|err| anyhow!("{err}"))?;
    Ok(())
  }
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
  T: FromStr,
  T::Err: Display,
{
  match env::var(key) {
    Ok(raw) => raw
      .trim()
      .parse()
      .map_err(|err| anyhow!("invalid {key} `{raw}`: {err}")),
    Err(_) => Ok(default),
  }
}

fn percent_var(key: &str, default: Rate) -> anyhow::Result<Rate> {
  match env::var(key) {
    Ok(raw) => Rate::parse_percent(&raw).with_context(|| format!("invalid {key}")),
    Err(_) => Ok(default),
  }
}
