use anyhow::Context;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use uuid::Uuid;

use crate::ledger::totals::{fits_scale, RATE_SCALE};
use crate::ledger::LedgerSettings;

/// Process configuration, read from the environment after `dotenv` has run.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub run_migrations: bool,

    /// Seconds between worker runs
    pub worker_poll_interval_seconds: u64,

    /// Recorded as the acting user on packs generated by the worker
    pub system_user_id: Uuid,

    pub ledger: LedgerSettings,
}

impl Config {
    /// Loads the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` or `JWT_SECRET` is missing, or if
    /// any variable that is set cannot be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = LedgerSettings::default();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_var("SERVER_PORT", 3000)?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            run_migrations: parse_var("RUN_MIGRATIONS", true)?,
            worker_poll_interval_seconds: parse_var("WORKER_POLL_INTERVAL_SECONDS", 60)?,
            system_user_id: parse_var("SYSTEM_USER_ID", Uuid::nil())?,
            ledger: LedgerSettings {
                default_vat_rate: check_vat_rate(parse_var(
                    "DEFAULT_VAT_RATE",
                    defaults.default_vat_rate,
                )?)?,
                payment_terms_days: check_payment_terms(parse_var(
                    "DEFAULT_PAYMENT_TERMS_DAYS",
                    defaults.payment_terms_days,
                )?)?,
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid {}: {} ({})", name, raw, e))
}

/// Rejects VAT rates outside `[0, 1]`.
pub fn check_vat_rate(rate: Decimal) -> anyhow::Result<Decimal> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        anyhow::bail!("DEFAULT_VAT_RATE must be a fraction between 0 and 1, got {}", rate);
    }
    if !fits_scale(rate, RATE_SCALE) {
        anyhow::bail!("DEFAULT_VAT_RATE cannot have more than four decimal places, got {}", rate);
    }
    Ok(rate)
}

/// Longest accepted payment term, ten years.
pub const MAX_PAYMENT_TERMS_DAYS: i64 = 3650;

/// Rejects payment terms outside `[0, MAX_PAYMENT_TERMS_DAYS]`.
pub fn check_payment_terms(days: i64) -> anyhow::Result<i64> {
    if !(0..=MAX_PAYMENT_TERMS_DAYS).contains(&days) {
        anyhow::bail!(
            "DEFAULT_PAYMENT_TERMS_DAYS must be between 0 and {}, got {}",
            MAX_PAYMENT_TERMS_DAYS,
            days
        );
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u16>("SERVER_PORT", " 8080 ").unwrap(), 8080);
        assert_eq!(parse_value::<Decimal>("DEFAULT_VAT_RATE", "0.14").unwrap(), dec!(0.14));
        assert!(parse_value::<bool>("RUN_MIGRATIONS", "false").is_ok());
        assert!(parse_value::<u16>("SERVER_PORT", "http").is_err());
    }

    #[test]
    fn test_vat_rate_bounds() {
        assert!(check_vat_rate(dec!(0.15)).is_ok());
        assert!(check_vat_rate(dec!(15)).is_err());
        assert!(check_vat_rate(dec!(0.15005)).is_err());
    }

    #[test]
    fn test_payment_terms_bounds() {
        assert_eq!(check_payment_terms(30).unwrap(), 30);
        assert_eq!(check_payment_terms(0).unwrap(), 0);
        assert!(check_payment_terms(-1).is_err());
        assert!(check_payment_terms(i64::MAX).is_err());
    }
}
