use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;
use rust_decimal::Decimal;

use crate::error::AppError;
use crate::reconcile::Period;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    pub run_migrations: bool,

    pub log_dir: String,
    pub log_level: tracing::Level,

    pub reconcile: ReconcileSettings,
}

/// Policy knobs for advance-deduction reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Two amounts closer than this are treated as equal.
    pub tolerance: Decimal,
    /// Earliest payroll year accepted by period checks.
    pub min_year: u32,
    /// Plan used for advances that carry no `monthly_deduction` of their own.
    /// `None` means the whole outstanding balance is due.
    pub default_monthly_deduction: Option<Decimal>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            tolerance: Decimal::new(1, 2),
            min_year: 2020,
            default_monthly_deduction: None,
        }
    }
}

impl ReconcileSettings {
    pub fn validate_period(&self, month: u32, year: u32) -> Result<Period, AppError> {
        if !(1..=12).contains(&month) {
            return Err(AppError::Validation(format!(
                "month must be between 1 and 12, got {month}"
            )));
        }
        if year < self.min_year {
            return Err(AppError::Validation(format!(
                "year must be {} or later, got {year}",
                self.min_year
            )));
        }
        Period::new(month, year)
            .ok_or_else(|| AppError::Validation(format!("invalid period {month}/{year}")))
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("{key} must be set"));

        let defaults = ReconcileSettings::default();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,

            rate_protected_per_min: parse_or(&lookup, "RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),
            run_migrations: parse_or(&lookup, "RUN_MIGRATIONS", false)?,

            log_dir: lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            log_level: parse_or(&lookup, "LOG_LEVEL", tracing::Level::DEBUG)?,

            reconcile: ReconcileSettings {
                tolerance: parse_or(&lookup, "DEDUCTION_TOLERANCE", defaults.tolerance)?,
                min_year: parse_or(&lookup, "RECONCILE_MIN_YEAR", defaults.min_year)?,
                default_monthly_deduction: lookup("DEFAULT_MONTHLY_DEDUCTION")
                    .map(|raw| {
                        Decimal::from_str(raw.trim())
                            .with_context(|| format!("DEFAULT_MONTHLY_DEDUCTION is not a decimal: {raw}"))
                    })
                    .transpose()?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} has an invalid value {raw:?}: {e}")),
        None => Ok(default),
    }
}
