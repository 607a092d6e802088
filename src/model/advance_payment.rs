use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, EnumString, Display, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AdvanceStatus {
    Active,
    Repaid,
}

impl TryFrom<String> for AdvanceStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// An advance disbursed to an employee, recovered through later payroll deductions.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct AdvancePayment {
    pub id: u64,
    pub user_id: u64,
    pub amount: Decimal,
    pub remaining_balance: Decimal,
    /// Stored deduction plan; `None` falls back to the configured default.
    pub monthly_deduction: Option<Decimal>,
    #[schema(value_type = String, format = "date")]
    pub advance_date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: AdvanceStatus,
    pub reason: Option<String>,
}

pub(crate) const ADVANCE_PAYMENT_COLUMNS: &str = r#"
    id, user_id, amount, remaining_balance, monthly_deduction, advance_date, status, reason
"#;

/// One deduction applied against one advance by one salary record.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct AdvanceDeductionTransaction {
    pub id: u64,
    pub advance_payment_id: u64,
    pub salary_record_id: u64,
    pub amount: Decimal,
    #[schema(value_type = String, format = "date")]
    pub deduction_date: NaiveDate,
    pub note: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub created_at: Option<NaiveDateTime>,
}

pub(crate) const DEDUCTION_TRANSACTION_COLUMNS: &str = r#"
    id, advance_payment_id, salary_record_id, amount, deduction_date, note, created_at
"#;

/// Row to insert when a repair synthesizes a missing deduction.
#[derive(Debug, Clone)]
pub struct NewDeductionTransaction {
    pub advance_payment_id: u64,
    pub salary_record_id: u64,
    pub amount: Decimal,
    pub deduction_date: NaiveDate,
    pub note: Option<String>,
}
