use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, EnumString, Display, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DisbursementStatus {
    Pending,
    Disbursed,
}

impl TryFrom<String> for DisbursementStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One payroll computation for one employee for one month.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct SalaryRecord {
    #[schema(example = 42)]
    pub id: u64,
    #[schema(example = 7)]
    pub user_id: u64,
    #[schema(example = 3)]
    pub month: u32,
    #[schema(example = 2025)]
    pub year: u32,
    pub base_salary: Decimal,
    pub calculated_salary: Decimal,
    pub bonuses: Decimal,
    pub deductions: Decimal,
    pub advance_salary_deducted: Decimal,
    pub final_salary: Decimal,
    #[sqlx(try_from = "String")]
    pub disbursement_status: DisbursementStatus,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub disbursed_at: Option<NaiveDateTime>,
    pub is_auto_generated: bool,
    pub is_manually_modified: bool,
}

impl SalaryRecord {
    /// `calculated + bonuses - deductions - advance`, what `final_salary` should hold.
    pub fn expected_final_salary(&self) -> Decimal {
        self.calculated_salary + self.bonuses - self.deductions - self.advance_salary_deducted
    }
}

pub(crate) const SALARY_RECORD_COLUMNS: &str = r#"
    id, user_id, month, year, base_salary, calculated_salary, bonuses, deductions,
    advance_salary_deducted, final_salary, disbursement_status, disbursed_at,
    is_auto_generated, is_manually_modified
"#;
