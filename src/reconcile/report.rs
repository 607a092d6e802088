use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::advance_payment::{AdvanceDeductionTransaction, AdvanceStatus};

/// Expected vs recorded vs transacted deduction for one salary record.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeductionReport {
    #[schema(example = 42)]
    pub salary_record_id: u64,
    #[schema(example = 7)]
    pub user_id: u64,
    #[schema(example = 3)]
    pub month: u32,
    #[schema(example = 2025)]
    pub year: u32,
    /// Derived from the advance ledger as of the start of the period.
    pub expected_amount: Decimal,
    /// `advance_salary_deducted` on the salary record.
    pub recorded_amount: Decimal,
    /// Sum of the deduction transactions linked to the record.
    pub transaction_sum: Decimal,
    pub has_discrepancy: bool,
    pub transactions: Vec<AdvanceDeductionTransaction>,
    pub issues: Vec<ConsistencyIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyIssue {
    /// Deductions posted against an advance exceed the amount advanced.
    TransactionsExceedAdvance {
        advance_payment_id: u64,
        advance_amount: Decimal,
        transacted: Decimal,
    },
    /// A linked transaction draws on an advance of a different employee.
    ForeignAdvance {
        transaction_id: u64,
        advance_payment_id: u64,
    },
    FinalSalaryMismatch {
        expected: Decimal,
        recorded: Decimal,
    },
    /// Nothing was deducted this period although the plan called for it.
    DeductionSkipped { expected: Decimal },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdvanceHistoryEntry {
    pub advance_payment_id: u64,
    #[schema(value_type = String, format = "date")]
    pub advance_date: NaiveDate,
    pub amount: Decimal,
    pub amount_repaid: Decimal,
    pub outstanding_balance: Decimal,
    /// `remaining_balance` as stored on the advance row.
    pub balance_on_record: Decimal,
    pub monthly_deduction: Option<Decimal>,
    pub status: AdvanceStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MonthReport {
    pub month: u32,
    pub year: u32,
    pub total_checked: usize,
    pub discrepancy_count: usize,
    pub discrepancies: Vec<DeductionReport>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RepairOutcome {
    AlreadyConsistent,
    /// Linked transactions exceed the recorded deduction; left for manual review.
    OverTransacted,
    Repaired,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RepairSummary {
    pub salary_record_id: u64,
    pub outcome: RepairOutcome,
    /// Recorded deduction minus linked transaction sum, before the repair.
    pub shortfall: Decimal,
    pub transactions_created: Vec<CreatedTransaction>,
    pub balances_adjusted: Vec<BalanceAdjustment>,
}

impl RepairSummary {
    pub fn unchanged(salary_record_id: u64, outcome: RepairOutcome, shortfall: Decimal) -> Self {
        Self {
            salary_record_id,
            outcome,
            shortfall,
            transactions_created: Vec::new(),
            balances_adjusted: Vec::new(),
        }
    }

    pub fn changes(&self) -> usize {
        self.transactions_created.len() + self.balances_adjusted.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CreatedTransaction {
    pub transaction_id: u64,
    pub advance_payment_id: u64,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BalanceAdjustment {
    pub advance_payment_id: u64,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
}
