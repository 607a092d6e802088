use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ReconcileSettings;
use crate::error::AppError;
use crate::model::advance_payment::{AdvancePayment, AdvanceStatus, NewDeductionTransaction};
use crate::model::salary_record::SalaryRecord;
use crate::utils::request::require_positive;

use super::Period;
use super::allocation::allocate_oldest_first;
use super::ledger::{AdvanceLedger, AdvanceTotal, LedgerTransaction};
use super::report::{
    AdvanceHistoryEntry, BalanceAdjustment, ConsistencyIssue, CreatedTransaction,
    DeductionReport, MonthReport, RepairOutcome, RepairSummary,
};

const REPAIR_NOTE: &str = "Synthesized by advance deduction repair";

pub struct ReconciliationEngine<'a, L> {
    ledger: &'a L,
    settings: &'a ReconcileSettings,
}

impl<'a, L: AdvanceLedger> ReconciliationEngine<'a, L> {
    pub fn new(ledger: &'a L, settings: &'a ReconcileSettings) -> Self {
        Self { ledger, settings }
    }

    #[instrument(name = "verify_salary_record", skip(self))]
    pub async fn verify_salary_record_deductions(
        &self,
        salary_record_id: u64,
    ) -> Result<DeductionReport, AppError> {
        require_positive("salary_record_id", salary_record_id)?;

        let record = self
            .ledger
            .salary_record(salary_record_id)
            .await?
            .ok_or_else(|| AppError::not_found("Salary record", salary_record_id))?;

        self.verify_record(record).await
    }

    #[instrument(name = "advance_history", skip(self))]
    pub async fn advance_payment_history(
        &self,
        user_id: u64,
    ) -> Result<Vec<AdvanceHistoryEntry>, AppError> {
        require_positive("user_id", user_id)?;

        if !self.ledger.user_exists(user_id).await? {
            return Err(AppError::not_found("User", user_id));
        }

        let mut advances = self.ledger.advances_for_user(user_id).await?;
        let repaid = totals_by_advance(self.ledger.repaid_totals(user_id).await?);

        advances.sort_by(|a, b| {
            b.advance_date
                .cmp(&a.advance_date)
                .then(b.id.cmp(&a.id))
        });

        Ok(advances
            .into_iter()
            .map(|advance| {
                let amount_repaid = repaid.get(&advance.id).copied().unwrap_or_default();
                AdvanceHistoryEntry {
                    advance_payment_id: advance.id,
                    advance_date: advance.advance_date,
                    amount: advance.amount,
                    amount_repaid,
                    outstanding_balance: (advance.amount - amount_repaid).max(Decimal::ZERO),
                    balance_on_record: advance.remaining_balance,
                    monthly_deduction: advance.monthly_deduction,
                    status: advance.status,
                    reason: advance.reason,
                }
            })
            .collect())
    }

    #[instrument(name = "check_month", skip(self))]
    pub async fn check_month_advance_deductions(
        &self,
        month: u32,
        year: u32,
    ) -> Result<MonthReport, AppError> {
        let period = self.settings.validate_period(month, year)?;

        let records = self.ledger.salary_records_for_period(period).await?;
        let total_checked = records.len();

        let mut discrepancies = Vec::new();
        for record in records {
            let report = self.verify_record(record).await?;
            if report.has_discrepancy {
                discrepancies.push(report);
            }
        }

        info!(
            total_checked,
            discrepancy_count = discrepancies.len(),
            "Month advance deductions checked"
        );

        Ok(MonthReport {
            month,
            year,
            total_checked,
            discrepancy_count: discrepancies.len(),
            discrepancies,
        })
    }

    /// Inserts the deduction transactions a salary record is missing, drawing
    /// on the oldest outstanding advances first. All-or-nothing.
    #[instrument(name = "fix_missing_transactions", skip(self))]
    pub async fn fix_missing_transactions(
        &self,
        salary_record_id: u64,
    ) -> Result<RepairSummary, AppError> {
        require_positive("salary_record_id", salary_record_id)?;

        let mut tx = self.ledger.begin().await?;

        match self.repair(&mut tx, salary_record_id).await {
            Ok(summary) => {
                tx.commit().await?;
                info!(
                    outcome = ?summary.outcome,
                    created = summary.transactions_created.len(),
                    "Advance deduction repair committed"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "Failed to roll back advance deduction repair");
                }
                warn!(error = %e, "Advance deduction repair rolled back");
                Err(e)
            }
        }
    }

    async fn repair(
        &self,
        tx: &mut L::Tx,
        salary_record_id: u64,
    ) -> Result<RepairSummary, AppError> {
        let record = tx
            .lock_salary_record(salary_record_id)
            .await?
            .ok_or_else(|| AppError::not_found("Salary record", salary_record_id))?;
        let period = Period::of(&record)?;

        let linked = tx.linked_total(salary_record_id).await?;
        let shortfall = record.advance_salary_deducted - linked;

        if shortfall <= self.settings.tolerance {
            let outcome = if -shortfall > self.settings.tolerance {
                RepairOutcome::OverTransacted
            } else {
                RepairOutcome::AlreadyConsistent
            };
            debug!(%shortfall, ?outcome, "Nothing to repair");
            return Ok(RepairSummary::unchanged(salary_record_id, outcome, shortfall));
        }

        let advances = tx
            .lock_outstanding_advances(record.user_id, period.last_day())
            .await?;
        let transacted = totals_by_advance(tx.transacted_totals(record.user_id).await?);
        let stored_balances: HashMap<u64, Decimal> =
            advances.iter().map(|a| (a.id, a.remaining_balance)).collect();

        // A stored balance may have drifted above what the advance can still
        // absorb; never draw past `amount - transacted`.
        let spendable: Vec<AdvancePayment> = advances
            .into_iter()
            .map(|mut advance| {
                let headroom =
                    advance.amount - transacted.get(&advance.id).copied().unwrap_or_default();
                advance.remaining_balance = advance.remaining_balance.min(headroom).max(Decimal::ZERO);
                advance
            })
            .collect();
        let plan = allocate_oldest_first(shortfall, &spendable);

        if plan.unallocated > self.settings.tolerance {
            return Err(AppError::InsufficientAdvanceBalance {
                salary_record_id,
                unallocated: plan.unallocated,
            });
        }

        let deduction_date = record
            .disbursed_at
            .map(|at| at.date())
            .unwrap_or_else(|| period.last_day());

        let mut summary = RepairSummary::unchanged(salary_record_id, RepairOutcome::Repaired, shortfall);

        for allocation in plan.allocations {
            let transaction_id = tx
                .insert_transaction(&NewDeductionTransaction {
                    advance_payment_id: allocation.advance_payment_id,
                    salary_record_id,
                    amount: allocation.amount,
                    deduction_date,
                    note: Some(REPAIR_NOTE.to_string()),
                })
                .await?;

            let status = if allocation.new_balance > Decimal::ZERO {
                AdvanceStatus::Active
            } else {
                AdvanceStatus::Repaid
            };
            tx.update_advance_balance(allocation.advance_payment_id, allocation.new_balance, status)
                .await?;

            debug!(
                transaction_id,
                advance_payment_id = allocation.advance_payment_id,
                amount = %allocation.amount,
                "Deduction transaction synthesized"
            );

            summary.transactions_created.push(CreatedTransaction {
                transaction_id,
                advance_payment_id: allocation.advance_payment_id,
                amount: allocation.amount,
            });
            summary.balances_adjusted.push(BalanceAdjustment {
                advance_payment_id: allocation.advance_payment_id,
                previous_balance: stored_balances
                    .get(&allocation.advance_payment_id)
                    .copied()
                    .unwrap_or(allocation.previous_balance),
                new_balance: allocation.new_balance,
            });
        }

        Ok(summary)
    }

    async fn verify_record(&self, record: SalaryRecord) -> Result<DeductionReport, AppError> {
        let period = Period::of(&record)?;
        let tolerance = self.settings.tolerance;

        let transactions = self.ledger.transactions_for_record(record.id).await?;
        let advances = self.ledger.advances_for_user(record.user_id).await?;
        let repaid_before = totals_by_advance(self.ledger.repaid_before(record.user_id, period).await?);
        let repaid_total = totals_by_advance(self.ledger.repaid_totals(record.user_id).await?);

        let expected = self.expected_deduction(&advances, &repaid_before, period);
        let recorded = record.advance_salary_deducted;
        let transaction_sum: Decimal = transactions.iter().map(|t| t.amount).sum();

        let differs = |a: Decimal, b: Decimal| (a - b).abs() > tolerance;
        // A month with nothing recorded and nothing transacted is a deferred
        // deduction, reported as an issue rather than a discrepancy.
        let skipped = recorded.is_zero() && transaction_sum.is_zero();
        let has_discrepancy = differs(recorded, transaction_sum)
            || (!skipped && (differs(expected, recorded) || differs(expected, transaction_sum)));

        let mut issues = Vec::new();

        if skipped && expected > tolerance {
            issues.push(ConsistencyIssue::DeductionSkipped { expected });
        }

        let own_advances: HashSet<u64> = advances.iter().map(|a| a.id).collect();
        for transaction in &transactions {
            if !own_advances.contains(&transaction.advance_payment_id) {
                issues.push(ConsistencyIssue::ForeignAdvance {
                    transaction_id: transaction.id,
                    advance_payment_id: transaction.advance_payment_id,
                });
            }
        }

        for advance in &advances {
            let transacted = repaid_total.get(&advance.id).copied().unwrap_or_default();
            if transacted - advance.amount > tolerance {
                issues.push(ConsistencyIssue::TransactionsExceedAdvance {
                    advance_payment_id: advance.id,
                    advance_amount: advance.amount,
                    transacted,
                });
            }
        }

        let expected_final = record.expected_final_salary();
        if differs(expected_final, record.final_salary) {
            issues.push(ConsistencyIssue::FinalSalaryMismatch {
                expected: expected_final,
                recorded: record.final_salary,
            });
        }

        if has_discrepancy {
            warn!(
                salary_record_id = record.id,
                %expected,
                %recorded,
                %transaction_sum,
                "Advance deduction discrepancy"
            );
        }

        Ok(DeductionReport {
            salary_record_id: record.id,
            user_id: record.user_id,
            month: record.month,
            year: record.year,
            expected_amount: expected,
            recorded_amount: recorded,
            transaction_sum,
            has_discrepancy,
            transactions,
            issues,
        })
    }

    /// Σ over advances outstanding at the start of `period` of
    /// `min(outstanding at period start, plan)`. An advance disbursed during
    /// the period owes nothing until the next one.
    fn expected_deduction(
        &self,
        advances: &[AdvancePayment],
        repaid_before: &HashMap<u64, Decimal>,
        period: Period,
    ) -> Decimal {
        advances
            .iter()
            .filter(|a| a.advance_date < period.first_day())
            .map(|advance| {
                let repaid = repaid_before.get(&advance.id).copied().unwrap_or_default();
                let outstanding = (advance.amount - repaid).max(Decimal::ZERO);
                let plan = advance
                    .monthly_deduction
                    .or(self.settings.default_monthly_deduction)
                    .unwrap_or(outstanding);
                outstanding.min(plan)
            })
            .sum()
    }
}

fn totals_by_advance(totals: Vec<AdvanceTotal>) -> HashMap<u64, Decimal> {
    totals
        .into_iter()
        .map(|t| (t.advance_payment_id, t.total))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::memory::{MemoryLedger, advance, salary_record, transaction};
    use rust_decimal_macros::dec;

    fn settings() -> ReconcileSettings {
        ReconcileSettings::default()
    }

    #[actix_web::test]
    async fn record_without_deduction_or_transactions_is_consistent() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        ledger.add_salary_record(salary_record(10, 1, 3, 2024, dec!(0))).await;
        // Outstanding advance exists but nothing was deducted this month.
        ledger.add_advance(advance(100, 1, (2024, 1, 10), dec!(500), dec!(500))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let report = engine.verify_salary_record_deductions(10).await.unwrap();

        assert!(!report.has_discrepancy);
        assert_eq!(report.transaction_sum, dec!(0));
        assert_eq!(
            report.issues,
            vec![ConsistencyIssue::DeductionSkipped { expected: dec!(500) }]
        );
    }

    #[actix_web::test]
    async fn expected_amount_follows_plan_and_prior_deductions() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        let mut adv = advance(100, 1, (2024, 1, 10), dec!(300), dec!(200));
        adv.monthly_deduction = Some(dec!(100));
        ledger.add_advance(adv).await;
        ledger.add_salary_record(salary_record(10, 1, 2, 2024, dec!(100))).await;
        ledger.add_salary_record(salary_record(11, 1, 3, 2024, dec!(100))).await;
        ledger.add_transaction(transaction(1, 100, 10, dec!(100))).await;
        ledger.add_transaction(transaction(2, 100, 11, dec!(100))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let report = engine.verify_salary_record_deductions(11).await.unwrap();

        assert_eq!(report.expected_amount, dec!(100));
        assert_eq!(report.recorded_amount, dec!(100));
        assert_eq!(report.transaction_sum, dec!(100));
        assert!(!report.has_discrepancy);
        assert!(report.issues.is_empty());
    }

    #[actix_web::test]
    async fn expected_is_capped_by_outstanding_balance() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        let mut adv = advance(100, 1, (2024, 1, 10), dec!(150), dec!(150));
        adv.monthly_deduction = Some(dec!(400));
        ledger.add_advance(adv).await;
        ledger.add_salary_record(salary_record(10, 1, 2, 2024, dec!(150))).await;
        ledger.add_transaction(transaction(1, 100, 10, dec!(150))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let report = engine.verify_salary_record_deductions(10).await.unwrap();

        assert_eq!(report.expected_amount, dec!(150));
        assert!(!report.has_discrepancy);
    }

    #[actix_web::test]
    async fn advance_disbursed_mid_period_is_not_expected_yet() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        ledger.add_advance(advance(100, 1, (2024, 3, 20), dec!(500), dec!(500))).await;
        ledger.add_salary_record(salary_record(10, 1, 3, 2024, dec!(0))).await;
        ledger.add_salary_record(salary_record(11, 1, 4, 2024, dec!(0))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);

        let march = engine.verify_salary_record_deductions(10).await.unwrap();
        assert_eq!(march.expected_amount, dec!(0));
        assert!(!march.has_discrepancy);
        assert!(march.issues.is_empty());

        let april = engine.verify_salary_record_deductions(11).await.unwrap();
        assert_eq!(april.expected_amount, dec!(500));
    }

    #[actix_web::test]
    async fn agreeing_record_and_transactions_still_differ_from_plan() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        let mut adv = advance(100, 1, (2024, 1, 10), dec!(300), dec!(200));
        adv.monthly_deduction = Some(dec!(50));
        ledger.add_advance(adv).await;
        ledger.add_salary_record(salary_record(10, 1, 2, 2024, dec!(100))).await;
        ledger.add_transaction(transaction(1, 100, 10, dec!(100))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let report = engine.verify_salary_record_deductions(10).await.unwrap();

        assert_eq!(report.expected_amount, dec!(50));
        assert_eq!(report.recorded_amount, dec!(100));
        assert_eq!(report.transaction_sum, dec!(100));
        assert!(report.has_discrepancy);
    }

    #[actix_web::test]
    async fn missing_transactions_are_flagged() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        ledger.add_advance(advance(100, 1, (2024, 1, 10), dec!(150), dec!(50))).await;
        ledger.add_salary_record(salary_record(10, 1, 2, 2024, dec!(150))).await;
        ledger.add_transaction(transaction(1, 100, 10, dec!(100))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let report = engine.verify_salary_record_deductions(10).await.unwrap();

        assert!(report.has_discrepancy);
        assert_eq!(report.recorded_amount, dec!(150));
        assert_eq!(report.transaction_sum, dec!(100));
    }

    #[actix_web::test]
    async fn differences_within_tolerance_are_ignored() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        ledger.add_advance(advance(100, 1, (2024, 1, 10), dec!(100), dec!(0))).await;
        ledger.add_salary_record(salary_record(10, 1, 2, 2024, dec!(100.00))).await;
        ledger.add_transaction(transaction(1, 100, 10, dec!(99.995))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let report = engine.verify_salary_record_deductions(10).await.unwrap();

        assert!(!report.has_discrepancy);
    }

    #[actix_web::test]
    async fn consistency_problems_are_reported_not_thrown() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        ledger.add_user(2).await;
        ledger.add_advance(advance(100, 1, (2024, 1, 10), dec!(100), dec!(0))).await;
        ledger.add_advance(advance(200, 2, (2024, 1, 10), dec!(100), dec!(100))).await;
        let mut record = salary_record(10, 1, 2, 2024, dec!(150));
        record.final_salary = dec!(1);
        ledger.add_salary_record(record).await;
        ledger.add_transaction(transaction(1, 100, 10, dec!(120))).await;
        ledger.add_transaction(transaction(2, 200, 10, dec!(30))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let report = engine.verify_salary_record_deductions(10).await.unwrap();

        assert_eq!(report.expected_amount, dec!(100));
        assert!(report.has_discrepancy);
        assert!(report.issues.contains(&ConsistencyIssue::ForeignAdvance {
            transaction_id: 2,
            advance_payment_id: 200,
        }));
        assert!(report.issues.contains(&ConsistencyIssue::TransactionsExceedAdvance {
            advance_payment_id: 100,
            advance_amount: dec!(100),
            transacted: dec!(120),
        }));
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, ConsistencyIssue::FinalSalaryMismatch { .. })));
    }

    #[actix_web::test]
    async fn verify_unknown_record_is_not_found() {
        let ledger = MemoryLedger::default();
        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);

        let err = engine.verify_salary_record_deductions(404).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = engine.verify_salary_record_deductions(0).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[actix_web::test]
    async fn history_is_newest_first_with_repaid_amounts() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        ledger.add_advance(advance(1, 1, (2024, 1, 5), dec!(100), dec!(40))).await;
        ledger.add_advance(advance(2, 1, (2024, 6, 5), dec!(200), dec!(200))).await;
        ledger.add_advance(advance(3, 1, (2024, 3, 5), dec!(300), dec!(300))).await;
        ledger.add_salary_record(salary_record(10, 1, 2, 2024, dec!(60))).await;
        ledger.add_transaction(transaction(1, 1, 10, dec!(60))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let history = engine.advance_payment_history(1).await.unwrap();

        let ids: Vec<u64> = history.iter().map(|h| h.advance_payment_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(history[2].amount_repaid, dec!(60));
        assert_eq!(history[2].outstanding_balance, dec!(40));
        assert_eq!(history[0].amount_repaid, dec!(0));
    }

    #[actix_web::test]
    async fn history_for_unknown_user_is_not_found() {
        let ledger = MemoryLedger::default();
        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);

        let err = engine.advance_payment_history(99).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[actix_web::test]
    async fn check_month_rejects_out_of_range_month() {
        let ledger = MemoryLedger::default();
        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);

        let err = engine.check_month_advance_deductions(13, 2024).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = engine.check_month_advance_deductions(5, 2019).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[actix_web::test]
    async fn check_month_aggregates_discrepancies() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        ledger.add_user(2).await;
        ledger.add_advance(advance(100, 1, (2024, 1, 10), dec!(100), dec!(0))).await;
        ledger.add_salary_record(salary_record(10, 1, 2, 2024, dec!(100))).await;
        ledger.add_transaction(transaction(1, 100, 10, dec!(100))).await;
        // Deduction recorded but never transacted.
        ledger.add_advance(advance(200, 2, (2024, 1, 10), dec!(80), dec!(80))).await;
        ledger.add_salary_record(salary_record(20, 2, 2, 2024, dec!(80))).await;
        // Different period, must not be counted.
        ledger.add_salary_record(salary_record(30, 2, 3, 2024, dec!(0))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let report = engine.check_month_advance_deductions(2, 2024).await.unwrap();

        assert_eq!(report.total_checked, 2);
        assert_eq!(report.discrepancy_count, 1);
        assert_eq!(report.discrepancies[0].salary_record_id, 20);
    }

    #[actix_web::test]
    async fn fix_draws_oldest_advance_first() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        ledger.add_advance(advance(2, 1, (2024, 2, 1), dec!(200), dec!(200))).await;
        ledger.add_advance(advance(1, 1, (2024, 1, 1), dec!(100), dec!(100))).await;
        ledger.add_salary_record(salary_record(10, 1, 3, 2024, dec!(150))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let summary = engine.fix_missing_transactions(10).await.unwrap();

        assert_eq!(summary.outcome, RepairOutcome::Repaired);
        let drawn: Vec<(u64, Decimal)> = summary
            .transactions_created
            .iter()
            .map(|t| (t.advance_payment_id, t.amount))
            .collect();
        assert_eq!(drawn, vec![(1, dec!(100)), (2, dec!(50))]);

        let state = ledger.snapshot().await;
        assert_eq!(state.advances[&1].remaining_balance, dec!(0));
        assert_eq!(state.advances[&1].status, AdvanceStatus::Repaid);
        assert_eq!(state.advances[&2].remaining_balance, dec!(150));
        assert_eq!(state.advances[&2].status, AdvanceStatus::Active);
    }

    #[actix_web::test]
    async fn fix_conserves_sums_and_is_idempotent() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        ledger.add_advance(advance(1, 1, (2024, 1, 1), dec!(500), dec!(440))).await;
        ledger.add_salary_record(salary_record(10, 1, 3, 2024, dec!(120.50))).await;
        ledger.add_transaction(transaction(1, 1, 10, dec!(60))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);

        let first = engine.fix_missing_transactions(10).await.unwrap();
        assert_eq!(first.shortfall, dec!(60.50));
        assert_eq!(first.transactions_created.len(), 1);

        let report = engine.verify_salary_record_deductions(10).await.unwrap();
        assert!((report.transaction_sum - report.recorded_amount).abs() <= settings.tolerance);

        let writes_before = ledger.write_count().await;
        let second = engine.fix_missing_transactions(10).await.unwrap();
        assert_eq!(second.outcome, RepairOutcome::AlreadyConsistent);
        assert_eq!(second.changes(), 0);
        assert_eq!(ledger.write_count().await, writes_before);
    }

    #[actix_web::test]
    async fn fix_leaves_over_transacted_records_alone() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        ledger.add_advance(advance(1, 1, (2024, 1, 1), dec!(500), dec!(300))).await;
        ledger.add_salary_record(salary_record(10, 1, 3, 2024, dec!(100))).await;
        ledger.add_transaction(transaction(1, 1, 10, dec!(200))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let summary = engine.fix_missing_transactions(10).await.unwrap();

        assert_eq!(summary.outcome, RepairOutcome::OverTransacted);
        assert_eq!(summary.changes(), 0);
        assert_eq!(ledger.write_count().await, 0);
    }

    #[actix_web::test]
    async fn fix_ignores_advances_disbursed_after_the_period() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        ledger.add_advance(advance(1, 1, (2024, 1, 1), dec!(50), dec!(50))).await;
        ledger.add_advance(advance(2, 1, (2024, 5, 1), dec!(500), dec!(500))).await;
        ledger.add_salary_record(salary_record(10, 1, 3, 2024, dec!(80))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let err = engine.fix_missing_transactions(10).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::InsufficientAdvanceBalance { salary_record_id: 10, unallocated } if unallocated == dec!(30)
        ));
        let state = ledger.snapshot().await;
        assert!(state.transactions.is_empty());
        assert_eq!(state.advances[&1].remaining_balance, dec!(50));
    }

    #[actix_web::test]
    async fn fix_never_draws_past_what_an_advance_can_absorb() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        // Stored balance still says 100 although 60 was already deducted.
        ledger.add_advance(advance(1, 1, (2024, 1, 1), dec!(100), dec!(100))).await;
        ledger.add_advance(advance(2, 1, (2024, 2, 1), dec!(200), dec!(200))).await;
        ledger.add_salary_record(salary_record(9, 1, 2, 2024, dec!(60))).await;
        ledger.add_transaction(transaction(1, 1, 9, dec!(60))).await;
        ledger.add_salary_record(salary_record(10, 1, 3, 2024, dec!(80))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let summary = engine.fix_missing_transactions(10).await.unwrap();

        assert_eq!(summary.outcome, RepairOutcome::Repaired);
        let drawn: Vec<(u64, Decimal)> = summary
            .transactions_created
            .iter()
            .map(|t| (t.advance_payment_id, t.amount))
            .collect();
        assert_eq!(drawn, vec![(1, dec!(40)), (2, dec!(40))]);
        assert_eq!(
            summary.balances_adjusted[0],
            BalanceAdjustment {
                advance_payment_id: 1,
                previous_balance: dec!(100),
                new_balance: dec!(0),
            }
        );

        let state = ledger.snapshot().await;
        assert_eq!(state.advances[&1].remaining_balance, dec!(0));
        assert_eq!(state.advances[&1].status, AdvanceStatus::Repaid);
        assert_eq!(state.advances[&2].remaining_balance, dec!(160));

        let report = engine.verify_salary_record_deductions(10).await.unwrap();
        assert!(!report
            .issues
            .iter()
            .any(|i| matches!(i, ConsistencyIssue::TransactionsExceedAdvance { .. })));
    }

    #[actix_web::test]
    async fn fix_fails_when_stale_balance_is_the_only_cover() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        ledger.add_advance(advance(1, 1, (2024, 1, 1), dec!(100), dec!(100))).await;
        ledger.add_salary_record(salary_record(9, 1, 2, 2024, dec!(60))).await;
        ledger.add_transaction(transaction(1, 1, 9, dec!(60))).await;
        ledger.add_salary_record(salary_record(10, 1, 3, 2024, dec!(80))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let err = engine.fix_missing_transactions(10).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::InsufficientAdvanceBalance { salary_record_id: 10, unallocated } if unallocated == dec!(40)
        ));
        let state = ledger.snapshot().await;
        assert_eq!(state.transactions.len(), 1);
        assert_eq!(ledger.write_count().await, 0);
    }

    #[actix_web::test]
    async fn failure_mid_repair_rolls_everything_back() {
        let ledger = MemoryLedger::default().fail_on_insert(2);
        ledger.add_user(1).await;
        ledger.add_advance(advance(1, 1, (2024, 1, 1), dec!(100), dec!(100))).await;
        ledger.add_advance(advance(2, 1, (2024, 2, 1), dec!(200), dec!(200))).await;
        ledger.add_salary_record(salary_record(10, 1, 3, 2024, dec!(150))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);
        let err = engine.fix_missing_transactions(10).await.unwrap_err();

        assert!(matches!(err, AppError::Database(_)));
        let state = ledger.snapshot().await;
        assert!(state.transactions.is_empty());
        assert_eq!(state.advances[&1].remaining_balance, dec!(100));
        assert_eq!(state.advances[&2].remaining_balance, dec!(200));
        assert_eq!(ledger.write_count().await, 0);
    }

    #[actix_web::test]
    async fn fix_unknown_record_is_not_found() {
        let ledger = MemoryLedger::default();
        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);

        let err = engine.fix_missing_transactions(77).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[actix_web::test]
    async fn concurrent_repairs_write_once() {
        let ledger = MemoryLedger::default();
        ledger.add_user(1).await;
        ledger.add_advance(advance(1, 1, (2024, 1, 1), dec!(100), dec!(100))).await;
        ledger.add_advance(advance(2, 1, (2024, 2, 1), dec!(200), dec!(200))).await;
        ledger.add_salary_record(salary_record(10, 1, 3, 2024, dec!(150))).await;

        let settings = settings();
        let engine = ReconciliationEngine::new(&ledger, &settings);

        let (a, b) = tokio::join!(
            engine.fix_missing_transactions(10),
            engine.fix_missing_transactions(10)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        let mut outcomes = [a.outcome, b.outcome];
        outcomes.sort_by_key(|o| *o as u8);
        assert_eq!(
            outcomes,
            [RepairOutcome::AlreadyConsistent, RepairOutcome::Repaired]
        );
        assert_eq!(a.changes() + b.changes(), 4);

        let state = ledger.snapshot().await;
        let linked: Decimal = state
            .transactions
            .iter()
            .filter(|t| t.salary_record_id == 10)
            .map(|t| t.amount)
            .sum();
        assert_eq!(linked, dec!(150));
        assert_eq!(state.transactions.len(), 2);
    }
}
