//! In-memory ledger for tests. A repair holds the whole ledger for its
//! lifetime, which mirrors the row locks taken by the MySQL ledger.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::advance_payment::{
    AdvanceDeductionTransaction, AdvancePayment, AdvanceStatus, NewDeductionTransaction,
};
use crate::model::salary_record::{DisbursementStatus, SalaryRecord};

use super::Period;
use super::ledger::{AdvanceLedger, AdvanceTotal, LedgerTransaction};

#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    pub users: BTreeSet<u64>,
    pub salary_records: BTreeMap<u64, SalaryRecord>,
    pub advances: BTreeMap<u64, AdvancePayment>,
    pub transactions: Vec<AdvanceDeductionTransaction>,
    /// Inserts and updates committed through repairs.
    pub writes: usize,
}

impl LedgerState {
    fn period_of(&self, salary_record_id: u64) -> Option<Period> {
        self.salary_records
            .get(&salary_record_id)
            .and_then(|r| Period::new(r.month, r.year))
    }

    fn owner_of(&self, advance_payment_id: u64) -> Option<u64> {
        self.advances.get(&advance_payment_id).map(|a| a.user_id)
    }

    fn totals<F>(&self, user_id: u64, keep: F) -> Vec<AdvanceTotal>
    where
        F: Fn(&AdvanceDeductionTransaction) -> bool,
    {
        let mut totals: BTreeMap<u64, Decimal> = BTreeMap::new();
        for t in &self.transactions {
            if self.owner_of(t.advance_payment_id) == Some(user_id) && keep(t) {
                *totals.entry(t.advance_payment_id).or_default() += t.amount;
            }
        }
        totals
            .into_iter()
            .map(|(advance_payment_id, total)| AdvanceTotal {
                advance_payment_id,
                total,
            })
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    fail_on_insert: Option<usize>,
}

impl MemoryLedger {
    /// Makes the n-th insert (1-based) of every repair fail.
    pub fn fail_on_insert(mut self, nth: usize) -> Self {
        self.fail_on_insert = Some(nth);
        self
    }

    pub async fn add_user(&self, id: u64) {
        self.state.lock().await.users.insert(id);
    }

    pub async fn add_salary_record(&self, record: SalaryRecord) {
        self.state.lock().await.salary_records.insert(record.id, record);
    }

    pub async fn add_advance(&self, advance: AdvancePayment) {
        self.state.lock().await.advances.insert(advance.id, advance);
    }

    pub async fn add_transaction(&self, transaction: AdvanceDeductionTransaction) {
        self.state.lock().await.transactions.push(transaction);
    }

    pub async fn snapshot(&self) -> LedgerState {
        (*self.state.lock().await).clone()
    }

    pub async fn write_count(&self) -> usize {
        self.state.lock().await.writes
    }
}

#[async_trait]
impl AdvanceLedger for MemoryLedger {
    type Tx = MemoryTx;

    async fn salary_record(&self, id: u64) -> Result<Option<SalaryRecord>, sqlx::Error> {
        Ok(self.state.lock().await.salary_records.get(&id).cloned())
    }

    async fn salary_records_for_period(
        &self,
        period: Period,
    ) -> Result<Vec<SalaryRecord>, sqlx::Error> {
        Ok(self
            .state
            .lock()
            .await
            .salary_records
            .values()
            .filter(|r| r.month == period.month() && r.year == period.year())
            .cloned()
            .collect())
    }

    async fn transactions_for_record(
        &self,
        salary_record_id: u64,
    ) -> Result<Vec<AdvanceDeductionTransaction>, sqlx::Error> {
        Ok(self
            .state
            .lock()
            .await
            .transactions
            .iter()
            .filter(|t| t.salary_record_id == salary_record_id)
            .cloned()
            .collect())
    }

    async fn user_exists(&self, user_id: u64) -> Result<bool, sqlx::Error> {
        Ok(self.state.lock().await.users.contains(&user_id))
    }

    async fn advances_for_user(&self, user_id: u64) -> Result<Vec<AdvancePayment>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut advances: Vec<AdvancePayment> = state
            .advances
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        advances.sort_by(|a, b| a.advance_date.cmp(&b.advance_date).then(a.id.cmp(&b.id)));
        Ok(advances)
    }

    async fn repaid_totals(&self, user_id: u64) -> Result<Vec<AdvanceTotal>, sqlx::Error> {
        Ok(self.state.lock().await.totals(user_id, |_| true))
    }

    async fn repaid_before(
        &self,
        user_id: u64,
        period: Period,
    ) -> Result<Vec<AdvanceTotal>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.totals(user_id, |t| {
            state
                .period_of(t.salary_record_id)
                .is_some_and(|p| p < period)
        }))
    }

    async fn begin(&self) -> Result<MemoryTx, sqlx::Error> {
        let guard = self.state.clone().lock_owned().await;
        let work = (*guard).clone();
        Ok(MemoryTx {
            guard,
            work,
            inserts: 0,
            fail_on_insert: self.fail_on_insert,
        })
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<LedgerState>,
    work: LedgerState,
    inserts: usize,
    fail_on_insert: Option<usize>,
}

#[async_trait]
impl LedgerTransaction for MemoryTx {
    async fn lock_salary_record(&mut self, id: u64) -> Result<Option<SalaryRecord>, sqlx::Error> {
        Ok(self.work.salary_records.get(&id).cloned())
    }

    async fn linked_total(&mut self, salary_record_id: u64) -> Result<Decimal, sqlx::Error> {
        Ok(self
            .work
            .transactions
            .iter()
            .filter(|t| t.salary_record_id == salary_record_id)
            .map(|t| t.amount)
            .sum())
    }

    async fn transacted_totals(&mut self, user_id: u64) -> Result<Vec<AdvanceTotal>, sqlx::Error> {
        Ok(self.work.totals(user_id, |_| true))
    }

    async fn lock_outstanding_advances(
        &mut self,
        user_id: u64,
        disbursed_by: NaiveDate,
    ) -> Result<Vec<AdvancePayment>, sqlx::Error> {
        let mut advances: Vec<AdvancePayment> = self
            .work
            .advances
            .values()
            .filter(|a| {
                a.user_id == user_id
                    && a.remaining_balance > Decimal::ZERO
                    && a.advance_date <= disbursed_by
            })
            .cloned()
            .collect();
        advances.sort_by(|a, b| a.advance_date.cmp(&b.advance_date).then(a.id.cmp(&b.id)));
        Ok(advances)
    }

    async fn insert_transaction(
        &mut self,
        row: &NewDeductionTransaction,
    ) -> Result<u64, sqlx::Error> {
        self.inserts += 1;
        if self.fail_on_insert == Some(self.inserts) {
            return Err(sqlx::Error::Protocol("injected insert failure".to_string()));
        }

        let id = self.work.transactions.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        self.work.transactions.push(AdvanceDeductionTransaction {
            id,
            advance_payment_id: row.advance_payment_id,
            salary_record_id: row.salary_record_id,
            amount: row.amount,
            deduction_date: row.deduction_date,
            note: row.note.clone(),
            created_at: None,
        });
        self.work.writes += 1;
        Ok(id)
    }

    async fn update_advance_balance(
        &mut self,
        advance_payment_id: u64,
        remaining_balance: Decimal,
        status: AdvanceStatus,
    ) -> Result<(), sqlx::Error> {
        if let Some(advance) = self.work.advances.get_mut(&advance_payment_id) {
            advance.remaining_balance = remaining_balance;
            advance.status = status;
            self.work.writes += 1;
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), sqlx::Error> {
        let MemoryTx {
            mut guard, work, ..
        } = self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        Ok(())
    }
}

pub fn salary_record(id: u64, user_id: u64, month: u32, year: u32, advance: Decimal) -> SalaryRecord {
    let calculated = Decimal::new(300_000, 2);
    SalaryRecord {
        id,
        user_id,
        month,
        year,
        base_salary: calculated,
        calculated_salary: calculated,
        bonuses: Decimal::ZERO,
        deductions: Decimal::ZERO,
        advance_salary_deducted: advance,
        final_salary: calculated - advance,
        disbursement_status: DisbursementStatus::Pending,
        disbursed_at: None,
        is_auto_generated: true,
        is_manually_modified: false,
    }
}

pub fn advance(
    id: u64,
    user_id: u64,
    date: (i32, u32, u32),
    amount: Decimal,
    remaining_balance: Decimal,
) -> AdvancePayment {
    AdvancePayment {
        id,
        user_id,
        amount,
        remaining_balance,
        monthly_deduction: None,
        advance_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
        status: if remaining_balance > Decimal::ZERO {
            AdvanceStatus::Active
        } else {
            AdvanceStatus::Repaid
        },
        reason: None,
    }
}

pub fn transaction(
    id: u64,
    advance_payment_id: u64,
    salary_record_id: u64,
    amount: Decimal,
) -> AdvanceDeductionTransaction {
    AdvanceDeductionTransaction {
        id,
        advance_payment_id,
        salary_record_id,
        amount,
        deduction_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        note: None,
        created_at: None,
    }
}
