use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{MySql, MySqlPool, Transaction};

use crate::model::advance_payment::{
    ADVANCE_PAYMENT_COLUMNS, AdvanceDeductionTransaction, AdvancePayment, AdvanceStatus,
    DEDUCTION_TRANSACTION_COLUMNS, NewDeductionTransaction,
};
use crate::model::salary_record::{SALARY_RECORD_COLUMNS, SalaryRecord};

use super::Period;

/// Deductions posted against one advance.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AdvanceTotal {
    pub advance_payment_id: u64,
    pub total: Decimal,
}

/// Read access to the payroll/advance ledger plus the ability to open a
/// write transaction for repairs.
#[async_trait]
pub trait AdvanceLedger: Send + Sync {
    type Tx: LedgerTransaction;

    async fn salary_record(&self, id: u64) -> Result<Option<SalaryRecord>, sqlx::Error>;

    async fn salary_records_for_period(
        &self,
        period: Period,
    ) -> Result<Vec<SalaryRecord>, sqlx::Error>;

    async fn transactions_for_record(
        &self,
        salary_record_id: u64,
    ) -> Result<Vec<AdvanceDeductionTransaction>, sqlx::Error>;

    async fn user_exists(&self, user_id: u64) -> Result<bool, sqlx::Error>;

    async fn advances_for_user(&self, user_id: u64) -> Result<Vec<AdvancePayment>, sqlx::Error>;

    /// All-time deduction totals for each of the user's advances.
    async fn repaid_totals(&self, user_id: u64) -> Result<Vec<AdvanceTotal>, sqlx::Error>;

    /// Deduction totals for each of the user's advances, counting only
    /// transactions posted by salary records of periods before `period`.
    async fn repaid_before(
        &self,
        user_id: u64,
        period: Period,
    ) -> Result<Vec<AdvanceTotal>, sqlx::Error>;

    async fn begin(&self) -> Result<Self::Tx, sqlx::Error>;
}

/// Write side of a repair. Reads here are locking reads: a second repair of
/// the same record waits until this one commits or rolls back.
#[async_trait]
pub trait LedgerTransaction: Send {
    async fn lock_salary_record(&mut self, id: u64) -> Result<Option<SalaryRecord>, sqlx::Error>;

    async fn linked_total(&mut self, salary_record_id: u64) -> Result<Decimal, sqlx::Error>;

    /// All-time deduction totals for each of the user's advances, read on
    /// the repair's connection.
    async fn transacted_totals(&mut self, user_id: u64) -> Result<Vec<AdvanceTotal>, sqlx::Error>;

    /// Advances with a positive balance disbursed on or before `disbursed_by`,
    /// oldest first.
    async fn lock_outstanding_advances(
        &mut self,
        user_id: u64,
        disbursed_by: NaiveDate,
    ) -> Result<Vec<AdvancePayment>, sqlx::Error>;

    async fn insert_transaction(
        &mut self,
        row: &NewDeductionTransaction,
    ) -> Result<u64, sqlx::Error>;

    async fn update_advance_balance(
        &mut self,
        advance_payment_id: u64,
        remaining_balance: Decimal,
        status: AdvanceStatus,
    ) -> Result<(), sqlx::Error>;

    async fn commit(self) -> Result<(), sqlx::Error>;

    async fn rollback(self) -> Result<(), sqlx::Error>;
}

/// Ledger backed by the MySQL pool. Built per request.
#[derive(Clone)]
pub struct MySqlLedger {
    pool: MySqlPool,
}

impl MySqlLedger {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdvanceLedger for MySqlLedger {
    type Tx = MySqlLedgerTx;

    async fn salary_record(&self, id: u64) -> Result<Option<SalaryRecord>, sqlx::Error> {
        let sql = format!("SELECT {SALARY_RECORD_COLUMNS} FROM salary_records WHERE id = ?");
        sqlx::query_as::<_, SalaryRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn salary_records_for_period(
        &self,
        period: Period,
    ) -> Result<Vec<SalaryRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {SALARY_RECORD_COLUMNS} FROM salary_records WHERE month = ? AND year = ? ORDER BY id"
        );
        sqlx::query_as::<_, SalaryRecord>(&sql)
            .bind(period.month())
            .bind(period.year())
            .fetch_all(&self.pool)
            .await
    }

    async fn transactions_for_record(
        &self,
        salary_record_id: u64,
    ) -> Result<Vec<AdvanceDeductionTransaction>, sqlx::Error> {
        let sql = format!(
            "SELECT {DEDUCTION_TRANSACTION_COLUMNS} FROM advance_deduction_transactions WHERE salary_record_id = ? ORDER BY id"
        );
        sqlx::query_as::<_, AdvanceDeductionTransaction>(&sql)
            .bind(salary_record_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn user_exists(&self, user_id: u64) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn advances_for_user(&self, user_id: u64) -> Result<Vec<AdvancePayment>, sqlx::Error> {
        let sql = format!(
            "SELECT {ADVANCE_PAYMENT_COLUMNS} FROM advance_payments WHERE user_id = ? ORDER BY advance_date ASC, id ASC"
        );
        sqlx::query_as::<_, AdvancePayment>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn repaid_totals(&self, user_id: u64) -> Result<Vec<AdvanceTotal>, sqlx::Error> {
        sqlx::query_as::<_, AdvanceTotal>(
            r#"
            SELECT t.advance_payment_id, COALESCE(SUM(t.amount), 0) AS total
            FROM advance_deduction_transactions t
            JOIN advance_payments a ON a.id = t.advance_payment_id
            WHERE a.user_id = ?
            GROUP BY t.advance_payment_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn repaid_before(
        &self,
        user_id: u64,
        period: Period,
    ) -> Result<Vec<AdvanceTotal>, sqlx::Error> {
        sqlx::query_as::<_, AdvanceTotal>(
            r#"
            SELECT t.advance_payment_id, COALESCE(SUM(t.amount), 0) AS total
            FROM advance_deduction_transactions t
            JOIN advance_payments a ON a.id = t.advance_payment_id
            JOIN salary_records s ON s.id = t.salary_record_id
            WHERE a.user_id = ?
            AND (s.year < ? OR (s.year = ? AND s.month < ?))
            GROUP BY t.advance_payment_id
            "#,
        )
        .bind(user_id)
        .bind(period.year())
        .bind(period.year())
        .bind(period.month())
        .fetch_all(&self.pool)
        .await
    }

    async fn begin(&self) -> Result<MySqlLedgerTx, sqlx::Error> {
        Ok(MySqlLedgerTx {
            tx: self.pool.begin().await?,
        })
    }
}

pub struct MySqlLedgerTx {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl LedgerTransaction for MySqlLedgerTx {
    async fn lock_salary_record(&mut self, id: u64) -> Result<Option<SalaryRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {SALARY_RECORD_COLUMNS} FROM salary_records WHERE id = ? FOR UPDATE"
        );
        sqlx::query_as::<_, SalaryRecord>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
    }

    async fn linked_total(&mut self, salary_record_id: u64) -> Result<Decimal, sqlx::Error> {
        sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM advance_deduction_transactions
            WHERE salary_record_id = ?
            FOR UPDATE
            "#,
        )
        .bind(salary_record_id)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn transacted_totals(&mut self, user_id: u64) -> Result<Vec<AdvanceTotal>, sqlx::Error> {
        sqlx::query_as::<_, AdvanceTotal>(
            r#"
            SELECT t.advance_payment_id, COALESCE(SUM(t.amount), 0) AS total
            FROM advance_deduction_transactions t
            JOIN advance_payments a ON a.id = t.advance_payment_id
            WHERE a.user_id = ?
            GROUP BY t.advance_payment_id
            LOCK IN SHARE MODE
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await
    }

    async fn lock_outstanding_advances(
        &mut self,
        user_id: u64,
        disbursed_by: NaiveDate,
    ) -> Result<Vec<AdvancePayment>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {ADVANCE_PAYMENT_COLUMNS}
            FROM advance_payments
            WHERE user_id = ?
            AND remaining_balance > 0
            AND advance_date <= ?
            ORDER BY advance_date ASC, id ASC
            FOR UPDATE
            "#
        );
        sqlx::query_as::<_, AdvancePayment>(&sql)
            .bind(user_id)
            .bind(disbursed_by)
            .fetch_all(&mut *self.tx)
            .await
    }

    async fn insert_transaction(
        &mut self,
        row: &NewDeductionTransaction,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO advance_deduction_transactions
            (advance_payment_id, salary_record_id, amount, deduction_date, note)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.advance_payment_id)
        .bind(row.salary_record_id)
        .bind(row.amount)
        .bind(row.deduction_date)
        .bind(row.note.as_deref())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.last_insert_id())
    }

    async fn update_advance_balance(
        &mut self,
        advance_payment_id: u64,
        remaining_balance: Decimal,
        status: AdvanceStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE advance_payments SET remaining_balance = ?, status = ? WHERE id = ?")
            .bind(remaining_balance)
            .bind(status.to_string())
            .bind(advance_payment_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}
