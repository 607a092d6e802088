//! Advance-deduction reconciliation.
//!
//! Re-derives the advance deduction each salary record should carry from
//! the employee's advance ledger, compares it with what was recorded and
//! what was actually transacted, and repairs missing transactions.

pub mod allocation;
pub mod engine;
pub mod ledger;
pub mod report;

#[cfg(test)]
pub mod memory;

use chrono::{Datelike, NaiveDate};

use crate::error::AppError;
use crate::model::salary_record::SalaryRecord;

pub use engine::ReconciliationEngine;
pub use ledger::MySqlLedger;

/// A payroll month. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    first_day: NaiveDate,
    last_day: NaiveDate,
}

impl Period {
    pub fn new(month: u32, year: u32) -> Option<Self> {
        let year = i32::try_from(year).ok()?;
        let first_day = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next_month = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self {
            first_day,
            last_day: next_month.pred_opt()?,
        })
    }

    pub fn of(record: &SalaryRecord) -> Result<Self, AppError> {
        Self::new(record.month, record.year).ok_or_else(|| {
            AppError::Internal(format!(
                "Salary record {} has an invalid period {}/{}",
                record.id, record.month, record.year
            ))
        })
    }

    pub fn month(self) -> u32 {
        self.first_day.month()
    }

    pub fn year(self) -> u32 {
        self.first_day.year_ce().1
    }

    pub fn first_day(self) -> NaiveDate {
        self.first_day
    }

    pub fn last_day(self) -> NaiveDate {
        self.last_day
    }
}
