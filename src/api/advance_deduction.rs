use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use strum::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::AppError;
use crate::reconcile::{MySqlLedger, ReconciliationEngine};
use crate::utils::request::{positive_id, required_action, required_number};
use crate::utils::response::success;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AdvanceDeductionAction {
    VerifySalaryRecord,
    GetAdvanceHistory,
    CheckMonth,
    FixMissingTransactions,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdvanceDeductionQuery {
    /// `verify_salary_record`, `get_advance_history` or `check_month`
    #[param(example = "verify_salary_record")]
    pub action: Option<String>,
    #[param(example = 42)]
    pub salary_record_id: Option<i64>,
    #[param(example = 7)]
    pub user_id: Option<i64>,
    #[param(example = 3)]
    pub month: Option<i64>,
    #[param(example = 2025)]
    pub year: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({"action": "fix_missing_transactions", "salary_record_id": 42}))]
pub struct AdvanceDeductionCommand {
    pub action: Option<String>,
    pub salary_record_id: Option<i64>,
}

#[derive(Debug, PartialEq)]
enum ReconcileQuery {
    VerifySalaryRecord { salary_record_id: u64 },
    AdvanceHistory { user_id: u64 },
    CheckMonth { month: u32, year: u32 },
}

impl AdvanceDeductionQuery {
    fn into_request(self) -> Result<ReconcileQuery, AppError> {
        match required_action(self.action.as_deref(), None)? {
            AdvanceDeductionAction::VerifySalaryRecord => Ok(ReconcileQuery::VerifySalaryRecord {
                salary_record_id: positive_id("salary_record_id", self.salary_record_id)?,
            }),
            AdvanceDeductionAction::GetAdvanceHistory => Ok(ReconcileQuery::AdvanceHistory {
                user_id: positive_id("user_id", self.user_id)?,
            }),
            AdvanceDeductionAction::CheckMonth => Ok(ReconcileQuery::CheckMonth {
                month: required_number("month", self.month)?,
                year: required_number("year", self.year)?,
            }),
            action @ AdvanceDeductionAction::FixMissingTransactions => Err(
                AppError::MethodNotAllowed(format!("{action} requires POST")),
            ),
        }
    }
}

impl AdvanceDeductionCommand {
    /// Returns the salary record to repair.
    fn into_repair_target(self) -> Result<u64, AppError> {
        match required_action(self.action.as_deref(), None)? {
            AdvanceDeductionAction::FixMissingTransactions => {
                positive_id("salary_record_id", self.salary_record_id)
            }
            action => Err(AppError::MethodNotAllowed(format!("{action} requires GET"))),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/advance-deductions",
    params(AdvanceDeductionQuery),
    responses(
        (status = 200, description = "Deduction report, advance history or month report"),
        (status = 400, description = "Missing or invalid parameter"),
        (status = 401),
        (status = 403, description = "HR/Admin only"),
        (status = 404, description = "Salary record or user not found"),
        (status = 405, description = "Action must be sent with POST")
    ),
    security(("bearer_auth" = [])),
    tag = "Advance deductions"
)]
pub async fn query_advance_deductions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<AdvanceDeductionQuery>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let request = query.into_inner().into_request()?;

    let ledger = MySqlLedger::new(pool.get_ref().clone());
    let engine = ReconciliationEngine::new(&ledger, &config.reconcile);

    let response = match request {
        ReconcileQuery::VerifySalaryRecord { salary_record_id } => {
            success(engine.verify_salary_record_deductions(salary_record_id).await?)
        }
        ReconcileQuery::AdvanceHistory { user_id } => {
            success(engine.advance_payment_history(user_id).await?)
        }
        ReconcileQuery::CheckMonth { month, year } => {
            success(engine.check_month_advance_deductions(month, year).await?)
        }
    };

    Ok(response)
}

#[utoipa::path(
    post,
    path = "/api/advance-deductions",
    request_body = AdvanceDeductionCommand,
    responses(
        (status = 200, description = "Repair summary", body = crate::reconcile::report::RepairSummary),
        (status = 400, description = "Missing or invalid parameter"),
        (status = 401),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Salary record not found"),
        (status = 405, description = "Action must be sent with GET"),
        (status = 409, description = "Outstanding advances cannot cover the shortfall")
    ),
    security(("bearer_auth" = [])),
    tag = "Advance deductions"
)]
pub async fn command_advance_deductions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    body: web::Json<AdvanceDeductionCommand>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    let salary_record_id = body.into_inner().into_repair_target()?;

    tracing::info!(
        salary_record_id,
        requested_by = auth.user_id,
        username = %auth.username,
        "Advance deduction repair requested"
    );

    let ledger = MySqlLedger::new(pool.get_ref().clone());
    let engine = ReconciliationEngine::new(&ledger, &config.reconcile);

    Ok(success(engine.fix_missing_transactions(salary_record_id).await?))
}
