use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use strum::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::AppError;
use crate::model::salary_record::{DisbursementStatus, SalaryRecord};
use crate::utils::request::{Pagination, positive_id, required_action, required_number};
use crate::utils::response::success;

const DEFAULT_PER_PAGE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SalarySlipAction {
    GetSlip,
    List,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SalarySlipQuery {
    /// `get_slip` or `list`
    #[param(example = "get_slip")]
    pub action: Option<String>,
    pub salary_record_id: Option<i64>,
    pub month: Option<i64>,
    pub year: Option<i64>,
    /// `pending` or `disbursed`
    pub disbursement_status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(sqlx::FromRow)]
struct SlipHeader {
    #[sqlx(flatten)]
    record: SalaryRecord,
    username: String,
    employee_name: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct DeductionLine {
    pub transaction_id: u64,
    pub advance_payment_id: u64,
    pub amount: Decimal,
    #[schema(value_type = String, format = "date")]
    pub deduction_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub advance_date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SalarySlip {
    pub salary_record: SalaryRecord,
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "Jane Doe", nullable = true)]
    pub employee_name: Option<String>,
    pub deduction_lines: Vec<DeductionLine>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct SlipSummary {
    pub salary_record_id: u64,
    pub user_id: u64,
    pub username: String,
    pub employee_name: Option<String>,
    pub calculated_salary: Decimal,
    pub advance_salary_deducted: Decimal,
    pub final_salary: Decimal,
    #[sqlx(try_from = "String")]
    pub disbursement_status: DisbursementStatus,
}

fn parse_status(raw: Option<&str>) -> Result<Option<DisbursementStatus>, AppError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| {
                AppError::Validation(format!("Unknown disbursement_status: {s}"))
            })
        })
        .transpose()
}

/// HR/Admin read any slip; everyone else only their own.
fn ensure_can_read(auth: &AuthUser, record: &SalaryRecord) -> Result<(), AppError> {
    if auth.is_hr_or_admin() || record.user_id == auth.user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You can only view your own salary slips".to_string(),
        ))
    }
}

async fn load_slip(pool: &MySqlPool, auth: &AuthUser, id: u64) -> Result<SalarySlip, AppError> {
    let header = sqlx::query_as::<_, SlipHeader>(
        r#"
        SELECT s.id, s.user_id, s.month, s.year, s.base_salary, s.calculated_salary,
               s.bonuses, s.deductions, s.advance_salary_deducted, s.final_salary,
               s.disbursement_status, s.disbursed_at, s.is_auto_generated,
               s.is_manually_modified,
               u.username,
               NULLIF(CONCAT_WS(' ', e.first_name, e.last_name), '') AS employee_name
        FROM salary_records s
        JOIN users u ON u.id = s.user_id
        LEFT JOIN employees e ON e.id = u.employee_id
        WHERE s.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Salary record", id))?;

    ensure_can_read(auth, &header.record)?;

    let deduction_lines = sqlx::query_as::<_, DeductionLine>(
        r#"
        SELECT t.id AS transaction_id, t.advance_payment_id, t.amount, t.deduction_date,
               a.advance_date, a.reason
        FROM advance_deduction_transactions t
        JOIN advance_payments a ON a.id = t.advance_payment_id
        WHERE t.salary_record_id = ?
        ORDER BY a.advance_date ASC, t.id ASC
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(SalarySlip {
        salary_record: header.record,
        username: header.username,
        employee_name: header.employee_name,
        deduction_lines,
    })
}

#[utoipa::path(
    get,
    path = "/api/salary-slips",
    params(SalarySlipQuery),
    responses(
        (status = 200, description = "Salary slip or paginated slip summaries", body = SalarySlip),
        (status = 400),
        (status = 401),
        (status = 403, description = "Not your slip, or list requested without HR/Admin role"),
        (status = 404, description = "Salary record not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Salary slips"
)]
pub async fn query_salary_slips(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<SalarySlipQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();

    match required_action(query.action.as_deref(), None)? {
        SalarySlipAction::GetSlip => {
            let id = positive_id("salary_record_id", query.salary_record_id)?;
            Ok(success(load_slip(pool.get_ref(), &auth, id).await?))
        }
        SalarySlipAction::List => {
            auth.require_hr_or_admin()?;

            let period = config.reconcile.validate_period(
                required_number("month", query.month)?,
                required_number("year", query.year)?,
            )?;
            let status = parse_status(query.disbursement_status.as_deref())?.map(|s| s.to_string());
            let pagination = Pagination::new(query.page, query.per_page, DEFAULT_PER_PAGE);

            let total: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*)
                FROM salary_records s
                WHERE s.month = ? AND s.year = ?
                  AND (? IS NULL OR s.disbursement_status = ?)
                "#,
            )
            .bind(period.month())
            .bind(period.year())
            .bind(&status)
            .bind(&status)
            .fetch_one(pool.get_ref())
            .await?;

            let rows = sqlx::query_as::<_, SlipSummary>(
                r#"
                SELECT s.id AS salary_record_id, s.user_id, u.username,
                       NULLIF(CONCAT_WS(' ', e.first_name, e.last_name), '') AS employee_name,
                       s.calculated_salary, s.advance_salary_deducted, s.final_salary,
                       s.disbursement_status
                FROM salary_records s
                JOIN users u ON u.id = s.user_id
                LEFT JOIN employees e ON e.id = u.employee_id
                WHERE s.month = ? AND s.year = ?
                  AND (? IS NULL OR s.disbursement_status = ?)
                ORDER BY u.username ASC, s.id ASC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(period.month())
            .bind(period.year())
            .bind(&status)
            .bind(&status)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(pool.get_ref())
            .await?;

            Ok(success(pagination.wrap(rows, total)))
        }
    }
}
