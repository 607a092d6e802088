use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use strum::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::attendance_type::AttendanceType;
use crate::utils::db_utils::{SqlValue, build_update_sql, execute_update, is_duplicate_key};
use crate::utils::request::{positive_id, required_action};
use crate::utils::response::{created, message, success};

const NAME_MAX: usize = 100;
const CODE_MAX: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceTypeAction {
    List,
    Get,
    Create,
    Update,
    Deactivate,
    Activate,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AttendanceTypeQuery {
    /// `list` (default) or `get`
    #[param(example = "list")]
    pub action: Option<String>,
    pub id: Option<i64>,
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[schema(example = json!({
    "action": "create",
    "name": "Half day",
    "code": "hd",
    "is_paid": true,
    "counts_as_present": true
}))]
pub struct AttendanceTypeCommand {
    /// `create`, `update`, `deactivate` or `activate`
    pub action: Option<String>,
    pub id: Option<i64>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub is_paid: Option<bool>,
    pub counts_as_present: Option<bool>,
}

fn validate_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > NAME_MAX {
        return Err(AppError::Validation(format!(
            "name must be 1 to {NAME_MAX} characters"
        )));
    }
    Ok(name.to_string())
}

/// Codes are stored upper-case.
fn normalize_code(raw: &str) -> Result<String, AppError> {
    let code = raw.trim();
    let valid_chars = code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if code.is_empty() || code.len() > CODE_MAX || !valid_chars {
        return Err(AppError::Validation(format!(
            "code must be 1 to {CODE_MAX} letters, digits or underscores"
        )));
    }
    Ok(code.to_ascii_uppercase())
}

fn required_field<'a>(name: &str, value: &'a Option<String>) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

/// Columns to set for an `update`, in a fixed order.
fn update_fields(cmd: &AttendanceTypeCommand) -> Result<Vec<(&'static str, SqlValue)>, AppError> {
    let mut fields = Vec::new();
    if let Some(name) = &cmd.name {
        fields.push(("name", SqlValue::String(validate_name(name)?)));
    }
    if let Some(code) = &cmd.code {
        fields.push(("code", SqlValue::String(normalize_code(code)?)));
    }
    if let Some(is_paid) = cmd.is_paid {
        fields.push(("is_paid", SqlValue::Bool(is_paid)));
    }
    if let Some(counts) = cmd.counts_as_present {
        fields.push(("counts_as_present", SqlValue::Bool(counts)));
    }
    Ok(fields)
}

async fn fetch_attendance_type(pool: &MySqlPool, id: u64) -> Result<AttendanceType, AppError> {
    sqlx::query_as::<_, AttendanceType>(
        r#"
        SELECT id, name, code, is_paid, counts_as_present, is_active
        FROM attendance_types
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Attendance type", id))
}

fn duplicate_code(e: sqlx::Error) -> AppError {
    if is_duplicate_key(&e) {
        AppError::Conflict("An attendance type with this code already exists".to_string())
    } else {
        e.into()
    }
}

#[utoipa::path(
    get,
    path = "/api/attendance-types",
    params(AttendanceTypeQuery),
    responses(
        (status = 200, description = "List or single attendance type", body = [AttendanceType]),
        (status = 400),
        (status = 401),
        (status = 404, description = "Attendance type not found"),
        (status = 405, description = "Action must be sent with POST")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance types"
)]
pub async fn query_attendance_types(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceTypeQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();

    match required_action(query.action.as_deref(), Some(AttendanceTypeAction::List))? {
        AttendanceTypeAction::List => {
            let include_inactive = query.include_inactive.unwrap_or(false);
            let rows = sqlx::query_as::<_, AttendanceType>(
                r#"
                SELECT id, name, code, is_paid, counts_as_present, is_active
                FROM attendance_types
                WHERE (? OR is_active = TRUE)
                ORDER BY name ASC
                "#,
            )
            .bind(include_inactive)
            .fetch_all(pool.get_ref())
            .await?;

            Ok(success(rows))
        }
        AttendanceTypeAction::Get => {
            let id = positive_id("id", query.id)?;
            Ok(success(fetch_attendance_type(pool.get_ref(), id).await?))
        }
        action => Err(AppError::MethodNotAllowed(format!("{action} requires POST"))),
    }
}

#[utoipa::path(
    post,
    path = "/api/attendance-types",
    request_body = AttendanceTypeCommand,
    responses(
        (status = 200, description = "Attendance type updated or toggled"),
        (status = 201, description = "Attendance type created", body = AttendanceType),
        (status = 400),
        (status = 401),
        (status = 403, description = "HR/Admin only"),
        (status = 404, description = "Attendance type not found"),
        (status = 409, description = "Code already in use")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance types"
)]
pub async fn command_attendance_types(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<AttendanceTypeCommand>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let cmd = body.into_inner();

    match required_action(cmd.action.as_deref(), None)? {
        AttendanceTypeAction::Create => {
            let name = validate_name(required_field("name", &cmd.name)?)?;
            let code = normalize_code(required_field("code", &cmd.code)?)?;

            let result = sqlx::query(
                r#"
                INSERT INTO attendance_types (name, code, is_paid, counts_as_present, is_active)
                VALUES (?, ?, ?, ?, TRUE)
                "#,
            )
            .bind(&name)
            .bind(&code)
            .bind(cmd.is_paid.unwrap_or(true))
            .bind(cmd.counts_as_present.unwrap_or(true))
            .execute(pool.get_ref())
            .await
            .map_err(duplicate_code)?;

            let id = result.last_insert_id();
            tracing::info!(id, code = %code, created_by = auth.user_id, "Attendance type created");

            Ok(created(fetch_attendance_type(pool.get_ref(), id).await?))
        }
        AttendanceTypeAction::Update => {
            let id = positive_id("id", cmd.id)?;
            let update = build_update_sql("attendance_types", update_fields(&cmd)?, "id", id)?;

            // Confirms existence; MySQL reports 0 affected rows for no-op updates too.
            fetch_attendance_type(pool.get_ref(), id).await?;
            execute_update(pool.get_ref(), update)
                .await
                .map_err(duplicate_code)?;

            tracing::info!(id, updated_by = auth.user_id, "Attendance type updated");
            Ok(success(fetch_attendance_type(pool.get_ref(), id).await?))
        }
        action @ (AttendanceTypeAction::Deactivate | AttendanceTypeAction::Activate) => {
            let id = positive_id("id", cmd.id)?;
            let active = action == AttendanceTypeAction::Activate;

            fetch_attendance_type(pool.get_ref(), id).await?;
            sqlx::query("UPDATE attendance_types SET is_active = ? WHERE id = ?")
                .bind(active)
                .bind(id)
                .execute(pool.get_ref())
                .await?;

            tracing::info!(id, active, updated_by = auth.user_id, "Attendance type toggled");
            Ok(message(if active {
                "Attendance type activated"
            } else {
                "Attendance type deactivated"
            }))
        }
        action => Err(AppError::MethodNotAllowed(format!("{action} requires GET"))),
    }
}
