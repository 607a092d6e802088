use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use strum::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::client_type::ClientType;
use crate::utils::request::{Pagination, required_action};
use crate::utils::response::success;

const DEFAULT_PER_PAGE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ClientTypeAction {
    List,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ClientTypeFilter {
    /// Only `list` is supported; it is also the default.
    pub action: Option<String>,
    pub active_only: Option<bool>,
    /// Case-insensitive substring of the name.
    #[param(example = "corp")]
    pub search: Option<String>,
    #[param(example = 1)]
    pub page: Option<u32>,
    #[param(example = 20)]
    pub per_page: Option<u32>,
}

/// `%term%` with LIKE wildcards escaped.
fn like_pattern(search: Option<&str>) -> Option<String> {
    let term = search.map(str::trim).filter(|s| !s.is_empty())?;
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{escaped}%"))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClientTypeListResponse {
    pub data: Vec<ClientType>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[utoipa::path(
    get,
    path = "/api/client-types",
    params(ClientTypeFilter),
    responses(
        (status = 200, description = "Paginated client types", body = ClientTypeListResponse),
        (status = 400),
        (status = 401)
    ),
    security(("bearer_auth" = [])),
    tag = "Client types"
)]
pub async fn query_client_types(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ClientTypeFilter>,
) -> Result<HttpResponse, AppError> {
    let filter = query.into_inner();
    let ClientTypeAction::List = required_action(filter.action.as_deref(), Some(ClientTypeAction::List))?;

    let pagination = Pagination::new(filter.page, filter.per_page, DEFAULT_PER_PAGE);
    let active_only = filter.active_only.unwrap_or(false);
    let pattern = like_pattern(filter.search.as_deref());

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM client_types
        WHERE (? = FALSE OR is_active = TRUE)
          AND (? IS NULL OR name LIKE ?)
        "#,
    )
    .bind(active_only)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(pool.get_ref())
    .await?;

    let rows = sqlx::query_as::<_, ClientType>(
        r#"
        SELECT id, name, description, is_active
        FROM client_types
        WHERE (? = FALSE OR is_active = TRUE)
          AND (? IS NULL OR name LIKE ?)
        ORDER BY name ASC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(active_only)
    .bind(&pattern)
    .bind(&pattern)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(success(pagination.wrap(rows, total)))
}
