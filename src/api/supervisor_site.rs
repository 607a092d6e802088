use std::collections::BTreeSet;

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use strum::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::role::Role;
use crate::model::site::{AssignedSite, Site};
use crate::utils::request::{positive_id, required_action};
use crate::utils::response::{message, success};

const MAX_SITES_PER_ASSIGN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SupervisorSiteAction {
    List,
    Available,
    Assign,
    Unassign,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SupervisorSiteQuery {
    /// `list` or `available`
    #[param(example = "list")]
    pub action: Option<String>,
    #[param(example = 15)]
    pub supervisor_id: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({"action": "assign", "supervisor_id": 15, "site_ids": [3, 4]}))]
pub struct SupervisorSiteCommand {
    /// `assign` or `unassign`
    pub action: Option<String>,
    pub supervisor_id: Option<i64>,
    /// Sites to assign, `assign` only.
    pub site_ids: Option<Vec<i64>>,
    /// Site to remove, `unassign` only.
    pub site_id: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignSummary {
    pub supervisor_id: u64,
    /// Distinct sites in the request.
    pub requested: usize,
    /// Assignments that did not exist before.
    pub assigned: u64,
}

/// Distinct, positive site ids, at most [`MAX_SITES_PER_ASSIGN`].
fn site_id_set(raw: Option<&[i64]>) -> Result<BTreeSet<u64>, AppError> {
    let raw = raw.unwrap_or_default();
    if raw.is_empty() {
        return Err(AppError::Validation("site_ids must not be empty".to_string()));
    }
    if raw.len() > MAX_SITES_PER_ASSIGN {
        return Err(AppError::Validation(format!(
            "At most {MAX_SITES_PER_ASSIGN} sites can be assigned at once"
        )));
    }
    raw.iter()
        .map(|&id| positive_id("site_ids", Some(id)))
        .collect()
}

#[utoipa::path(
    get,
    path = "/api/supervisor-sites",
    params(SupervisorSiteQuery),
    responses(
        (status = 200, description = "Assigned sites (`list`) or active unassigned sites (`available`)", body = [AssignedSite]),
        (status = 400),
        (status = 401),
        (status = 403, description = "HR/Admin only"),
        (status = 405, description = "Action must be sent with POST")
    ),
    security(("bearer_auth" = [])),
    tag = "Supervisor sites"
)]
pub async fn query_supervisor_sites(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SupervisorSiteQuery>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let query = query.into_inner();

    match required_action(query.action.as_deref(), None)? {
        SupervisorSiteAction::List => {
            let supervisor_id = positive_id("supervisor_id", query.supervisor_id)?;
            let sites = sqlx::query_as::<_, AssignedSite>(
                r#"
                SELECT ss.site_id, s.name, s.address, s.client_type_id, ss.assigned_at
                FROM supervisor_sites ss
                JOIN sites s ON s.id = ss.site_id
                WHERE ss.supervisor_id = ?
                ORDER BY s.name ASC
                "#,
            )
            .bind(supervisor_id)
            .fetch_all(pool.get_ref())
            .await?;

            Ok(success(sites))
        }
        SupervisorSiteAction::Available => {
            let supervisor_id = positive_id("supervisor_id", query.supervisor_id)?;
            let sites = sqlx::query_as::<_, Site>(
                r#"
                SELECT s.id, s.name, s.address, s.client_type_id, s.is_active
                FROM sites s
                WHERE s.is_active = TRUE
                  AND NOT EXISTS (
                      SELECT 1 FROM supervisor_sites ss
                      WHERE ss.site_id = s.id AND ss.supervisor_id = ?
                  )
                ORDER BY s.name ASC
                "#,
            )
            .bind(supervisor_id)
            .fetch_all(pool.get_ref())
            .await?;

            Ok(success(sites))
        }
        action => Err(AppError::MethodNotAllowed(format!("{action} requires POST"))),
    }
}

#[utoipa::path(
    post,
    path = "/api/supervisor-sites",
    request_body = SupervisorSiteCommand,
    responses(
        (status = 200, description = "Assignment summary or confirmation", body = AssignSummary),
        (status = 400, description = "Invalid ids, user is not a supervisor, or site inactive"),
        (status = 401),
        (status = 403, description = "HR/Admin only"),
        (status = 404, description = "Supervisor or assignment not found"),
        (status = 405, description = "Action must be sent with GET")
    ),
    security(("bearer_auth" = [])),
    tag = "Supervisor sites"
)]
pub async fn command_supervisor_sites(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<SupervisorSiteCommand>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let cmd = body.into_inner();

    match required_action(cmd.action.as_deref(), None)? {
        SupervisorSiteAction::Assign => {
            let supervisor_id = positive_id("supervisor_id", cmd.supervisor_id)?;
            let site_ids = site_id_set(cmd.site_ids.as_deref())?;

            let summary = assign_sites(pool.get_ref(), supervisor_id, &site_ids).await?;
            tracing::info!(
                supervisor_id,
                requested = summary.requested,
                assigned = summary.assigned,
                assigned_by = auth.user_id,
                "Sites assigned to supervisor"
            );

            Ok(success(summary))
        }
        SupervisorSiteAction::Unassign => {
            let supervisor_id = positive_id("supervisor_id", cmd.supervisor_id)?;
            let site_id = positive_id("site_id", cmd.site_id)?;

            let result =
                sqlx::query("DELETE FROM supervisor_sites WHERE supervisor_id = ? AND site_id = ?")
                    .bind(supervisor_id)
                    .bind(site_id)
                    .execute(pool.get_ref())
                    .await?;

            if result.rows_affected() == 0 {
                return Err(AppError::NotFound(format!(
                    "Site {site_id} is not assigned to supervisor {supervisor_id}"
                )));
            }

            tracing::info!(supervisor_id, site_id, removed_by = auth.user_id, "Site unassigned");
            Ok(message("Site unassigned"))
        }
        action => Err(AppError::MethodNotAllowed(format!("{action} requires GET"))),
    }
}

async fn assign_sites(
    pool: &MySqlPool,
    supervisor_id: u64,
    site_ids: &BTreeSet<u64>,
) -> Result<AssignSummary, AppError> {
    let mut tx = pool.begin().await?;

    let role_id: Option<u8> = sqlx::query_scalar("SELECT role_id FROM users WHERE id = ? FOR UPDATE")
        .bind(supervisor_id)
        .fetch_optional(&mut *tx)
        .await?;

    match role_id {
        None => return Err(AppError::not_found("User", supervisor_id)),
        Some(role) if role != Role::Supervisor.id() => {
            return Err(AppError::Validation(format!(
                "User {supervisor_id} is not a supervisor"
            )));
        }
        Some(_) => {}
    }

    let in_list = placeholders(site_ids.len(), "?");
    let lookup_sql = format!(
        "SELECT id FROM sites WHERE is_active = TRUE AND id IN ({in_list}) LOCK IN SHARE MODE"
    );
    let mut lookup = sqlx::query_scalar::<_, u64>(&lookup_sql);
    for id in site_ids {
        lookup = lookup.bind(*id);
    }
    let active: BTreeSet<u64> = lookup.fetch_all(&mut *tx).await?.into_iter().collect();

    let unusable: Vec<String> = site_ids
        .difference(&active)
        .map(u64::to_string)
        .collect();
    if !unusable.is_empty() {
        return Err(AppError::Validation(format!(
            "Sites not found or inactive: {}",
            unusable.join(", ")
        )));
    }

    // Existing assignments are kept; only new pairs count as affected rows.
    let insert_sql = format!(
        "INSERT IGNORE INTO supervisor_sites (supervisor_id, site_id) VALUES {}",
        placeholders(site_ids.len(), "(?, ?)")
    );
    let mut insert = sqlx::query(&insert_sql);
    for id in site_ids {
        insert = insert.bind(supervisor_id).bind(*id);
    }

    let assigned = insert.execute(&mut *tx).await?.rows_affected();
    tx.commit().await?;

    Ok(AssignSummary {
        supervisor_id,
        requested: site_ids.len(),
        assigned,
    })
}

/// `n` copies of `group` joined by commas.
fn placeholders(n: usize, group: &str) -> String {
    vec![group; n].join(", ")
}
