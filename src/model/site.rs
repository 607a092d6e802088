use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Site {
    pub id: u64,
    pub name: String,
    pub address: Option<String>,
    pub client_type_id: Option<u64>,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AssignedSite {
    pub site_id: u64,
    pub name: String,
    pub address: Option<String>,
    pub client_type_id: Option<u64>,
    #[schema(example = "2026-01-01T09:00:00", format = "date-time", value_type = String)]
    pub assigned_at: NaiveDateTime,
}
