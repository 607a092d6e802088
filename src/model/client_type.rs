use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ClientType {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Corporate")]
    pub name: String,
    #[schema(example = "Office buildings and company premises", nullable = true)]
    pub description: Option<String>,
    pub is_active: bool,
}
