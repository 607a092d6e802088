use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "name": "Present",
        "code": "P",
        "is_paid": true,
        "counts_as_present": true,
        "is_active": true
    })
)]
pub struct AttendanceType {
    pub id: u64,
    pub name: String,
    pub code: String,
    pub is_paid: bool,
    pub counts_as_present: bool,
    pub is_active: bool,
}
