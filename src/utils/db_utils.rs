use sqlx::{Executor, MySql};

use crate::error::AppError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    Bool(bool),
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug, PartialEq)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build UPDATE SQL from the fields a request actually set
/// ===============================
/// Column names come from the caller's code, never from the request body.
pub fn build_update_sql(
    table: &str,
    fields: Vec<(&'static str, SqlValue)>,
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, AppError> {
    if fields.is_empty() {
        return Err(AppError::Validation("No fields provided for update".to_string()));
    }

    let set_clause = fields
        .iter()
        .map(|(column, _)| format!("{} = ?", column))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!("UPDATE {} SET {} WHERE {} = ?", table, set_clause, id_column);

    let mut values: Vec<SqlValue> = fields.into_iter().map(|(_, value)| value).collect();

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update<'e, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
        };
    }

    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}

/// True for unique index violations (MySQL error 1062).
pub fn is_duplicate_key(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_set_clause_in_field_order() {
        let update = build_update_sql(
            "attendance_types",
            vec![
                ("name", SqlValue::String("Half day".into())),
                ("is_paid", SqlValue::Bool(true)),
            ],
            "id",
            9,
        )
        .unwrap();

        assert_eq!(
            update.sql,
            "UPDATE attendance_types SET name = ?, is_paid = ? WHERE id = ?"
        );
        assert_eq!(
            update.values,
            vec![
                SqlValue::String("Half day".into()),
                SqlValue::Bool(true),
                SqlValue::U64(9),
            ]
        );
    }

    #[test]
    fn empty_update_is_rejected() {
        let err = build_update_sql("attendance_types", Vec::new(), "id", 1).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
