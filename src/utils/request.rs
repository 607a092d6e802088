use serde::Serialize;

use crate::error::AppError;

pub fn require_positive(name: &str, value: u64) -> Result<u64, AppError> {
    if value == 0 {
        return Err(AppError::Validation(format!("{name} must be a positive integer")));
    }
    Ok(value)
}

/// Reads a required id from a query string field.
pub fn positive_id(name: &str, value: Option<i64>) -> Result<u64, AppError> {
    let value = value.ok_or_else(|| AppError::Validation(format!("{name} is required")))?;
    u64::try_from(value)
        .map_err(|_| AppError::Validation(format!("{name} must be a positive integer")))
        .and_then(|v| require_positive(name, v))
}

/// Reads a required month/year style number.
pub fn required_number(name: &str, value: Option<i64>) -> Result<u32, AppError> {
    let value = value.ok_or_else(|| AppError::Validation(format!("{name} is required")))?;
    u32::try_from(value).map_err(|_| AppError::Validation(format!("{name} is out of range")))
}

pub fn required_action<T>(action: Option<&str>, default: Option<T>) -> Result<T, AppError>
where
    T: std::str::FromStr,
{
    match action.map(str::trim).filter(|a| !a.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Validation(format!("Unknown action: {raw}"))),
        None => default.ok_or_else(|| AppError::Validation("action is required".to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn new(page: Option<u32>, per_page: Option<u32>, default_per_page: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(default_per_page).clamp(1, 100),
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    pub fn wrap<T>(self, data: Vec<T>, total: i64) -> Paginated<T> {
        Paginated {
            data,
            page: self.page,
            per_page: self.per_page,
            total,
        }
    }
}

#[derive(Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::EnumString;

    #[derive(Debug, PartialEq, EnumString)]
    #[strum(serialize_all = "snake_case")]
    enum Action {
        List,
        GetSlip,
    }

    #[test]
    fn positive_id_rejects_missing_zero_and_negative() {
        assert_eq!(positive_id("id", Some(5)).unwrap(), 5);
        assert!(matches!(positive_id("id", None), Err(AppError::Validation(m)) if m == "id is required"));
        assert!(positive_id("id", Some(0)).is_err());
        assert!(positive_id("id", Some(-3)).is_err());
    }

    #[test]
    fn action_parsing_uses_default_and_rejects_unknown() {
        assert_eq!(required_action(Some("get_slip"), None::<Action>).unwrap(), Action::GetSlip);
        assert_eq!(required_action(None, Some(Action::List)).unwrap(), Action::List);
        assert!(required_action::<Action>(None, None).is_err());
        assert!(matches!(
            required_action::<Action>(Some("drop_table"), None),
            Err(AppError::Validation(m)) if m.contains("drop_table")
        ));
    }

    #[test]
    fn pagination_is_clamped() {
        let p = Pagination::new(Some(0), Some(1000), 20);
        assert_eq!((p.page, p.per_page), (1, 100));

        let p = Pagination::new(Some(3), None, 20);
        assert_eq!(p.offset(), 40);
        assert_eq!(p.limit(), 20);
    }
}
