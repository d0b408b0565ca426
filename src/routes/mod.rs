use crate::errors::{AppError, AppResult};

pub mod articles;
pub mod health;
pub mod roles;
pub mod settings;
pub mod users;

/// Path ids arrive as text so a malformed one is a validation error with our
/// own body rather than the extractor's rejection.
pub(crate) fn parse_id(raw: &str, what: &str) -> AppResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::validation(format!("invalid {what} id: {raw}")))
}
