use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;

/// Problems caught before any request leaves the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title cannot be empty")]
    EmptyTitle,

    #[error("due date {0} is in the past")]
    DueDateInPast(NaiveDate),

    #[error("a due time needs a due date")]
    TimeWithoutDate,

    #[error("invalid due time `{0}`; expected H:MM AM or H:MM PM")]
    InvalidDueTime(String),

    #[error("invalid due date `{0}`")]
    InvalidDueDate(String),

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("`{0}` is not a valid email address")]
    InvalidEmail(String),

    #[error("nothing to update")]
    EmptyUpdate,
}

pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

pub fn title(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyTitle)
    } else {
        Ok(())
    }
}

pub fn due_date_not_past(due: NaiveDate, today: NaiveDate) -> Result<(), ValidationError> {
    if due < today {
        Err(ValidationError::DueDateInPast(due))
    } else {
        Ok(())
    }
}

pub fn passwords_match(password: &str, confirm: &str) -> Result<(), ValidationError> {
    require("password", password)?;
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

pub fn email(value: &str) -> Result<(), ValidationError> {
    static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    require("email", value)?;
    let re = EMAIL_RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());
    let valid = match re {
        Some(re) => re.is_match(value.trim()),
        None => value.contains('@'),
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(value.to_string()))
    }
}
