//! Request handlers.
//!
//! Handlers never read identity cookies on their own when a gate guards the
//! route; they take [`UserIdentity`](super::gates::UserIdentity) or
//! [`AccountSession`](super::gates::AccountSession) instead.

pub mod accounts;
pub mod deleted;
pub mod events;
pub mod exchange;
pub mod health;
pub mod login;
pub mod optout;

use regex::Regex;

use super::error::ApiError;

/// Trim surrounding whitespace and lowercase an email address.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Lightweight email sanity check used before calling the database.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Reject empty (or whitespace only) request fields.
pub(crate) fn require<'a>(value: &'a str, field: &str) -> Result<&'a str, ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} is required")));
    }
    Ok(value)
}
