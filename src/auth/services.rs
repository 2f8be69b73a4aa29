use lazy_static::lazy_static;
use regex::Regex;

use crate::error::FieldError;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Policy for new passwords: 8+ chars with a lowercase, an uppercase and a digit.
pub fn password_problems(password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if password.chars().count() < 8 {
        errors.push(FieldError::new("password", "Password must be at least 8 characters"));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push(FieldError::new("password", "Password must contain a lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push(FieldError::new("password", "Password must contain an uppercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new("password", "Password must contain a number"));
    }
    errors
}

/// Collects problems with the usual account fields; `password` is only
/// checked against the policy when `strict_password` is set.
pub fn check_account_fields(
    name: Option<&str>,
    email: &str,
    password: &str,
    strict_password: bool,
) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Some(name) = name {
        if name.trim().is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        }
    }
    if !is_valid_email(email) {
        errors.push(FieldError::new("email", "Please provide a valid email"));
    }
    if strict_password {
        errors.extend(password_problems(password));
    } else if password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }
    errors
}
