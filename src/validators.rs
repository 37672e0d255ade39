/// Input validators for request payloads.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_NAME_LENGTH: usize = 50;
const MAX_TITLE_LENGTH: usize = 100;
const MIN_ISBN_LENGTH: usize = 10;
const MAX_ISBN_LENGTH: usize = 13;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

/// Validates and normalizes an email address.
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }
    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort(
            "email".to_string(),
            MIN_EMAIL_LENGTH,
        ));
    }
    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong(
            "email".to_string(),
            MAX_EMAIL_LENGTH,
        ));
    }
    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat(
            "email has invalid format".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

/// Validates a person name (first/last name, author name or surname).
pub fn is_valid_name(field: &str, name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field.to_string()));
    }
    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong(field.to_string(), MAX_NAME_LENGTH));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat(format!(
            "{} contains control characters",
            field
        )));
    }

    Ok(trimmed.to_string())
}

/// Validates a book title.
pub fn is_valid_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("title".to_string()));
    }
    if trimmed.len() > MAX_TITLE_LENGTH {
        return Err(ValidationError::TooLong(
            "title".to_string(),
            MAX_TITLE_LENGTH,
        ));
    }

    Ok(trimmed.to_string())
}

/// Validates an ISBN: 10 to 13 digits, hyphens stripped.
pub fn is_valid_isbn(isbn: &str) -> Result<String, ValidationError> {
    let normalized: String = isbn.chars().filter(|c| *c != '-').collect();

    if normalized.len() < MIN_ISBN_LENGTH {
        return Err(ValidationError::TooShort(
            "isbn".to_string(),
            MIN_ISBN_LENGTH,
        ));
    }
    if normalized.len() > MAX_ISBN_LENGTH {
        return Err(ValidationError::TooLong("isbn".to_string(), MAX_ISBN_LENGTH));
    }
    // Final character of ISBN-10 may be the X check digit.
    if !normalized
        .chars()
        .all(|c| c.is_ascii_digit() || c == 'X' || c == 'x')
    {
        return Err(ValidationError::InvalidFormat(
            "isbn must contain only digits".to_string(),
        ));
    }

    Ok(normalized)
}

/// Validates a genre slug: lowercase alphanumerics separated by hyphens.
pub fn is_valid_slug(slug: &str) -> Result<String, ValidationError> {
    let trimmed = slug.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("slug".to_string()));
    }
    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong(
            "slug".to_string(),
            MAX_NAME_LENGTH,
        ));
    }
    if !SLUG_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat(
            "slug must be lowercase alphanumerics separated by hyphens".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}
