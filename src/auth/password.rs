/// Password hashing and verification
///
/// bcrypt-backed credential verification plus password strength rules
/// applied before hashing. Plaintext passwords are never stored.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash a password with bcrypt after validating its strength.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    validate_password_strength(password)?;

    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a raw password against a stored bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// Strength rules: 8-128 characters with at least one digit, one lowercase
/// and one uppercase letter. The upper bound guards against bcrypt's input
/// limit.
fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        )));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_differs_from_plaintext() {
        let password = "Secret1$password";
        let hash = hash_password(password).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn correct_password_verifies() {
        let password = "Secret1$password";
        let hash = hash_password(password).expect("Failed to hash password");

        assert!(verify_password(password, &hash).expect("Failed to verify"));
    }

    #[test]
    fn wrong_password_does_not_verify() {
        let hash = hash_password("Secret1$password").expect("Failed to hash password");

        assert!(!verify_password("Wrong1$password", &hash).expect("Failed to verify"));
    }

    #[test]
    fn short_password_is_rejected() {
        assert!(hash_password("Short1").is_err());
    }

    #[test]
    fn overlong_password_is_rejected() {
        let long = format!("Aa1{}", "a".repeat(MAX_PASSWORD_LENGTH));
        assert!(hash_password(&long).is_err());
    }

    #[test]
    fn passwords_missing_a_character_class_are_rejected() {
        assert!(hash_password("nodigitsnoupper").is_err());
        assert!(hash_password("NOLOWERCASE1").is_err());
        assert!(hash_password("nouppercase1").is_err());
    }

    #[test]
    fn symbols_are_allowed_but_not_required() {
        assert!(hash_password("Secret1$").is_ok());
    }
}
