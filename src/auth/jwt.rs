/// Token codec
///
/// Encodes and decodes compact signed tokens (HS256) against the
/// process-wide signing secret. Decoding applies zero clock-skew leeway:
/// a token one second past its expiration is rejected.

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};

use crate::auth::claims::{Claims, TokenType};
use crate::auth::role::Role;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Sign the given claims into a compact token string.
pub fn encode_token(claims: &Claims, config: &JwtSettings) -> Result<String, AppError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Verify a token string and return its claims.
///
/// # Errors
/// - `ExpiredToken` if past expiration (checked before anything else the
///   caller might do with the stored record)
/// - `BadSignature` if the signature does not verify
/// - `MalformedToken` for anything else that prevents parsing
pub fn decode_token(token: &str, config: &JwtSettings) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        let kind = match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            ErrorKind::InvalidSignature => AuthError::BadSignature,
            _ => AuthError::MalformedToken,
        };
        tracing::debug!(error = %e, "Token decode failed");
        AppError::Auth(kind)
    })
}

/// Generate a short-lived access token for a principal.
pub fn generate_access_token(
    email: &str,
    role: Role,
    config: &JwtSettings,
) -> Result<String, AppError> {
    let claims = Claims::new(email, role, TokenType::Access, config.access_token_expiry);
    encode_token(&claims, config)
}

/// Generate a long-lived refresh token for a principal.
///
/// This only signs the token; persisting it as an active record is the
/// auth service's job.
pub fn generate_refresh_token(
    email: &str,
    role: Role,
    config: &JwtSettings,
) -> Result<String, AppError> {
    let claims = Claims::new(email, role, TokenType::Refresh, config.refresh_token_expiry);
    encode_token(&claims, config)
}
