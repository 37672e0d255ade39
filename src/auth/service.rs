/// Authentication service
///
/// Login, token-pair issuance, single-use refresh rotation, validation and
/// logout. Composes the token codec, the refresh store and the principal
/// lookup.

use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::jwt::{decode_token, generate_access_token, generate_refresh_token};
use crate::auth::password::verify_password;
use crate::auth::refresh_token::{
    consume_refresh_token, deactivate_refresh_token, find_refresh_token, save_refresh_token,
};
use crate::auth::role::Role;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// An access/refresh token pair as handed to the client.
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Principal row as read from the accounts table.
#[derive(Debug)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub active: bool,
}

/// Look up a principal by email.
pub async fn find_principal_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<Principal>, AppError> {
    let row = sqlx::query_as::<_, (Uuid, String, String, String, bool)>(
        "SELECT id, email, password_hash, role, active FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    row.map(|(id, email, password_hash, role, active)| {
        let role = role
            .parse::<Role>()
            .map_err(|e| AppError::Internal(format!("Corrupt role column: {}", e)))?;
        Ok(Principal {
            id,
            email,
            password_hash,
            role,
            active,
        })
    })
    .transpose()
}

/// Issue an access/refresh pair for a principal and persist the refresh
/// token as an ACTIVE record. Access tokens are never persisted.
pub async fn issue_token_pair(
    pool: &PgPool,
    jwt: &JwtSettings,
    user_id: Uuid,
    email: &str,
    role: Role,
) -> Result<TokenPair, AppError> {
    let access_token = generate_access_token(email, role, jwt)?;
    let refresh_token = generate_refresh_token(email, role, jwt)?;
    save_refresh_token(pool, user_id, &refresh_token).await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Authenticate with email and password, returning a fresh token pair.
///
/// Not-found, inactive-account and wrong-password all produce the same
/// `InvalidCredentials` failure so callers cannot enumerate accounts or
/// test passwords of disabled ones. The active check runs before the
/// password is even verified.
pub async fn login(
    pool: &PgPool,
    jwt: &JwtSettings,
    email: &str,
    password: &str,
) -> Result<TokenPair, AppError> {
    let principal = find_principal_by_email(pool, email)
        .await?
        .filter(|p| p.active)
        .ok_or(AppError::Auth(AuthError::InvalidCredentials))?;

    if !verify_password(password, &principal.password_hash)? {
        return Err(AppError::Auth(AuthError::InvalidCredentials));
    }

    tracing::info!(user_id = %principal.id, "User logged in");
    issue_token_pair(pool, jwt, principal.id, &principal.email, principal.role).await
}

/// Rotate a refresh token: consume the presented one and mint a new pair.
///
/// The token is strictly single-use. A replayed token that is still
/// cryptographically valid fails on the persisted `active = false` flag.
/// Wrong-type, not-found and already-consumed all collapse into
/// `BadRefreshToken`; expiry surfaces as `ExpiredToken` from the decode.
pub async fn refresh(pool: &PgPool, jwt: &JwtSettings, token: &str) -> Result<TokenPair, AppError> {
    let record = find_refresh_token(pool, token)
        .await?
        .ok_or(AppError::Auth(AuthError::BadRefreshToken))?;

    let claims = decode_token(token, jwt)?;
    if !claims.is_refresh() || !record.active {
        return Err(AppError::Auth(AuthError::BadRefreshToken));
    }

    // Compare-and-set; a concurrent rotation of the same token loses here.
    if !consume_refresh_token(pool, token).await? {
        return Err(AppError::Auth(AuthError::BadRefreshToken));
    }

    // Re-resolve the principal so role changes since issuance are honored.
    let principal = find_principal_by_email(pool, claims.subject())
        .await?
        .filter(|p| p.active)
        .ok_or(AppError::Auth(AuthError::BadRefreshToken))?;

    tracing::info!(user_id = %principal.id, "Refresh token rotated");
    issue_token_pair(pool, jwt, principal.id, &principal.email, principal.role).await
}

/// Confirm a refresh token is currently usable without consuming it.
pub async fn validate(pool: &PgPool, jwt: &JwtSettings, token: &str) -> Result<(), AppError> {
    let record = find_refresh_token(pool, token)
        .await?
        .ok_or(AppError::Auth(AuthError::BadRefreshToken))?;

    let claims = decode_token(token, jwt)?;
    if !claims.is_refresh() || !record.active {
        return Err(AppError::Auth(AuthError::BadRefreshToken));
    }

    Ok(())
}

/// Deactivate the presented refresh token. Idempotent: repeated calls and
/// unknown tokens are a no-op.
pub async fn logout(pool: &PgPool, token: &str) -> Result<(), AppError> {
    deactivate_refresh_token(pool, token).await
}
