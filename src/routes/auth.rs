/// Authentication routes
///
/// Login, single-use token refresh, refresh validation and logout. This
/// whole namespace bypasses the request authenticator.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::auth::service;
use crate::configuration::JwtSettings;
use crate::error::AppError;
use crate::validators::is_valid_email;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenPairResponse {
    pub(crate) fn new(pair: service::TokenPair, jwt: &JwtSettings) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: jwt.access_token_expiry,
        }
    }
}

/// POST /api/v1/auth/login
///
/// # Errors
/// - 401: unknown email, inactive account or wrong password
///   (indistinguishable)
pub async fn login(
    form: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;
    let pair = service::login(pool.get_ref(), jwt_config.get_ref(), &email, &form.password).await?;

    Ok(HttpResponse::Ok().json(TokenPairResponse::new(pair, jwt_config.get_ref())))
}

/// POST /api/v1/auth/refresh
///
/// Rotates the presented refresh token: the old record is deactivated and a
/// new pair is issued. Replaying a consumed token fails with 401 even while
/// it is still cryptographically valid.
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let pair = service::refresh(pool.get_ref(), jwt_config.get_ref(), &form.refresh_token).await?;

    Ok(HttpResponse::Ok().json(TokenPairResponse::new(pair, jwt_config.get_ref())))
}

/// POST /api/v1/auth/validate
///
/// Confirms a refresh token is currently usable without consuming it.
pub async fn validate(
    form: web::Json<RefreshRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    service::validate(pool.get_ref(), jwt_config.get_ref(), &form.refresh_token).await?;

    Ok(HttpResponse::Ok().finish())
}

/// POST /api/v1/auth/logout
///
/// Deactivates the presented refresh token. Idempotent: logging out an
/// already-inactive or unknown token returns 200 as well.
pub async fn logout(
    form: web::Json<RefreshRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    service::logout(pool.get_ref(), &form.refresh_token).await?;

    Ok(HttpResponse::Ok().finish())
}
