/// Account routes
///
/// Registration, self-service for the authenticated account, and admin
/// listing/deletion. The authenticated identity comes from the request
/// authenticator; each handler states its own authorization requirement
/// through an explicit guard call.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::guard::{authorize, require_authenticated, AuthenticatedUser};
use crate::auth::password::hash_password;
use crate::auth::refresh_token::revoke_all_user_tokens;
use crate::auth::role::{Permission, Role};
use crate::auth::service;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::routes::auth::TokenPairResponse;
use crate::routes::{Page, Pagination};
use crate::validators::{is_valid_email, is_valid_name};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Deserialize)]
pub struct PartialUserRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub active: Option<bool>,
}

#[derive(Deserialize)]
pub struct PartialProfileRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Registration response: the created account plus its first token pair,
/// so a fresh client is signed in without a follow-up login call.
#[derive(Serialize)]
pub struct RegisterResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub tokens: TokenPairResponse,
}

#[derive(Debug, Deserialize)]
pub struct UserFilter {
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub active: bool,
    pub created_at: String,
}

type UserRow = (Uuid, String, String, String, String, bool, DateTime<Utc>);

fn to_response(row: UserRow) -> Result<UserResponse, AppError> {
    let (id, email, first_name, last_name, role, active, created_at) = row;
    let role = role
        .parse::<Role>()
        .map_err(|e| AppError::Internal(format!("Corrupt role column: {}", e)))?;

    Ok(UserResponse {
        id: id.to_string(),
        email,
        first_name,
        last_name,
        role,
        active,
        created_at: created_at.to_rfc3339(),
    })
}

const USER_COLUMNS: &str = "id, email, first_name, last_name, role, active, created_at";

async fn fetch_user(pool: &PgPool, id: Uuid) -> Result<UserResponse, AppError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Database(DatabaseError::NotFound("User not found".to_string())))?;

    to_response(row)
}

async fn fetch_user_by_email(pool: &PgPool, email: &str) -> Result<(Uuid, UserResponse), AppError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {} FROM users WHERE email = $1",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Database(DatabaseError::NotFound("User not found".to_string())))?;

    let id = row.0;
    Ok((id, to_response(row)?))
}

/// POST /api/v1/users
///
/// Registers a new account with the USER role and issues its first token
/// pair. Only anonymous callers may register; a duplicate email yields 409.
pub async fn register(
    form: web::Json<RegisterRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    if user.is_some() {
        return Err(AppError::Auth(AuthError::Forbidden));
    }

    let email = is_valid_email(&form.email)?;
    let first_name = is_valid_name("first_name", &form.first_name)?;
    let last_name = is_valid_name("last_name", &form.last_name)?;

    if exists_by_email(pool.get_ref(), &email).await? {
        return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
            "email already taken".to_string(),
        )));
    }

    let password_hash = hash_password(&form.password)?;
    let user_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, email, first_name, last_name, password_hash, role, active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 'USER', true, $6, $6)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&first_name)
    .bind(&last_name)
    .bind(&password_hash)
    .bind(now)
    .execute(pool.get_ref())
    .await?;

    tracing::info!(user_id = %user_id, "User registered");

    let pair = service::issue_token_pair(
        pool.get_ref(),
        jwt_config.get_ref(),
        user_id,
        &email,
        Role::User,
    )
    .await?;

    let created = fetch_user(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Created().json(RegisterResponse {
        user: created,
        tokens: TokenPairResponse::new(pair, jwt_config.get_ref()),
    }))
}

async fn exists_by_email(pool: &PgPool, email: &str) -> Result<bool, AppError> {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

/// GET /api/v1/users
///
/// Admin-only listing with optional email/name filters and pagination.
pub async fn list_users(
    pool: web::Data<PgPool>,
    filter: web::Query<UserFilter>,
    pagination: web::Query<Pagination>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminRead)?;

    let mut query = sqlx::QueryBuilder::new(format!(
        "SELECT {} FROM users WHERE true",
        USER_COLUMNS
    ));
    let mut count = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM users WHERE true");

    if let Some(email) = filter.email.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", email);
        query.push(" AND email ILIKE ").push_bind(pattern.clone());
        count.push(" AND email ILIKE ").push_bind(pattern);
    }
    if let Some(name) = filter.name.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", name);
        query
            .push(" AND (first_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR last_name ILIKE ")
            .push_bind(pattern.clone())
            .push(")");
        count
            .push(" AND (first_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR last_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    query
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let rows = query
        .build_query_as::<UserRow>()
        .fetch_all(pool.get_ref())
        .await?;
    let (total,) = count
        .build_query_as::<(i64,)>()
        .fetch_one(pool.get_ref())
        .await?;

    let items = rows
        .into_iter()
        .map(to_response)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HttpResponse::Ok().json(Page {
        items,
        page: pagination.page(),
        per_page: pagination.limit(),
        total,
    }))
}

/// GET /api/v1/users/{id}
///
/// Admins may fetch any account; other callers only their own.
pub async fn get_user(
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    let caller = authorize(user.as_deref(), Permission::UserRead)?;
    let target = fetch_user(pool.get_ref(), path.into_inner()).await?;

    if !caller.is_admin() && caller.email != target.email {
        return Err(AppError::Auth(AuthError::Forbidden));
    }

    Ok(HttpResponse::Ok().json(target))
}

/// PUT /api/v1/users/{id}
///
/// Admin-only full replacement of an account's profile fields.
pub async fn replace_user(
    path: web::Path<Uuid>,
    form: web::Json<UpdateUserRequest>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminWrite)?;

    let user_id = path.into_inner();
    let email = is_valid_email(&form.email)?;
    let first_name = is_valid_name("first_name", &form.first_name)?;
    let last_name = is_valid_name("last_name", &form.last_name)?;

    let result = sqlx::query(
        r#"
        UPDATE users SET email = $1, first_name = $2, last_name = $3, updated_at = $4
        WHERE id = $5
        "#,
    )
    .bind(&email)
    .bind(&first_name)
    .bind(&last_name)
    .bind(Utc::now())
    .bind(user_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "User not found".to_string(),
        )));
    }

    let updated = fetch_user(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// PATCH /api/v1/users/{id}
///
/// Admin-only partial update. Setting `active` to false also revokes the
/// account's refresh tokens, so disabling is an immediate sign-out.
pub async fn update_user(
    path: web::Path<Uuid>,
    form: web::Json<PartialUserRequest>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminWrite)?;

    let user_id = path.into_inner();
    let current = fetch_user(pool.get_ref(), user_id).await?;

    let email = match form.email.as_deref() {
        Some(e) => is_valid_email(e)?,
        None => current.email,
    };
    let first_name = match form.first_name.as_deref() {
        Some(n) => is_valid_name("first_name", n)?,
        None => current.first_name,
    };
    let last_name = match form.last_name.as_deref() {
        Some(n) => is_valid_name("last_name", n)?,
        None => current.last_name,
    };
    let active = form.active.unwrap_or(current.active);

    sqlx::query(
        r#"
        UPDATE users SET email = $1, first_name = $2, last_name = $3, active = $4, updated_at = $5
        WHERE id = $6
        "#,
    )
    .bind(&email)
    .bind(&first_name)
    .bind(&last_name)
    .bind(active)
    .bind(Utc::now())
    .bind(user_id)
    .execute(pool.get_ref())
    .await?;

    if current.active && !active {
        revoke_all_user_tokens(pool.get_ref(), user_id).await?;
        tracing::info!(user_id = %user_id, "User deactivated");
    }

    let updated = fetch_user(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// DELETE /api/v1/users/{id}
///
/// Admin-only. Deleting an account also revokes every refresh token it
/// holds, so no credential survives the record.
pub async fn delete_user(
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminWrite)?;

    let user_id = path.into_inner();
    revoke_all_user_tokens(pool.get_ref(), user_id).await?;

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "User not found".to_string(),
        )));
    }

    tracing::info!(user_id = %user_id, "User deleted");
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/v1/users/me
pub async fn get_current_user(
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    let caller = require_authenticated(user.as_deref())?;
    let (_, me) = fetch_user_by_email(pool.get_ref(), &caller.email).await?;

    Ok(HttpResponse::Ok().json(me))
}

/// PUT /api/v1/users/me
pub async fn update_current_user(
    form: web::Json<UpdateUserRequest>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    let caller = require_authenticated(user.as_deref())?;
    let (user_id, _) = fetch_user_by_email(pool.get_ref(), &caller.email).await?;

    let email = is_valid_email(&form.email)?;
    let first_name = is_valid_name("first_name", &form.first_name)?;
    let last_name = is_valid_name("last_name", &form.last_name)?;

    sqlx::query(
        r#"
        UPDATE users SET email = $1, first_name = $2, last_name = $3, updated_at = $4
        WHERE id = $5
        "#,
    )
    .bind(&email)
    .bind(&first_name)
    .bind(&last_name)
    .bind(Utc::now())
    .bind(user_id)
    .execute(pool.get_ref())
    .await?;

    let updated = fetch_user(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// PATCH /api/v1/users/me
pub async fn patch_current_user(
    form: web::Json<PartialProfileRequest>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    let caller = require_authenticated(user.as_deref())?;
    let (user_id, current) = fetch_user_by_email(pool.get_ref(), &caller.email).await?;

    let email = match form.email.as_deref() {
        Some(e) => is_valid_email(e)?,
        None => current.email,
    };
    let first_name = match form.first_name.as_deref() {
        Some(n) => is_valid_name("first_name", n)?,
        None => current.first_name,
    };
    let last_name = match form.last_name.as_deref() {
        Some(n) => is_valid_name("last_name", n)?,
        None => current.last_name,
    };

    sqlx::query(
        r#"
        UPDATE users SET email = $1, first_name = $2, last_name = $3, updated_at = $4
        WHERE id = $5
        "#,
    )
    .bind(&email)
    .bind(&first_name)
    .bind(&last_name)
    .bind(Utc::now())
    .bind(user_id)
    .execute(pool.get_ref())
    .await?;

    let updated = fetch_user(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// DELETE /api/v1/users/me
pub async fn delete_current_user(
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    let caller = require_authenticated(user.as_deref())?;
    let (user_id, _) = fetch_user_by_email(pool.get_ref(), &caller.email).await?;

    revoke_all_user_tokens(pool.get_ref(), user_id).await?;
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    tracing::info!(user_id = %user_id, "User deleted own account");
    Ok(HttpResponse::NoContent().finish())
}
