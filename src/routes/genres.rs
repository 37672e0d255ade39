/// Genre routes
///
/// Reads are public, writes are admin-only. Name and slug are both unique.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::auth::guard::{authorize, AuthenticatedUser};
use crate::auth::role::Permission;
use crate::error::{AppError, DatabaseError};
use crate::validators::{is_valid_name, is_valid_slug};

#[derive(Deserialize)]
pub struct GenreRequest {
    pub name: String,
    pub slug: String,
}

#[derive(Serialize)]
pub struct GenreResponse {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

async fn fetch_genre(pool: &PgPool, id: i64) -> Result<GenreResponse, AppError> {
    sqlx::query_as::<_, (i64, String, String)>("SELECT id, name, slug FROM genres WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(|(id, name, slug)| GenreResponse { id, name, slug })
        .ok_or_else(|| AppError::Database(DatabaseError::NotFound("Genre not found".to_string())))
}

async fn name_or_slug_taken(
    pool: &PgPool,
    name: &str,
    slug: &str,
    exclude_id: Option<i64>,
) -> Result<bool, AppError> {
    let taken = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM genres
            WHERE (name = $1 OR slug = $2) AND ($3::bigint IS NULL OR id <> $3)
        )
        "#,
    )
    .bind(name)
    .bind(slug)
    .bind(exclude_id)
    .fetch_one(pool)
    .await?;
    Ok(taken)
}

/// GET /api/v1/genres
pub async fn list_genres(pool: web::Data<PgPool>) -> Result<HttpResponse, AppError> {
    let genres = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT id, name, slug FROM genres ORDER BY name",
    )
    .fetch_all(pool.get_ref())
    .await?
    .into_iter()
    .map(|(id, name, slug)| GenreResponse { id, name, slug })
    .collect::<Vec<_>>();

    Ok(HttpResponse::Ok().json(genres))
}

/// GET /api/v1/genres/{id}
pub async fn get_genre(
    path: web::Path<i64>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let genre = fetch_genre(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(genre))
}

/// POST /api/v1/genres (admin)
pub async fn create_genre(
    form: web::Json<GenreRequest>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminWrite)?;

    let name = is_valid_name("name", &form.name)?;
    let slug = is_valid_slug(&form.slug)?;

    if name_or_slug_taken(pool.get_ref(), &name, &slug, None).await? {
        return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
            "genre name or slug already taken".to_string(),
        )));
    }

    let (id,) =
        sqlx::query_as::<_, (i64,)>("INSERT INTO genres (name, slug) VALUES ($1, $2) RETURNING id")
            .bind(&name)
            .bind(&slug)
            .fetch_one(pool.get_ref())
            .await?;

    tracing::info!(genre_id = id, "Genre created");
    let created = fetch_genre(pool.get_ref(), id).await?;
    Ok(HttpResponse::Created().json(created))
}

/// PUT /api/v1/genres/{id} (admin)
pub async fn replace_genre(
    path: web::Path<i64>,
    form: web::Json<GenreRequest>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminWrite)?;

    let id = path.into_inner();
    let name = is_valid_name("name", &form.name)?;
    let slug = is_valid_slug(&form.slug)?;

    if name_or_slug_taken(pool.get_ref(), &name, &slug, Some(id)).await? {
        return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
            "genre name or slug already taken".to_string(),
        )));
    }

    let result = sqlx::query("UPDATE genres SET name = $1, slug = $2 WHERE id = $3")
        .bind(&name)
        .bind(&slug)
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Genre not found".to_string(),
        )));
    }

    let updated = fetch_genre(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// DELETE /api/v1/genres/{id} (admin)
pub async fn delete_genre(
    path: web::Path<i64>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminWrite)?;

    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM genres WHERE id = $1")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Genre not found".to_string(),
        )));
    }

    tracing::info!(genre_id = id, "Genre deleted");
    Ok(HttpResponse::NoContent().finish())
}
