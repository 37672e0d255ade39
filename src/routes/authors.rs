/// Author routes
///
/// Reads are public, writes are admin-only.

use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::auth::guard::{authorize, AuthenticatedUser};
use crate::auth::role::Permission;
use crate::error::{AppError, DatabaseError, ValidationError};
use crate::routes::{Page, Pagination};
use crate::validators::is_valid_name;

#[derive(Deserialize)]
pub struct AuthorRequest {
    pub name: String,
    pub surname: String,
    pub birth_date: NaiveDate,
    pub death_date: Option<NaiveDate>,
    pub biography: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthorFilter {
    pub name: Option<String>,
    pub surname: Option<String>,
}

#[derive(Serialize)]
pub struct AuthorResponse {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub birth_date: NaiveDate,
    pub death_date: Option<NaiveDate>,
    pub biography: String,
}

type AuthorRow = (i64, String, String, NaiveDate, Option<NaiveDate>, String);

fn to_response(row: AuthorRow) -> AuthorResponse {
    let (id, name, surname, birth_date, death_date, biography) = row;
    AuthorResponse {
        id,
        name,
        surname,
        birth_date,
        death_date,
        biography,
    }
}

async fn fetch_author(pool: &PgPool, id: i64) -> Result<AuthorResponse, AppError> {
    sqlx::query_as::<_, AuthorRow>(
        "SELECT id, name, surname, birth_date, death_date, biography FROM authors WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(to_response)
    .ok_or_else(|| AppError::Database(DatabaseError::NotFound("Author not found".to_string())))
}

fn validate_dates(birth: NaiveDate, death: Option<NaiveDate>) -> Result<(), AppError> {
    if let Some(death) = death {
        if death <= birth {
            return Err(AppError::Validation(ValidationError::InvalidFormat(
                "death_date must be after birth_date".to_string(),
            )));
        }
    }
    Ok(())
}

/// GET /api/v1/authors
pub async fn list_authors(
    pool: web::Data<PgPool>,
    filter: web::Query<AuthorFilter>,
    pagination: web::Query<Pagination>,
) -> Result<HttpResponse, AppError> {
    let mut query = sqlx::QueryBuilder::new(
        "SELECT id, name, surname, birth_date, death_date, biography FROM authors WHERE true",
    );
    let mut count = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM authors WHERE true");

    if let Some(name) = filter.name.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", name);
        query.push(" AND name ILIKE ").push_bind(pattern.clone());
        count.push(" AND name ILIKE ").push_bind(pattern);
    }
    if let Some(surname) = filter.surname.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", surname);
        query.push(" AND surname ILIKE ").push_bind(pattern.clone());
        count.push(" AND surname ILIKE ").push_bind(pattern);
    }

    query
        .push(" ORDER BY id LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let rows = query
        .build_query_as::<AuthorRow>()
        .fetch_all(pool.get_ref())
        .await?;
    let (total,) = count
        .build_query_as::<(i64,)>()
        .fetch_one(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Page {
        items: rows.into_iter().map(to_response).collect::<Vec<_>>(),
        page: pagination.page(),
        per_page: pagination.limit(),
        total,
    }))
}

/// GET /api/v1/authors/{id}
pub async fn get_author(
    path: web::Path<i64>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let author = fetch_author(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(author))
}

/// POST /api/v1/authors (admin)
pub async fn create_author(
    form: web::Json<AuthorRequest>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminWrite)?;

    let name = is_valid_name("name", &form.name)?;
    let surname = is_valid_name("surname", &form.surname)?;
    validate_dates(form.birth_date, form.death_date)?;

    let (id,) = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO authors (name, surname, birth_date, death_date, biography)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(&name)
    .bind(&surname)
    .bind(form.birth_date)
    .bind(form.death_date)
    .bind(&form.biography)
    .fetch_one(pool.get_ref())
    .await?;

    tracing::info!(author_id = id, "Author created");
    let created = fetch_author(pool.get_ref(), id).await?;
    Ok(HttpResponse::Created().json(created))
}

/// PUT /api/v1/authors/{id} (admin)
pub async fn replace_author(
    path: web::Path<i64>,
    form: web::Json<AuthorRequest>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminWrite)?;

    let id = path.into_inner();
    let name = is_valid_name("name", &form.name)?;
    let surname = is_valid_name("surname", &form.surname)?;
    validate_dates(form.birth_date, form.death_date)?;

    let result = sqlx::query(
        r#"
        UPDATE authors SET name = $1, surname = $2, birth_date = $3, death_date = $4, biography = $5
        WHERE id = $6
        "#,
    )
    .bind(&name)
    .bind(&surname)
    .bind(form.birth_date)
    .bind(form.death_date)
    .bind(&form.biography)
    .bind(id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Author not found".to_string(),
        )));
    }

    let updated = fetch_author(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// DELETE /api/v1/authors/{id} (admin)
pub async fn delete_author(
    path: web::Path<i64>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminWrite)?;

    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM authors WHERE id = $1")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Author not found".to_string(),
        )));
    }

    tracing::info!(author_id = id, "Author deleted");
    Ok(HttpResponse::NoContent().finish())
}
