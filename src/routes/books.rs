/// Book routes
///
/// CRUD over the catalog. Reads are public, writes are admin-only. Listing
/// supports pagination and dynamic filters assembled into one query.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::auth::guard::{authorize, AuthenticatedUser};
use crate::auth::role::Permission;
use crate::error::{AppError, DatabaseError};
use crate::routes::{Page, Pagination};
use crate::validators::{is_valid_isbn, is_valid_title};

#[derive(Deserialize)]
pub struct BookRequest {
    pub title: String,
    pub author_id: i64,
    pub genre_id: i64,
    pub isbn: String,
    pub year: i32,
}

#[derive(Deserialize)]
pub struct PartialBookRequest {
    pub title: Option<String>,
    pub author_id: Option<i64>,
    pub genre_id: Option<i64>,
    pub isbn: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct BookFilter {
    pub title: Option<String>,
    pub author_id: Option<i64>,
    pub genre_id: Option<i64>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
}

#[derive(Serialize)]
pub struct BookResponse {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    pub genre_id: i64,
    pub isbn: String,
    pub year: i32,
}

type BookRow = (i64, String, i64, i64, String, i32);

fn to_response(row: BookRow) -> BookResponse {
    let (id, title, author_id, genre_id, isbn, year) = row;
    BookResponse {
        id,
        title,
        author_id,
        genre_id,
        isbn,
        year,
    }
}

async fn fetch_book(pool: &PgPool, id: i64) -> Result<BookResponse, AppError> {
    sqlx::query_as::<_, BookRow>(
        "SELECT id, title, author_id, genre_id, isbn, year FROM books WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(to_response)
    .ok_or_else(|| AppError::Database(DatabaseError::NotFound("Book not found".to_string())))
}

/// GET /api/v1/books
pub async fn list_books(
    pool: web::Data<PgPool>,
    filter: web::Query<BookFilter>,
    pagination: web::Query<Pagination>,
) -> Result<HttpResponse, AppError> {
    let mut query = sqlx::QueryBuilder::new(
        "SELECT id, title, author_id, genre_id, isbn, year FROM books WHERE true",
    );
    let mut count = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM books WHERE true");

    if let Some(title) = filter.title.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", title);
        query.push(" AND title ILIKE ").push_bind(pattern.clone());
        count.push(" AND title ILIKE ").push_bind(pattern);
    }
    if let Some(author_id) = filter.author_id {
        query.push(" AND author_id = ").push_bind(author_id);
        count.push(" AND author_id = ").push_bind(author_id);
    }
    if let Some(genre_id) = filter.genre_id {
        query.push(" AND genre_id = ").push_bind(genre_id);
        count.push(" AND genre_id = ").push_bind(genre_id);
    }
    if let Some(year_from) = filter.year_from {
        query.push(" AND year >= ").push_bind(year_from);
        count.push(" AND year >= ").push_bind(year_from);
    }
    if let Some(year_to) = filter.year_to {
        query.push(" AND year <= ").push_bind(year_to);
        count.push(" AND year <= ").push_bind(year_to);
    }

    query
        .push(" ORDER BY id LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let rows = query
        .build_query_as::<BookRow>()
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

/// GET /api/v1/books/{id}
pub async fn get_book(path: web::Path<i64>, pool: web::Data<PgPool>) -> Result<HttpResponse, AppError> {
    let book = fetch_book(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(book))
}

async fn validate_references(pool: &PgPool, author_id: i64, genre_id: i64) -> Result<(), AppError> {
    let author_exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM authors WHERE id = $1)")
            .bind(author_id)
            .fetch_one(pool)
            .await?;
    if !author_exists {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Author not found".to_string(),
        )));
    }

    let genre_exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM genres WHERE id = $1)")
            .bind(genre_id)
            .fetch_one(pool)
            .await?;
    if !genre_exists {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Genre not found".to_string(),
        )));
    }

    Ok(())
}

async fn isbn_taken(pool: &PgPool, isbn: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
    let taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM books WHERE isbn = $1 AND ($2::bigint IS NULL OR id <> $2))",
    )
    .bind(isbn)
    .bind(exclude_id)
    .fetch_one(pool)
    .await?;
    Ok(taken)
}

/// POST /api/v1/books (admin)
pub async fn create_book(
    form: web::Json<BookRequest>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminWrite)?;

    let title = is_valid_title(&form.title)?;
    let isbn = is_valid_isbn(&form.isbn)?;
    validate_references(pool.get_ref(), form.author_id, form.genre_id).await?;

    if isbn_taken(pool.get_ref(), &isbn, None).await? {
        return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
            "isbn already taken".to_string(),
        )));
    }

    let (id,) = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO books (title, author_id, genre_id, isbn, year)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(&title)
    .bind(form.author_id)
    .bind(form.genre_id)
    .bind(&isbn)
    .bind(form.year)
    .fetch_one(pool.get_ref())
    .await?;

    tracing::info!(book_id = id, "Book created");
    let created = fetch_book(pool.get_ref(), id).await?;
    Ok(HttpResponse::Created().json(created))
}

/// PUT /api/v1/books/{id} (admin)
pub async fn replace_book(
    path: web::Path<i64>,
    form: web::Json<BookRequest>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminWrite)?;

    let id = path.into_inner();
    let title = is_valid_title(&form.title)?;
    let isbn = is_valid_isbn(&form.isbn)?;
    validate_references(pool.get_ref(), form.author_id, form.genre_id).await?;

    if isbn_taken(pool.get_ref(), &isbn, Some(id)).await? {
        return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
            "isbn already taken".to_string(),
        )));
    }

    let result = sqlx::query(
        r#"
        UPDATE books SET title = $1, author_id = $2, genre_id = $3, isbn = $4, year = $5
        WHERE id = $6
        "#,
    )
    .bind(&title)
    .bind(form.author_id)
    .bind(form.genre_id)
    .bind(&isbn)
    .bind(form.year)
    .bind(id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Book not found".to_string(),
        )));
    }

    let updated = fetch_book(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// PATCH /api/v1/books/{id} (admin)
pub async fn update_book(
    path: web::Path<i64>,
    form: web::Json<PartialBookRequest>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminWrite)?;

    let id = path.into_inner();
    let current = fetch_book(pool.get_ref(), id).await?;

    let title = match form.title.as_deref() {
        Some(t) => is_valid_title(t)?,
        None => current.title,
    };
    let isbn = match form.isbn.as_deref() {
        Some(i) => is_valid_isbn(i)?,
        None => current.isbn,
    };
    let author_id = form.author_id.unwrap_or(current.author_id);
    let genre_id = form.genre_id.unwrap_or(current.genre_id);
    let year = form.year.unwrap_or(current.year);

    validate_references(pool.get_ref(), author_id, genre_id).await?;
    if isbn_taken(pool.get_ref(), &isbn, Some(id)).await? {
        return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
            "isbn already taken".to_string(),
        )));
    }

    sqlx::query(
        r#"
        UPDATE books SET title = $1, author_id = $2, genre_id = $3, isbn = $4, year = $5
        WHERE id = $6
        "#,
    )
    .bind(&title)
    .bind(author_id)
    .bind(genre_id)
    .bind(&isbn)
    .bind(year)
    .bind(id)
    .execute(pool.get_ref())
    .await?;

    let updated = fetch_book(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// DELETE /api/v1/books/{id} (admin)
pub async fn delete_book(
    path: web::Path<i64>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminWrite)?;

    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM books WHERE id = $1")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Book not found".to_string(),
        )));
    }

    tracing::info!(book_id = id, "Book deleted");
    Ok(HttpResponse::NoContent().finish())
}
