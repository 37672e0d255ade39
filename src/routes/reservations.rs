/// Reservation routes
///
/// Users reserve a book for a date range. Ranges must lie in the future,
/// last at least one day, and must not overlap another reservation for the
/// same book.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::guard::{authorize, AuthenticatedUser};
use crate::auth::role::Permission;
use crate::error::{AppError, AuthError, DatabaseError, ValidationError};
use crate::routes::{Page, Pagination};

fn minimum_reservation() -> Duration {
    Duration::days(1)
}

#[derive(Deserialize)]
pub struct ReservationRequest {
    pub book_id: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct UpdateReservationRequest {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct ReservationResponse {
    pub id: i64,
    pub user_id: String,
    pub book_id: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

type ReservationRow = (i64, Uuid, i64, DateTime<Utc>, DateTime<Utc>);

fn to_response(row: ReservationRow) -> ReservationResponse {
    let (id, user_id, book_id, start_date, end_date) = row;
    ReservationResponse {
        id,
        user_id: user_id.to_string(),
        book_id,
        start_date,
        end_date,
    }
}

fn validate_dates(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), AppError> {
    let now = Utc::now();
    if start <= now || end <= now || start >= end {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "reservation dates must be in the future with start before end".to_string(),
        )));
    }
    if end - start < minimum_reservation() {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "reservation must last at least one day".to_string(),
        )));
    }
    Ok(())
}

async fn fetch_reservation(pool: &PgPool, id: i64) -> Result<ReservationRow, AppError> {
    sqlx::query_as::<_, ReservationRow>(
        "SELECT id, user_id, book_id, start_date, end_date FROM reservations WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        AppError::Database(DatabaseError::NotFound("Reservation not found".to_string()))
    })
}

async fn caller_user_id(pool: &PgPool, caller: &AuthenticatedUser) -> Result<Uuid, AppError> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE email = $1")
        .bind(&caller.email)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::Auth(AuthError::Unauthorized))
}

/// Two ranges overlap when each starts before the other ends.
async fn has_overlap(
    pool: &PgPool,
    book_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_id: Option<i64>,
) -> Result<bool, AppError> {
    let overlap = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM reservations
            WHERE book_id = $1
              AND start_date < $3
              AND end_date > $2
              AND ($4::bigint IS NULL OR id <> $4)
        )
        "#,
    )
    .bind(book_id)
    .bind(start)
    .bind(end)
    .bind(exclude_id)
    .fetch_one(pool)
    .await?;
    Ok(overlap)
}

/// POST /api/v1/reservations
pub async fn create_reservation(
    form: web::Json<ReservationRequest>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    let caller = authorize(user.as_deref(), Permission::UserWrite)?;
    validate_dates(form.start_date, form.end_date)?;

    let book_exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM books WHERE id = $1)")
            .bind(form.book_id)
            .fetch_one(pool.get_ref())
            .await?;
    if !book_exists {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Book not found".to_string(),
        )));
    }

    if has_overlap(pool.get_ref(), form.book_id, form.start_date, form.end_date, None).await? {
        return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
            "book is already reserved for this period".to_string(),
        )));
    }

    let user_id = caller_user_id(pool.get_ref(), caller).await?;
    let (id,) = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO reservations (user_id, book_id, start_date, end_date)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(form.book_id)
    .bind(form.start_date)
    .bind(form.end_date)
    .fetch_one(pool.get_ref())
    .await?;

    tracing::info!(reservation_id = id, book_id = form.book_id, "Reservation created");
    let created = fetch_reservation(pool.get_ref(), id).await?;
    Ok(HttpResponse::Created().json(to_response(created)))
}

/// GET /api/v1/reservations (admin)
pub async fn list_reservations(
    pool: web::Data<PgPool>,
    pagination: web::Query<Pagination>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    authorize(user.as_deref(), Permission::AdminRead)?;

    let rows = sqlx::query_as::<_, ReservationRow>(
        r#"
        SELECT id, user_id, book_id, start_date, end_date FROM reservations
        ORDER BY start_date DESC LIMIT $1 OFFSET $2
        "#,
    )
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(pool.get_ref())
    .await?;

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reservations")
        .fetch_one(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Page {
        items: rows.into_iter().map(to_response).collect::<Vec<_>>(),
        page: pagination.page(),
        per_page: pagination.limit(),
        total,
    }))
}

/// GET /api/v1/reservations/my
pub async fn list_my_reservations(
    pool: web::Data<PgPool>,
    pagination: web::Query<Pagination>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    let caller = authorize(user.as_deref(), Permission::UserRead)?;
    let user_id = caller_user_id(pool.get_ref(), caller).await?;

    let rows = sqlx::query_as::<_, ReservationRow>(
        r#"
        SELECT id, user_id, book_id, start_date, end_date FROM reservations
        WHERE user_id = $1
        ORDER BY start_date DESC LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(pool.get_ref())
    .await?;

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reservations WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Page {
        items: rows.into_iter().map(to_response).collect::<Vec<_>>(),
        page: pagination.page(),
        per_page: pagination.limit(),
        total,
    }))
}

/// GET /api/v1/reservations/{id}
///
/// Admins may fetch any reservation; other callers only their own.
pub async fn get_reservation(
    path: web::Path<i64>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    let caller = authorize(user.as_deref(), Permission::UserRead)?;
    let row = fetch_reservation(pool.get_ref(), path.into_inner()).await?;

    if !caller.is_admin() {
        let user_id = caller_user_id(pool.get_ref(), caller).await?;
        if row.1 != user_id {
            return Err(AppError::Auth(AuthError::Forbidden));
        }
    }

    Ok(HttpResponse::Ok().json(to_response(row)))
}

/// PUT /api/v1/reservations/{id}
///
/// Re-validates the new date range, including the overlap check against
/// other reservations for the same book.
pub async fn update_reservation(
    path: web::Path<i64>,
    form: web::Json<UpdateReservationRequest>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    let caller = authorize(user.as_deref(), Permission::UserWrite)?;
    let id = path.into_inner();
    let row = fetch_reservation(pool.get_ref(), id).await?;

    if !caller.is_admin() {
        let user_id = caller_user_id(pool.get_ref(), caller).await?;
        if row.1 != user_id {
            return Err(AppError::Auth(AuthError::Forbidden));
        }
    }

    validate_dates(form.start_date, form.end_date)?;
    if has_overlap(pool.get_ref(), row.2, form.start_date, form.end_date, Some(id)).await? {
        return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
            "book is already reserved for this period".to_string(),
        )));
    }

    sqlx::query("UPDATE reservations SET start_date = $1, end_date = $2 WHERE id = $3")
        .bind(form.start_date)
        .bind(form.end_date)
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    let updated = fetch_reservation(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(to_response(updated)))
}

/// DELETE /api/v1/reservations/{id}
pub async fn delete_reservation(
    path: web::Path<i64>,
    pool: web::Data<PgPool>,
    user: Option<web::ReqData<AuthenticatedUser>>,
) -> Result<HttpResponse, AppError> {
    let caller = authorize(user.as_deref(), Permission::UserWrite)?;
    let id = path.into_inner();
    let row = fetch_reservation(pool.get_ref(), id).await?;

    if !caller.is_admin() {
        let user_id = caller_user_id(pool.get_ref(), caller).await?;
        if row.1 != user_id {
            return Err(AppError::Auth(AuthError::Forbidden));
        }
    }

    sqlx::query("DELETE FROM reservations WHERE id = $1")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    tracing::info!(reservation_id = id, "Reservation cancelled");
    Ok(HttpResponse::NoContent().finish())
}
