/// Refresh token store
///
/// Persisted records of issued refresh tokens. Tokens are SHA-256 hashed
/// before storage so a database dump never yields usable credentials; all
/// lookups go through the hash.
///
/// A record's `active` flag moves ACTIVE -> INACTIVE at most once and never
/// back. Consumption is a conditional UPDATE, so two concurrent rotations
/// of the same token cannot both succeed.

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// Stored refresh token row, minus the hash itself.
#[derive(Debug)]
pub struct RefreshTokenRecord {
    pub user_id: Uuid,
    pub active: bool,
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Persist a freshly issued refresh token as an ACTIVE record.
pub async fn save_refresh_token(pool: &PgPool, user_id: Uuid, token: &str) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, active, created_at)
        VALUES ($1, $2, $3, true, $4)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(hash_token(token))
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up the stored record for a raw token string.
pub async fn find_refresh_token(
    pool: &PgPool,
    token: &str,
) -> Result<Option<RefreshTokenRecord>, AppError> {
    let row = sqlx::query_as::<_, (Uuid, bool)>(
        "SELECT user_id, active FROM refresh_tokens WHERE token_hash = $1",
    )
    .bind(hash_token(token))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(user_id, active)| RefreshTokenRecord { user_id, active }))
}

/// Atomically flip an active record to inactive.
///
/// Returns `true` if this call performed the transition. The `active = true`
/// predicate is the compare-and-set: of two concurrent callers, Postgres
/// row locking guarantees exactly one observes an affected row.
pub async fn consume_refresh_token(pool: &PgPool, token: &str) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET active = false WHERE token_hash = $1 AND active = true",
    )
    .bind(hash_token(token))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Deactivate a token for logout. Idempotent: missing or already-inactive
/// tokens are a no-op, not an error.
pub async fn deactivate_refresh_token(pool: &PgPool, token: &str) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET active = false WHERE token_hash = $1 AND active = true",
    )
    .bind(hash_token(token))
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        tracing::info!("Refresh token deactivated");
    }

    Ok(())
}

/// Deactivate every active refresh token belonging to a user. Used when an
/// account is deleted.
pub async fn revoke_all_user_tokens(pool: &PgPool, user_id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE refresh_tokens SET active = false WHERE user_id = $1 AND active = true")
        .bind(user_id)
        .execute(pool)
        .await?;

    tracing::info!(user_id = %user_id, "All refresh tokens revoked for user");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        let token = "some.refresh.token";
        assert_eq!(hash_token(token), hash_token(token));
    }

    #[test]
    fn hash_differs_from_plaintext_and_is_hex() {
        let token = "some.refresh.token";
        let hashed = hash_token(token);

        assert_ne!(token, hashed);
        // SHA-256 hex digest
        assert_eq!(hashed.len(), 64);
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_tokens_hash_differently() {
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }
}
