use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteExecutor};

use calldeck_core::domain::user::AdminUser;

use super::{decode_ts, encode_ts, RepositoryError};

pub async fn find_by_username(
    executor: impl SqliteExecutor<'_>,
    username: &str,
) -> Result<Option<AdminUser>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, username, password_hash, created_at FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(executor)
    .await?;

    row.map(|row| {
        Ok(AdminUser {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            created_at: decode_ts(&row.try_get::<String, _>("created_at")?)?,
        })
    })
    .transpose()
}

pub async fn create(
    executor: impl SqliteExecutor<'_>,
    username: &str,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query("INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)")
        .bind(username)
        .bind(password_hash)
        .bind(encode_ts(now))
        .execute(executor)
        .await?;
    Ok(())
}
