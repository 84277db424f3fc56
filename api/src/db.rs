use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::auth::Session;
use crate::models::{User, Wrap, WrapSummary};

pub async fn init_db(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(50)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(database_url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

pub async fn create_user(pool: &PgPool, username: &str, password_hash: &str) -> Result<i64> {
    let row = sqlx::query("INSERT INTO users (username, password_hash) VALUES ($1, $2) RETURNING id")
        .bind(username)
        .bind(password_hash)
        .fetch_one(pool)
        .await?;

    Ok(row.get("id"))
}

pub async fn get_user_by_username(pool: &PgPool, username: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, created_at FROM users WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn create_session(pool: &PgPool, user_id: i64, token: &str) -> Result<()> {
    sqlx::query("INSERT INTO sessions (token, user_id) VALUES ($1, $2)")
        .bind(token)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn get_session(pool: &PgPool, token: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        "SELECT token, user_id, spotify_access_token FROM sessions WHERE token = $1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| Session {
        token: r.get("token"),
        user_id: r.get("user_id"),
        spotify_access_token: r.get("spotify_access_token"),
    }))
}

pub async fn set_session_access_token(
    pool: &PgPool,
    token: &str,
    access_token: &str,
) -> Result<()> {
    sqlx::query("UPDATE sessions SET spotify_access_token = $2 WHERE token = $1")
        .bind(token)
        .bind(access_token)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn delete_session(pool: &PgPool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn insert_wrap(
    pool: &PgPool,
    user_id: i64,
    name: &str,
    time_range: &str,
    share_token: &str,
    stats: &serde_json::Value,
) -> Result<Wrap> {
    let wrap = sqlx::query_as::<_, Wrap>(
        r#"
        INSERT INTO wraps (user_id, name, time_range, share_token, stats)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, user_id, name, time_range, share_token, stats, created_at
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(time_range)
    .bind(share_token)
    .bind(stats)
    .fetch_one(pool)
    .await?;

    Ok(wrap)
}

pub async fn list_wraps(pool: &PgPool, user_id: i64) -> Result<Vec<WrapSummary>> {
    let wraps = sqlx::query_as::<_, WrapSummary>(
        r#"
        SELECT id, name, time_range, share_token, created_at
        FROM wraps
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(wraps)
}

/// Owner-scoped lookup; someone else's wrap id resolves to `None`.
pub async fn get_wrap_for_user(pool: &PgPool, wrap_id: i64, user_id: i64) -> Result<Option<Wrap>> {
    let wrap = sqlx::query_as::<_, Wrap>(
        r#"
        SELECT id, user_id, name, time_range, share_token, stats, created_at
        FROM wraps
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(wrap_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(wrap)
}

/// Share-token lookup, deliberately unscoped: share links work for anyone.
pub async fn get_wrap_by_share_token(pool: &PgPool, share_token: &str) -> Result<Option<Wrap>> {
    let wrap = sqlx::query_as::<_, Wrap>(
        r#"
        SELECT id, user_id, name, time_range, share_token, stats, created_at
        FROM wraps
        WHERE share_token = $1
        "#,
    )
    .bind(share_token)
    .fetch_optional(pool)
    .await?;

    Ok(wrap)
}

/// Owner-scoped delete. Returns whether a row was actually removed.
pub async fn delete_wrap(pool: &PgPool, wrap_id: i64, user_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM wraps WHERE id = $1 AND user_id = $2")
        .bind(wrap_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
