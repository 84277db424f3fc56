//! Inspect stored users and wraps against a live database.
//!
//! Usage: inspect [username]

use anyhow::Result;
use sqlx::Row;

use rewind_api::config::Config;
use rewind_api::db;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("inspect=info,rewind_api=info")
        .init();

    let config = Config::from_env()?;
    let pool = db::init_db(&config.database_url).await?;

    match std::env::args().nth(1) {
        Some(username) => {
            let Some(user) = db::get_user_by_username(&pool, &username).await? else {
                println!("no user named {:?}", username);
                return Ok(());
            };

            let wraps = db::list_wraps(&pool, user.id).await?;
            println!(
                "{} (id {}, registered {}): {} wraps",
                user.username,
                user.id,
                user.created_at.format("%Y-%m-%d"),
                wraps.len()
            );

            for summary in wraps {
                let wrap = db::get_wrap_for_user(&pool, summary.id, user.id)
                    .await?
                    .expect("listed wrap vanished");
                let version = wrap.stats.get("version").and_then(|v| v.as_u64());
                let total_tracks = wrap.stats.get("total_tracks").and_then(|v| v.as_u64());

                println!(
                    "  #{} {:?} [{}] created {} share={} stats v{} ({} tracks)",
                    wrap.id,
                    wrap.name,
                    wrap.time_range,
                    wrap.created_at.format("%Y-%m-%d %H:%M"),
                    wrap.share_token,
                    version.unwrap_or(0),
                    total_tracks.unwrap_or(0),
                );
            }
        }
        None => {
            let rows = sqlx::query(
                r#"
                SELECT u.id, u.username, COUNT(w.id) AS wrap_count
                FROM users u
                LEFT JOIN wraps w ON w.user_id = u.id
                GROUP BY u.id, u.username
                ORDER BY u.id
                "#,
            )
            .fetch_all(&pool)
            .await?;

            println!("{} users", rows.len());
            for row in rows {
                let id: i64 = row.get("id");
                let username: String = row.get("username");
                let wrap_count: i64 = row.get("wrap_count");
                println!("  {} (id {}): {} wraps", username, id, wrap_count);
            }
        }
    }

    Ok(())
}
