use anyhow::{Context, Result};

/// Process configuration, read once at startup and carried in the app state.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_redirect_uri: String,
    /// Where the callback sends the browser after a successful token exchange.
    pub frontend_url: String,
    /// How many top tracks are considered for mood bucketing.
    pub mood_track_limit: usize,
}

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MOOD_TRACK_LIMIT: usize = 5;

impl Config {
    pub fn from_env() -> Result<Config> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/rewind".to_string());

        let port = std::env::var("PORT")
            .ok()
            .map(|v| v.parse::<u16>())
            .transpose()
            .context("invalid PORT")?
            .unwrap_or(DEFAULT_PORT);

        let spotify_client_id = std::env::var("SPOTIFY_CLIENT_ID").unwrap_or_default();
        let spotify_client_secret = std::env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default();

        let spotify_redirect_uri = std::env::var("SPOTIFY_REDIRECT_URI")
            .unwrap_or_else(|_| format!("http://localhost:{}/api/spotify/callback", port));

        let frontend_url = std::env::var("FRONTEND_URL").unwrap_or_else(|_| "/".to_string());

        let mood_track_limit = std::env::var("MOOD_TRACK_LIMIT")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("invalid MOOD_TRACK_LIMIT")?
            .unwrap_or(DEFAULT_MOOD_TRACK_LIMIT);

        Ok(Config {
            database_url,
            port,
            spotify_client_id,
            spotify_client_secret,
            spotify_redirect_uri,
            frontend_url,
            mood_track_limit,
        })
    }
}
