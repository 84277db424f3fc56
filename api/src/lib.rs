use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing_subscriber;

pub mod auth;
pub mod config;
pub mod db;
pub mod models;
pub mod spotify;
pub mod stats;

use crate::auth::Session;
use crate::config::Config;
use crate::models::TimeRange;
use crate::spotify::SpotifyClient;
use crate::stats::ListeningStats;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub spotify: SpotifyClient,
}

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
struct CredentialsForm {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct FieldErrors {
    errors: BTreeMap<&'static str, String>,
}

async fn register(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> Response {
    let username = form.username.trim().to_string();

    let mut errors: BTreeMap<&'static str, String> = BTreeMap::new();
    if username.len() < MIN_USERNAME_LEN {
        errors.insert(
            "username",
            format!("must be at least {} characters", MIN_USERNAME_LEN),
        );
    }
    if form.password.len() < MIN_PASSWORD_LEN {
        errors.insert(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        );
    }

    if errors.is_empty() {
        match db::get_user_by_username(&state.db, &username).await {
            Ok(Some(_)) => {
                errors.insert("username", "already taken".to_string());
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("user lookup failed: {}", e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    if !errors.is_empty() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(FieldErrors { errors })).into_response();
    }

    let password_hash = match auth::hash_password(&form.password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!("password hashing failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match db::create_user(&state.db, &username, &password_hash).await {
        Ok(id) => {
            tracing::info!("registered user {} ({})", username, id);
            (
                StatusCode::CREATED,
                Json(serde_json::json!({ "id": id, "username": username })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("user insert failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn login(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> Response {
    let user = match db::get_user_by_username(&state.db, form.username.trim()).await {
        Ok(Some(user)) => user,
        Ok(None) => return StatusCode::FORBIDDEN.into_response(),
        Err(e) => {
            tracing::error!("user lookup failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match auth::verify_password(&form.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return StatusCode::FORBIDDEN.into_response(),
        Err(e) => {
            tracing::error!("password verification failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let token = auth::generate_token(auth::SESSION_TOKEN_LEN);
    if let Err(e) = db::create_session(&state.db, user.id, &token).await {
        tracing::error!("session insert failed: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let cookie = format!("{}={}; Path=/; HttpOnly", auth::SESSION_COOKIE, token);
    (
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "token": token })),
    )
        .into_response()
}

async fn logout(State(state): State<AppState>, session: Session) -> Response {
    if let Err(e) = db::delete_session(&state.db, &session.token).await {
        tracing::error!("session delete failed: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let cookie = format!("{}=; Path=/; HttpOnly; Max-Age=0", auth::SESSION_COOKIE);
    (StatusCode::OK, [(header::SET_COOKIE, cookie)]).into_response()
}

async fn spotify_login(State(state): State<AppState>) -> Redirect {
    Redirect::to(&state.spotify.authorize_url())
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
}

async fn spotify_callback(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = params.error {
        tracing::warn!("authorization was denied: {}", error);
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": error })),
        )
            .into_response();
    }

    let code = match params.code {
        Some(code) if !code.is_empty() => code,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "missing authorization code" })),
            )
                .into_response();
        }
    };

    let access_token = match state.spotify.exchange_code(&code).await {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("token exchange failed: {}", e);
            return (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "spotify login failed" })),
            )
                .into_response();
        }
    };

    if let Err(e) = db::set_session_access_token(&state.db, &session.token, &access_token).await {
        tracing::error!("session update failed: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    Redirect::to(&state.config.frontend_url).into_response()
}

#[derive(Debug, Deserialize)]
struct WrappedForm {
    #[serde(default)]
    time_range: TimeRange,
    #[serde(default)]
    save_wrap: bool,
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct SavedWrap {
    id: i64,
    name: String,
    share_token: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct WrappedResponse {
    stats: ListeningStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved: Option<SavedWrap>,
}

/// Fetch the user's listening history, derive a wrap from it and optionally
/// persist the result. Upstream failures degrade to empty sections rather
/// than failing the whole request.
#[axum::debug_handler]
async fn generate_wrapped(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<WrappedForm>,
) -> Response {
    let Some(access_token) = session.spotify_access_token else {
        return Redirect::to("/api/spotify/login").into_response();
    };

    let tracks = state
        .spotify
        .top_tracks(&access_token, form.time_range)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("top tracks unavailable: {}", e);
            Vec::new()
        });

    let artists = state
        .spotify
        .top_artists(&access_token, form.time_range)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("top artists unavailable: {}", e);
            Vec::new()
        });

    let mood_ids: Vec<String> = tracks
        .iter()
        .take(state.config.mood_track_limit)
        .map(|t| t.id.clone())
        .collect();
    let features = if mood_ids.is_empty() {
        Vec::new()
    } else {
        state
            .spotify
            .audio_features(&access_token, &mood_ids)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("audio features unavailable: {}", e);
                Vec::new()
            })
    };

    let plays = state
        .spotify
        .recently_played(&access_token)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("recently played unavailable: {}", e);
            Vec::new()
        });

    let stats = stats::build_stats(
        form.time_range,
        &tracks,
        &artists,
        &features,
        &plays,
        state.config.mood_track_limit,
    );

    let saved = if form.save_wrap {
        let name = form
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Top Tracks - {}", form.time_range.display_name()));

        let stats_json = match serde_json::to_value(&stats) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("stats serialization failed: {}", e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let share_token = auth::generate_token(auth::SHARE_TOKEN_LEN);
        match db::insert_wrap(
            &state.db,
            session.user_id,
            &name,
            form.time_range.as_str(),
            &share_token,
            &stats_json,
        )
        .await
        {
            Ok(wrap) => {
                tracing::info!("saved wrap {} for user {}", wrap.id, session.user_id);
                Some(SavedWrap {
                    id: wrap.id,
                    name: wrap.name,
                    share_token: wrap.share_token,
                    created_at: wrap.created_at,
                })
            }
            Err(e) => {
                tracing::error!("wrap insert failed: {}", e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    } else {
        None
    };

    Json(WrappedResponse { stats, saved }).into_response()
}

async fn list_wraps(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<models::WrapSummary>>, StatusCode> {
    db::list_wraps(&state.db, session.user_id)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("wrap listing failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

#[derive(Debug, Serialize)]
struct WrapDetail {
    id: i64,
    name: String,
    time_range: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    share_token: Option<String>,
    created_at: DateTime<Utc>,
    stats: serde_json::Value,
}

async fn wrap_detail(
    State(state): State<AppState>,
    session: Session,
    Path(wrap_id): Path<i64>,
) -> Result<Json<WrapDetail>, StatusCode> {
    match db::get_wrap_for_user(&state.db, wrap_id, session.user_id).await {
        Ok(Some(wrap)) => Ok(Json(WrapDetail {
            id: wrap.id,
            name: wrap.name,
            time_range: wrap.time_range,
            share_token: Some(wrap.share_token),
            created_at: wrap.created_at,
            stats: wrap.stats,
        })),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("wrap lookup failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn delete_wrap(
    State(state): State<AppState>,
    session: Session,
    Path(wrap_id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    match db::delete_wrap(&state.db, wrap_id, session.user_id).await {
        Ok(true) => {
            tracing::info!("deleted wrap {} for user {}", wrap_id, session.user_id);
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("wrap delete failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Public share view: resolves by token alone and leaves the owner out of
/// the response.
async fn shared_wrap(
    State(state): State<AppState>,
    Path(share_token): Path<String>,
) -> Result<Json<WrapDetail>, StatusCode> {
    match db::get_wrap_by_share_token(&state.db, &share_token).await {
        Ok(Some(wrap)) => Ok(Json(WrapDetail {
            id: wrap.id,
            name: wrap.name,
            time_range: wrap.time_range,
            share_token: None,
            created_at: wrap.created_at,
            stats: wrap.stats,
        })),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("shared wrap lookup failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn health_check() -> &'static str {
    "ok"
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/spotify/login", get(spotify_login))
        .route("/api/spotify/callback", get(spotify_callback))
        .route("/api/wrapped", post(generate_wrapped))
        .route("/api/wraps", get(list_wraps))
        .route("/api/wraps/:id", get(wrap_detail))
        .route("/api/wraps/:id/delete", post(delete_wrap))
        .route("/api/shared/:token", get(shared_wrap))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("rewind_api=debug,tower_http=debug")
        .init();

    let config = Config::from_env().expect("failed to load configuration");

    let db = db::init_db(&config.database_url)
        .await
        .expect("failed to initialize database");
    tracing::info!("database initialized");

    if config.spotify_client_id.is_empty() || config.spotify_client_secret.is_empty() {
        tracing::warn!(
            "SPOTIFY_CLIENT_ID / SPOTIFY_CLIENT_SECRET not set, account linking will fail"
        );
    }

    let spotify = SpotifyClient::new(&config);
    let port = config.port;
    let state = AppState {
        db,
        config,
        spotify,
    };

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
