//! Password hashing and session extraction.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::StatusCode};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use rand::Rng;
use rand_distr::Alphanumeric;

use crate::AppState;

pub const SESSION_COOKIE: &str = "session_token";
pub const SESSION_TOKEN_LEN: usize = 64;
pub const SHARE_TOKEN_LEN: usize = 16;

pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|err| anyhow!("{}", err))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, target_hash: &str) -> Result<bool> {
    let password_hash = PasswordHash::new(target_hash).map_err(|err| anyhow!("{}", err))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &password_hash)
        .is_ok())
}

pub fn generate_token(len: usize) -> String {
    let rng = rand::rng();
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// A resolved server-side session. The access token is present only after
/// the streaming-account callback has completed for this session.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub spotify_access_token: Option<String>,
}

async fn extract_session(parts: &mut Parts, state: &AppState) -> Option<Session> {
    let jar = CookieJar::from_request_parts(parts, state)
        .await
        .expect("Could not read cookies into CookieJar.");
    let token = jar.get(SESSION_COOKIE).map(Cookie::value)?.to_string();

    match crate::db::get_session(&state.db, &token).await {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!("session lookup failed: {}", err);
            None
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        extract_session(parts, state)
            .await
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
