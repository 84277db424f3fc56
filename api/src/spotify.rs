//! Client for the upstream music-streaming Web API.
//!
//! Every fetch returns `Err` on a non-success status instead of an empty
//! list, so callers can tell "the API had nothing for us" apart from "the
//! call failed" and decide how to degrade.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::models::TimeRange;

pub const ACCOUNTS_URL: &str = "https://accounts.spotify.com";
pub const API_URL: &str = "https://api.spotify.com/v1";
pub const OAUTH_SCOPE: &str = "user-top-read user-read-recently-played";

const PAGE_LIMIT: usize = 50;
const FEATURES_CHUNK: usize = 100;
const RECENT_LIMIT: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRef {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Album {
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub duration_ms: i64,
    pub album: Album,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// Per-track audio descriptors, each normalized to [0, 1]. The features
/// endpoint returns `null` entries for tracks it has no analysis for, hence
/// `Option<AudioFeatures>` in the parallel list.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AudioFeatures {
    pub energy: f64,
    pub danceability: f64,
    pub valence: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayEvent {
    pub track: Track,
    pub played_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
struct Page<T> {
    #[serde(default)]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AudioFeaturesResponse {
    audio_features: Vec<Option<AudioFeatures>>,
}

#[derive(Clone)]
pub struct SpotifyClient {
    http: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl SpotifyClient {
    pub fn new(config: &Config) -> SpotifyClient {
        SpotifyClient {
            http: Client::new(),
            client_id: config.spotify_client_id.clone(),
            client_secret: config.spotify_client_secret.clone(),
            redirect_uri: config.spotify_redirect_uri.clone(),
        }
    }

    /// Authorize URL for starting the authorization-code flow.
    pub fn authorize_url(&self) -> String {
        format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}",
            ACCOUNTS_URL,
            self.client_id,
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(OAUTH_SCOPE)
        )
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String> {
        let auth = format!("{}:{}", self.client_id, self.client_secret);
        let encoded =
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, auth.as_bytes());

        let response = self
            .http
            .post(format!("{}/api/token", ACCOUNTS_URL))
            .header("Authorization", format!("Basic {}", encoded))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .context("token exchange request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("token exchange failed: {}", response.status());
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    pub async fn top_tracks(&self, access_token: &str, time_range: TimeRange) -> Result<Vec<Track>> {
        self.fetch_top("tracks", access_token, time_range).await
    }

    pub async fn top_artists(
        &self,
        access_token: &str,
        time_range: TimeRange,
    ) -> Result<Vec<Artist>> {
        self.fetch_top("artists", access_token, time_range).await
    }

    /// Page through a top-items ranking until the API returns an empty page.
    async fn fetch_top<T: serde::de::DeserializeOwned>(
        &self,
        kind: &str,
        access_token: &str,
        time_range: TimeRange,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut offset = 0usize;

        loop {
            let response = self
                .http
                .get(format!("{}/me/top/{}", API_URL, kind))
                .header("Authorization", format!("Bearer {}", access_token))
                .query(&[("time_range", time_range.as_str())])
                .query(&[("limit", PAGE_LIMIT), ("offset", offset)])
                .send()
                .await
                .with_context(|| format!("top {} request failed", kind))?;

            if !response.status().is_success() {
                anyhow::bail!("top {} fetch failed: {}", kind, response.status());
            }

            let page: Page<T> = response.json().await?;
            if page.items.is_empty() {
                break;
            }
            items.extend(page.items);
            offset += PAGE_LIMIT;
        }

        Ok(items)
    }

    /// Audio features for the given track ids, aligned by position. Tracks
    /// unknown to the analysis service come back as `None`.
    pub async fn audio_features(
        &self,
        access_token: &str,
        track_ids: &[String],
    ) -> Result<Vec<Option<AudioFeatures>>> {
        let mut features = Vec::with_capacity(track_ids.len());

        for chunk in track_ids.chunks(FEATURES_CHUNK) {
            let response = self
                .http
                .get(format!("{}/audio-features", API_URL))
                .header("Authorization", format!("Bearer {}", access_token))
                .query(&[("ids", chunk.join(","))])
                .send()
                .await
                .context("audio features request failed")?;

            if !response.status().is_success() {
                anyhow::bail!("audio features fetch failed: {}", response.status());
            }

            let body: AudioFeaturesResponse = response.json().await?;
            features.extend(body.audio_features);
        }

        Ok(features)
    }

    /// Most recent play events, one bounded request.
    pub async fn recently_played(&self, access_token: &str) -> Result<Vec<PlayEvent>> {
        let response = self
            .http
            .get(format!("{}/me/player/recently-played", API_URL))
            .header("Authorization", format!("Bearer {}", access_token))
            .query(&[("limit", RECENT_LIMIT)])
            .send()
            .await
            .context("recently played request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("recently played fetch failed: {}", response.status());
        }

        let page: Page<PlayEvent> = response.json().await?;
        Ok(page.items)
    }
}
