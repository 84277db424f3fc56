//! Aggregation over fetched listening data.
//!
//! Pure functions: raw top-tracks/top-artists/play-event records in, derived
//! statistics out. Missing optional data (no genres, no images, no audio
//! features) degrades to empty or absent values, never to an error.

use std::collections::{HashMap, HashSet};

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::models::TimeRange;
use crate::spotify::{Artist, AudioFeatures, PlayEvent, Track};

/// Bumped whenever the shape of [`ListeningStats`] changes; stored rows keep
/// the version they were written with.
pub const STATS_VERSION: u32 = 1;

/// Display prefix for top tracks, artists and albums.
pub const DISPLAY_LIMIT: usize = 5;

const TOP_GENRES: usize = 5;
const TOP_STREAKS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListeningStats {
    pub version: u32,
    pub time_range: TimeRange,
    pub total_tracks: u32,
    pub total_minutes: f64,
    pub total_genres: u32,
    pub favorite_genres: Vec<GenreCount>,
    pub top_tracks: Vec<TrackSummary>,
    pub top_artists: Vec<ArtistSummary>,
    pub top_albums: Vec<AlbumSummary>,
    pub mood_buckets: MoodBuckets,
    pub time_of_day: TimeOfDayBreakdown,
    pub longest_streaks: Vec<TrackStreak>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreCount {
    pub genre: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSummary {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistSummary {
    pub id: String,
    pub name: String,
    pub genres: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumSummary {
    pub name: String,
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodTrack {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoodBuckets {
    pub chill: Vec<MoodTrack>,
    pub workout: Vec<MoodTrack>,
    pub focus: Vec<MoodTrack>,
}

/// Raw play counts per day segment, converted in place to percentages of the
/// total (2 decimals) when there is at least one play.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeOfDayBreakdown {
    pub morning: f64,
    pub afternoon: f64,
    pub evening: f64,
    pub night: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackStreak {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub streak: u32,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn primary_artist(artists: &[crate::spotify::ArtistRef]) -> String {
    artists.first().map(|a| a.name.clone()).unwrap_or_default()
}

fn first_image(images: &[crate::spotify::Image]) -> Option<String> {
    images.first().map(|i| i.url.clone())
}

/// The 5 most frequent genre labels across all artists, counted as a
/// multiset. Stable sort on count descending, so ties keep the order the
/// genres were first encountered in.
pub fn top_genres(artists: &[Artist]) -> Vec<GenreCount> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u32> = HashMap::new();

    for artist in artists {
        for genre in &artist.genres {
            if !counts.contains_key(genre) {
                order.push(genre.clone());
            }
            *counts.entry(genre.clone()).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<GenreCount> = order
        .into_iter()
        .map(|genre| {
            let count = counts[&genre];
            GenreCount { genre, count }
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(TOP_GENRES);
    ranked
}

pub fn unique_genre_count(artists: &[Artist]) -> u32 {
    let unique: HashSet<&str> = artists
        .iter()
        .flat_map(|a| a.genres.iter().map(String::as_str))
        .collect();
    unique.len() as u32
}

/// Bucket play events by hour of day: morning [5,12), afternoon [12,17),
/// evening [17,22), night otherwise. With no plays the raw zero counts are
/// returned as-is; percentage conversion is skipped rather than dividing by
/// zero.
pub fn time_of_day(plays: &[PlayEvent]) -> TimeOfDayBreakdown {
    let mut breakdown = TimeOfDayBreakdown::default();

    for play in plays {
        match play.played_at.hour() {
            5..=11 => breakdown.morning += 1.0,
            12..=16 => breakdown.afternoon += 1.0,
            17..=21 => breakdown.evening += 1.0,
            _ => breakdown.night += 1.0,
        }
    }

    let total = breakdown.morning + breakdown.afternoon + breakdown.evening + breakdown.night;
    if total > 0.0 {
        breakdown.morning = round2(breakdown.morning / total * 100.0);
        breakdown.afternoon = round2(breakdown.afternoon / total * 100.0);
        breakdown.evening = round2(breakdown.evening / total * 100.0);
        breakdown.night = round2(breakdown.night / total * 100.0);
    }

    breakdown
}

/// Longest consecutive-play runs. Scans the events in their given order,
/// keeps the maximum run length seen per track across the whole scan, and
/// returns the top 3 descending; ties keep first-appearance order.
pub fn longest_streaks(plays: &[PlayEvent]) -> Vec<TrackStreak> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, u32> = HashMap::new();

    let mut last_id: Option<&str> = None;
    let mut run = 0u32;

    for play in plays {
        let id = play.track.id.as_str();
        if last_id == Some(id) {
            run += 1;
            continue;
        }
        if let Some(prev) = last_id {
            let entry = best.entry(prev.to_string()).or_insert(0);
            *entry = (*entry).max(run);
        }
        if !best.contains_key(id) {
            order.push(id.to_string());
        }
        last_id = Some(id);
        run = 1;
    }
    if let Some(prev) = last_id {
        let entry = best.entry(prev.to_string()).or_insert(0);
        *entry = (*entry).max(run);
    }

    let mut ranked: Vec<(String, u32)> = order
        .into_iter()
        .map(|id| {
            let streak = best[&id];
            (id, streak)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(TOP_STREAKS);

    ranked
        .into_iter()
        .filter_map(|(id, streak)| {
            let track = plays.iter().find(|p| p.track.id == id).map(|p| &p.track)?;
            Some(TrackStreak {
                id,
                name: track.name.clone(),
                image_url: first_image(&track.album.images),
                streak,
            })
        })
        .collect()
}

/// Classify the first `limit` top tracks into at most one mood bucket each,
/// using the audio-feature entry at the same position. Tracks without a
/// feature entry are skipped; the first matching predicate wins, checked
/// chill, then workout, then focus.
pub fn mood_buckets(
    tracks: &[Track],
    features: &[Option<AudioFeatures>],
    limit: usize,
) -> MoodBuckets {
    let mut buckets = MoodBuckets::default();

    for (track, feature) in tracks.iter().take(limit).zip(features.iter()) {
        let Some(f) = feature else {
            continue;
        };
        let entry = MoodTrack {
            id: track.id.clone(),
            name: track.name.clone(),
        };
        if f.energy < 0.4 && f.valence < 0.5 {
            buckets.chill.push(entry);
        } else if f.danceability > 0.7 && f.energy > 0.6 {
            buckets.workout.push(entry);
        } else if (0.4..=0.7).contains(&f.energy) && f.valence > 0.5 {
            buckets.focus.push(entry);
        }
    }

    buckets
}

/// Total duration of all tracks, in minutes rounded to 2 decimals.
pub fn total_minutes(tracks: &[Track]) -> f64 {
    let total_ms: i64 = tracks.iter().map(|t| t.duration_ms).sum();
    round2(total_ms as f64 / (1000.0 * 60.0))
}

/// Album name, primary artist and first cover image for the display prefix
/// of top tracks.
pub fn top_albums(tracks: &[Track]) -> Vec<AlbumSummary> {
    tracks
        .iter()
        .take(DISPLAY_LIMIT)
        .map(|track| AlbumSummary {
            name: track.album.name.clone(),
            artist: primary_artist(&track.album.artists),
            image_url: first_image(&track.album.images),
        })
        .collect()
}

pub fn build_stats(
    time_range: TimeRange,
    tracks: &[Track],
    artists: &[Artist],
    features: &[Option<AudioFeatures>],
    plays: &[PlayEvent],
    mood_track_limit: usize,
) -> ListeningStats {
    let top_tracks = tracks
        .iter()
        .take(DISPLAY_LIMIT)
        .map(|track| TrackSummary {
            id: track.id.clone(),
            name: track.name.clone(),
            artist: primary_artist(&track.artists),
            duration_ms: track.duration_ms,
            image_url: first_image(&track.album.images),
        })
        .collect();

    let top_artists = artists
        .iter()
        .take(DISPLAY_LIMIT)
        .map(|artist| ArtistSummary {
            id: artist.id.clone(),
            name: artist.name.clone(),
            genres: artist.genres.clone(),
            image_url: first_image(&artist.images),
        })
        .collect();

    ListeningStats {
        version: STATS_VERSION,
        time_range,
        total_tracks: tracks.len() as u32,
        total_minutes: total_minutes(tracks),
        total_genres: unique_genre_count(artists),
        favorite_genres: top_genres(artists),
        top_tracks,
        top_artists,
        top_albums: top_albums(tracks),
        mood_buckets: mood_buckets(tracks, features, mood_track_limit),
        time_of_day: time_of_day(plays),
        longest_streaks: longest_streaks(plays),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::{Album, ArtistRef, Image};
    use chrono::{TimeZone, Utc};

    fn track(id: &str, name: &str, duration_ms: i64) -> Track {
        Track {
            id: id.to_string(),
            name: name.to_string(),
            duration_ms,
            album: Album {
                name: format!("{} album", name),
                artists: vec![ArtistRef {
                    id: format!("{}-artist", id),
                    name: format!("{} artist", name),
                }],
                images: vec![Image {
                    url: format!("https://img.example/{}.jpg", id),
                    height: Some(640),
                    width: Some(640),
                }],
            },
            artists: vec![ArtistRef {
                id: format!("{}-artist", id),
                name: format!("{} artist", name),
            }],
        }
    }

    fn artist(id: &str, genres: &[&str]) -> Artist {
        Artist {
            id: id.to_string(),
            name: id.to_string(),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            images: vec![],
        }
    }

    fn play(track_id: &str, hour: u32) -> PlayEvent {
        PlayEvent {
            track: track(track_id, track_id, 200000),
            played_at: Utc.with_ymd_and_hms(2025, 6, 1, hour, 30, 0).unwrap(),
        }
    }

    fn features(energy: f64, danceability: f64, valence: f64) -> Option<AudioFeatures> {
        Some(AudioFeatures {
            energy,
            danceability,
            valence,
        })
    }

    #[test]
    fn genre_ties_keep_first_seen_order() {
        let artists = vec![
            artist("a", &["rock", "pop"]),
            artist("b", &["rock", "pop", "jazz"]),
            artist("c", &["rock", "pop"]),
        ];

        let ranked = top_genres(&artists);
        assert_eq!(ranked[0], GenreCount { genre: "rock".to_string(), count: 3 });
        assert_eq!(ranked[1], GenreCount { genre: "pop".to_string(), count: 3 });
        assert_eq!(ranked[2], GenreCount { genre: "jazz".to_string(), count: 1 });
    }

    #[test]
    fn genre_ranking_caps_at_five() {
        let artists = vec![artist(
            "a",
            &["one", "two", "three", "four", "five", "six", "six"],
        )];

        let ranked = top_genres(&artists);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].genre, "six");
    }

    #[test]
    fn genre_ranking_of_nothing_is_empty() {
        assert!(top_genres(&[]).is_empty());
        assert!(top_genres(&[artist("a", &[])]).is_empty());
        assert_eq!(unique_genre_count(&[artist("a", &[])]), 0);
    }

    #[test]
    fn unique_genres_are_deduplicated() {
        let artists = vec![artist("a", &["rock", "pop"]), artist("b", &["rock"])];
        assert_eq!(unique_genre_count(&artists), 2);
    }

    #[test]
    fn time_of_day_percentages_sum_to_100() {
        let plays = vec![
            play("a", 6),  // morning
            play("a", 11), // morning
            play("a", 13), // afternoon
            play("a", 18), // evening
            play("a", 23), // night
            play("a", 2),  // night
        ];

        let breakdown = time_of_day(&plays);
        assert_eq!(breakdown.morning, 33.33);
        assert_eq!(breakdown.afternoon, 16.67);
        assert_eq!(breakdown.evening, 16.67);
        assert_eq!(breakdown.night, 33.33);

        let sum = breakdown.morning + breakdown.afternoon + breakdown.evening + breakdown.night;
        assert!((sum - 100.0).abs() < 0.05);
    }

    #[test]
    fn time_of_day_bucket_edges() {
        let breakdown = time_of_day(&[play("a", 4), play("a", 5)]);
        assert_eq!(breakdown.morning, 50.0);
        assert_eq!(breakdown.night, 50.0);

        let breakdown = time_of_day(&[play("a", 12), play("a", 17), play("a", 22)]);
        assert_eq!(breakdown.afternoon, 33.33);
        assert_eq!(breakdown.evening, 33.33);
        assert_eq!(breakdown.night, 33.33);
    }

    #[test]
    fn time_of_day_of_no_plays_stays_zero() {
        assert_eq!(time_of_day(&[]), TimeOfDayBreakdown::default());
    }

    #[test]
    fn streaks_keep_the_max_run_not_the_last() {
        let plays = vec![
            play("a", 10),
            play("a", 10),
            play("a", 10),
            play("b", 11),
            play("a", 12),
            play("a", 12),
        ];

        let streaks = longest_streaks(&plays);
        assert_eq!(streaks.len(), 2);
        assert_eq!(streaks[0].id, "a");
        assert_eq!(streaks[0].streak, 3);
        assert_eq!(streaks[1].id, "b");
        assert_eq!(streaks[1].streak, 1);
        assert_eq!(
            streaks[0].image_url.as_deref(),
            Some("https://img.example/a.jpg")
        );
    }

    #[test]
    fn streak_ties_keep_first_appearance_order() {
        let plays = vec![
            play("a", 10),
            play("a", 10),
            play("b", 11),
            play("b", 11),
            play("c", 12),
            play("c", 12),
            play("d", 13),
        ];

        let streaks = longest_streaks(&plays);
        let ids: Vec<&str> = streaks.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn streaks_of_no_plays_are_empty() {
        assert!(longest_streaks(&[]).is_empty());
    }

    #[test]
    fn mood_bucketing_places_chill_and_workout() {
        let tracks = vec![track("a", "Calm", 180000), track("b", "Pump", 200000)];
        let feats = vec![features(0.3, 0.2, 0.4), features(0.8, 0.9, 0.9)];

        let buckets = mood_buckets(&tracks, &feats, 5);
        assert_eq!(buckets.chill.len(), 1);
        assert_eq!(buckets.chill[0].id, "a");
        assert_eq!(buckets.workout.len(), 1);
        assert_eq!(buckets.workout[0].id, "b");
        assert!(buckets.focus.is_empty());
    }

    #[test]
    fn mood_bucketing_leaves_unmatched_tracks_out() {
        // High energy, low danceability, low valence: no predicate matches.
        let tracks = vec![track("a", "Odd", 180000)];
        let feats = vec![features(0.9, 0.1, 0.1)];

        let buckets = mood_buckets(&tracks, &feats, 5);
        assert!(buckets.chill.is_empty());
        assert!(buckets.workout.is_empty());
        assert!(buckets.focus.is_empty());
    }

    #[test]
    fn mood_bucketing_assigns_first_matching_bucket_only() {
        // Satisfies both workout and focus; workout is checked first.
        let tracks = vec![track("a", "Both", 180000)];
        let feats = vec![features(0.65, 0.8, 0.6)];

        let buckets = mood_buckets(&tracks, &feats, 5);
        assert!(buckets.workout.iter().any(|t| t.id == "a"));
        assert!(buckets.focus.is_empty());
    }

    #[test]
    fn mood_bucketing_focus_boundaries_are_inclusive() {
        let tracks = vec![track("lo", "Lo", 1), track("hi", "Hi", 1)];
        let feats = vec![features(0.4, 0.1, 0.6), features(0.7, 0.1, 0.6)];

        let buckets = mood_buckets(&tracks, &feats, 5);
        let ids: Vec<&str> = buckets.focus.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["lo", "hi"]);
    }

    #[test]
    fn mood_bucketing_skips_missing_features_and_respects_limit() {
        let tracks = vec![
            track("a", "A", 1),
            track("b", "B", 1),
            track("c", "C", 1),
        ];
        let feats = vec![None, features(0.3, 0.2, 0.4), features(0.3, 0.2, 0.4)];

        let buckets = mood_buckets(&tracks, &feats, 2);
        // "a" has no features, "c" is past the limit.
        assert_eq!(buckets.chill.len(), 1);
        assert_eq!(buckets.chill[0].id, "b");
    }

    #[test]
    fn total_minutes_rounds_to_two_decimals() {
        let tracks = vec![track("a", "A", 180000), track("b", "B", 200000)];
        assert_eq!(total_minutes(&tracks), 6.33);
        assert_eq!(total_minutes(&[]), 0.0);
    }

    #[test]
    fn album_extraction_takes_the_display_prefix() {
        let tracks: Vec<Track> = (0..7)
            .map(|i| track(&format!("t{}", i), &format!("T{}", i), 1000))
            .collect();

        let albums = top_albums(&tracks);
        assert_eq!(albums.len(), DISPLAY_LIMIT);
        assert_eq!(albums[0].name, "T0 album");
        assert_eq!(albums[0].artist, "T0 artist");
        assert!(albums[0].image_url.is_some());
    }

    #[test]
    fn album_extraction_degrades_without_images() {
        let mut bare = track("a", "A", 1000);
        bare.album.images.clear();
        bare.album.artists.clear();

        let albums = top_albums(&[bare]);
        assert_eq!(albums[0].image_url, None);
        assert_eq!(albums[0].artist, "");
    }

    #[test]
    fn build_stats_assembles_a_versioned_record() {
        let tracks: Vec<Track> = (0..10)
            .map(|i| track(&format!("t{}", i), &format!("T{}", i), 60000))
            .collect();
        let artists = vec![artist("a", &["rock"]), artist("b", &["rock", "pop"])];
        let feats: Vec<Option<AudioFeatures>> =
            tracks.iter().map(|_| features(0.3, 0.2, 0.4)).collect();
        let plays = vec![play("t0", 9), play("t0", 9), play("t1", 20)];

        let stats = build_stats(TimeRange::MediumTerm, &tracks, &artists, &feats, &plays, 5);

        assert_eq!(stats.version, STATS_VERSION);
        assert_eq!(stats.time_range, TimeRange::MediumTerm);
        assert_eq!(stats.total_tracks, 10);
        assert_eq!(stats.total_minutes, 10.0);
        assert_eq!(stats.total_genres, 2);
        assert_eq!(stats.top_tracks.len(), DISPLAY_LIMIT);
        assert_eq!(stats.top_albums.len(), DISPLAY_LIMIT);
        assert_eq!(stats.mood_buckets.chill.len(), 5);
        assert_eq!(stats.longest_streaks[0].id, "t0");
        assert_eq!(stats.longest_streaks[0].streak, 2);

        // Survives the JSON round trip it takes through the wraps table.
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["version"], 1);
        let back: ListeningStats = serde_json::from_value(value).unwrap();
        assert_eq!(back.total_tracks, 10);
    }

    #[test]
    fn empty_inputs_produce_an_empty_but_valid_record() {
        let stats = build_stats(TimeRange::ShortTerm, &[], &[], &[], &[], 5);

        assert_eq!(stats.total_tracks, 0);
        assert_eq!(stats.total_minutes, 0.0);
        assert!(stats.favorite_genres.is_empty());
        assert!(stats.longest_streaks.is_empty());
        assert_eq!(stats.time_of_day, TimeOfDayBreakdown::default());
    }
}
