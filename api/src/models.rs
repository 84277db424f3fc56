use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Wrap {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub time_range: String,
    pub share_token: String,
    pub stats: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Dashboard listing row, without the stats payload.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WrapSummary {
    pub id: i64,
    pub name: String,
    pub time_range: String,
    pub share_token: String,
    pub created_at: DateTime<Utc>,
}

/// Lookback window offered by the upstream top-tracks/top-artists endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    #[default]
    ShortTerm,
    MediumTerm,
    LongTerm,
}

impl TimeRange {
    /// Wire value understood by the upstream API.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "short_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "Short Term",
            TimeRange::MediumTerm => "Medium Term",
            TimeRange::LongTerm => "Long Term",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_range_round_trips_through_wire_values() {
        for range in [
            TimeRange::ShortTerm,
            TimeRange::MediumTerm,
            TimeRange::LongTerm,
        ] {
            let encoded = serde_json::to_string(&range).unwrap();
            assert_eq!(encoded, format!("\"{}\"", range.as_str()));
            let decoded: TimeRange = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, range);
        }
    }

    #[test]
    fn time_range_defaults_to_short_term() {
        assert_eq!(TimeRange::default(), TimeRange::ShortTerm);
    }
}
