//! Persisted entities.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use sqlx::FromRow;

/// Builds the row identity of a show or episode from its provenance.
///
/// The result is a pure function of `(provider, provider_id)`, so ingesting the same
/// provider record twice always targets the same row.
pub fn canonical_id(provider: &str, provider_id: &str) -> String {
    format!("{provider}_{provider_id}")
}

/// Lifecycle status of a show.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, Default, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ShowStatus {
    Running,
    Ended,
    #[default]
    Unknown,
}

impl ShowStatus {
    /// Normalizes the free-form status strings providers return.
    pub fn from_provider(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "running" | "continuing" | "returning series" | "in production" => Self::Running,
            "ended" | "canceled" | "cancelled" => Self::Ended,
            _ => Self::Unknown,
        }
    }
}

/// Canonical show.
///
/// Unique per `(provider, provider_id)`. When `cross_ref_id` is set, no other show
/// carries the same value; records from other providers with that value merge into
/// this row instead of creating a new one.
#[derive(FromRow, Serialize, Default, Clone, Debug, PartialEq)]
pub struct ShowModel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub overview: String,
    /// Poster artwork URL
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(default)]
    pub status: ShowStatus,
    #[serde(default)]
    pub first_air_date: Option<DateTime<Utc>>,
    /// Provider name (e.g., "tvmaze", "tmdb")
    #[serde(default)]
    pub provider: String,
    /// Provider-native identifier
    #[serde(default)]
    pub provider_id: String,
    /// Provider-independent catalog identifier (IMDb ID)
    #[serde(default)]
    pub cross_ref_id: Option<String>,
}

/// A single episode of a [`ShowModel`].
///
/// Episodes without an announced air date keep `air_date` as `None` and never show
/// up in upcoming queries.
#[derive(FromRow, Serialize, Default, Clone, Debug, PartialEq)]
pub struct EpisodeModel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub show_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub season_number: i32,
    #[serde(default)]
    pub episode_number: i32,
    #[serde(default)]
    pub air_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub provider_id: String,
}

/// Chat platform user, mirrored for display purposes only.
#[derive(FromRow, Serialize, Default, Clone, Debug)]
pub struct UserModel {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Links users to the shows they follow.
#[derive(FromRow, Serialize, Default, Clone, Debug)]
pub struct SubscriptionModel {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub show_id: String,
}

/// Proof that `user_id` was notified about `episode_id`.
///
/// Unique per `(user_id, episode_id)`; the storage constraint is what prevents a second
/// notification, even when two sweeps overlap.
#[derive(FromRow, Serialize, Default, Clone, Debug)]
pub struct NotificationModel {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub episode_id: String,
    #[serde(default)]
    pub notified_at: DateTime<Utc>,
}
