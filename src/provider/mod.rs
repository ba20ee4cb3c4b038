//! Show metadata providers.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;

use crate::entity::ShowStatus;
use crate::provider::error::ProviderError;

pub mod error;
pub mod fetch;
pub mod providers;
pub mod tmdb_provider;
pub mod tvmaze_provider;

/// Static description of a provider.
#[derive(Clone, Debug)]
pub struct ProviderInfo {
    /// Registry key, also stored as provenance (e.g., "tvmaze")
    pub name: String,
    /// Human readable name (e.g., "TVMaze")
    pub display_name: String,
    /// https://api.provider.tld
    pub api_url: String,
}

#[derive(Clone, Debug)]
pub struct BaseProvider {
    pub info: ProviderInfo,
}

impl BaseProvider {
    pub fn new(info: ProviderInfo) -> Self {
        BaseProvider { info }
    }
}

/// A show as described by one provider, before reconciliation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShowCandidate {
    pub provider: String,
    pub provider_id: String,
    pub name: String,
    pub overview: String,
    pub poster_url: Option<String>,
    pub status: ShowStatus,
    pub first_air_date: Option<DateTime<Utc>>,
    pub cross_ref_id: Option<String>,
}

impl ShowCandidate {
    /// Ranks how much usable metadata the candidate carries.
    ///
    /// +3 for a non-empty overview, +2 for a poster, +1 for a known first air date.
    pub fn completeness_score(&self) -> u8 {
        let mut score = 0;
        if !self.overview.trim().is_empty() {
            score += 3;
        }
        if self.poster_url.as_deref().is_some_and(|p| !p.is_empty()) {
            score += 2;
        }
        if self.first_air_date.is_some() {
            score += 1;
        }
        score
    }
}

/// An episode as described by one provider.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EpisodeCandidate {
    pub provider: String,
    pub provider_id: String,
    pub name: String,
    pub season_number: i32,
    pub episode_number: i32,
    pub air_date: Option<DateTime<Utc>>,
    pub overview: String,
}

/// Capability set every show metadata source implements.
///
/// Providers are looked up at runtime by [`ProviderInfo::name`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// Free-text show search. Malformed items are skipped, not fatal.
    async fn search_shows(&self, query: &str) -> Result<Vec<ShowCandidate>, ProviderError>;

    async fn get_show_details(&self, provider_id: &str) -> Result<ShowCandidate, ProviderError>;

    /// Every known episode of the show, aired or not.
    async fn list_episodes(&self, provider_id: &str)
    -> Result<Vec<EpisodeCandidate>, ProviderError>;

    /// Episodes airing strictly after now.
    async fn list_upcoming_episodes(
        &self,
        provider_id: &str,
    ) -> Result<Vec<EpisodeCandidate>, ProviderError> {
        let now = Utc::now();
        let episodes = self.list_episodes(provider_id).await?;
        Ok(episodes
            .into_iter()
            .filter(|e| e.air_date.is_some_and(|air| air > now))
            .collect())
    }

    fn get_base(&self) -> &BaseProvider;

    fn name(&self) -> &str {
        &self.get_base().info.name
    }
}

/// Parses a provider date: RFC 3339 first, then a bare `YYYY-MM-DD` at midnight UTC.
///
/// Anything else, including an empty string, yields `None`.
pub fn parse_air_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Turns the HTML some providers embed in synopses into plain text.
pub fn clean_overview(raw: &str) -> String {
    if !raw.contains('<') {
        return raw.trim().to_string();
    }
    strip_emphasis(&html2md::parse_html(raw)).trim().to_string()
}

/// Drops the emphasis markers of converted markdown and unescapes literal characters.
fn strip_emphasis(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut chars = markdown.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '*' | '_' | '~' => {}
            _ => out.push(c),
        }
    }
    out
}
