//! TMDB (The Movie Database) v3 API integration.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use log::debug;
use log::warn;
use serde_json::Map;
use serde_json::Value;

use crate::config::ProviderSettings;
use crate::entity::ShowStatus;
use crate::provider::BaseProvider;
use crate::provider::EpisodeCandidate;
use crate::provider::Provider;
use crate::provider::ProviderInfo;
use crate::provider::ShowCandidate;
use crate::provider::clean_overview;
use crate::provider::error::ProviderError;
use crate::provider::fetch::ResilientClient;
use crate::provider::fetch::RetryPolicy;
use crate::provider::parse_air_date;

pub const TMDB: &str = "tmdb";
const POSTER_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";

type Json<'a> = &'a Map<String, Value>;

/// TMDB provider.
///
/// Search results lack IMDb IDs, so every hit is enriched with a details call
/// (`append_to_response=external_ids`). Episodes are fetched season by season.
pub struct TmdbProvider {
    pub base: BaseProvider,
    client: ResilientClient,
    api_key: String,
}

impl TmdbProvider {
    pub fn new(settings: &ProviderSettings, api_key: &str) -> Result<Self, ProviderError> {
        let info = ProviderInfo {
            name: TMDB.to_string(),
            display_name: "TMDB".to_string(),
            api_url: settings.base_url.clone(),
        };
        Ok(Self {
            base: BaseProvider::new(info),
            client: ResilientClient::new(TMDB, settings)?,
            api_key: api_key.to_string(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.client = self.client.with_policy(policy);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base.info.api_url)
    }

    async fn fetch_details(&self, provider_id: &str) -> Result<Value, ProviderError> {
        self.client
            .get_json(
                &self.url(&format!("/tv/{provider_id}")),
                &[
                    ("api_key", self.api_key.as_str()),
                    ("append_to_response", "external_ids"),
                ],
            )
            .await
    }

    async fn fetch_season(
        &self,
        provider_id: &str,
        season: i64,
    ) -> Result<Vec<EpisodeCandidate>, ProviderError> {
        let resp: Value = self
            .client
            .get_json(
                &self.url(&format!("/tv/{provider_id}/season/{season}")),
                &[("api_key", self.api_key.as_str())],
            )
            .await?;

        let items = resp
            .get("episodes")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ProviderError::MissingField {
                field: "season.episodes".to_string(),
            })?;

        let mut episodes = Vec::with_capacity(items.len());
        for item in items {
            match self.parse_episode(item, season) {
                Ok(episode) => episodes.push(episode),
                Err(e) => warn!(
                    "Skipping malformed TMDB episode of show {provider_id} season {season}: {e}"
                ),
            }
        }
        Ok(episodes)
    }

    /// Fetches the given seasons, dropping the ones that fail.
    async fn fetch_seasons(&self, provider_id: &str, seasons: &[i64]) -> Vec<EpisodeCandidate> {
        let mut episodes = Vec::new();
        for &season in seasons {
            match self.fetch_season(provider_id, season).await {
                Ok(mut batch) => episodes.append(&mut batch),
                Err(e) => warn!("Failed to fetch TMDB show {provider_id} season {season}: {e}"),
            }
        }
        episodes
    }

    fn as_object<'a>(&self, value: &'a Value, field: &str) -> Result<Json<'a>, ProviderError> {
        value
            .as_object()
            .ok_or_else(|| ProviderError::UnexpectedResult {
                message: format!("{field} is not an object"),
            })
    }

    fn get_id(&self, obj: Json, field: &str) -> Result<String, ProviderError> {
        obj.get("id")
            .and_then(|v| v.as_i64())
            .map(|id| id.to_string())
            .ok_or_else(|| ProviderError::MissingField {
                field: format!("{field}.id"),
            })
    }

    fn get_str<'a>(&self, obj: Json<'a>, key: &str) -> Option<&'a str> {
        obj.get(key).and_then(|v| v.as_str())
    }

    fn get_poster_url(&self, obj: Json) -> Option<String> {
        self.get_str(obj, "poster_path")
            .filter(|p| !p.is_empty())
            .map(|p| format!("{POSTER_BASE_URL}{p}"))
    }

    /// Regular seasons listed in a details response. Season 0 holds specials.
    fn get_season_numbers(&self, details: &Value) -> Vec<i64> {
        details
            .get("seasons")
            .and_then(|v| v.as_array())
            .map(|seasons| {
                seasons
                    .iter()
                    .filter_map(|s| s.get("season_number").and_then(|n| n.as_i64()))
                    .filter(|n| *n > 0)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn parse_search_result(&self, item: &Value) -> Result<ShowCandidate, ProviderError> {
        let obj = self.as_object(item, "result")?;
        let name = self
            .get_str(obj, "name")
            .ok_or_else(|| ProviderError::MissingField {
                field: "result.name".to_string(),
            })?;

        Ok(ShowCandidate {
            provider: TMDB.to_string(),
            provider_id: self.get_id(obj, "result")?,
            name: name.to_string(),
            overview: clean_overview(self.get_str(obj, "overview").unwrap_or("")),
            poster_url: self.get_poster_url(obj),
            status: ShowStatus::Unknown,
            first_air_date: self.get_str(obj, "first_air_date").and_then(parse_air_date),
            cross_ref_id: None,
        })
    }

    fn parse_details(&self, details: &Value) -> Result<ShowCandidate, ProviderError> {
        let mut candidate = self.parse_search_result(details)?;
        candidate.status = ShowStatus::from_provider(
            details.get("status").and_then(|v| v.as_str()).unwrap_or(""),
        );
        candidate.cross_ref_id = self.get_imdb_id(details);
        Ok(candidate)
    }

    fn get_imdb_id(&self, details: &Value) -> Option<String> {
        details
            .get("external_ids")
            .and_then(|e| e.get("imdb_id"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    }

    fn parse_episode(&self, item: &Value, season: i64) -> Result<EpisodeCandidate, ProviderError> {
        let obj = self.as_object(item, "episode")?;
        let episode_number = obj
            .get("episode_number")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ProviderError::MissingField {
                field: "episode.episode_number".to_string(),
            })?;
        let season_number = obj
            .get("season_number")
            .and_then(|v| v.as_i64())
            .unwrap_or(season);

        Ok(EpisodeCandidate {
            provider: TMDB.to_string(),
            provider_id: self.get_id(obj, "episode")?,
            name: self.get_str(obj, "name").unwrap_or("").to_string(),
            season_number: season_number as i32,
            episode_number: episode_number as i32,
            air_date: self.get_str(obj, "air_date").and_then(parse_air_date),
            overview: clean_overview(self.get_str(obj, "overview").unwrap_or("")),
        })
    }

    /// Adds status and IMDb ID from the details endpoint. Keeps the bare candidate on failure.
    async fn enrich(&self, mut candidate: ShowCandidate) -> ShowCandidate {
        match self.fetch_details(&candidate.provider_id).await {
            Ok(details) => {
                candidate.cross_ref_id = self.get_imdb_id(&details);
                candidate.status = ShowStatus::from_provider(
                    details.get("status").and_then(|v| v.as_str()).unwrap_or(""),
                );
            }
            Err(e) => warn!(
                "Failed to fetch external IDs for TMDB show {}: {e}",
                candidate.provider_id
            ),
        }
        candidate
    }
}

#[async_trait]
impl Provider for TmdbProvider {
    async fn search_shows(&self, query: &str) -> Result<Vec<ShowCandidate>, ProviderError> {
        debug!("Searching {} for `{query}`", self.base.info.display_name);
        let resp: Value = self
            .client
            .get_json(
                &self.url("/search/tv"),
                &[("api_key", self.api_key.as_str()), ("query", query)],
            )
            .await?;

        let results = resp
            .get("results")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ProviderError::MissingField {
                field: "results".to_string(),
            })?;

        let mut candidates = Vec::with_capacity(results.len());
        for item in results {
            match self.parse_search_result(item) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => warn!("Skipping malformed TMDB search result: {e}"),
            }
        }

        Ok(join_all(candidates.into_iter().map(|c| self.enrich(c))).await)
    }

    async fn get_show_details(&self, provider_id: &str) -> Result<ShowCandidate, ProviderError> {
        debug!("Fetching TMDB show {provider_id}");
        let details = self.fetch_details(provider_id).await?;
        self.parse_details(&details)
    }

    async fn list_episodes(
        &self,
        provider_id: &str,
    ) -> Result<Vec<EpisodeCandidate>, ProviderError> {
        let details = self.fetch_details(provider_id).await?;
        let seasons = self.get_season_numbers(&details);
        debug!(
            "Fetching {} TMDB seasons for show {provider_id}",
            seasons.len()
        );
        Ok(self.fetch_seasons(provider_id, &seasons).await)
    }

    /// Only fetches seasons from the last aired one onward.
    async fn list_upcoming_episodes(
        &self,
        provider_id: &str,
    ) -> Result<Vec<EpisodeCandidate>, ProviderError> {
        let details = self.fetch_details(provider_id).await?;
        let current_season = details
            .get("last_episode_to_air")
            .and_then(|e| e.get("season_number"))
            .and_then(|n| n.as_i64())
            .unwrap_or(1);
        let seasons: Vec<i64> = self
            .get_season_numbers(&details)
            .into_iter()
            .filter(|n| *n >= current_season)
            .collect();

        let now = Utc::now();
        Ok(self
            .fetch_seasons(provider_id, &seasons)
            .await
            .into_iter()
            .filter(|e| e.air_date.is_some_and(|air| air > now))
            .collect())
    }

    fn get_base(&self) -> &BaseProvider {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::Config;

    fn provider() -> TmdbProvider {
        TmdbProvider::new(&Config::new().providers.tmdb, "key").unwrap()
    }

    #[test]
    fn test_parse_details() {
        let details = json!({
            "id": 1399,
            "name": "Game of Thrones",
            "overview": "Seven noble families fight.",
            "poster_path": "/u3bZgnGQ9T01sWNhyveQz0wH0Hl.jpg",
            "first_air_date": "2011-04-17",
            "status": "Ended",
            "external_ids": { "imdb_id": "tt0944947" },
            "seasons": [{ "season_number": 0 }, { "season_number": 1 }, { "season_number": 2 }]
        });
        let provider = provider();
        let candidate = provider.parse_details(&details).unwrap();
        assert_eq!(candidate.provider_id, "1399");
        assert_eq!(
            candidate.poster_url.as_deref(),
            Some("https://image.tmdb.org/t/p/w500/u3bZgnGQ9T01sWNhyveQz0wH0Hl.jpg")
        );
        assert_eq!(candidate.cross_ref_id.as_deref(), Some("tt0944947"));
        assert_eq!(candidate.status, ShowStatus::Ended);
        assert_eq!(provider.get_season_numbers(&details), vec![1, 2]);
    }

    #[test]
    fn test_empty_poster_path_is_ignored() {
        let result = json!({ "id": 5, "name": "No Art", "poster_path": "" });
        let candidate = provider().parse_search_result(&result).unwrap();
        assert_eq!(candidate.poster_url, None);
    }

    #[test]
    fn test_parse_episode_falls_back_to_requested_season() {
        let item = json!({ "id": 63056, "name": "Winter Is Coming", "episode_number": 1, "air_date": null });
        let candidate = provider().parse_episode(&item, 1).unwrap();
        assert_eq!(candidate.season_number, 1);
        assert_eq!(candidate.air_date, None);
    }
}
