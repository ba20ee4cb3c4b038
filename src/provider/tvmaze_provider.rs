//! TVMaze REST API integration.

use async_trait::async_trait;
use log::debug;
use log::warn;
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

pub const TVMAZE: &str = "tvmaze";

/// TVMaze provider. Needs no API key; IMDb IDs come from `externals.imdb`.
pub struct TvMazeProvider {
    pub base: BaseProvider,
    client: ResilientClient,
}

impl TvMazeProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let info = ProviderInfo {
            name: TVMAZE.to_string(),
            display_name: "TVMaze".to_string(),
            api_url: settings.base_url.clone(),
        };
        Ok(Self {
            base: BaseProvider::new(info),
            client: ResilientClient::new(TVMAZE, settings)?,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.client = self.client.with_policy(policy);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base.info.api_url)
    }

    fn get_array<'a>(&self, resp: &'a Value, field: &str) -> Result<&'a Vec<Value>, ProviderError> {
        resp.as_array().ok_or_else(|| ProviderError::UnexpectedResult {
            message: format!("{field} is not an array"),
        })
    }

    fn get_id(&self, value: &Value, field: &str) -> Result<String, ProviderError> {
        value
            .get("id")
            .and_then(|v| v.as_i64())
            .map(|id| id.to_string())
            .ok_or_else(|| ProviderError::MissingField {
                field: format!("{field}.id"),
            })
    }

    fn get_str<'a>(&self, value: &'a Value, key: &str) -> Option<&'a str> {
        value.get(key).and_then(|v| v.as_str())
    }

    fn parse_show(&self, show: &Value) -> Result<ShowCandidate, ProviderError> {
        let provider_id = self.get_id(show, "show")?;
        let name = self
            .get_str(show, "name")
            .ok_or_else(|| ProviderError::MissingField {
                field: "show.name".to_string(),
            })?
            .to_string();

        let poster_url = show
            .get("image")
            .and_then(|img| img.get("medium").or_else(|| img.get("original")))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        let cross_ref_id = show
            .get("externals")
            .and_then(|e| e.get("imdb"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        Ok(ShowCandidate {
            provider: TVMAZE.to_string(),
            provider_id,
            name,
            overview: clean_overview(self.get_str(show, "summary").unwrap_or("")),
            poster_url,
            status: ShowStatus::from_provider(self.get_str(show, "status").unwrap_or("")),
            first_air_date: self.get_str(show, "premiered").and_then(parse_air_date),
            cross_ref_id,
        })
    }

    fn parse_episode(&self, episode: &Value) -> Result<EpisodeCandidate, ProviderError> {
        let provider_id = self.get_id(episode, "episode")?;
        let season_number = episode
            .get("season")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ProviderError::MissingField {
                field: "episode.season".to_string(),
            })?;
        // Specials carry a null number.
        let episode_number = episode.get("number").and_then(|v| v.as_i64()).unwrap_or(0);

        let air_date = self
            .get_str(episode, "airstamp")
            .and_then(parse_air_date)
            .or_else(|| self.get_str(episode, "airdate").and_then(parse_air_date));

        Ok(EpisodeCandidate {
            provider: TVMAZE.to_string(),
            provider_id,
            name: self.get_str(episode, "name").unwrap_or("").to_string(),
            season_number: season_number as i32,
            episode_number: episode_number as i32,
            air_date,
            overview: clean_overview(self.get_str(episode, "summary").unwrap_or("")),
        })
    }
}

#[async_trait]
impl Provider for TvMazeProvider {
    async fn search_shows(&self, query: &str) -> Result<Vec<ShowCandidate>, ProviderError> {
        debug!("Searching {} for `{query}`", self.base.info.display_name);
        let resp: Value = self
            .client
            .get_json(&self.url("/search/shows"), &[("q", query)])
            .await?;

        let results = self.get_array(&resp, "search results")?;
        let mut candidates = Vec::with_capacity(results.len());
        for result in results {
            let parsed = result
                .get("show")
                .ok_or_else(|| ProviderError::MissingField {
                    field: "show".to_string(),
                })
                .and_then(|show| self.parse_show(show));
            match parsed {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => warn!("Skipping malformed TVMaze search result: {e}"),
            }
        }
        Ok(candidates)
    }

    async fn get_show_details(&self, provider_id: &str) -> Result<ShowCandidate, ProviderError> {
        debug!("Fetching TVMaze show {provider_id}");
        let resp: Value = self
            .client
            .get_json(&self.url(&format!("/shows/{provider_id}")), &[])
            .await?;
        self.parse_show(&resp)
    }

    async fn list_episodes(
        &self,
        provider_id: &str,
    ) -> Result<Vec<EpisodeCandidate>, ProviderError> {
        debug!("Fetching TVMaze episodes for show {provider_id}");
        let resp: Value = self
            .client
            .get_json(&self.url(&format!("/shows/{provider_id}/episodes")), &[])
            .await?;

        let items = self.get_array(&resp, "episodes")?;
        let mut episodes = Vec::with_capacity(items.len());
        for item in items {
            match self.parse_episode(item) {
                Ok(episode) => episodes.push(episode),
                Err(e) => warn!("Skipping malformed TVMaze episode of show {provider_id}: {e}"),
            }
        }
        Ok(episodes)
    }

    fn get_base(&self) -> &BaseProvider {
        &self.base
    }
}
