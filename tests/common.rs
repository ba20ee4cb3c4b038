//! Common test utilities and mock implementations.
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use shows_bot::config::Config;
use shows_bot::notifier::Notifier;
use shows_bot::provider::BaseProvider;
use shows_bot::provider::EpisodeCandidate;
use shows_bot::provider::Provider;
use shows_bot::provider::ProviderInfo;
use shows_bot::provider::ShowCandidate;
use shows_bot::provider::error::ProviderError;
use shows_bot::provider::providers::Providers;
use shows_bot::repository::Repository;
use shows_bot::service::Services;
use tokio::sync::Notify;
use uuid::Uuid;

/// Sets up a temporary test database.
pub async fn setup_db() -> (Arc<Repository>, PathBuf) {
    let uuid = Uuid::new_v4();
    let db_path = std::env::temp_dir().join(format!("shows-bot-test-{}.db", uuid));
    let db_url = format!("sqlite://{}", db_path.to_str().unwrap());

    let db = Repository::new(&db_url, db_path.to_str().unwrap())
        .await
        .expect("Failed to create database");

    db.run_migrations().await.expect("Failed to run migrations");

    (Arc::new(db), db_path)
}

/// Cleans up the test database file.
pub async fn teardown_db(db_path: PathBuf) {
    if db_path.exists() {
        let _ = std::fs::remove_file(db_path);
    }
}

/// Builds services over `providers` (priority order) with default configuration.
pub fn setup_services(
    db: Arc<Repository>,
    providers: Vec<Arc<dyn Provider>>,
    notifier: Arc<dyn Notifier>,
) -> Services {
    let mut registry = Providers::new();
    for provider in providers {
        registry.add_provider(provider);
    }
    Services::new(&Config::new(), db, Arc::new(registry), notifier)
        .expect("Failed to create services")
}

pub fn show_candidate(
    provider: &str,
    provider_id: &str,
    name: &str,
    cross_ref_id: Option<&str>,
    overview: &str,
) -> ShowCandidate {
    ShowCandidate {
        provider: provider.to_string(),
        provider_id: provider_id.to_string(),
        name: name.to_string(),
        overview: overview.to_string(),
        cross_ref_id: cross_ref_id.map(|s| s.to_string()),
        ..Default::default()
    }
}

pub fn episode_candidate(
    provider: &str,
    provider_id: &str,
    season_number: i32,
    episode_number: i32,
    air_date: Option<DateTime<Utc>>,
) -> EpisodeCandidate {
    EpisodeCandidate {
        provider: provider.to_string(),
        provider_id: provider_id.to_string(),
        name: format!("Episode {episode_number}"),
        season_number,
        episode_number,
        air_date,
        overview: String::new(),
    }
}

// MOCK PROVIDER

/// Mock show provider for testing.
#[derive(Clone)]
pub struct MockProvider {
    pub base: BaseProvider,
    pub state: Arc<RwLock<MockProviderState>>,
    /// Signalled when a blocked episode call starts.
    pub entered: Arc<Notify>,
    /// Releases a blocked episode call.
    pub release: Arc<Notify>,
}

/// State for the mock provider.
#[derive(Default, Clone)]
pub struct MockProviderState {
    pub shows: Vec<ShowCandidate>,
    pub episodes: Vec<EpisodeCandidate>,
    pub fail_search: bool,
    pub fail_episodes: bool,
    pub block_episodes: bool,
    pub search_calls: usize,
    pub full_episode_calls: usize,
    pub upcoming_episode_calls: usize,
}

impl MockProvider {
    /// Creates a new mock provider registered under `name`.
    pub fn new(name: &str) -> Self {
        let info = ProviderInfo {
            name: name.to_string(),
            display_name: format!("Mock {name}"),
            api_url: format!("https://api.{name}.test"),
        };
        Self {
            base: BaseProvider::new(info),
            state: Arc::new(RwLock::new(MockProviderState::default())),
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    pub fn set_shows(&self, shows: Vec<ShowCandidate>) {
        self.state.write().unwrap().shows = shows;
    }

    pub fn set_episodes(&self, episodes: Vec<EpisodeCandidate>) {
        self.state.write().unwrap().episodes = episodes;
    }

    pub fn set_fail_search(&self, fail: bool) {
        self.state.write().unwrap().fail_search = fail;
    }

    pub fn set_fail_episodes(&self, fail: bool) {
        self.state.write().unwrap().fail_episodes = fail;
    }

    pub fn set_block_episodes(&self, block: bool) {
        self.state.write().unwrap().block_episodes = block;
    }

    pub fn snapshot(&self) -> MockProviderState {
        self.state.read().unwrap().clone()
    }

    fn episodes_or_error(&self) -> Result<Vec<EpisodeCandidate>, ProviderError> {
        let state = self.state.read().unwrap();
        if state.fail_episodes {
            return Err(ProviderError::ServerError { status: 503 });
        }
        Ok(state.episodes.clone())
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn search_shows(&self, _query: &str) -> Result<Vec<ShowCandidate>, ProviderError> {
        let mut state = self.state.write().unwrap();
        state.search_calls += 1;
        if state.fail_search {
            return Err(ProviderError::RetriesExhausted {
                attempts: 4,
                source: Box::new(ProviderError::ServerError { status: 500 }),
            });
        }
        Ok(state.shows.clone())
    }

    async fn get_show_details(&self, provider_id: &str) -> Result<ShowCandidate, ProviderError> {
        self.state
            .read()
            .unwrap()
            .shows
            .iter()
            .find(|s| s.provider_id == provider_id)
            .cloned()
            .ok_or(ProviderError::ClientError { status: 404 })
    }

    async fn list_episodes(
        &self,
        _provider_id: &str,
    ) -> Result<Vec<EpisodeCandidate>, ProviderError> {
        self.state.write().unwrap().full_episode_calls += 1;
        self.episodes_or_error()
    }

    async fn list_upcoming_episodes(
        &self,
        _provider_id: &str,
    ) -> Result<Vec<EpisodeCandidate>, ProviderError> {
        let block = {
            let mut state = self.state.write().unwrap();
            state.upcoming_episode_calls += 1;
            state.block_episodes
        };
        if block {
            self.entered.notify_one();
            self.release.notified().await;
        }

        let now = Utc::now();
        Ok(self
            .episodes_or_error()?
            .into_iter()
            .filter(|e| e.air_date.is_some_and(|air| air > now))
            .collect())
    }

    fn get_base(&self) -> &BaseProvider {
        &self.base
    }
}

// RECORDING NOTIFIER

/// Notifier that keeps every delivered message in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(i64, String)>>,
    pub failing_users: Mutex<HashSet<i64>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, user_id: i64) {
        self.failing_users.lock().unwrap().insert(user_id);
    }

    pub fn recover(&self, user_id: i64) {
        self.failing_users.lock().unwrap().remove(&user_id);
    }

    pub fn sent_to(&self, user_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, user_id: i64, text: &str) -> anyhow::Result<()> {
        if self.failing_users.lock().unwrap().contains(&user_id) {
            anyhow::bail!("chat {user_id} unreachable");
        }
        // Yield so concurrent dispatches interleave.
        tokio::task::yield_now().await;
        self.sent.lock().unwrap().push((user_id, text.to_string()));
        Ok(())
    }
}
