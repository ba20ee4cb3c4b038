//! Environment-driven configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// Toggles for optional background features.
#[derive(Clone, Debug)]
pub struct Features {
    /// Runs the periodic notification sweep.
    pub notifications: bool,
}

/// Connection settings for a single metadata provider.
#[derive(Clone, Debug)]
pub struct ProviderSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Requests per second.
    pub rate_limit: u32,
}

#[derive(Clone, Debug)]
pub struct ProvidersConfig {
    pub tmdb: ProviderSettings,
    pub tvmaze: ProviderSettings,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub db_url: String,
    pub db_path: String,
    pub logs_path: PathBuf,
    pub telegram_token: String,
    pub tmdb_api_key: Option<String>,
    /// Period between two notification sweeps.
    pub check_interval: Duration,
    /// Width of the `(now, now + threshold)` dispatch window.
    pub episode_notification_threshold: Duration,
    /// Number of canonical shows returned by a search.
    pub max_results: usize,
    pub max_followed_shows: u32,
    /// Shows processed concurrently within one sweep.
    pub sweep_workers: usize,
    pub features: Features,
    pub providers: ProvidersConfig,
}

impl Config {
    pub fn new() -> Self {
        Self {
            db_url: "sqlite://data/shows.db".to_string(),
            db_path: "data/shows.db".to_string(),
            logs_path: PathBuf::from("logs"),
            telegram_token: String::new(),
            tmdb_api_key: None,
            check_interval: Duration::from_secs(6 * 60 * 60),
            episode_notification_threshold: Duration::from_secs(7 * 24 * 60 * 60),
            max_results: 5,
            max_followed_shows: 100,
            sweep_workers: 4,
            features: Features {
                notifications: true,
            },
            providers: ProvidersConfig {
                tmdb: ProviderSettings {
                    base_url: "https://api.themoviedb.org/3".to_string(),
                    timeout: Duration::from_secs(10),
                    max_retries: 3,
                    rate_limit: 40,
                },
                tvmaze: ProviderSettings {
                    base_url: "https://api.tvmaze.com".to_string(),
                    timeout: Duration::from_secs(10),
                    max_retries: 3,
                    rate_limit: 20,
                },
            },
        }
    }

    /// Overlays values from the process environment.
    pub fn load(&mut self) -> Result<(), AppError> {
        if let Some(v) = env("DB_URL") {
            self.db_url = v;
        }
        if let Some(v) = env("DB_PATH") {
            self.db_path = v;
        }
        if let Some(v) = env("LOGS_PATH") {
            self.logs_path = PathBuf::from(v);
        }
        if let Some(v) = env("TMDB_API_KEY") {
            self.tmdb_api_key = Some(v);
        }
        if let Some(v) = env("NOTIFICATIONS_ENABLED") {
            self.features.notifications = parse_flag(&v);
        }

        if let Some(secs) = parse_env::<u64>("CHECK_INTERVAL")? {
            self.check_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("EPISODE_NOTIFICATION_THRESHOLD")? {
            self.episode_notification_threshold = Duration::from_secs(secs);
        }
        if let Some(v) = parse_env("MAX_RESULTS")? {
            self.max_results = v;
        }
        if let Some(v) = parse_env("MAX_FOLLOWED_SHOWS")? {
            self.max_followed_shows = v;
        }
        if let Some(v) = parse_env::<usize>("SWEEP_WORKERS")? {
            self.sweep_workers = v.max(1);
        }

        load_provider_settings("TMDB", &mut self.providers.tmdb)?;
        load_provider_settings("TVMAZE", &mut self.providers.tvmaze)?;

        if let Some(token) = env("TELEGRAM_TOKEN") {
            self.telegram_token = token;
        }

        Ok(())
    }

    /// Checks the keys the enabled features depend on.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.features.notifications && self.telegram_token.is_empty() {
            return Err(AppError::MissingConfig {
                key: "TELEGRAM_TOKEN".to_string(),
            });
        }
        Ok(())
    }
}

fn load_provider_settings(prefix: &str, settings: &mut ProviderSettings) -> Result<(), AppError> {
    if let Some(v) = env(&format!("{prefix}_BASE_URL")) {
        settings.base_url = v.trim_end_matches('/').to_string();
    }
    if let Some(secs) = parse_env::<u64>(&format!("{prefix}_TIMEOUT"))? {
        settings.timeout = Duration::from_secs(secs);
    }
    if let Some(v) = parse_env(&format!("{prefix}_MAX_RETRIES"))? {
        settings.max_retries = v;
    }
    if let Some(v) = parse_env(&format!("{prefix}_RATE_LIMIT"))? {
        settings.rate_limit = v;
    }
    Ok(())
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, AppError> {
    match env(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::InvalidConfig {
                key: key.to_string(),
                value,
            }),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
