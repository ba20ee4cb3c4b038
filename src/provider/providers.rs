//! Provider registry and management.

use std::sync::Arc;

use log::info;
use log::warn;

use crate::config::Config;
use crate::provider::Provider;
use crate::provider::error::ProviderError;
use crate::provider::tmdb_provider::TmdbProvider;
use crate::provider::tvmaze_provider::TvMazeProvider;

/// Registry of the configured providers.
///
/// Registration order is priority order: on equal completeness, the candidate from the
/// provider registered first wins reconciliation.
pub struct Providers {
    providers: Vec<Arc<dyn Provider>>,
}

impl Providers {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Builds the registry from configuration. TMDB is only registered with an API key.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let mut providers = Self::new();
        providers.add_provider(Arc::new(TvMazeProvider::new(&config.providers.tvmaze)?));

        match &config.tmdb_api_key {
            Some(key) => {
                providers.add_provider(Arc::new(TmdbProvider::new(&config.providers.tmdb, key)?))
            }
            None => warn!("TMDB_API_KEY is not set. TMDB provider disabled."),
        }

        info!(
            "Registered providers: {}",
            providers
                .providers
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(providers)
    }

    /// Looks up a provider by its registry key.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| ProviderError::UnsupportedProvider {
                provider: name.to_string(),
            })
    }

    /// Returns all registered providers in priority order.
    pub fn get_all_providers(&self) -> Vec<Arc<dyn Provider>> {
        self.providers.clone()
    }

    /// Adds a provider. A provider with the same name replaces the earlier one in place.
    pub fn add_provider(&mut self, provider: Arc<dyn Provider>) {
        if let Some(slot) = self
            .providers
            .iter_mut()
            .find(|p| p.name() == provider.name())
        {
            *slot = provider;
        } else {
            self.providers.push(provider);
        }
    }
}

impl Default for Providers {
    fn default() -> Self {
        Self::new()
    }
}
