//! Episode ingestion from providers.

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use log::debug;
use log::warn;

use crate::entity::EpisodeModel;
use crate::entity::ShowModel;
use crate::entity::canonical_id;
use crate::provider::EpisodeCandidate;
use crate::provider::providers::Providers;
use crate::repository::Repository;
use crate::service::error::ServiceError;

/// Which episodes to pull from the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestMode {
    /// Every known episode. Used when a show gets its first follower.
    Full,
    /// Only episodes that have not aired yet. Used by the periodic sweep.
    Upcoming,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    /// Already stored; left untouched.
    pub existing: usize,
    pub failed: usize,
}

pub struct EpisodeService {
    pub db: Arc<Repository>,
    pub providers: Arc<Providers>,
}

impl EpisodeService {
    pub fn new(db: Arc<Repository>, providers: Arc<Providers>) -> Self {
        Self { db, providers }
    }

    /// Stores provider episodes under `show`.
    ///
    /// Insert-or-ignore by provenance: a stored episode is never overwritten, so
    /// ingesting the same batch twice is a no-op. A row that fails to store is
    /// counted and skipped.
    ///
    /// # Performance
    /// * DB calls: N
    pub async fn ingest(&self, show: &ShowModel, candidates: &[EpisodeCandidate]) -> IngestReport {
        let mut report = IngestReport::default();
        for candidate in candidates {
            let model = to_episode_model(&show.id, candidate);
            match self.db.episode.upsert_by_provenance(&model).await {
                Ok(true) => report.inserted += 1,
                Ok(false) => report.existing += 1,
                Err(e) => {
                    warn!("Failed to store episode {} of show {}: {e}", model.id, show.id);
                    report.failed += 1;
                }
            }
        }
        debug!(
            "Ingested episodes of show {}: {} new, {} existing, {} failed",
            show.id, report.inserted, report.existing, report.failed
        );
        report
    }

    /// Fetches episodes of `show` from its own provider and ingests them.
    pub async fn refresh(
        &self,
        show: &ShowModel,
        mode: IngestMode,
    ) -> Result<IngestReport, ServiceError> {
        let provider = self.providers.get(&show.provider)?;
        let candidates = match mode {
            IngestMode::Full => provider.list_episodes(&show.provider_id).await?,
            IngestMode::Upcoming => provider.list_upcoming_episodes(&show.provider_id).await?,
        };
        Ok(self.ingest(show, &candidates).await)
    }

    /// # Performance
    /// * DB calls: 1
    pub async fn list_for_show(&self, show_id: &str) -> Result<Vec<EpisodeModel>, ServiceError> {
        Ok(self.db.episode.select_all_by_show_id(show_id).await?)
    }

    /// # Performance
    /// * DB calls: 1
    pub async fn next_upcoming(
        &self,
        show_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<EpisodeModel>, ServiceError> {
        Ok(self.db.episode.select_next_upcoming(show_id, now).await?)
    }
}

fn to_episode_model(show_id: &str, candidate: &EpisodeCandidate) -> EpisodeModel {
    EpisodeModel {
        id: canonical_id(&candidate.provider, &candidate.provider_id),
        show_id: show_id.to_string(),
        name: candidate.name.clone(),
        season_number: candidate.season_number,
        episode_number: candidate.episode_number,
        air_date: candidate.air_date,
        overview: candidate.overview.clone(),
        provider: candidate.provider.clone(),
        provider_id: candidate.provider_id.clone(),
    }
}
