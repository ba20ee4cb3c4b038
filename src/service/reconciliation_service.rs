//! Multi-provider show search and deduplication.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use log::debug;
use log::info;
use log::warn;

use crate::entity::ShowModel;
use crate::entity::canonical_id;
use crate::provider::ShowCandidate;
use crate::provider::providers::Providers;
use crate::repository::Repository;
use crate::service::error::ServiceError;

/// Turns raw provider search hits into canonical, persisted shows.
pub struct ReconciliationService {
    pub db: Arc<Repository>,
    pub providers: Arc<Providers>,
    max_results: usize,
}

impl ReconciliationService {
    pub fn new(db: Arc<Repository>, providers: Arc<Providers>, max_results: usize) -> Self {
        Self {
            db,
            providers,
            max_results,
        }
    }

    /// Searches every provider and returns at most `max_results` canonical shows.
    ///
    /// A failing provider or a show that cannot be stored only shrinks the result.
    /// Every discovered show is persisted before the list is truncated.
    ///
    /// # Performance
    /// * Provider calls: 1 per provider, concurrently
    /// * DB calls: 1-4 per group
    pub async fn search(&self, query: &str) -> Vec<ShowModel> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let candidates = self.collect_candidates(query).await;
        let groups = group_candidates(candidates);
        debug!("Search `{query}` produced {} candidate groups", groups.len());

        let mut seen = HashSet::new();
        let mut shows = Vec::with_capacity(groups.len());
        for group in groups {
            let Some(best) = pick_best(group) else {
                continue;
            };
            match self.store_show(&best).await {
                Ok(show) => {
                    if seen.insert(show.id.clone()) {
                        shows.push(show);
                    }
                }
                Err(e) => warn!(
                    "Failed to store show {}:{} ({}): {e}",
                    best.provider, best.provider_id, best.name
                ),
            }
        }

        info!("Search `{query}` resolved to {} shows", shows.len());
        shows.truncate(self.max_results);
        shows
    }

    /// Stores a candidate as a canonical show.
    ///
    /// Merges into the show with the same cross-reference ID first, then into the show
    /// with the same provenance, and inserts otherwise.
    pub async fn store_show(&self, candidate: &ShowCandidate) -> Result<ShowModel, ServiceError> {
        let model = to_show_model(candidate);
        if let Some(existing) = self.db.show.upsert_by_cross_ref(&model).await? {
            return Ok(existing);
        }
        Ok(self.db.show.upsert_by_provenance(&model).await?)
    }

    async fn collect_candidates(&self, query: &str) -> Vec<ShowCandidate> {
        let providers = self.providers.get_all_providers();
        let results = join_all(providers.iter().map(|p| p.search_shows(query))).await;

        let mut candidates = Vec::new();
        for (provider, result) in providers.iter().zip(results) {
            match result {
                Ok(mut found) => {
                    debug!("{} returned {} results", provider.name(), found.len());
                    candidates.append(&mut found);
                }
                Err(e) => warn!("Search on provider {} failed: {e}", provider.name()),
            }
        }
        candidates
    }
}

/// Groups candidates sharing a cross-reference ID, in first-seen order.
///
/// Candidates without one each form their own group.
pub fn group_candidates(candidates: Vec<ShowCandidate>) -> Vec<Vec<ShowCandidate>> {
    let mut groups: Vec<Vec<ShowCandidate>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        match candidate.cross_ref_id.clone() {
            Some(cross_ref_id) => match index.get(&cross_ref_id) {
                Some(&i) => groups[i].push(candidate),
                None => {
                    index.insert(cross_ref_id, groups.len());
                    groups.push(vec![candidate]);
                }
            },
            None => groups.push(vec![candidate]),
        }
    }
    groups
}

/// Highest completeness score wins; the earliest candidate wins a tie.
pub fn pick_best(group: Vec<ShowCandidate>) -> Option<ShowCandidate> {
    group.into_iter().fold(None, |best, candidate| match best {
        Some(best) if best.completeness_score() >= candidate.completeness_score() => Some(best),
        _ => Some(candidate),
    })
}

fn to_show_model(candidate: &ShowCandidate) -> ShowModel {
    ShowModel {
        id: canonical_id(&candidate.provider, &candidate.provider_id),
        name: candidate.name.clone(),
        overview: candidate.overview.clone(),
        poster_url: candidate.poster_url.clone(),
        status: candidate.status,
        first_air_date: candidate.first_air_date,
        provider: candidate.provider.clone(),
        provider_id: candidate.provider_id.clone(),
        cross_ref_id: candidate.cross_ref_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(provider: &str, id: &str, cross_ref: Option<&str>, overview: &str) -> ShowCandidate {
        ShowCandidate {
            provider: provider.to_string(),
            provider_id: id.to_string(),
            name: "Foo".to_string(),
            overview: overview.to_string(),
            cross_ref_id: cross_ref.map(|s| s.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_group_candidates_keeps_first_seen_order() {
        let groups = group_candidates(vec![
            candidate("a", "1", Some("tt1"), ""),
            candidate("a", "2", None, ""),
            candidate("b", "9", Some("tt1"), "plot"),
            candidate("b", "8", None, ""),
        ]);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1][0].provider_id, "2");
        assert_eq!(groups[2][0].provider_id, "8");
    }

    #[test]
    fn test_pick_best_prefers_score_then_order() {
        let best = pick_best(vec![
            candidate("a", "1", Some("tt1"), ""),
            candidate("b", "9", Some("tt1"), "plot"),
        ])
        .unwrap();
        assert_eq!(best.provider, "b");

        let tie = pick_best(vec![
            candidate("a", "1", Some("tt1"), "plot"),
            candidate("b", "9", Some("tt1"), "plot"),
        ])
        .unwrap();
        assert_eq!(tie.provider, "a");

        assert!(pick_best(Vec::new()).is_none());
    }
}
