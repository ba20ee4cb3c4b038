use std::sync::Arc;

use crate::config::Config;
use crate::notifier::Notifier;
use crate::provider::providers::Providers;
use crate::repository::Repository;
use crate::service::episode_service::EpisodeService;
use crate::service::notification_service::NotificationService;
use crate::service::reconciliation_service::ReconciliationService;
use crate::service::subscription_service::SubscriptionService;

pub mod episode_service;
pub mod error;
pub mod notification_service;
pub mod reconciliation_service;
pub mod subscription_service;

pub struct Services {
    pub reconciliation: Arc<ReconciliationService>,
    pub episodes: Arc<EpisodeService>,
    pub subscriptions: Arc<SubscriptionService>,
    pub notifications: Arc<NotificationService>,
}

impl Services {
    pub fn new(
        config: &Config,
        db: Arc<Repository>,
        providers: Arc<Providers>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let episodes = Arc::new(EpisodeService::new(db.clone(), providers.clone()));

        Ok(Self {
            reconciliation: Arc::new(ReconciliationService::new(
                db.clone(),
                providers,
                config.max_results,
            )),
            subscriptions: Arc::new(SubscriptionService::new(
                db.clone(),
                episodes.clone(),
                config.max_followed_shows,
            )),
            notifications: Arc::new(NotificationService::new(
                db,
                notifier,
                config.episode_notification_threshold,
            )?),
            episodes,
        })
    }
}
