//! Follow/unfollow management.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use log::info;
use log::warn;

use crate::entity::EpisodeModel;
use crate::entity::ShowModel;
use crate::entity::UserModel;
use crate::repository::Repository;
use crate::repository::table::Table;
use crate::service::episode_service::EpisodeService;
use crate::service::episode_service::IngestMode;
use crate::service::episode_service::IngestReport;
use crate::service::error::ServiceError;

/// Default lookahead for [`SubscriptionService::upcoming_for_user`].
pub const UPCOMING_WINDOW: Duration = Duration::from_secs(30 * 24 * 60 * 60);

pub struct SubscriptionService {
    pub db: Arc<Repository>,
    pub episodes: Arc<EpisodeService>,
    max_followed_shows: u32,
}

impl SubscriptionService {
    pub fn new(db: Arc<Repository>, episodes: Arc<EpisodeService>, max_followed_shows: u32) -> Self {
        Self {
            db,
            episodes,
            max_followed_shows,
        }
    }

    /// Mirrors the chat user's display metadata.
    ///
    /// # Performance
    /// * DB calls: 1
    pub async fn store_user(&self, user: &UserModel) -> Result<(), ServiceError> {
        Ok(self.db.user.upsert(user).await?)
    }

    /// # Performance
    /// * DB calls: 1
    pub async fn get_show(&self, show_id: &str) -> Result<Option<ShowModel>, ServiceError> {
        Ok(self.db.show.select(&show_id.to_string()).await?)
    }

    /// Follows a stored show.
    ///
    /// The first follow of a show by this user triggers a full episode ingestion. An
    /// ingestion failure is logged and the follow stays in place.
    ///
    /// # Performance
    /// * DB calls: 3 + 1? + N (ingestion)
    pub async fn follow(&self, user_id: i64, show_id: &str) -> Result<FollowResult, ServiceError> {
        // DB 1
        let show = self
            .get_show(show_id)
            .await?
            .ok_or_else(|| ServiceError::ShowNotFound {
                show_id: show_id.to_string(),
            })?;

        // DB 1
        if self.db.subscription.is_following(user_id, show_id).await? {
            return Ok(FollowResult::AlreadyFollowing { show });
        }

        // DB 1
        let count = self.db.subscription.count_by_user_id(user_id).await?;
        if count >= self.max_followed_shows {
            return Ok(FollowResult::LimitReached {
                limit: self.max_followed_shows,
            });
        }

        // DB 1?
        if !self.db.subscription.follow(user_id, show_id).await? {
            return Ok(FollowResult::AlreadyFollowing { show });
        }
        info!("User {user_id} followed show {show_id}");

        let ingested = match self.episodes.refresh(&show, IngestMode::Full).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Full episode ingestion for show {show_id} failed: {e}");
                None
            }
        };

        Ok(FollowResult::Success { show, ingested })
    }

    /// # Performance
    /// * DB calls: 1
    pub async fn unfollow(
        &self,
        user_id: i64,
        show_id: &str,
    ) -> Result<UnfollowResult, ServiceError> {
        if self.db.subscription.unfollow(user_id, show_id).await? {
            info!("User {user_id} unfollowed show {show_id}");
            Ok(UnfollowResult::Success {
                show_id: show_id.to_string(),
            })
        } else {
            Ok(UnfollowResult::NotFollowing {
                show_id: show_id.to_string(),
            })
        }
    }

    /// # Performance
    /// * DB calls: 1
    pub async fn is_following(&self, user_id: i64, show_id: &str) -> Result<bool, ServiceError> {
        Ok(self.db.subscription.is_following(user_id, show_id).await?)
    }

    /// # Performance
    /// * DB calls: 1
    pub async fn list_shows_for_user(&self, user_id: i64) -> Result<Vec<ShowModel>, ServiceError> {
        Ok(self.db.subscription.select_shows_by_user_id(user_id).await?)
    }

    /// Distinct shows with at least one follower.
    ///
    /// # Performance
    /// * DB calls: 1
    pub async fn list_followed_shows(&self) -> Result<Vec<ShowModel>, ServiceError> {
        Ok(self.db.subscription.select_all_followed_shows().await?)
    }

    /// Episodes of followed shows airing within `(now, now + window)`, by air date.
    ///
    /// # Performance
    /// * DB calls: 1
    pub async fn upcoming_for_user(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<EpisodeModel>, ServiceError> {
        let window = chrono::Duration::from_std(window).map_err(|e| {
            ServiceError::UnexpectedResult {
                message: format!("Invalid upcoming window: {e}"),
            }
        })?;
        Ok(self
            .db
            .episode
            .select_upcoming_by_user_id(user_id, now, now + window)
            .await?)
    }
}

#[derive(Debug)]
pub enum FollowResult {
    Success {
        show: ShowModel,
        /// `None` when episode ingestion failed.
        ingested: Option<IngestReport>,
    },
    AlreadyFollowing {
        show: ShowModel,
    },
    LimitReached {
        limit: u32,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub enum UnfollowResult {
    Success { show_id: String },
    NotFollowing { show_id: String },
}
