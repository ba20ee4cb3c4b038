//! Due-episode evaluation and at-most-once dispatch.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use log::debug;
use log::error;
use log::info;
use log::warn;

use crate::entity::EpisodeModel;
use crate::entity::ShowModel;
use crate::notifier::Notifier;
use crate::provider::clean_overview;
use crate::repository::Repository;
use crate::service::error::ServiceError;

const OVERVIEW_LIMIT: usize = 150;

/// Whether `air_date` falls in the open window `(now, now + threshold)`.
pub fn is_within_window(air_date: DateTime<Utc>, now: DateTime<Utc>, threshold: TimeDelta) -> bool {
    air_date > now && air_date - now < threshold
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Sent and recorded.
    pub sent: usize,
    pub send_failures: usize,
    /// Sent, but the record write failed. The user may be notified again next sweep.
    pub record_failures: usize,
    /// Sent, but a concurrent dispatch recorded the pair first.
    pub already_recorded: usize,
}

pub struct NotificationService {
    pub db: Arc<Repository>,
    pub notifier: Arc<dyn Notifier>,
    threshold: TimeDelta,
}

impl NotificationService {
    pub fn new(
        db: Arc<Repository>,
        notifier: Arc<dyn Notifier>,
        threshold: Duration,
    ) -> Result<Self, ServiceError> {
        let threshold = TimeDelta::from_std(threshold).map_err(|e| ServiceError::UnexpectedResult {
            message: format!("Invalid notification threshold: {e}"),
        })?;
        Ok(Self {
            db,
            notifier,
            threshold,
        })
    }

    /// Persisted episodes of the show airing within `(now, now + threshold)`.
    ///
    /// # Performance
    /// * DB calls: 1
    pub async fn due_episodes(
        &self,
        show_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<EpisodeModel>, ServiceError> {
        let until = now
            .checked_add_signed(self.threshold)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let episodes = self
            .db
            .episode
            .select_airing_between(show_id, now, until)
            .await?;
        Ok(episodes
            .into_iter()
            .filter(|e| {
                e.air_date
                    .is_some_and(|air| is_within_window(air, now, self.threshold))
            })
            .collect())
    }

    /// Notifies every follower of `show` not yet notified about `episode`.
    ///
    /// Recipients come from current storage state, so a user with a record is never
    /// picked again. Each message is sent first and recorded afterwards; a failed send
    /// leaves no record and the user is retried by the next sweep.
    ///
    /// # Performance
    /// * DB calls: 1 + N
    pub async fn dispatch(
        &self,
        show: &ShowModel,
        episode: &EpisodeModel,
    ) -> Result<DispatchReport, ServiceError> {
        // DB 1
        let users = self
            .db
            .notification
            .select_users_to_notify(&episode.id, &show.id)
            .await?;
        if users.is_empty() {
            return Ok(DispatchReport::default());
        }

        debug!(
            "Dispatching episode {} of show {} to {} users",
            episode.id,
            show.id,
            users.len()
        );
        let text = render_message(show, episode);
        let mut report = DispatchReport::default();

        for user_id in users {
            if let Err(e) = self.notifier.send(user_id, &text).await {
                warn!("Failed to notify user {user_id} about episode {}: {e}", episode.id);
                report.send_failures += 1;
                continue;
            }

            // DB N
            match self
                .db
                .notification
                .record(user_id, &episode.id, Utc::now())
                .await
            {
                Ok(true) => report.sent += 1,
                Ok(false) => report.already_recorded += 1,
                Err(e) => {
                    error!(
                        "Notified user {user_id} about episode {} but failed to record it: {e}",
                        episode.id
                    );
                    report.record_failures += 1;
                }
            }
        }

        if report.sent > 0 {
            info!(
                "Notified {} users about {} S{}E{}",
                report.sent, show.name, episode.season_number, episode.episode_number
            );
        }
        Ok(report)
    }
}

/// Renders the episode alert in Telegram Markdown.
///
/// Provider text is escaped, and the overview is cut as plain text before escaping,
/// so the message never carries an unbalanced entity.
pub fn render_message(show: &ShowModel, episode: &EpisodeModel) -> String {
    let mut message = format!(
        "🔔 *New Episode Alert* 🔔\n\n*{}*\nSeason {}, Episode {}: {}",
        escape_markdown(&show.name),
        episode.season_number,
        episode.episode_number,
        escape_markdown(&episode.name)
    );

    if let Some(air_date) = episode.air_date {
        message.push_str(&format!("\n\nAirs on {}", air_date.format("%A, %B %-d, %Y")));
    }

    let overview = clean_overview(&episode.overview);
    if !overview.is_empty() {
        message.push_str("\n\n");
        message.push_str(&escape_markdown(&truncate(&overview, OVERVIEW_LIMIT)));
    }
    message
}

/// Escapes the characters Telegram's legacy Markdown treats as entity markers.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_is_within_window() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let threshold = TimeDelta::days(7);
        assert!(!is_within_window(now - TimeDelta::seconds(1), now, threshold));
        assert!(!is_within_window(now, now, threshold));
        assert!(is_within_window(now + threshold / 2, now, threshold));
        assert!(!is_within_window(now + threshold, now, threshold));
        assert!(!is_within_window(
            now + threshold + TimeDelta::seconds(1),
            now,
            threshold
        ));
    }

    #[test]
    fn test_render_message() {
        let show = ShowModel {
            name: "Severance".to_string(),
            ..Default::default()
        };
        let episode = EpisodeModel {
            name: "Hello, Ms. Cobel".to_string(),
            season_number: 2,
            episode_number: 1,
            air_date: Some(Utc.with_ymd_and_hms(2025, 1, 17, 2, 0, 0).unwrap()),
            overview: "<p>Mark returns.</p>".to_string(),
            ..Default::default()
        };
        assert_eq!(
            render_message(&show, &episode),
            "🔔 *New Episode Alert* 🔔\n\n*Severance*\nSeason 2, Episode 1: Hello, Ms. Cobel\n\nAirs on Friday, January 17, 2025\n\nMark returns."
        );
    }

    /// Unescaped occurrences of `marker`.
    fn count_markers(text: &str, marker: char) -> usize {
        let mut count = 0;
        let mut escaped = false;
        for c in text.chars() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == marker {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn test_render_message_keeps_entities_balanced() {
        let show = ShowModel {
            name: "Mr_Robot".to_string(),
            ..Default::default()
        };
        let episode = EpisodeModel {
            name: "eps1.0_hellofriend.mov".to_string(),
            season_number: 1,
            episode_number: 1,
            overview: format!("{} <b>Mark</b> returns.", "x".repeat(140)),
            ..Default::default()
        };

        let message = render_message(&show, &episode);

        assert!(message.contains("*Mr\\_Robot*"));
        assert!(message.contains("eps1.0\\_hellofriend.mov"));
        assert_eq!(count_markers(&message, '*'), 4);
        assert_eq!(count_markers(&message, '_'), 0);

        let overview = message.rsplit("\n\n").next().unwrap();
        assert!(overview.starts_with(&"x".repeat(140)));
        assert!(overview.ends_with("..."));
        assert!(!overview.contains('*'));
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b*c`d[e]"), "a\\_b\\*c\\`d\\[e]");
        assert_eq!(escape_markdown("plain"), "plain");
    }

    #[test]
    fn test_truncate() {
        let long = "é".repeat(200);
        let cut = truncate(&long, 150);
        assert_eq!(cut.chars().count(), 150);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate("short", 150), "short");
    }
}
