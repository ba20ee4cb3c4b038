//! Background task sweeping followed shows for due episodes.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use log::debug;
use log::error;
use log::info;
use log::warn;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::entity::ShowModel;
use crate::service::episode_service::EpisodeService;
use crate::service::episode_service::IngestMode;
use crate::service::notification_service::NotificationService;
use crate::service::subscription_service::SubscriptionService;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub shows: usize,
    /// Shows not started because a stop was requested.
    pub skipped_shows: usize,
    pub failed_shows: usize,
    pub refresh_failures: usize,
    pub due_episodes: usize,
    pub notifications_sent: usize,
    pub send_failures: usize,
    pub record_failures: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep was still running.
    Skipped,
}

enum ShowOutcome {
    Processed {
        refreshed: bool,
        due_episodes: usize,
        sent: usize,
        send_failures: usize,
        record_failures: usize,
        dispatch_failures: usize,
    },
    Failed,
    Skipped,
}

/// Periodically refreshes followed shows and notifies their followers.
///
/// One sweep runs at a time: the timer loop is sequential and a manual [`Self::sweep`]
/// during an active one returns [`SweepOutcome::Skipped`]. Shows inside a sweep are
/// processed concurrently, at most `workers` at once.
pub struct NotificationScheduler {
    subscriptions: Arc<SubscriptionService>,
    episodes: Arc<EpisodeService>,
    notifications: Arc<NotificationService>,
    check_interval: Duration,
    workers: usize,
    running: AtomicBool,
    sweeping: AtomicBool,
    stopping: AtomicBool,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationScheduler {
    pub fn new(
        subscriptions: Arc<SubscriptionService>,
        episodes: Arc<EpisodeService>,
        notifications: Arc<NotificationService>,
        check_interval: Duration,
        workers: usize,
    ) -> Arc<Self> {
        info!(
            "Initializing NotificationScheduler with interval {:?} and {} workers",
            check_interval, workers
        );
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            subscriptions,
            episodes,
            notifications,
            check_interval,
            workers: workers.max(1),
            running: AtomicBool::new(false),
            sweeping: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            shutdown,
            handle: Mutex::new(None),
        })
    }

    /// Starts the sweep loop. The first sweep runs immediately.
    pub fn start(self: Arc<Self>) -> anyhow::Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("NotificationScheduler is already running.");
            return Ok(());
        }
        self.stopping.store(false, Ordering::SeqCst);
        info!("Starting NotificationScheduler check loop.");

        let handle = self.clone().spawn_check_loop();
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Stops the loop and waits for it to exit.
    ///
    /// A sweep in progress finishes the shows it already started; the remaining ones
    /// are skipped.
    pub async fn stop(&self) {
        info!("Stopping NotificationScheduler check loop.");
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.send_replace(true);

        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!("NotificationScheduler loop ended abnormally: {e}");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn spawn_check_loop(self: Arc<Self>) -> JoinHandle<()> {
        let mut shutdown = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::spawn(async move {
            // Cleared on every exit, including a panic inside a sweep.
            let _running = FlagGuard(&self.running);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.changed() => break,
                }
                if self.stopping.load(Ordering::SeqCst) {
                    break;
                }
                match self.sweep(Utc::now()).await {
                    Ok(SweepOutcome::Completed(report)) => info!(
                        "Sweep finished: {} shows, {} due episodes, {} notifications sent, {} failed shows",
                        report.shows,
                        report.due_episodes,
                        report.notifications_sent,
                        report.failed_shows
                    ),
                    Ok(SweepOutcome::Skipped) => {}
                    Err(e) => error!("Error running notification sweep: {e}"),
                }
            }
            info!("NotificationScheduler check loop stopped.");
        })
    }

    /// Runs one full pass over every followed show, evaluating due episodes against `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> anyhow::Result<SweepOutcome> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Previous notification sweep is still running. Skipping.");
            return Ok(SweepOutcome::Skipped);
        }
        let _sweeping = FlagGuard(&self.sweeping);

        let shows = self.subscriptions.list_followed_shows().await?;
        debug!("Sweeping {} followed shows.", shows.len());

        let outcomes: Vec<ShowOutcome> = stream::iter(shows)
            .map(|show| self.process_show(show, now))
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut report = SweepReport {
            shows: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                ShowOutcome::Processed {
                    refreshed,
                    due_episodes,
                    sent,
                    send_failures,
                    record_failures,
                    dispatch_failures,
                } => {
                    if !refreshed {
                        report.refresh_failures += 1;
                    }
                    if dispatch_failures > 0 {
                        report.failed_shows += 1;
                    }
                    report.due_episodes += due_episodes;
                    report.notifications_sent += sent;
                    report.send_failures += send_failures;
                    report.record_failures += record_failures;
                }
                ShowOutcome::Failed => report.failed_shows += 1,
                ShowOutcome::Skipped => report.skipped_shows += 1,
            }
        }
        Ok(SweepOutcome::Completed(report))
    }

    async fn process_show(&self, show: ShowModel, now: DateTime<Utc>) -> ShowOutcome {
        if self.stopping.load(Ordering::SeqCst) {
            return ShowOutcome::Skipped;
        }

        // Stale episodes are still good enough to notify from.
        let refreshed = match self.episodes.refresh(&show, IngestMode::Upcoming).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "Failed to refresh upcoming episodes of {}: {e}",
                    self.get_show_desc(&show)
                );
                false
            }
        };

        let due = match self.notifications.due_episodes(&show.id, now).await {
            Ok(due) => due,
            Err(e) => {
                error!(
                    "Failed to evaluate due episodes of {}: {e}",
                    self.get_show_desc(&show)
                );
                return ShowOutcome::Failed;
            }
        };

        let due_episodes = due.len();
        let mut sent = 0;
        let mut send_failures = 0;
        let mut record_failures = 0;
        let mut dispatch_failures = 0;
        for episode in due {
            match self.notifications.dispatch(&show, &episode).await {
                Ok(report) => {
                    sent += report.sent;
                    send_failures += report.send_failures;
                    record_failures += report.record_failures;
                }
                Err(e) => {
                    error!(
                        "Failed to dispatch episode {} of {}: {e}",
                        episode.id,
                        self.get_show_desc(&show)
                    );
                    dispatch_failures += 1;
                }
            }
        }

        ShowOutcome::Processed {
            refreshed,
            due_episodes,
            sent,
            send_failures,
            record_failures,
            dispatch_failures,
        }
    }

    fn get_show_desc(&self, show: &ShowModel) -> String {
        format!("show id `{}` ({})", show.id, show.name)
    }
}

/// Clears a flag when dropped.
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
