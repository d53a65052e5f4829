//! Background keyword monitor.
//!
//! A [`MonitorScheduler`] owns the running flag and at most one loop task.
//! Each cycle reads the active feeds and keywords, fetches every feed in
//! order, and stores entries whose title or description mention a keyword.
//! Every wait inside the loop is sliced into short steps so `stop()` is
//! observed quickly; an in-flight fetch is never aborted.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::Config;
use crate::db::ArticleStore;
use crate::error::Result;
use crate::feed::{EntrySource, FeedFetcher, RawEntry};
use crate::models::{ActiveFeed, InsertOutcome, NewArticle, StatusSummary};
use crate::text::{normalize, truncate_chars, KeywordMatcher};

/// Stored descriptions are cut to this many characters.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Wait between the end of one cycle and the start of the next.
    pub scan_interval: Duration,
    /// Delay between consecutive feeds within a cycle.
    pub feed_delay: Duration,
    /// Wait after a cycle that failed outright.
    pub error_backoff: Duration,
    /// How long `stop()` waits for the loop to exit.
    pub stop_timeout: Duration,
    /// Granularity at which waits re-check the running flag.
    pub check_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(1800),
            feed_delay: Duration::from_secs(2),
            error_backoff: Duration::from_secs(60),
            stop_timeout: Duration::from_secs(5),
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

impl From<&Config> for MonitorSettings {
    fn from(config: &Config) -> Self {
        Self {
            scan_interval: Duration::from_secs(config.scan_interval_secs),
            feed_delay: Duration::from_secs(config.feed_delay_secs),
            error_backoff: Duration::from_secs(config.error_backoff_secs),
            stop_timeout: Duration::from_secs(config.stop_timeout_secs),
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub feeds_scanned: usize,
    pub feeds_failed: usize,
    pub entries_seen: usize,
    pub articles_stored: usize,
    pub duplicates_skipped: usize,
    pub entry_errors: usize,
    /// The loop was stopped before every feed was visited.
    pub interrupted: bool,
}

enum EntryOutcome {
    Stored,
    AlreadySeen,
    Unmatched,
}

struct Shared<S> {
    store: Arc<ArticleStore>,
    source: S,
    settings: MonitorSettings,
    running: AtomicBool,
    // Bumped on every start; a loop only continues while its generation is current.
    generation: AtomicU64,
    wake: Notify,
}

pub struct MonitorScheduler<S: EntrySource = FeedFetcher> {
    shared: Arc<Shared<S>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorScheduler<FeedFetcher> {
    pub fn from_config(store: Arc<ArticleStore>, config: &Config) -> Result<Self> {
        let fetcher = FeedFetcher::new(
            Duration::from_secs(config.fetch_timeout_secs),
            config.max_entries_per_feed,
        )?;
        Ok(Self::new(store, fetcher, MonitorSettings::from(config)))
    }
}

impl<S: EntrySource> MonitorScheduler<S> {
    pub fn new(store: Arc<ArticleStore>, source: S, mut settings: MonitorSettings) -> Self {
        if settings.check_interval.is_zero() {
            settings.check_interval = DEFAULT_CHECK_INTERVAL;
        }

        Self {
            shared: Arc::new(Shared {
                store,
                source,
                settings,
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                wake: Notify::new(),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<ArticleStore> {
        &self.shared.store
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Starts the background loop. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if self.shared.running.load(Ordering::SeqCst) {
            return false;
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(shared.run_loop(generation)));

        tracing::info!(generation, "Monitoring started");
        true
    }

    /// Signals the loop to exit and waits for it, up to the stop timeout.
    ///
    /// Returns `false` if the loop was still busy (typically inside a fetch)
    /// when the timeout elapsed; it then exits on its own at the next check.
    pub async fn stop(&self) -> bool {
        let mut task = self.task.lock().await;
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return true;
        }
        self.shared.wake.notify_waiters();

        let Some(mut handle) = task.take() else {
            return true;
        };

        match tokio::time::timeout(self.shared.settings.stop_timeout, &mut handle).await {
            Ok(Ok(())) => {
                tracing::info!("Monitoring stopped");
                true
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Monitor task ended abnormally");
                true
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.shared.settings.stop_timeout.as_secs_f64(),
                    "Monitor loop did not exit in time, leaving it to finish in the background"
                );
                false
            }
        }
    }

    /// Runs one cycle now, whether or not the loop is running.
    pub async fn manual_scan(&self) -> Result<CycleReport> {
        tracing::info!("Manual scan requested");
        let report = self.shared.run_cycle(None).await?;
        log_report(&report);
        Ok(report)
    }

    pub async fn status(&self) -> Result<StatusSummary> {
        self.shared.store.status_summary(self.is_running()).await
    }
}

impl<S: EntrySource> Drop for MonitorScheduler<S> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wake.notify_waiters();
    }
}

impl<S: EntrySource> Shared<S> {
    fn is_live(&self, generation: u64) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run_loop(self: Arc<Self>, generation: u64) {
        while self.is_live(generation) {
            let cycle = AssertUnwindSafe(self.run_cycle(Some(generation)))
                .catch_unwind()
                .await;

            let wait = match cycle {
                Ok(Ok(report)) => {
                    log_report(&report);
                    self.settings.scan_interval
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        error = %e,
                        backoff_secs = self.settings.error_backoff.as_secs_f64(),
                        "Scan cycle failed, backing off"
                    );
                    self.settings.error_backoff
                }
                Err(_) => {
                    tracing::error!(
                        backoff_secs = self.settings.error_backoff.as_secs_f64(),
                        "Scan cycle panicked, backing off"
                    );
                    self.settings.error_backoff
                }
            };

            if !self.pause(generation, wait).await {
                break;
            }
        }

        tracing::debug!(generation, "Monitor loop exited");
    }

    /// Sleeps for `duration` in `check_interval` slices. Returns `false` as
    /// soon as the loop is no longer live.
    async fn pause(&self, generation: u64, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if !self.is_live(generation) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let step = (deadline - now).min(self.settings.check_interval);
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = self.wake.notified() => {}
            }
        }
    }

    async fn between_feeds(&self, generation: Option<u64>) -> bool {
        match generation {
            Some(generation) => self.pause(generation, self.settings.feed_delay).await,
            None => {
                tokio::time::sleep(self.settings.feed_delay).await;
                true
            }
        }
    }

    /// One pass over every active feed. `generation` is `None` for manual scans,
    /// which are not interrupted by `stop()`.
    async fn run_cycle(&self, generation: Option<u64>) -> Result<CycleReport> {
        let feeds = self.store.active_feeds().await?;
        let keywords = self.store.active_keywords().await?;
        let mut report = CycleReport::default();

        if feeds.is_empty() || keywords.is_empty() {
            tracing::info!(
                feeds = feeds.len(),
                keywords = keywords.len(),
                "No active feeds or keywords, skipping scan"
            );
            return Ok(report);
        }

        let matcher = KeywordMatcher::new(&keywords);
        for (index, feed) in feeds.iter().enumerate() {
            if index > 0 && !self.between_feeds(generation).await {
                report.interrupted = true;
                break;
            }
            self.scan_feed(feed, &matcher, &mut report).await;
        }

        Ok(report)
    }

    async fn scan_feed(&self, feed: &ActiveFeed, matcher: &KeywordMatcher, report: &mut CycleReport) {
        let entries = match self.source.fetch_entries(&feed.url).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(feed = %feed.name, url = %feed.url, error = %e, "FetchFailed");
                report.feeds_failed += 1;
                return;
            }
        };
        report.feeds_scanned += 1;

        let mut stored = 0;
        for entry in entries {
            report.entries_seen += 1;
            let link = entry.link.clone();
            match self.process_entry(feed, entry, matcher).await {
                Ok(EntryOutcome::Stored) => {
                    stored += 1;
                    report.articles_stored += 1;
                }
                Ok(EntryOutcome::AlreadySeen) => report.duplicates_skipped += 1,
                Ok(EntryOutcome::Unmatched) => {}
                Err(e) => {
                    report.entry_errors += 1;
                    tracing::warn!(feed = %feed.name, link = %link, error = %e, "Failed to process entry");
                }
            }
        }

        if stored > 0 {
            tracing::info!(feed = %feed.name, stored, "Stored matching articles");
        } else {
            tracing::debug!(feed = %feed.name, "No new matching articles");
        }
    }

    async fn process_entry(
        &self,
        feed: &ActiveFeed,
        entry: RawEntry,
        matcher: &KeywordMatcher,
    ) -> Result<EntryOutcome> {
        if self.store.exists(&entry.link).await? {
            return Ok(EntryOutcome::AlreadySeen);
        }

        let title = normalize(&entry.title);
        let description = normalize(&entry.description);
        let matched = matcher.find(&format!("{title} {description}"));
        if matched.is_empty() {
            return Ok(EntryOutcome::Unmatched);
        }

        let article = NewArticle {
            title,
            description: truncate_chars(&description, MAX_DESCRIPTION_CHARS),
            link: entry.link,
            feed_name: feed.name.clone(),
            matched_keywords: matched,
            published_at: entry.published,
        };

        // exists() and insert are separate calls, so a concurrent scan may win the race
        match self.store.insert_article(article).await? {
            InsertOutcome::Created(id) => {
                tracing::debug!(id, feed = %feed.name, "Stored article");
                Ok(EntryOutcome::Stored)
            }
            InsertOutcome::AlreadyExists => Ok(EntryOutcome::AlreadySeen),
        }
    }
}

fn log_report(report: &CycleReport) {
    tracing::info!(
        feeds_scanned = report.feeds_scanned,
        feeds_failed = report.feeds_failed,
        entries = report.entries_seen,
        stored = report.articles_stored,
        duplicates = report.duplicates_skipped,
        entry_errors = report.entry_errors,
        interrupted = report.interrupted,
        "Scan cycle finished"
    );
}
