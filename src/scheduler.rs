//! Periodic poll loop.
//!
//! One loop owns every [`FeedConfig`] and processes the feeds in configured
//! order, one at a time. A failing feed is counted by the circuit breaker and
//! never keeps the other feeds from being polled.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SlapperError};
use crate::feed::{
    extract, watermark, EpisodeSnapshot, ErrorCircuitBreaker, FeedConfig, FeedSource,
    PublishTarget,
};
use crate::platform::Platform;
use crate::publish::{episode_embed, AnnouncementDeduper, PublishOrchestrator};

/// Default poll interval in minutes.
pub const DEFAULT_CHECK_INTERVAL_MIN: u64 = 5;

/// What one poll did for one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A new episode was found; `threads` threads were created or found.
    Published { episode: i64, threads: usize },
    /// The latest episode was already seen.
    NoUpdate,
    /// The feed is disabled by configuration or by the circuit breaker.
    Skipped,
    /// Processing failed; the failure was counted.
    Failed(String),
}

/// Processes single feeds. Holds everything but the feeds themselves.
pub struct FeedPoller {
    source: Arc<dyn FeedSource>,
    platform: Arc<dyn Platform>,
    orchestrator: PublishOrchestrator,
    announcer: AnnouncementDeduper,
    breaker: ErrorCircuitBreaker,
}

impl FeedPoller {
    pub fn new(source: Arc<dyn FeedSource>, platform: Arc<dyn Platform>) -> Self {
        Self {
            orchestrator: PublishOrchestrator::new(platform.clone()),
            announcer: AnnouncementDeduper::new(platform.clone()),
            source,
            platform,
            breaker: ErrorCircuitBreaker::default(),
        }
    }

    pub fn breaker(&self) -> &ErrorCircuitBreaker {
        &self.breaker
    }

    /// Fetch the feed and extract its latest episode.
    pub async fn latest_episode(&self, feed: &FeedConfig) -> Result<EpisodeSnapshot> {
        let raw = self.source.fetch(&feed.source_uri).await?;
        extract(
            &raw,
            &feed.field_schema,
            feed.feed_is_reversed,
            feed.override_numbering,
        )
    }

    /// Poll one feed. Never fails; errors are counted and reported as
    /// [`PollOutcome::Failed`].
    ///
    /// Every publish target is tried even when an earlier one fails. Any
    /// target failure counts as one failure of the feed.
    pub async fn poll(&self, feed: &mut FeedConfig) -> PollOutcome {
        if !feed.enabled {
            debug!("{}: Is disabled, skipping.", feed.title);
            return PollOutcome::Skipped;
        }
        if self.breaker.is_tripped(feed) {
            warn!("{}: Too many errors, skipping.", feed.title);
            return PollOutcome::Skipped;
        }

        match self.process(feed).await {
            Ok(Some((episode, threads))) => PollOutcome::Published { episode, threads },
            Ok(None) => {
                debug!("{}: No updates.", feed.title);
                PollOutcome::NoUpdate
            }
            Err(e) => {
                error!("{}: {}", feed.title, e);
                self.breaker.record_failure(feed);
                PollOutcome::Failed(e.to_string())
            }
        }
    }

    async fn process(&self, feed: &mut FeedConfig) -> Result<Option<(i64, usize)>> {
        let snapshot = self.latest_episode(feed).await?;
        let Some(episode) = watermark::check(feed, snapshot, None) else {
            return Ok(None);
        };
        info!("{}: New episode found: {}", feed.title, episode.number);

        let feed: &FeedConfig = feed;
        let title = episode.display_title(&feed.title_prefix, feed.override_prepend_number);
        let mut threads = 0;
        let mut first_error = None;

        for target in &feed.channel_targets {
            match self.publish_to(feed, target, &title, &episode).await {
                Ok(true) => threads += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        "{}: channel {} failed: {}",
                        feed.title, target.publish_channel_id, e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(Some((episode.number, threads))),
        }
    }

    /// Publish into one target. Returns whether a thread was created or
    /// found.
    async fn publish_to(
        &self,
        feed: &FeedConfig,
        target: &PublishTarget,
        title: &str,
        episode: &EpisodeSnapshot,
    ) -> Result<bool> {
        let channel = self
            .platform
            .get_channel(target.publish_channel_id)
            .await?
            .ok_or_else(|| {
                SlapperError::Publish(format!("channel {} not found", target.publish_channel_id))
            })?;

        let Some(thread) = self.orchestrator.publish(&channel, title, episode, feed).await? else {
            return Ok(false);
        };

        let embed = episode_embed(feed, episode, true);
        self.announcer
            .announce(&feed.title, target.announce_channel_id, title, &thread, embed)
            .await?;
        self.orchestrator.add_subscribers(feed, &thread).await;
        Ok(true)
    }
}

/// Drives [`FeedPoller`] over all feeds on a fixed interval.
pub struct PollScheduler {
    feeds: Vec<FeedConfig>,
    poller: FeedPoller,
    check_interval: Duration,
}

impl PollScheduler {
    pub fn new(
        feeds: Vec<FeedConfig>,
        source: Arc<dyn FeedSource>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            feeds,
            poller: FeedPoller::new(source, platform),
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_MIN * 60),
        }
    }

    /// Create a scheduler with a custom check interval.
    pub fn with_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    pub fn with_breaker(mut self, breaker: ErrorCircuitBreaker) -> Self {
        self.poller.breaker = breaker;
        self
    }

    pub fn feeds(&self) -> &[FeedConfig] {
        &self.feeds
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Fetch every enabled feed once and seed its watermark without
    /// publishing.
    ///
    /// Any failure, including a feed without episodes, is a configuration
    /// error.
    pub async fn startup_check(&mut self) -> Result<()> {
        let titles: Vec<&str> = self.feeds.iter().map(|f| f.title.as_str()).collect();
        info!("Beginning first time check of RSS feeds... {}", titles.join(", "));

        for feed in self.feeds.iter_mut().filter(|f| f.enabled) {
            let snapshot = self.poller.latest_episode(feed).await.map_err(|e| {
                SlapperError::Config(format!("{}: startup check failed: {}", feed.title, e))
            })?;
            match watermark::check(feed, snapshot, None) {
                Some(episode) => info!(
                    "{}: Latest episode checked on startup: {}.",
                    feed.title, episode.number
                ),
                None => {
                    return Err(SlapperError::Config(format!(
                        "{}: No episode data found! Please check the feed URL",
                        feed.title
                    )));
                }
            }
        }
        Ok(())
    }

    /// Poll every feed once, in order.
    pub async fn run_tick(&mut self) -> Vec<PollOutcome> {
        info!("Checking RSS feeds...");
        let mut outcomes = Vec::with_capacity(self.feeds.len());
        for feed in self.feeds.iter_mut() {
            outcomes.push(self.poller.poll(feed).await);
        }
        outcomes
    }

    /// Run the poll loop until `shutdown` turns `true`.
    ///
    /// A tick in progress when shutdown is requested runs to completion.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Poll scheduler started (check interval: {} seconds)",
            self.check_interval.as_secs()
        );

        let mut timer = interval(self.check_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = timer.tick() => {
                    self.run_tick().await;
                }
                Ok(()) = shutdown.changed() => {}
            }
        }

        info!("Poll scheduler stopped");
    }
}

