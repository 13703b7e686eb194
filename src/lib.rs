//! threadslapper - podcast feed to discussion thread bot
//!
//! Polls podcast feeds on a schedule, detects new episodes and publishes a
//! discussion thread per episode, plus an optional announcement in a second
//! channel.

pub mod config;
pub mod error;
pub mod feed;
pub mod html;
pub mod logging;
pub mod platform;
pub mod publish;
pub mod scheduler;

pub use config::{BotConfig, Config, FeedEntry, LoggingConfig, TargetEntry};
pub use error::{Result, SlapperError};
pub use feed::{
    extract, BreakerState, ColorTheme, EpisodeSnapshot, ErrorCircuitBreaker, FeedConfig,
    FeedSource, FieldKey, FieldSchema, HttpFeedSource, PublishTarget, RawDocument,
};
pub use platform::{
    Channel, ChannelKind, DiscordClient, Embed, Message, MessageRef, OutgoingMessage, Platform,
    ThreadHandle,
};
pub use publish::{Announcement, AnnouncementDeduper, PublishOrchestrator};
pub use scheduler::{FeedPoller, PollOutcome, PollScheduler};
