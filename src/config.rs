//! Configuration module for threadslapper.
//!
//! The configuration document is TOML. Feeds are listed under `[feeds]` as a
//! mapping from feed title to feed settings; their order in the file is the
//! order they are polled in. A single extra feed may be given inline under
//! `[feed]`.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::feed::{ColorTheme, FeedConfig, FieldSchema, PublishTarget, DEFAULT_MAX_FEED_ERRORS};
use crate::platform::DEFAULT_API_BASE_URL;
use crate::{Result, SlapperError};

/// Prefix of every environment variable read by [`Config::apply_env_overrides`].
pub const ENV_PREFIX: &str = "THREADSLAPPER_";

/// Name of the log file inside [`LoggingConfig::path`].
pub const LOG_FILE_NAME: &str = "discordbot.log";

/// Longest accepted poll interval in minutes (one week).
pub const MAX_CHECK_INTERVAL_MIN: u64 = 7 * 24 * 60;

/// Title given to the inline feed when it has none.
const INLINE_FEED_TITLE: &str = "RSS Feed";

fn deserialize_token<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|t| !t.is_empty())
        .map(SecretString::from))
}

/// Bot configuration.
#[derive(Debug, Deserialize)]
pub struct BotConfig {
    /// Bot token.
    #[serde(default, deserialize_with = "deserialize_token")]
    pub token: Option<SecretString>,
    /// Minutes between two polls of all feeds.
    #[serde(default = "default_check_interval")]
    pub check_interval_min: u64,
    /// Fetch every feed once before the first tick to seed watermarks.
    #[serde(default = "default_startup_check")]
    pub startup_latest_episode_check: bool,
    /// Failures a feed may have before it is disabled.
    #[serde(default = "default_max_feed_errors")]
    pub max_feed_errors: u32,
    /// REST API root.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_check_interval() -> u64 {
    5
}

fn default_startup_check() -> bool {
    true
}

fn default_max_feed_errors() -> u32 {
    DEFAULT_MAX_FEED_ERRORS
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl BotConfig {
    /// Poll interval as a duration.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_min.saturating_mul(60))
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            check_interval_min: default_check_interval(),
            startup_latest_episode_check: default_startup_check(),
            max_feed_errors: default_max_feed_errors(),
            api_base_url: default_api_base_url(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory of the log file.
    #[serde(default = "default_log_path")]
    pub path: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_path() -> String {
    ".".to_string()
}

impl LoggingConfig {
    /// Full path of the log file.
    pub fn file(&self) -> std::path::PathBuf {
        Path::new(&self.path).join(LOG_FILE_NAME)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            path: default_log_path(),
        }
    }
}

/// An additional publish target of a feed.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetEntry {
    pub channel_id: u64,
    #[serde(default)]
    pub announce_channel_id: Option<u64>,
}

/// One feed as written in the configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedEntry {
    /// Only read for the inline `[feed]`; mapped feeds use their key.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Defaults to the feed title.
    #[serde(default)]
    pub title_prefix: Option<String>,
    #[serde(default)]
    pub channel_id: Option<u64>,
    #[serde(default)]
    pub announce_channel_id: Option<u64>,
    #[serde(default)]
    pub subscriber_role_id: Option<u64>,
    #[serde(default)]
    pub rss_url: Option<String>,
    #[serde(default)]
    pub override_episode_numbers: bool,
    #[serde(default)]
    pub override_episode_check: bool,
    #[serde(default)]
    pub override_episode_prepend_title: bool,
    #[serde(default)]
    pub rss_feed_is_backwards: bool,
    #[serde(default)]
    pub rss_episode_key: Option<String>,
    #[serde(default)]
    pub rss_title_key: Option<String>,
    #[serde(default)]
    pub rss_description_key: Option<String>,
    #[serde(default)]
    pub rss_episode_url_key: Option<String>,
    #[serde(default)]
    pub rss_image_key: Option<String>,
    #[serde(default)]
    pub rss_tag_key: Option<String>,
    #[serde(default)]
    pub rss_channel_title_key: Option<String>,
    #[serde(default)]
    pub rss_channel_url_key: Option<String>,
    #[serde(default)]
    pub rss_channel_image_key: Option<String>,
    #[serde(default)]
    pub rss_channel_last_published_key: Option<String>,
    #[serde(default)]
    pub color_theme_r: u8,
    #[serde(default)]
    pub color_theme_g: u8,
    #[serde(default)]
    pub color_theme_b: u8,
    /// Further channels the feed publishes into.
    #[serde(default)]
    pub extra_targets: Vec<TargetEntry>,
}

fn default_enabled() -> bool {
    true
}

impl FeedEntry {
    fn field_schema(&self) -> FieldSchema {
        let defaults = FieldSchema::default();
        let pick = |custom: &Option<String>, default: String| custom.clone().unwrap_or(default);
        FieldSchema {
            episode_number: pick(&self.rss_episode_key, defaults.episode_number),
            title: pick(&self.rss_title_key, defaults.title),
            description: pick(&self.rss_description_key, defaults.description),
            episode_url: pick(&self.rss_episode_url_key, defaults.episode_url),
            image: pick(&self.rss_image_key, defaults.image),
            tags: pick(&self.rss_tag_key, defaults.tags),
            channel_title: pick(&self.rss_channel_title_key, defaults.channel_title),
            channel_url: pick(&self.rss_channel_url_key, defaults.channel_url),
            channel_image: pick(&self.rss_channel_image_key, defaults.channel_image),
            channel_last_published: pick(
                &self.rss_channel_last_published_key,
                defaults.channel_last_published,
            ),
        }
    }

    /// Turn the entry into a runtime feed, checking required fields.
    pub fn to_feed_config(&self, title: &str) -> Result<FeedConfig> {
        let channel_id = self
            .channel_id
            .ok_or_else(|| SlapperError::Config(format!("{}: channel_id is required", title)))?;
        let rss_url = self
            .rss_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| SlapperError::Config(format!("{}: rss_url is required", title)))?;
        url::Url::parse(rss_url)
            .map_err(|e| SlapperError::Config(format!("{}: invalid rss_url: {}", title, e)))?;

        let mut primary = PublishTarget::new(channel_id);
        primary.announce_channel_id = self.announce_channel_id;

        let mut feed = FeedConfig::new(title, rss_url, channel_id);
        feed.channel_targets = vec![primary];
        feed.channel_targets.extend(self.extra_targets.iter().map(|t| PublishTarget {
            publish_channel_id: t.channel_id,
            announce_channel_id: t.announce_channel_id,
        }));
        feed.enabled = self.enabled;
        feed.title_prefix = self.title_prefix.clone().unwrap_or_else(|| title.to_string());
        feed.field_schema = self.field_schema();
        feed.feed_is_reversed = self.rss_feed_is_backwards;
        feed.subscriber_group_id = self.subscriber_role_id;
        feed.override_numbering = self.override_episode_numbers;
        feed.override_always_publish = self.override_episode_check;
        feed.override_prepend_number = self.override_episode_prepend_title;
        feed.color_theme = ColorTheme::new(self.color_theme_r, self.color_theme_g, self.color_theme_b);
        Ok(feed)
    }
}

/// Main configuration structure.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Bot configuration.
    #[serde(default)]
    pub bot: BotConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Single inline feed.
    #[serde(default)]
    pub feed: Option<FeedEntry>,
    /// Feed title to feed settings, in file order.
    #[serde(default)]
    pub feeds: toml::Table,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(SlapperError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| SlapperError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `THREADSLAPPER_TOKEN`: bot token
    /// - `THREADSLAPPER_CHECK_INTERVAL_MIN`: poll interval in minutes
    /// - `THREADSLAPPER_LOG_PATH`: directory of the log file
    /// - `THREADSLAPPER_RSS_FEED`: URL of the inline feed
    /// - `THREADSLAPPER_CHANNEL_ID`: channel of the inline feed
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`, which receives full variable names.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}")).filter(|v| !v.trim().is_empty())
        };

        if let Some(token) = var("TOKEN") {
            self.bot.token = Some(SecretString::from(token));
        }
        if let Some(interval) = var("CHECK_INTERVAL_MIN") {
            self.bot.check_interval_min = interval.trim().parse().map_err(|_| {
                SlapperError::Config(format!(
                    "{ENV_PREFIX}CHECK_INTERVAL_MIN is not a number: {interval}"
                ))
            })?;
        }
        if let Some(path) = var("LOG_PATH") {
            self.logging.path = path;
        }
        if let Some(rss_url) = var("RSS_FEED") {
            self.feed.get_or_insert_with(inline_feed).rss_url = Some(rss_url);
        }
        if let Some(channel) = var("CHANNEL_ID") {
            let channel_id = channel.trim().parse().map_err(|_| {
                SlapperError::Config(format!("{ENV_PREFIX}CHANNEL_ID is not a number: {channel}"))
            })?;
            self.feed.get_or_insert_with(inline_feed).channel_id = Some(channel_id);
        }
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - no bot token is set
    /// - the poll interval is zero or longer than [`MAX_CHECK_INTERVAL_MIN`]
    /// - any feed is invalid (see [`Config::feed_configs`])
    pub fn validate(&self) -> Result<()> {
        if self.bot.token.is_none() {
            return Err(SlapperError::Config(format!(
                "bot token is not set. Set it in the config file or via {ENV_PREFIX}TOKEN."
            )));
        }
        if self.bot.check_interval_min == 0 {
            return Err(SlapperError::Config(
                "check_interval_min must be at least 1".to_string(),
            ));
        }
        if self.bot.check_interval_min > MAX_CHECK_INTERVAL_MIN {
            return Err(SlapperError::Config(format!(
                "check_interval_min must be at most {MAX_CHECK_INTERVAL_MIN}"
            )));
        }
        self.feed_configs()?;
        Ok(())
    }

    /// Build the runtime feeds: the inline feed first, then `[feeds]` in file
    /// order.
    ///
    /// Fails on a missing channel id or feed URL, on duplicate titles and
    /// when no feed is configured at all.
    pub fn feed_configs(&self) -> Result<Vec<FeedConfig>> {
        let mut feeds = Vec::with_capacity(self.feeds.len() + 1);

        if let Some(entry) = &self.feed {
            let title = entry.title.clone().unwrap_or_else(|| INLINE_FEED_TITLE.to_string());
            feeds.push(entry.to_feed_config(&title)?);
        }

        for (title, value) in &self.feeds {
            let entry: FeedEntry = value
                .clone()
                .try_into()
                .map_err(|e| SlapperError::Config(format!("{}: {}", title, e)))?;
            feeds.push(entry.to_feed_config(title)?);
        }

        if feeds.is_empty() {
            return Err(SlapperError::Config("no feeds configured".to_string()));
        }

        let mut seen = HashSet::new();
        for feed in &feeds {
            if !seen.insert(feed.title.as_str()) {
                return Err(SlapperError::Config(format!(
                    "duplicate feed title: {}",
                    feed.title
                )));
            }
        }

        Ok(feeds)
    }
}

fn inline_feed() -> FeedEntry {
    FeedEntry {
        enabled: true,
        ..FeedEntry::default()
    }
}
