//! Feed types for threadslapper.

use serde_json::{Map, Value};

/// Default number of processing failures tolerated before a feed is disabled.
pub const DEFAULT_MAX_FEED_ERRORS: u32 = 5;

/// Logical fields read out of a feed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey {
    EpisodeNumber,
    Title,
    Description,
    EpisodeUrl,
    Image,
    Tags,
    ChannelTitle,
    ChannelUrl,
    ChannelImage,
    ChannelLastPublished,
}

/// Maps every [`FieldKey`] to the provider-specific key used by one feed.
///
/// Resolved once when the configuration is loaded; extraction only ever
/// looks keys up through [`FieldSchema::key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub episode_number: String,
    pub title: String,
    pub description: String,
    pub episode_url: String,
    pub image: String,
    pub tags: String,
    pub channel_title: String,
    pub channel_url: String,
    pub channel_image: String,
    pub channel_last_published: String,
}

impl FieldSchema {
    /// Provider key for a logical field.
    pub fn key(&self, field: FieldKey) -> &str {
        match field {
            FieldKey::EpisodeNumber => &self.episode_number,
            FieldKey::Title => &self.title,
            FieldKey::Description => &self.description,
            FieldKey::EpisodeUrl => &self.episode_url,
            FieldKey::Image => &self.image,
            FieldKey::Tags => &self.tags,
            FieldKey::ChannelTitle => &self.channel_title,
            FieldKey::ChannelUrl => &self.channel_url,
            FieldKey::ChannelImage => &self.channel_image,
            FieldKey::ChannelLastPublished => &self.channel_last_published,
        }
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self {
            episode_number: "itunes_episode".to_string(),
            title: "title".to_string(),
            description: "summary".to_string(),
            episode_url: "link".to_string(),
            image: "image".to_string(),
            tags: "tags".to_string(),
            channel_title: "title".to_string(),
            channel_url: "link".to_string(),
            channel_image: "image".to_string(),
            channel_last_published: "published".to_string(),
        }
    }
}

/// Embed accent color of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorTheme {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorTheme {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Packed `0xRRGGBB` value.
    pub fn to_rgb(self) -> u32 {
        (u32::from(self.r) << 16) | (u32::from(self.g) << 8) | u32::from(self.b)
    }
}

/// One place a feed publishes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishTarget {
    /// Text or forum channel that receives the episode thread.
    pub publish_channel_id: u64,
    /// Optional text channel that receives a short announcement.
    pub announce_channel_id: Option<u64>,
}

impl PublishTarget {
    pub fn new(publish_channel_id: u64) -> Self {
        Self {
            publish_channel_id,
            announce_channel_id: None,
        }
    }

    pub fn with_announce_channel(mut self, channel_id: u64) -> Self {
        self.announce_channel_id = Some(channel_id);
        self
    }
}

/// A watched feed: its configuration plus the runtime counters.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Unique label, used as the log prefix.
    pub title: String,
    pub enabled: bool,
    /// Prepended to every thread title.
    pub title_prefix: String,
    pub source_uri: String,
    pub field_schema: FieldSchema,
    /// The newest entry is the last one instead of the first.
    pub feed_is_reversed: bool,
    pub channel_targets: Vec<PublishTarget>,
    /// Members of this role are added to every new thread.
    pub subscriber_group_id: Option<u64>,
    /// Use the entry count as the episode number.
    pub override_numbering: bool,
    /// Create a thread even when one with the same title exists.
    pub override_always_publish: bool,
    /// Never prefix the episode number onto thread titles.
    pub override_prepend_number: bool,
    pub color_theme: ColorTheme,
    /// Highest episode number already published.
    pub watermark: i64,
    /// Processing failures since the process started.
    pub error_count: u32,
}

impl FeedConfig {
    /// Create an enabled feed publishing into a single channel.
    pub fn new(
        title: impl Into<String>,
        source_uri: impl Into<String>,
        publish_channel_id: u64,
    ) -> Self {
        let title = title.into();
        Self {
            title_prefix: title.clone(),
            title,
            enabled: true,
            source_uri: source_uri.into(),
            field_schema: FieldSchema::default(),
            feed_is_reversed: false,
            channel_targets: vec![PublishTarget::new(publish_channel_id)],
            subscriber_group_id: None,
            override_numbering: false,
            override_always_publish: false,
            override_prepend_number: false,
            color_theme: ColorTheme::default(),
            watermark: 0,
            error_count: 0,
        }
    }

    pub fn with_title_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.title_prefix = prefix.into();
        self
    }

    /// Set the announce channel of the primary target.
    pub fn with_announce_channel(mut self, channel_id: u64) -> Self {
        if let Some(primary) = self.channel_targets.first_mut() {
            primary.announce_channel_id = Some(channel_id);
        }
        self
    }

    pub fn with_target(mut self, target: PublishTarget) -> Self {
        self.channel_targets.push(target);
        self
    }

    pub fn with_subscriber_group(mut self, role_id: u64) -> Self {
        self.subscriber_group_id = Some(role_id);
        self
    }

    pub fn with_watermark(mut self, watermark: i64) -> Self {
        self.watermark = watermark;
        self
    }
}

/// Untyped feed document as returned by a [`FeedSource`](super::FeedSource).
///
/// Keys follow the usual feed-parser naming (`title`, `link`, `summary`,
/// `itunes_episode`, `image.href`, `tags[].term`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDocument {
    pub metadata: Map<String, Value>,
    pub entries: Vec<Map<String, Value>>,
}
