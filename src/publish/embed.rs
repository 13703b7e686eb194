//! Embed shown with every episode thread and announcement.

use chrono::SecondsFormat;

use crate::feed::{EpisodeSnapshot, FeedConfig};
use crate::platform::Embed;

/// Build the episode embed.
///
/// The embed title uses the feed prefix and, unless the feed overrides
/// numbering, the episode number. Announcements pass `truncate` to only carry
/// the first paragraph of the description.
pub fn episode_embed(feed: &FeedConfig, episode: &EpisodeSnapshot, truncate: bool) -> Embed {
    Embed::new(episode.display_title(&feed.title_prefix, feed.override_numbering))
        .description(episode.display_description(truncate))
        .color(feed.color_theme.to_rgb())
        .url(&episode.episode_url)
        .timestamp(
            episode
                .published_at()
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .footer(format!("Tags: {}", episode.tags.join(", ")))
        .author(episode.channel_title.clone(), &episode.channel_image_url)
        .image(&episode.image_url)
}
