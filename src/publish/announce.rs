//! Announcements of new threads in a secondary channel.
//!
//! Dedup only looks at the most recent message of the announce channel. It
//! stops back-to-back repeats, not repeats separated by other traffic.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Result, SlapperError};
use crate::platform::{ChannelKind, Embed, OutgoingMessage, Platform, ThreadHandle};

/// Fixed first line of every announcement.
pub const ANNOUNCEMENT_PREAMBLE: &str = ":thread: :clap:";

/// What happened to an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    Sent,
    /// The announce channel already ends with this announcement, or cannot
    /// take one.
    Skipped,
    /// The target has no announce channel.
    NotConfigured,
}

/// Marker identifying the announcement for `title`.
pub fn lead_marker(title: &str) -> String {
    format!("{}\n# {}", ANNOUNCEMENT_PREAMBLE, title)
}

/// Full announcement text for `title`, linking to `thread`.
pub fn compose(title: &str, thread: &ThreadHandle) -> String {
    format!(
        "{}\n\n# Discuss here! {}\n\n",
        lead_marker(title),
        thread.jump_url()
    )
}

/// Sends announcements unless the channel's last message already is one.
#[derive(Clone)]
pub struct AnnouncementDeduper {
    platform: Arc<dyn Platform>,
}

impl AnnouncementDeduper {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    pub async fn announce(
        &self,
        feed_title: &str,
        announce_channel_id: Option<u64>,
        title: &str,
        thread: &ThreadHandle,
        embed: Embed,
    ) -> Result<Announcement> {
        let Some(channel_id) = announce_channel_id else {
            return Ok(Announcement::NotConfigured);
        };

        let channel = match self.platform.get_channel(channel_id).await.map_err(announce_error)? {
            Some(channel) => channel,
            None => {
                warn!("{}: announce channel {} not found", feed_title, channel_id);
                return Ok(Announcement::Skipped);
            }
        };
        if channel.kind != ChannelKind::Linear {
            warn!(
                "{}: announce channel {} is not a text channel, skipping",
                feed_title, channel.name
            );
            return Ok(Announcement::Skipped);
        }

        let marker = lead_marker(title);
        let last = self
            .platform
            .last_message(channel.id)
            .await
            .map_err(announce_error)?;
        if last.is_some_and(|m| m.content.contains(&marker)) {
            info!("{}: Announcement message already exists, skipping.", feed_title);
            return Ok(Announcement::Skipped);
        }

        info!("{}: Sending announcement message to {}", feed_title, channel.name);
        let message = OutgoingMessage::text(compose(title, thread)).with_embed(embed);
        self.platform
            .send_message(channel.id, &message)
            .await
            .map_err(announce_error)?;
        Ok(Announcement::Sent)
    }
}

fn announce_error(e: SlapperError) -> SlapperError {
    SlapperError::Publish(format!("announcement: {}", e))
}
