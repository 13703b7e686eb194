//! Idempotent thread creation.
//!
//! The thread title is the dedup key: unless the feed forces publishing, a
//! channel that already has an active thread with the exact title gets no new
//! one. Content is never compared.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Result, SlapperError};
use crate::feed::{EpisodeSnapshot, FeedConfig};
use crate::platform::{thread_name, Channel, ChannelKind, OutgoingMessage, Platform, ThreadHandle};
use crate::publish::embed::episode_embed;

/// First message posted inside every new thread.
pub const THREAD_KICKOFF: &str = ":thread: :clap:";

/// Creates episode threads and posts.
#[derive(Clone)]
pub struct PublishOrchestrator {
    platform: Arc<dyn Platform>,
}

impl PublishOrchestrator {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Make sure a thread titled `title` exists in `channel`.
    ///
    /// Returns the created thread, or the existing one when exactly one
    /// thread already has this title. Several threads with the same title are
    /// not disambiguated and yield `None`. Titles longer than the platform
    /// allows are cut, both for matching and for the new thread.
    pub async fn publish(
        &self,
        channel: &Channel,
        title: &str,
        episode: &EpisodeSnapshot,
        feed: &FeedConfig,
    ) -> Result<Option<ThreadHandle>> {
        let name = thread_name(title);
        if !feed.override_always_publish {
            let mut matches: Vec<ThreadHandle> = self
                .platform
                .list_threads(channel)
                .await
                .map_err(|e| publish_error(title, e))?
                .into_iter()
                .filter(|t| t.name == name)
                .collect();

            if !matches.is_empty() {
                info!("{}: Thread '{}' already exists", feed.title, title);
                if matches.len() == 1 {
                    return Ok(matches.pop());
                }
                warn!(
                    "{}: {} threads are titled '{}', not picking one",
                    feed.title,
                    matches.len(),
                    title
                );
                return Ok(None);
            }
        }

        let reason = format!(
            "{}: New Episode ({}) detected, creating thread: {}",
            feed.title, episode.number, title
        );
        let embed = episode_embed(feed, episode, false);

        let thread = match channel.kind {
            ChannelKind::Linear => {
                let lead = OutgoingMessage::text(episode.display_title("", false)).with_embed(embed);
                let message = self
                    .platform
                    .send_message(channel.id, &lead)
                    .await
                    .map_err(|e| publish_error(title, e))?;
                self.platform
                    .start_thread(channel, message.id, &name, &reason)
                    .await
                    .map_err(|e| publish_error(title, e))?
            }
            ChannelKind::Forum => {
                let first = OutgoingMessage::default().with_embed(embed);
                let thread = self
                    .platform
                    .create_forum_post(channel, &name, &first, &reason)
                    .await
                    .map_err(|e| publish_error(title, e))?;
                if let Some(message) = thread.starting_message {
                    if let Err(e) = self.platform.crosspost_message(message).await {
                        debug!("{}: could not publish first post message: {}", feed.title, e);
                    }
                }
                thread
            }
            ChannelKind::Unsupported(code) => {
                return Err(SlapperError::Publish(format!(
                    "channel {} ({}) has unsupported type {}",
                    channel.id, channel.name, code
                )));
            }
        };

        self.settle(feed, channel.kind, &thread).await;
        info!("{}: Thread '{}' created", feed.title, title);
        Ok(Some(thread))
    }

    /// Join the new thread, pin its first message and post the kick-off.
    /// Failures are logged and ignored.
    async fn settle(&self, feed: &FeedConfig, kind: ChannelKind, thread: &ThreadHandle) {
        if let Err(e) = self.platform.join_thread(thread.id).await {
            warn!("{}: could not join thread '{}': {}", feed.title, thread.name, e);
        }

        let mut kickoff = OutgoingMessage::text(THREAD_KICKOFF);
        if let Some(first) = thread.starting_message {
            if let Err(e) = self.platform.pin_message(first).await {
                warn!("{}: could not pin first message of '{}': {}", feed.title, thread.name, e);
            }
            if kind == ChannelKind::Forum {
                kickoff = kickoff.replying_to(first);
            }
        }

        if let Err(e) = self.platform.send_message(thread.id, &kickoff).await {
            warn!("{}: could not post in thread '{}': {}", feed.title, thread.name, e);
        }
    }

    /// Add every member of the feed's subscriber role to `thread`.
    ///
    /// Returns how many members were added. Failures are logged and ignored.
    pub async fn add_subscribers(&self, feed: &FeedConfig, thread: &ThreadHandle) -> usize {
        let (Some(role_id), Some(guild_id)) = (feed.subscriber_group_id, thread.guild_id) else {
            return 0;
        };

        let members = match self.platform.role_members(guild_id, role_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!("{}: could not list members of role {}: {}", feed.title, role_id, e);
                return 0;
            }
        };

        let mut added = 0;
        for user_id in members {
            match self.platform.add_thread_member(thread.id, user_id).await {
                Ok(()) => added += 1,
                Err(e) => warn!(
                    "{}: could not add member {} to '{}': {}",
                    feed.title, user_id, thread.name, e
                ),
            }
        }
        debug!("{}: added {} subscriber(s) to '{}'", feed.title, added, thread.name);
        added
    }
}

fn publish_error(title: &str, e: SlapperError) -> SlapperError {
    SlapperError::Publish(format!("thread '{}': {}", title, e))
}
