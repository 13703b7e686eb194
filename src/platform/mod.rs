//! Messaging platform boundary.
//!
//! The publish logic only talks to a [`Platform`]. The production
//! implementation is [`DiscordClient`]; tests use an in-memory one.

pub mod discord;
pub mod embed;

use async_trait::async_trait;

use crate::Result;

pub use discord::{DiscordClient, DEFAULT_API_BASE_URL};
pub use embed::{Embed, EmbedAuthor, EmbedFooter, EmbedImage};

/// Base of message and thread links.
pub const JUMP_URL_BASE: &str = "https://discord.com/channels";

/// Longest thread name the platform accepts, in characters.
pub const MAX_THREAD_NAME_CHARS: usize = 100;

/// Thread name for `title`, cut to [`MAX_THREAD_NAME_CHARS`].
///
/// Existing threads are matched against this name, not the full title.
pub fn thread_name(title: &str) -> String {
    title
        .chars()
        .take(MAX_THREAD_NAME_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// How threads are created in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Text or announcement channel: a lead message is sent and a thread is
    /// opened on it.
    Linear,
    /// Forum channel: a post is created directly, its first message carries
    /// the content.
    Forum,
    /// Anything else (voice, category, DM, ...), carrying the raw type.
    Unsupported(u8),
}

/// A channel as returned by [`Platform::get_channel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: u64,
    pub name: String,
    pub guild_id: Option<u64>,
    pub kind: ChannelKind,
}

/// Where a message lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

/// A thread or forum post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadHandle {
    pub id: u64,
    pub name: String,
    pub guild_id: Option<u64>,
    /// The message the thread was opened from, when known.
    pub starting_message: Option<MessageRef>,
}

impl ThreadHandle {
    /// Link that opens the thread in a client.
    pub fn jump_url(&self) -> String {
        match self.guild_id {
            Some(guild) => format!("{}/{}/{}", JUMP_URL_BASE, guild, self.id),
            None => format!("{}/@me/{}", JUMP_URL_BASE, self.id),
        }
    }
}

/// A posted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub channel_id: u64,
    pub content: String,
}

/// A message to be sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: String,
    pub embed: Option<Embed>,
    /// Reply to this message.
    pub reference: Option<MessageRef>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }

    pub fn replying_to(mut self, reference: MessageRef) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// Operations the publisher needs from the messaging platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Look a channel up; `None` when it does not exist or is not visible.
    async fn get_channel(&self, id: u64) -> Result<Option<Channel>>;

    /// Active threads whose parent is `channel`.
    async fn list_threads(&self, channel: &Channel) -> Result<Vec<ThreadHandle>>;

    async fn send_message(&self, channel_id: u64, message: &OutgoingMessage) -> Result<Message>;

    /// Open a public thread on an existing message of a linear channel.
    async fn start_thread(
        &self,
        channel: &Channel,
        message_id: u64,
        name: &str,
        reason: &str,
    ) -> Result<ThreadHandle>;

    /// Create a post in a forum channel with `message` as its first message.
    async fn create_forum_post(
        &self,
        channel: &Channel,
        name: &str,
        message: &OutgoingMessage,
        reason: &str,
    ) -> Result<ThreadHandle>;

    async fn join_thread(&self, thread_id: u64) -> Result<()>;

    async fn pin_message(&self, message: MessageRef) -> Result<()>;

    /// Publish a message to channels following this one.
    async fn crosspost_message(&self, message: MessageRef) -> Result<()>;

    /// Most recent message of a channel, if any.
    async fn last_message(&self, channel_id: u64) -> Result<Option<Message>>;

    /// User ids of the members holding `role_id`.
    async fn role_members(&self, guild_id: u64, role_id: u64) -> Result<Vec<u64>>;

    async fn add_thread_member(&self, thread_id: u64, user_id: u64) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_name_is_cut() {
        assert_eq!(thread_name("Show 1: Pilot"), "Show 1: Pilot");
        let long = "é".repeat(150);
        assert_eq!(thread_name(&long).chars().count(), MAX_THREAD_NAME_CHARS);
        let spaced = format!("{} tail", "a".repeat(99));
        assert_eq!(thread_name(&spaced), "a".repeat(99));
    }

    #[test]
    fn test_jump_url() {
        let thread = ThreadHandle {
            id: 22,
            name: "t".to_string(),
            guild_id: Some(11),
            starting_message: None,
        };
        assert_eq!(thread.jump_url(), "https://discord.com/channels/11/22");

        let dm = ThreadHandle {
            guild_id: None,
            ..thread
        };
        assert_eq!(dm.jump_url(), "https://discord.com/channels/@me/22");
    }

    #[test]
    fn test_outgoing_message_builders() {
        let reference = MessageRef {
            channel_id: 1,
            message_id: 2,
        };
        let msg = OutgoingMessage::text("hi")
            .with_embed(Embed::new("t"))
            .replying_to(reference);
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.embed, Some(Embed::new("t")));
        assert_eq!(msg.reference, Some(reference));
    }
}
