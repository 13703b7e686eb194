//! Publishing side: threads, announcements and the shared embed.

pub mod announce;
pub mod embed;
pub mod orchestrator;

pub use announce::{compose, lead_marker, Announcement, AnnouncementDeduper, ANNOUNCEMENT_PREAMBLE};
pub use embed::episode_embed;
pub use orchestrator::{PublishOrchestrator, THREAD_KICKOFF};
