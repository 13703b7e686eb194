//! Normalized episode data extracted from one fetch.

use chrono::{DateTime, FixedOffset, Utc};

use crate::html::html_to_text;

/// Longest description sent to the platform, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Suffix appended to descriptions cut at [`MAX_DESCRIPTION_CHARS`].
const ELLIPSIS: &str = "...";

/// `strftime` formats tried after RFC 2822, in order.
const TIMESTAMP_FORMATS: &[&str] = &["%a, %d %b %Y %H:%M:%S %z", "%Y-%m-%dT%H:%M:%S%z"];

/// The latest item of a feed, as seen by one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeSnapshot {
    pub number: i64,
    pub title: String,
    /// Raw markup as found in the feed.
    pub description: String,
    pub episode_url: String,
    pub image_url: String,
    pub tags: Vec<String>,
    pub channel_title: String,
    pub channel_url: String,
    pub channel_image_url: String,
    /// Raw timestamp string; see [`EpisodeSnapshot::published_at`].
    pub channel_last_published: String,
}

impl EpisodeSnapshot {
    /// Title shown for this episode.
    ///
    /// The prefix marks which feed the episode comes from. Unless `force_raw`
    /// is set, the episode number is inserted after the prefix when the title
    /// does not already mention it.
    pub fn display_title(&self, prefix: &str, force_raw: bool) -> String {
        if force_raw {
            return self.title.trim().to_string();
        }
        if contains_number(&self.title, self.number) {
            format!("{} {}", prefix, self.title).trim().to_string()
        } else {
            format!("{} {}: {}", prefix, self.number, self.title)
                .trim()
                .to_string()
        }
    }

    /// Description converted to text.
    ///
    /// With `truncate_at_first_blank_line` only the first paragraph is kept,
    /// whatever its length. Otherwise text over [`MAX_DESCRIPTION_CHARS`] is
    /// cut and ends with an ellipsis.
    pub fn display_description(&self, truncate_at_first_blank_line: bool) -> String {
        let text = html_to_text(&self.description);

        if truncate_at_first_blank_line {
            if let Some(idx) = text.find("\n\n") {
                return text[..idx].to_string();
            }
        }

        if text.chars().count() > MAX_DESCRIPTION_CHARS {
            let mut cut: String = text
                .chars()
                .take(MAX_DESCRIPTION_CHARS - ELLIPSIS.len())
                .collect();
            cut.push_str(ELLIPSIS);
            return cut;
        }

        text
    }

    /// Best-effort parse of `channel_last_published`.
    ///
    /// Falls back to the current time when no known format matches.
    pub fn published_at(&self) -> DateTime<FixedOffset> {
        parse_timestamp(&self.channel_last_published).unwrap_or_else(|| Utc::now().fixed_offset())
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
}

/// Whether `number` appears in `title` as a standalone run of digits.
fn contains_number(title: &str, number: i64) -> bool {
    let needle = number.to_string();
    title
        .split(|c: char| !c.is_ascii_digit())
        .any(|run| run == needle)
}
