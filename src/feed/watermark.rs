//! New-episode detection against the feed watermark.

use crate::feed::episode::EpisodeSnapshot;
use crate::feed::types::FeedConfig;

/// Decide whether `snapshot` is new for `feed`.
///
/// The baseline is `override_watermark` when given, the feed's watermark
/// otherwise. Only a strictly greater episode number counts as new; in that
/// case the watermark is advanced before the snapshot is handed back. The
/// watermark never moves backwards, even under an override below it. Feeds
/// that reuse or renumber episodes are not detected as new.
pub fn check(
    feed: &mut FeedConfig,
    snapshot: EpisodeSnapshot,
    override_watermark: Option<i64>,
) -> Option<EpisodeSnapshot> {
    let baseline = override_watermark.unwrap_or(feed.watermark);
    if snapshot.number > baseline {
        feed.watermark = feed.watermark.max(snapshot.number);
        Some(snapshot)
    } else {
        None
    }
}
