//! Feed side of threadslapper: configuration types, fetching, episode
//! extraction, new-episode detection and failure counting.

pub mod breaker;
pub mod episode;
pub mod extract;
pub mod fetcher;
pub mod types;
pub mod watermark;

pub use breaker::{BreakerState, ErrorCircuitBreaker};
pub use episode::{EpisodeSnapshot, MAX_DESCRIPTION_CHARS};
pub use extract::extract;
pub use fetcher::{parse_document, FeedSource, HttpFeedSource, MAX_FEED_SIZE};
pub use types::{
    ColorTheme, FeedConfig, FieldKey, FieldSchema, PublishTarget, RawDocument,
    DEFAULT_MAX_FEED_ERRORS,
};
