//! Feed fetching and flattening into a [`RawDocument`].
//!
//! Documents are parsed with `feed-rs` and flattened into feed-parser style
//! key/value maps. A second, shallow `quick-xml` pass picks up namespaced
//! extension elements (`itunes:episode`, `podcast:season`, ...) that
//! `feed-rs` does not model, stored as `itunes_episode`, `podcast_season`.

use std::time::Duration;

use async_trait::async_trait;
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{Result, SlapperError};
use crate::feed::types::RawDocument;

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Total timeout in seconds.
const TOTAL_TIMEOUT_SECS: u64 = 30;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Maximum feed size in bytes (10MB). Podcast feeds with full history get big.
pub const MAX_FEED_SIZE: u64 = 10 * 1024 * 1024;

/// User agent string for feed fetching.
const USER_AGENT: &str = concat!("threadslapper/", env!("CARGO_PKG_VERSION"));

/// Source of feed documents.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch and flatten the document at `uri`.
    async fn fetch(&self, uri: &str) -> Result<RawDocument>;
}

/// Fetches feeds over HTTP(S).
pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    /// Create a new fetcher with default settings.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SlapperError::Fetch(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, uri: &str) -> Result<RawDocument> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| SlapperError::Fetch(format!("failed to fetch feed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SlapperError::Fetch(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_FEED_SIZE {
                return Err(SlapperError::Fetch(format!(
                    "feed too large: {} bytes (max {} bytes)",
                    content_length, MAX_FEED_SIZE
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SlapperError::Fetch(format!("failed to read response: {}", e)))?;

        if bytes.len() as u64 > MAX_FEED_SIZE {
            return Err(SlapperError::Fetch(format!(
                "feed too large: {} bytes (max {} bytes)",
                bytes.len(),
                MAX_FEED_SIZE
            )));
        }

        parse_document(&bytes)
    }
}

/// Parse feed bytes into a [`RawDocument`].
pub fn parse_document(bytes: &[u8]) -> Result<RawDocument> {
    let feed = parser::parse(bytes)
        .map_err(|e| SlapperError::Fetch(format!("failed to parse feed: {}", e)))?;

    let mut document = flatten_feed(feed);

    match extension_fields(bytes) {
        Ok((metadata, entries)) => {
            merge_missing(&mut document.metadata, metadata);
            if entries.len() == document.entries.len() {
                for (target, extra) in document.entries.iter_mut().zip(entries) {
                    merge_missing(target, extra);
                }
            } else {
                debug!(
                    "extension pass saw {} entries, parser saw {}; skipping entry extensions",
                    entries.len(),
                    document.entries.len()
                );
            }
        }
        Err(e) => debug!("extension pass failed: {}", e),
    }

    Ok(document)
}

/// Add `extra` keys not already present. `itunes_image` also fills a missing
/// `image`, which is where feed parsers usually put it.
fn merge_missing(target: &mut Map<String, Value>, extra: Map<String, Value>) {
    for (key, value) in extra {
        target.entry(key).or_insert(value);
    }
    if !target.contains_key("image") {
        if let Some(image) = target.get("itunes_image").filter(|v| v.is_object()).cloned() {
            target.insert("image".into(), image);
        }
    }
}

fn flatten_feed(feed: Feed) -> RawDocument {
    let mut metadata = Map::new();

    if let Some(title) = feed.title {
        metadata.insert("title".into(), Value::String(title.content));
    }
    if let Some(description) = feed.description {
        metadata.insert("subtitle".into(), Value::String(description.content));
    }
    if let Some(link) = feed.links.first() {
        metadata.insert("link".into(), Value::String(link.href.clone()));
    }
    if let Some(image) = feed.logo.as_ref().or(feed.icon.as_ref()) {
        metadata.insert("image".into(), json!({ "href": image.uri }));
    }
    if let Some(published) = feed.published.or(feed.updated) {
        metadata.insert("published".into(), Value::String(published.to_rfc2822()));
    }
    if let Some(updated) = feed.updated {
        metadata.insert("updated".into(), Value::String(updated.to_rfc2822()));
    }
    if let Some(language) = feed.language {
        metadata.insert("language".into(), Value::String(language));
    }

    let entries = feed.entries.into_iter().map(flatten_entry).collect();

    RawDocument { metadata, entries }
}

fn flatten_entry(entry: Entry) -> Map<String, Value> {
    let mut map = Map::new();

    map.insert("id".into(), Value::String(entry.id));
    if let Some(title) = entry.title {
        map.insert("title".into(), Value::String(title.content));
    }

    let body = entry.content.and_then(|c| c.body);
    if let Some(summary) = entry.summary.map(|s| s.content).or_else(|| body.clone()) {
        map.insert("summary".into(), Value::String(summary));
    }
    if let Some(body) = body {
        map.insert("content".into(), Value::String(body));
    }

    if let Some(link) = entry.links.first() {
        map.insert("link".into(), Value::String(link.href.clone()));
    }
    if let Some(published) = entry.published.or(entry.updated) {
        map.insert("published".into(), Value::String(published.to_rfc2822()));
    }
    if let Some(author) = entry.authors.first() {
        map.insert("author".into(), Value::String(author.name.clone()));
    }

    let thumbnail = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .next()
        .map(|t| t.image.uri.clone());
    if let Some(uri) = thumbnail {
        map.insert("image".into(), json!({ "href": uri }));
    }

    if !entry.categories.is_empty() {
        let tags = entry
            .categories
            .into_iter()
            .map(|c| json!({ "term": c.term, "label": c.label }))
            .collect();
        map.insert("tags".into(), Value::Array(tags));
    }

    map
}

type ExtensionFields = (Map<String, Value>, Vec<Map<String, Value>>);

/// An extension element being read.
struct Pending {
    key: String,
    depth: usize,
    attrs: Map<String, Value>,
    text: String,
    into_entry: bool,
}

/// Collect namespaced child elements of the channel and of every entry.
fn extension_fields(bytes: &[u8]) -> std::result::Result<ExtensionFields, quick_xml::Error> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut metadata = Map::new();
    let mut entries: Vec<Map<String, Value>> = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut pending: Option<Pending> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                if is_entry(&name) {
                    entries.push(Map::new());
                } else if pending.is_none() {
                    pending = start_extension(&e, &stack, stack.len() + 1);
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                if pending.is_none() {
                    if let Some(p) = start_extension(&e, &stack, stack.len() + 1) {
                        finish(p, &mut metadata, &mut entries);
                    }
                }
            }
            Event::Text(t) => {
                if let Some(p) = pending.as_mut() {
                    p.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(p) = pending.as_mut() {
                    p.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let depth = stack.len();
                stack.pop();
                if pending.as_ref().is_some_and(|p| p.depth == depth) {
                    if let Some(p) = pending.take() {
                        finish(p, &mut metadata, &mut entries);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((metadata, entries))
}

fn is_entry(name: &[u8]) -> bool {
    name == b"item" || name == b"entry"
}

fn is_container(name: &[u8]) -> bool {
    is_entry(name) || name == b"channel" || name == b"feed"
}

/// Begin reading `e` if it is a namespaced direct child of a container.
fn start_extension(e: &BytesStart<'_>, stack: &[Vec<u8>], depth: usize) -> Option<Pending> {
    let parent = stack.last()?;
    let name = e.name();
    if !is_container(parent) || !name.as_ref().contains(&b':') {
        return None;
    }

    let key = String::from_utf8_lossy(name.as_ref()).replace(':', "_");
    let mut attrs = Map::new();
    for attr in e.attributes().flatten() {
        if let Ok(value) = attr.unescape_value() {
            let attr_key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            attrs.insert(attr_key, Value::String(value.to_string()));
        }
    }

    Some(Pending {
        key,
        depth,
        attrs,
        text: String::new(),
        into_entry: is_entry(parent),
    })
}

fn finish(p: Pending, metadata: &mut Map<String, Value>, entries: &mut [Map<String, Value>]) {
    let value = if !p.text.trim().is_empty() {
        Value::String(p.text.trim().to_string())
    } else if !p.attrs.is_empty() {
        Value::Object(p.attrs)
    } else {
        return;
    };

    let target = if p.into_entry {
        match entries.last_mut() {
            Some(entry) => entry,
            None => return,
        }
    } else {
        metadata
    };
    target.entry(p.key).or_insert(value);
}
