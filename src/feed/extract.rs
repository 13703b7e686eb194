//! Turns a raw feed document into an [`EpisodeSnapshot`].
//!
//! Every lookup goes through the feed's [`FieldSchema`]. A missing or oddly
//! typed field never fails extraction; it takes the default documented on
//! each accessor below. The only hard failure is a document without entries.

use serde_json::{Map, Value};

use crate::error::{Result, SlapperError};
use crate::feed::episode::EpisodeSnapshot;
use crate::feed::types::{FieldKey, FieldSchema, RawDocument};

/// Default for missing entry text fields.
pub const MISSING_TEXT: &str = "None";

/// Extract the latest episode of a document.
///
/// The latest entry is the first one, or the last one when
/// `feed_is_reversed` is set. With `override_numbering` the episode number is
/// the total entry count instead of the feed's own numbering.
pub fn extract(
    raw: &RawDocument,
    schema: &FieldSchema,
    feed_is_reversed: bool,
    override_numbering: bool,
) -> Result<EpisodeSnapshot> {
    let latest = if feed_is_reversed {
        raw.entries.last()
    } else {
        raw.entries.first()
    }
    .ok_or_else(|| SlapperError::Extraction("feed document has no entries".to_string()))?;

    let number = if override_numbering {
        raw.entries.len() as i64
    } else {
        number_field(latest, schema.key(FieldKey::EpisodeNumber))
    };

    let meta = &raw.metadata;

    Ok(EpisodeSnapshot {
        number,
        title: text_field(latest, schema.key(FieldKey::Title), MISSING_TEXT),
        description: text_field(latest, schema.key(FieldKey::Description), MISSING_TEXT),
        episode_url: text_field(latest, schema.key(FieldKey::EpisodeUrl), MISSING_TEXT),
        image_url: image_field(latest, schema.key(FieldKey::Image)),
        tags: tags_field(latest, schema.key(FieldKey::Tags)),
        channel_title: text_field(meta, schema.key(FieldKey::ChannelTitle), ""),
        channel_url: text_field(meta, schema.key(FieldKey::ChannelUrl), ""),
        channel_image_url: image_field(meta, schema.key(FieldKey::ChannelImage)),
        channel_last_published: text_field(meta, schema.key(FieldKey::ChannelLastPublished), ""),
    })
}

/// String value, or `default` when absent or not a scalar.
fn text_field(map: &Map<String, Value>, key: &str, default: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => default.to_string(),
    }
}

/// Integer from a number or a numeric string; `0` otherwise.
fn number_field(map: &Map<String, Value>, key: &str) -> i64 {
    match map.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Image URL from `{href}`, `{url}` or a plain string; empty otherwise.
fn image_field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::Object(obj)) => obj
            .get("href")
            .or_else(|| obj.get("url"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

/// Tag terms in document order without duplicates; empty when absent.
fn tags_field(map: &Map<String, Value>, key: &str) -> Vec<String> {
    let Some(Value::Array(items)) = map.get(key) else {
        return Vec::new();
    };

    let mut tags: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let term = match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => obj
                .get("term")
                .or_else(|| obj.get("label"))
                .and_then(Value::as_str),
            _ => None,
        };
        if let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|t| t == term) {
                tags.push(term.to_string());
            }
        }
    }
    tags
}
