//! Push payload validation
//!
//! Turns the untyped JSON body a connector sends into a
//! [`SanitizedPayload`]. Pure: no I/O, no store access.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::parser::sanitize::{sanitize_rich_text, sanitize_text_field, sanitize_url};
use crate::utils::error::ValidationError;

/// Format of `publish_date_gmt` / `modified_date_gmt`
pub const PAYLOAD_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A push payload after validation and sanitization
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedPayload {
    pub source_url: String,
    pub node_id: String,
    pub original_item_id: String,
    pub title: String,
    pub original_title: String,
    pub content: String,
    pub excerpt: String,
    pub featured_image_url: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub publish_date: DateTime<Utc>,
    pub modified_date: DateTime<Utc>,
}

/// Validate and sanitize a push payload
///
/// Required: `source_url`, `node_id`, `original_post_id`, `title`, each
/// non-empty after sanitization. Any `status` field is ignored here;
/// status is decided by policy.
///
/// # Errors
///
/// Returns [`ValidationError::NotAnObject`] for non-object bodies,
/// [`ValidationError::MissingField`] for an absent required field and
/// [`ValidationError::InvalidUrl`] when `source_url` is not an http(s) URL.
pub fn sanitize_payload(payload: &Value) -> Result<SanitizedPayload, ValidationError> {
    let map = payload.as_object().ok_or(ValidationError::NotAnObject)?;
    sanitize_fields(map, Utc::now())
}

/// [`sanitize_payload`] over an already unwrapped map with a fixed clock
pub fn sanitize_fields(
    map: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<SanitizedPayload, ValidationError> {
    let raw_url = required(map, "source_url")?;
    let node_id = sanitize_text_field(&required(map, "node_id")?);
    let original_item_id = sanitize_text_field(&required(map, "original_post_id")?);
    let title = sanitize_text_field(&required(map, "title")?);

    for (field, value) in [
        ("node_id", &node_id),
        ("original_post_id", &original_item_id),
        ("title", &title),
    ] {
        if value.is_empty() {
            return Err(ValidationError::MissingField(field));
        }
    }

    let source_url = sanitize_url(&raw_url).ok_or_else(|| ValidationError::InvalidUrl {
        field: "source_url",
        value: raw_url.clone(),
    })?;

    let original_title = optional(map, "original_title")
        .map(|t| sanitize_text_field(&t))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| title.clone());

    let publish_date = optional(map, "publish_date_gmt")
        .and_then(|d| parse_payload_date(&d))
        .unwrap_or(now);
    let modified_date = optional(map, "modified_date_gmt")
        .and_then(|d| parse_payload_date(&d))
        .unwrap_or(publish_date);

    Ok(SanitizedPayload {
        source_url,
        node_id,
        original_item_id,
        title,
        original_title,
        content: optional(map, "content")
            .map(|c| sanitize_rich_text(&c))
            .unwrap_or_default(),
        excerpt: optional(map, "excerpt")
            .map(|e| sanitize_rich_text(&e))
            .unwrap_or_default(),
        featured_image_url: optional(map, "featured_image_url").and_then(|u| sanitize_url(&u)),
        categories: string_list(map.get("categories")),
        tags: string_list(map.get("tags")),
        publish_date,
        modified_date,
    })
}

/// Parse a strict `YYYY-MM-DD HH:MM:SS` GMT timestamp
pub fn parse_payload_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), PAYLOAD_DATE_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

fn required(map: &Map<String, Value>, field: &'static str) -> Result<String, ValidationError> {
    optional(map, field)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ValidationError::MissingField(field))
}

// Scalars are accepted as text; connectors send numeric ids unquoted
fn optional(map: &Map<String, Value>, field: &str) -> Option<String> {
    match map.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(sanitize_text_field(s)),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}
