//! RSS 2.0 and Atom feed parsing

use scraper::Html;

use crate::models::FeedEntry;
use crate::parser::image::is_valid_image_url;
use crate::parser::selectors::IMG;
use crate::parser::xml::{parse_document, XmlElement};
use crate::utils::error::ParseError;

/// `content:encoded` namespace
pub const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";

/// Media RSS namespace
pub const MEDIA_NS: &str = "http://search.yahoo.com/mrss/";

const KIND: &str = "RSS";

/// Parse an RSS 2.0 or Atom document into entries
///
/// The shape is detected from the document: `channel/item` for RSS,
/// top-level `entry` elements for Atom. A well-formed document of
/// either shape with no entries yields an empty list.
///
/// # Errors
///
/// - [`ParseError::Empty`] for blank input
/// - [`ParseError::InvalidXml`] when the document is not well-formed
/// - [`ParseError::UnknownFormat`] when it is neither RSS nor Atom
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, ParseError> {
    if xml.trim().is_empty() {
        return Err(ParseError::Empty { kind: KIND });
    }

    let root = parse_document(xml).ok_or(ParseError::InvalidXml { kind: KIND })?;

    if let Some(channel) = root.child("channel") {
        return Ok(channel.children_named("item").map(rss_entry).collect());
    }

    if root.name == "feed" || root.child("entry").is_some() {
        return Ok(root.children_named("entry").map(atom_entry).collect());
    }

    Err(ParseError::UnknownFormat { kind: KIND })
}

fn rss_entry(item: &XmlElement) -> FeedEntry {
    let description = item.child_text("description");
    let content = item
        .child_ns(CONTENT_NS, "encoded")
        .map(|c| c.text().to_string())
        .unwrap_or_else(|| description.clone());

    FeedEntry {
        title: item.child_text("title"),
        link: item.child_text("link"),
        pub_date: item.child_text("pubDate"),
        guid: item.child_text("guid"),
        featured_image_url: rss_image(item, &content, &description),
        description,
        content,
    }
}

fn atom_entry(entry: &XmlElement) -> FeedEntry {
    let summary = entry.child_text("summary");
    let content = entry
        .child("content")
        .map(|c| c.text().to_string())
        .unwrap_or_else(|| summary.clone());

    FeedEntry {
        title: entry.child_text("title"),
        link: atom_link(entry),
        pub_date: entry.child_text("published"),
        guid: entry.child_text("id"),
        featured_image_url: atom_image(entry, &content),
        description: summary,
        content,
    }
}

// Prefer the alternate link; fall back to the first one
fn atom_link(entry: &XmlElement) -> String {
    let mut links = entry.children_named("link");
    let first = entry.child("link");
    let chosen = links
        .find(|l| matches!(l.attr("rel"), None | Some("alternate")))
        .or(first);

    chosen
        .map(|l| {
            l.attr("href")
                .map(str::to_string)
                .unwrap_or_else(|| l.text().to_string())
        })
        .unwrap_or_default()
}

/// Image precedence for RSS items
///
/// `media:content`, then an `image/*` enclosure, then the first image in
/// the item's content or description.
fn rss_image(item: &XmlElement, content: &str, description: &str) -> Option<String> {
    if let Some(url) = item
        .child_ns(MEDIA_NS, "content")
        .and_then(|m| m.attr("url"))
        .filter(|u| is_valid_image_url(u))
    {
        return Some(url.to_string());
    }

    if let Some(url) = item
        .children_named("enclosure")
        .filter(|e| e.attr("type").is_some_and(|t| t.starts_with("image/")))
        .find_map(|e| e.attr("url"))
    {
        return Some(url.to_string());
    }

    first_image_in_html(content).or_else(|| first_image_in_html(description))
}

/// Image precedence for Atom entries
fn atom_image(entry: &XmlElement, content: &str) -> Option<String> {
    let enclosure = entry.children_named("link").find(|l| {
        l.attr("rel") == Some("enclosure")
            && l.attr("type").is_some_and(|t| t.starts_with("image/"))
    });
    if let Some(href) = enclosure.and_then(|l| l.attr("href")) {
        return Some(href.to_string());
    }

    first_image_in_html(content)
}

/// First `<img src>` in an HTML fragment that looks like an image
pub fn first_image_in_html(html: &str) -> Option<String> {
    if !html.contains("<img") {
        return None;
    }
    let fragment = Html::parse_fragment(html);
    let src = fragment
        .select(&IMG)
        .next()
        .and_then(|img| img.value().attr("src"))?
        .trim();
    is_valid_image_url(src).then(|| src.to_string())
}
