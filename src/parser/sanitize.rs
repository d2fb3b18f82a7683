//! Sanitization of inbound text, URLs and rich text
//!
//! Every text field that reaches the content store goes through one of
//! three filters here:
//! - [`sanitize_text_field`] for single-line plain text (titles, ids, dates)
//! - [`sanitize_url`] for URL fields
//! - [`sanitize_rich_text`] for bodies, an allow-list over a parsed HTML tree

use regex::Regex;
use scraper::{ElementRef, Html, Node};
use std::sync::LazyLock;
use url::Url;

use crate::utils::{normalize_whitespace, trim_words};

// Pre-compiled regex patterns for performance
static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

static SCRIPT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());

static STYLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").unwrap());

/// Tags kept by [`sanitize_rich_text`]
const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "article", "b", "blockquote", "br", "caption", "cite", "code", "dd", "del",
    "div", "dl", "dt", "em", "figcaption", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr",
    "i", "img", "ins", "kbd", "li", "mark", "ol", "p", "pre", "q", "s", "section", "small",
    "span", "strong", "sub", "sup", "table", "tbody", "td", "tfoot", "th", "thead", "time",
    "tr", "u", "ul",
];

/// Tags removed together with everything inside them
const DROPPED_TAGS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "form", "input",
    "button", "select", "textarea", "svg", "math", "head", "title", "meta", "link", "frame",
    "frameset", "applet", "base",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img"];

const GLOBAL_ATTRS: &[&str] = &["class", "id", "title", "lang", "dir"];

const URL_ATTRS: &[&str] = &["href", "src", "cite"];

fn tag_attrs(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" => &["href", "rel", "target", "name"],
        "img" => &["src", "alt", "width", "height", "srcset", "sizes", "loading"],
        "td" | "th" => &["colspan", "rowspan", "scope"],
        "time" => &["datetime"],
        "blockquote" | "q" | "del" | "ins" => &["cite"],
        "ol" => &["start", "type", "reversed"],
        _ => &[],
    }
}

/// Sanitize a single-line plain text field
///
/// Strips tags, removes invisible and control characters, collapses
/// whitespace including line breaks.
///
/// # Examples
///
/// ```
/// use chiral_hub::parser::sanitize::sanitize_text_field;
///
/// let clean = sanitize_text_field("  <b>Hello</b>\n\tWorld\u{200B} ");
/// assert_eq!(clean, "Hello World");
/// ```
pub fn sanitize_text_field(text: &str) -> String {
    let stripped = strip_html_tags(text);
    let visible = remove_zero_width(&stripped);
    let visible = remove_control_chars(&visible);
    normalize_whitespace(&visible)
}

/// Constrain a URL to an absolute http(s) URL
///
/// Returns `None` for anything that is not a valid URL with a host.
/// The returned string is percent-encoded by the URL grammar.
///
/// # Examples
///
/// ```
/// use chiral_hub::parser::sanitize::sanitize_url;
///
/// assert_eq!(
///     sanitize_url(" https://a.example/my post ").as_deref(),
///     Some("https://a.example/my%20post")
/// );
/// assert_eq!(sanitize_url("javascript:alert(1)"), None);
/// ```
pub fn sanitize_url(raw: &str) -> Option<String> {
    let trimmed = remove_control_chars(raw.trim());
    if trimmed.is_empty() {
        return None;
    }

    let parsed = Url::parse(&trimmed).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str()?;

    Some(parsed.to_string())
}

/// Filter an HTML fragment down to common rich-text markup
///
/// Scripts, styles and embedded objects are removed with their content,
/// unknown tags are unwrapped, attributes are limited per tag and URL
/// attributes with executable schemes are dropped.
///
/// # Examples
///
/// ```
/// use chiral_hub::parser::sanitize::sanitize_rich_text;
///
/// let html = r#"<p onclick="x()">Hi <script>evil()</script><blink>there</blink></p>"#;
/// assert_eq!(sanitize_rich_text(html), "<p>Hi there</p>");
/// ```
pub fn sanitize_rich_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    write_children(fragment.root_element(), &mut out);
    out.trim().to_string()
}

fn write_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&html_escape::encode_text(&**text)),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    write_element(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let tag = element.value().name().to_ascii_lowercase();

    if DROPPED_TAGS.contains(&tag.as_str()) {
        return;
    }

    if !ALLOWED_TAGS.contains(&tag.as_str()) {
        write_children(element, out);
        return;
    }

    out.push('<');
    out.push_str(&tag);
    let per_tag = tag_attrs(&tag);
    let mut attrs: Vec<(String, &str)> = element
        .value()
        .attrs()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect();
    attrs.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, value) in attrs {
        if !GLOBAL_ATTRS.contains(&name.as_str()) && !per_tag.contains(&name.as_str()) {
            continue;
        }
        if URL_ATTRS.contains(&name.as_str()) && !is_safe_link(value) {
            continue;
        }
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(value));
        out.push('"');
    }
    out.push('>');

    if VOID_TAGS.contains(&tag.as_str()) {
        return;
    }

    write_children(element, out);
    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
}

fn is_safe_link(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    !(compact.starts_with("javascript:")
        || compact.starts_with("vbscript:")
        || compact.starts_with("data:"))
}

/// Remove zero-width spaces and similar invisible characters
///
/// # Examples
///
/// ```
/// use chiral_hub::parser::sanitize::remove_zero_width;
///
/// assert_eq!(remove_zero_width("a\u{200B}b\u{FEFF}c"), "abc");
/// ```
pub fn remove_zero_width(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(*c,
                '\u{200B}'..='\u{200F}' |
                '\u{2028}'..='\u{202F}' |
                '\u{FEFF}'
            )
        })
        .collect()
}

/// Remove control characters except newline and tab
pub fn remove_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Decode HTML entities, named and numeric
///
/// # Examples
///
/// ```
/// use chiral_hub::parser::sanitize::decode_html_entities;
///
/// assert_eq!(decode_html_entities("Tom &amp; Jerry&#39;s"), "Tom & Jerry's");
/// ```
pub fn decode_html_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Extract plain text from HTML, removing all tags
///
/// Script and style blocks are removed with their content.
///
/// # Examples
///
/// ```
/// use chiral_hub::parser::sanitize::strip_html_tags;
///
/// let html = "<p>Hello <strong>World</strong></p>";
/// assert_eq!(strip_html_tags(html), "Hello World");
/// ```
pub fn strip_html_tags(html: &str) -> String {
    let without_scripts = SCRIPT_REGEX.replace_all(html, "");
    let without_styles = STYLE_REGEX.replace_all(&without_scripts, "");
    TAG_REGEX.replace_all(&without_styles, "").to_string()
}

/// Plain-text excerpt of an HTML fragment limited to `max_words`
///
/// # Examples
///
/// ```
/// use chiral_hub::parser::sanitize::html_to_excerpt;
///
/// assert_eq!(html_to_excerpt("<p>one</p>\n<p>two three</p>", 2), "one two…");
/// ```
pub fn html_to_excerpt(html: &str, max_words: usize) -> String {
    // Keep word boundaries where block tags touch
    let spaced = TAG_REGEX.replace_all(
        &STYLE_REGEX.replace_all(&SCRIPT_REGEX.replace_all(html, ""), ""),
        " ",
    )
    .to_string();
    let text = decode_html_entities(&spaced);
    trim_words(&normalize_whitespace(&text), max_words)
}

/// Check if text contains meaningful content
pub fn has_content(text: &str) -> bool {
    !text.trim().is_empty()
}
