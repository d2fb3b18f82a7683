//! Minimal namespace-aware XML tree
//!
//! Feeds and sitemaps are small enough to load whole. The tree keeps
//! each element's resolved namespace so extension elements such as
//! `content:encoded` are matched by URI, not by whatever prefix a
//! publisher picked.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::parser::sanitize::decode_html_entities;

/// One XML element with its attributes, children and direct text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Namespace URI the element resolved to
    pub namespace: Option<String>,
    /// Whether the element was written with a prefix
    pub prefixed: bool,
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    /// Trimmed text directly inside this element, CDATA included
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Attribute value by local name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether this is an unprefixed element with the given local name
    pub fn is(&self, name: &str) -> bool {
        !self.prefixed && self.name == name
    }

    /// Whether this element has the given namespace URI and local name
    pub fn is_ns(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// First unprefixed child with the given local name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(name))
    }

    /// All unprefixed children with the given local name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.is(name))
    }

    /// First child in the given namespace
    pub fn child_ns(&self, namespace: &str, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is_ns(namespace, name))
    }

    /// Text of the first unprefixed child, or empty
    pub fn child_text(&self, name: &str) -> String {
        self.child(name)
            .map(|c| c.text().to_string())
            .unwrap_or_default()
    }
}

/// Parse a document and return its root element
///
/// Returns `None` for malformed input: mismatched tags, bad attribute
/// syntax, missing root. The reader's own diagnostics are dropped here;
/// callers report a single invalid-document error instead.
pub fn parse_document(xml: &str) -> Option<XmlElement> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let (namespace, event) = match reader.read_resolved_event() {
            Ok((resolved, event)) => (owned_namespace(resolved), event),
            Err(e) => {
                tracing::debug!(error = %e, "XML parse failed");
                return None;
            }
        };

        match event {
            Event::Start(start) => {
                let element = open_element(&reader, namespace?, &start)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = open_element(&reader, namespace?, &start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop()?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&unescape_text(&text));
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return None;
    }
    root
}

// Outer `None` marks an undeclared prefix
fn owned_namespace(resolved: ResolveResult<'_>) -> Option<Option<String>> {
    match resolved {
        ResolveResult::Bound(ns) => Some(Some(String::from_utf8_lossy(ns.as_ref()).into_owned())),
        ResolveResult::Unbound => Some(None),
        ResolveResult::Unknown(_) => None,
    }
}

fn open_element(
    reader: &NsReader<&[u8]>,
    namespace: Option<String>,
    start: &BytesStart<'_>,
) -> Option<XmlElement> {
    let qname = start.name();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.ok()?;
        let key = attr.key;
        if key.as_namespace_binding().is_some() {
            continue;
        }
        let (_, local) = reader.resolve_attribute(key);
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => decode_html_entities(&String::from_utf8_lossy(&attr.value)),
        };
        attrs.push((String::from_utf8_lossy(local.as_ref()).into_owned(), value));
    }

    Some(XmlElement {
        namespace,
        prefixed: qname.prefix().is_some(),
        name: String::from_utf8_lossy(qname.local_name().as_ref()).into_owned(),
        attrs,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Option<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        // A second top-level element is not a document
        None if root.is_some() => return None,
        None => *root = Some(element),
    }
    Some(())
}

// Feeds routinely carry HTML entities (`&nbsp;`) that XML does not define
fn unescape_text(text: &BytesText<'_>) -> String {
    match text.unescape() {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => decode_html_entities(&String::from_utf8_lossy(text)),
    }
}
