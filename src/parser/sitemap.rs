//! Sitemap and sitemap-index documents

use crate::parser::xml::parse_document;
use crate::utils::error::ParseError;

const KIND: &str = "Sitemap";

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<sitemapindex>`: locations of child sitemaps
    Index(Vec<String>),
    /// `<urlset>`: page locations
    UrlSet(Vec<String>),
}

impl SitemapDocument {
    /// Parse a sitemap or sitemap index
    ///
    /// A document with `<sitemap>` children is an index; otherwise its
    /// `<url>` children are read. Entries without a `<loc>` are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Empty`] for blank input,
    /// [`ParseError::InvalidXml`] for malformed XML and
    /// [`ParseError::UnknownFormat`] when the root is neither shape.
    pub fn parse(xml: &str) -> Result<Self, ParseError> {
        if xml.trim().is_empty() {
            return Err(ParseError::Empty { kind: KIND });
        }

        let root = parse_document(xml).ok_or(ParseError::InvalidXml { kind: KIND })?;

        let locs = |tag: &str| -> Vec<String> {
            root.children_named(tag)
                .map(|c| c.child_text("loc"))
                .filter(|loc| !loc.is_empty())
                .collect()
        };

        if root.child("sitemap").is_some() || root.name == "sitemapindex" {
            return Ok(Self::Index(locs("sitemap")));
        }
        if root.child("url").is_some() || root.name == "urlset" {
            return Ok(Self::UrlSet(locs("url")));
        }

        Err(ParseError::UnknownFormat { kind: KIND })
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }
}
