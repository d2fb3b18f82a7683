//! HTML page extraction with ordered fallbacks
//!
//! Pulls a title, sanitized body, excerpt and representative image out of
//! an arbitrary article page. Extraction is best-effort; the fallback order
//! of each field is fixed and covered by tests.

use scraper::{ElementRef, Html, Selector};

use crate::models::{ExtractedContent, EXCERPT_WORDS};
use crate::parser::image::{is_valid_image_url, make_absolute_url};
use crate::parser::sanitize::{
    decode_html_entities, has_content, html_to_excerpt, sanitize_rich_text, strip_html_tags,
};
use crate::parser::selectors::{
    BASE_HREF, CONTENT_REGIONS, IMAGE_REGIONS, IMG, OG_IMAGE, TITLE, TWITTER_IMAGE,
};
use crate::utils::{normalize_whitespace, url_path};

/// Extracts structured content from article HTML
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Extract title, content, excerpt and featured image from a page
    ///
    /// # Fallback Order
    /// - Title: `<title>`, then the URL path
    /// - Content: `<article>`, `<main>`, `<body>`, then the whole document
    /// - Image: `og:image`, `twitter:image`, first image in a content
    ///   region, then first image anywhere
    ///
    /// `url` is the page address; it is the base for relative image URLs
    /// unless the document declares `<base href>`.
    pub fn extract_from_html(&self, url: &str, html: &str) -> ExtractedContent {
        let document = Html::parse_document(html);

        let content = sanitize_rich_text(&self.extract_content(&document, html));
        let excerpt = html_to_excerpt(&content, EXCERPT_WORDS);
        let base = self.base_url(&document, url);

        ExtractedContent {
            title: self.extract_title(&document, url),
            featured_image_url: self.extract_featured_image(&document, &base),
            content,
            excerpt,
        }
    }

    fn extract_title(&self, document: &Html, url: &str) -> String {
        let title = document
            .select(&TITLE)
            .next()
            .map(|el| {
                let raw: String = el.text().collect();
                normalize_whitespace(&strip_html_tags(&decode_html_entities(&raw)))
            })
            .unwrap_or_default();

        if has_content(&title) {
            return title;
        }

        let path = url_path(url);
        if path.is_empty() {
            url.to_string()
        } else {
            path
        }
    }

    fn extract_content(&self, document: &Html, raw: &str) -> String {
        for selector in CONTENT_REGIONS.iter() {
            if let Some(el) = document.select(selector).next() {
                let inner = el.inner_html();
                if has_content(&inner) {
                    return inner;
                }
            }
        }
        raw.to_string()
    }

    fn base_url(&self, document: &Html, page_url: &str) -> String {
        document
            .select(&BASE_HREF)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(|href| make_absolute_url(href.trim(), Some(page_url)))
            .unwrap_or_else(|| page_url.to_string())
    }

    fn extract_featured_image(&self, document: &Html, base: &str) -> Option<String> {
        let accept = |candidate: &str| -> Option<String> {
            let candidate = candidate.trim();
            is_valid_image_url(candidate).then(|| make_absolute_url(candidate, Some(base)))
        };

        // 1-2. Social meta tags
        for group in [&*OG_IMAGE, &*TWITTER_IMAGE] {
            let found = group
                .iter()
                .filter_map(|sel| meta_content(document, sel))
                .find_map(|c| accept(&c));
            if found.is_some() {
                return found;
            }
        }

        // 3. First image inside a content region
        for region in IMAGE_REGIONS.iter() {
            let first = document
                .select(region)
                .next()
                .and_then(first_img_src);
            if let Some(src) = first.and_then(|s| accept(&s)) {
                return Some(src);
            }
        }

        // 4. First image anywhere
        document
            .select(&IMG)
            .next()
            .and_then(|el| el.value().attr("src"))
            .and_then(accept)
    }
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
}

fn first_img_src(region: ElementRef<'_>) -> Option<String> {
    region
        .select(&IMG)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string)
}
