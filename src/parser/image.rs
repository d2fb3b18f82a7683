//! Image URL heuristics shared by the feed parser and content extractor

use url::Url;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

const IMAGE_KEYWORDS: &[&str] = &["image", "img", "photo", "picture", "pic", "notion.so/image"];

const IMAGE_DOMAIN_HINTS: &[&str] = &["images.unsplash.com", "cdn.", "img.", "static.", "media."];

/// Whether `url` plausibly points at an image
///
/// Accepts absolute URLs and root/dot-relative paths. A known image
/// extension is enough; otherwise the URL must contain an image keyword
/// or a CDN-style host hint. This is a pre-download guess: the asset
/// importer's Content-Type check is the final gate.
pub fn is_valid_image_url(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() {
        return false;
    }

    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) if is_relative_url(url) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
        Err(_) => return false,
    };

    if let Some(ext) = path.rsplit('/').next().and_then(|name| name.rsplit_once('.')) {
        if IMAGE_EXTENSIONS.contains(&ext.1.to_lowercase().as_str()) {
            return true;
        }
    }

    let lower = url.to_lowercase();
    IMAGE_KEYWORDS.iter().any(|k| lower.contains(k))
        || IMAGE_DOMAIN_HINTS.iter().any(|d| lower.contains(d))
}

/// Root-relative or dot-relative reference
pub fn is_relative_url(url: &str) -> bool {
    url.starts_with('/') || url.starts_with("./") || url.starts_with("../")
}

/// Resolve `url` against `base`
///
/// Absolute URLs come back unchanged, protocol-relative URLs take the
/// base scheme and paths resolve against the base directory. Without a
/// usable base the input is returned as is.
pub fn make_absolute_url(url: &str, base: Option<&str>) -> String {
    if Url::parse(url).is_ok() {
        return url.to_string();
    }

    match base.and_then(|b| Url::parse(b).ok()) {
        Some(base) => base
            .join(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string()),
        None => url.to_string(),
    }
}
