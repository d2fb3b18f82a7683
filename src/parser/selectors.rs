//! CSS selectors used by the content extractor
//!
//! Each list is tried in order; the order is part of the extraction
//! contract and must not be shuffled.

use lazy_static::lazy_static;
use scraper::Selector;

// Helper macro to parse selectors safely at compile time
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    pub static ref TITLE: Selector = parse_selector!("title");

    pub static ref BASE_HREF: Selector = parse_selector!("base[href]");

    /// Main content containers, most specific first
    pub static ref CONTENT_REGIONS: Vec<Selector> = vec![
        parse_selector!("article"),
        parse_selector!("main"),
        parse_selector!("body"),
    ];

    pub static ref OG_IMAGE: Vec<Selector> = vec![
        parse_selector!(r#"meta[property="og:image"]"#),
        parse_selector!(r#"meta[name="og:image"]"#),
    ];

    pub static ref TWITTER_IMAGE: Vec<Selector> = vec![
        parse_selector!(r#"meta[name="twitter:image"]"#),
        parse_selector!(r#"meta[property="twitter:image"]"#),
    ];

    /// Regions searched for an inline image before the whole page
    pub static ref IMAGE_REGIONS: Vec<Selector> = vec![
        parse_selector!("article"),
        parse_selector!("main"),
        parse_selector!(".entry-content"),
        parse_selector!(".post-content"),
    ];

    pub static ref IMG: Selector = parse_selector!("img[src]");
}
