//! Small helpers over `scraper` shared by the HTML sources

use crate::sources::ParseError;
use scraper::{ElementRef, Selector};

/// Compiles a CSS selector
pub fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Selector(format!("{}: {:?}", css, e)))
}

/// Text of an element, one trimmed line per non-empty text node
pub fn block_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trimmed text of the first match below `element`, if any
pub fn first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(|found| found.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}
