//! Keyword and pattern heuristics for article text

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Disaster categories and the words that indicate them, in priority order
const DISASTER_KEYWORDS: &[(&str, &[&str])] = &[
    ("地震", &["地震", "震感", "震源"]),
    ("火灾", &["火灾", "起火", "燃烧"]),
    ("事故", &["事故", "碰撞", "塌陷", "爆炸"]),
    ("洪涝", &["洪水", "积水", "暴雨"]),
];

static LOSS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<amount>\d+(?:\.\d+)?)\s*(?P<unit>人|万元|亿元)").expect("loss pattern")
});

static DATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})[-/年](\d{1,2})[-/月](\d{1,2})").expect("date pattern"));

/// Casualty or damage figure mentioned in an article
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LossInfo {
    pub amount: String,
    pub unit: String,
}

/// Classifies text by the first disaster category whose keywords appear
pub fn detect_disaster_type(text: &str) -> Option<&'static str> {
    DISASTER_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| text.contains(keyword)))
        .map(|(category, _)| *category)
}

/// Finds the first "<number> 人|万元|亿元" figure
pub fn extract_loss_info(text: &str) -> Option<LossInfo> {
    let captures = LOSS_PATTERN.captures(text)?;
    Some(LossInfo {
        amount: captures["amount"].to_string(),
        unit: captures["unit"].to_string(),
    })
}

/// Finds the first `YYYY-MM-DD`, `YYYY/MM/DD` or `YYYY年MM月DD` date
///
/// A match that is not a real calendar date yields `None`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let captures = DATE_PATTERN.captures(text)?;
    let year = captures[1].parse().ok()?;
    let month = captures[2].parse().ok()?;
    let day = captures[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Guesses a place name from the text preceding a marker such as 市 or 区
///
/// Markers are tried in order. The result is up to `window` characters
/// before the first occurrence plus the marker itself. With `max_offset`,
/// a marker found at or beyond that character position (or at position 0)
/// does not count.
pub fn guess_location(
    text: &str,
    markers: &[&str],
    window: usize,
    max_offset: Option<usize>,
) -> Option<String> {
    for marker in markers {
        let Some(byte_index) = text.find(marker) else {
            continue;
        };
        let offset = text[..byte_index].chars().count();
        if let Some(limit) = max_offset {
            if offset == 0 || offset >= limit {
                continue;
            }
        }

        let start = offset.saturating_sub(window);
        let length = offset - start + marker.chars().count();
        let location: String = text.chars().skip(start).take(length).collect();
        let location = location.trim();
        if !location.is_empty() {
            return Some(location.to_string());
        }
    }
    None
}
