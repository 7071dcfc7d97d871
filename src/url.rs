//! The background `url(...)` pattern
//!
//! Matches `url(`, an optional quote, the path (non-greedy), an optional quote and `)`.
//! The three capture groups are the prefix, the path and the suffix, so a rewrite can
//! swap the path while keeping whatever quoting the author used.

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Source of the background URL pattern.
pub const BACKGROUND_URL_PATTERN: &str = r#"(?i)(url\(["']?)(.*?)(["']?\))"#;

/// Shared compiled background URL pattern.
pub fn background_url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(BACKGROUND_URL_PATTERN).expect("background URL pattern is valid"))
}

/// Whether `value` contains at least one `url(...)`.
pub fn has_url(value: &str) -> bool {
    background_url_regex().is_match(value)
}

/// One `url(...)` occurrence inside a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlMatch<'a> {
    /// Byte range of the whole match within the scanned text
    pub start: usize,
    pub end: usize,
    /// `url(` plus the opening quote, if any
    pub prefix: &'a str,
    /// The path argument
    pub path: &'a str,
    /// The closing quote, if any, plus `)`
    pub suffix: &'a str,
}

impl<'a> UrlMatch<'a> {
    fn from_captures(caps: &Captures<'a>) -> Option<Self> {
        let whole = caps.get(0)?;
        Some(Self {
            start: whole.start(),
            end: whole.end(),
            prefix: caps.get(1).map_or("", |m| m.as_str()),
            path: caps.get(2).map_or("", |m| m.as_str()),
            suffix: caps.get(3).map_or("", |m| m.as_str()),
        })
    }
}

/// Every `url(...)` occurrence in `text`, in source order.
///
/// The scan cursor always moves forward: after a zero-length match it advances by
/// one character so the loop cannot stall.
pub fn find_urls(text: &str) -> Vec<UrlMatch<'_>> {
    let regex = background_url_regex();
    let mut matches = Vec::new();
    let mut cursor = 0;

    while cursor <= text.len() {
        let Some(caps) = regex.captures_at(text, cursor) else {
            break;
        };
        let Some(found) = UrlMatch::from_captures(&caps) else {
            break;
        };

        cursor = if found.end == found.start {
            next_char_boundary(text, found.end)
        } else {
            found.end
        };
        matches.push(found);
    }

    matches
}

/// Replace each `url(...)` in `text` with whatever `replace` returns for it.
pub fn replace_urls<F>(text: &str, mut replace: F) -> String
where
    F: FnMut(&UrlMatch<'_>) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for found in find_urls(text) {
        if let Some(replacement) = replace(&found) {
            out.push_str(&text[last..found.start]);
            out.push_str(&replacement);
            last = found.end;
        }
    }

    out.push_str(&text[last..]);
    out
}

fn next_char_boundary(text: &str, index: usize) -> usize {
    text[index..].chars().next().map_or(text.len() + 1, |ch| index + ch.len_utf8())
}
