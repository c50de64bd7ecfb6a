//! # Text Fitter
//!
//! Packs a generated body and its hashtags into a fixed length budget.
//! Lengths are weighted: code points outside the Basic Multilingual Plane
//! (most emoji) count as two units, everything else as one.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Appended to a body that had to be cut at a word boundary.
pub const ELLIPSIS: char = '\u{2026}';

/// Appended when the body had to be cut mid-word as a last resort.
pub const HARD_TRUNCATION_MARKER: &str = "...";

static HASHTAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\w+").expect("valid hashtag pattern"));
static SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("valid space pattern"));
static TRAILING_DOTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\s*\.{3})+\s*$").expect("valid trailing dots pattern"));

/// Length in platform units.
pub fn weighted_len(text: &str) -> usize {
    text.chars().map(char_width).sum()
}

fn char_width(c: char) -> usize {
    if u32::from(c) > 0xFFFF {
        2
    } else {
        1
    }
}

/// All `#word` tokens in order of appearance, duplicates included.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    HASHTAG
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Drops repeated tags, keeping the first occurrence of each.
pub fn dedup_hashtags<I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

/// Turns loose generator output ("ai", "#ML,") into a single `#word` token.
pub fn normalize_hashtag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let prefixed = if trimmed.starts_with('#') {
        trimmed.to_string()
    } else {
        format!("#{trimmed}")
    };
    HASHTAG
        .find(&prefixed)
        .filter(|m| m.start() == 0)
        .map(|m| m.as_str().to_string())
}

/// Fits `raw_text` plus hashtags into `limit` units.
///
/// Hashtags found in the text come first, followed by `extra_hashtags`
/// (normalized, see [`normalize_hashtag`]); the combined list is deduplicated
/// and appended after the body. When the body does not fit next to the tags it
/// is cut at a word boundary and marked with [`ELLIPSIS`]. Tags are dropped
/// from the end until the post fits. Re-fitting a fitted post under the same
/// limit returns it unchanged.
pub fn fit_post(raw_text: &str, extra_hashtags: &[String], limit: usize) -> String {
    let found = extract_hashtags(raw_text);
    let extra = extra_hashtags.iter().filter_map(|t| normalize_hashtag(t));
    let mut tags = dedup_hashtags(found.into_iter().chain(extra));
    let body = strip_body(raw_text);

    loop {
        let candidate = compose(&fit_body(&body, &tags, limit), &tags);
        if weighted_len(&candidate) <= limit {
            return candidate;
        }
        if tags.pop().is_none() {
            return hard_truncate(&body, limit);
        }
    }
}

/// Body text with hashtags and any trailing `...` removed.
fn strip_body(raw_text: &str) -> String {
    let without_tags = HASHTAG.replace_all(raw_text, "");
    let collapsed = SPACE_RUN.replace_all(&without_tags, " ");
    TRAILING_DOTS
        .replace(collapsed.trim(), "")
        .trim()
        .to_string()
}

fn fit_body(body: &str, tags: &[String], limit: usize) -> String {
    let available = if tags.is_empty() {
        limit
    } else {
        // one unit for the space separating body and tags
        limit.saturating_sub(weighted_len(&tags.join(" ")) + 1)
    };

    if weighted_len(body) <= available {
        return body.to_string();
    }

    // reserve one unit for the ellipsis
    let budget = available.saturating_sub(1);
    let mut kept = Vec::new();
    let mut used = 0;
    for word in body.split_whitespace() {
        let width = weighted_len(word);
        if used + width + 1 > budget {
            break;
        }
        kept.push(word);
        used += width + 1;
    }

    let mut fitted = kept.join(" ");
    fitted.push(ELLIPSIS);
    fitted
}

fn compose(body: &str, tags: &[String]) -> String {
    format!("{} {}", body, tags.join(" ")).trim().to_string()
}

fn hard_truncate(body: &str, limit: usize) -> String {
    if limit < HARD_TRUNCATION_MARKER.len() {
        return ".".repeat(limit);
    }

    let keep = limit - HARD_TRUNCATION_MARKER.len();
    let mut out = String::new();
    let mut used = 0;
    for c in body.chars() {
        let width = char_width(c);
        if used + width > keep {
            break;
        }
        out.push(c);
        used += width;
    }
    format!("{}{}", out.trim_end(), HARD_TRUNCATION_MARKER)
}
