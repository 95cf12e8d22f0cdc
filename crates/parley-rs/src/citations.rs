//! Citation extraction from heterogeneous response payloads.
//!
//! Two passes, concatenated in this order:
//!
//! 1. A recursive descent over the structured response. At every object
//!    node, values under the keys `url`, `source` or `href` (any case) that
//!    are `http(s)` strings are collected.
//! 2. A URL pattern scan over the reply text.
//!
//! Each candidate is trimmed of surrounding punctuation and the list is
//! deduplicated keeping first-seen order. If the structured value cannot be
//! turned into a JSON tree, pass 1 is skipped with a warning and pass 2
//! still runs.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Object keys whose string values are treated as source URLs.
const URL_KEYS: [&str; 3] = ["url", "source", "href"];

/// Trailing characters stripped from each candidate.
const TRAILING_PUNCTUATION: &[char] = &[')', '.', ',', ';', ':', ']'];

/// Leading characters stripped from each candidate.
const LEADING_PUNCTUATION: &[char] = &['(', '['];

static URL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+").ok());

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Trim surrounding punctuation: trailing `).,;:]`, then leading `([`.
pub fn clean_url(candidate: &str) -> &str {
    candidate
        .trim()
        .trim_end_matches(TRAILING_PUNCTUATION)
        .trim_start_matches(LEADING_PUNCTUATION)
}

/// Collect URL-valued fields from a JSON tree, depth first, in document
/// order.
pub fn extract_from_value(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if let Value::String(s) = child {
                    let s = s.trim();
                    if URL_KEYS.contains(&key.to_lowercase().as_str()) && is_http_url(s) {
                        out.push(s.to_string());
                    }
                } else {
                    extract_from_value(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                extract_from_value(item, out);
            }
        }
        Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => {}
    }
}

/// Every `http(s)://` run of non-whitespace in `text`, in order.
pub fn extract_from_text(text: &str) -> Vec<String> {
    let Some(pattern) = URL_PATTERN.as_ref() else {
        return Vec::new();
    };
    pattern
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Extract cited URLs from a structured response and the reply text.
pub fn extract_citations<T: Serialize + ?Sized>(raw: &T, reply_text: &str) -> Vec<String> {
    let mut candidates = Vec::new();

    match serde_json::to_value(raw) {
        Ok(tree) => extract_from_value(&tree, &mut candidates),
        Err(e) => warn!("Structured citation scan skipped: {e}"),
    }
    candidates.extend(extract_from_text(reply_text));

    let mut seen = HashSet::new();
    let sources: Vec<String> = candidates
        .iter()
        .map(|c| clean_url(c))
        .filter(|c| !c.is_empty() && seen.insert(c.to_string()))
        .map(str::to_string)
        .collect();
    debug!(
        "Citations: {} candidate(s), {} unique",
        candidates.len(),
        sources.len()
    );
    sources
}

/// Render sources as a numbered "Sources:" block.
pub fn format_sources(sources: &[String]) -> String {
    if sources.is_empty() {
        return "Sources: (none detected)".to_string();
    }
    let lines: Vec<String> = sources
        .iter()
        .enumerate()
        .map(|(i, url)| format!("{}. {url}", i + 1))
        .collect();
    format!("Sources:\n{}", lines.join("\n"))
}
