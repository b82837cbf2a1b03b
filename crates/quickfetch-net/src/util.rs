// crates/quickfetch-net/src/util.rs
//! URL normalization and query-string formatting

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns true if the URL is already absolute (http:// or https://)
pub(crate) fn is_absolute_http(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Joins a relative path onto the base URL; absolute URLs pass through
pub(crate) fn join_url(base: &str, url: &str) -> String {
    let url = url.trim();
    if is_absolute_http(url) {
        url.to_string()
    } else {
        format!("{}{}", base, url)
    }
}

/// Formats an ordered parameter map as `k=v&k2=v2` with percent-encoded
/// values and no trailing separator
pub(crate) fn format_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Appends GET parameters to a URL. A URL that already carries a query
/// string is extended with `&` instead of a second `?`.
pub(crate) fn format_get(url: &str, params: &BTreeMap<String, String>) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, sep, format_query(params))
}

/// Derives a local file name from the last URL path segment, replacing
/// characters that are unsafe in file names. Falls back to a millisecond
/// timestamp when the URL has no usable segment.
pub(crate) fn file_name_from_url(url: &str) -> String {
    let fallback = || {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().to_string())
            .unwrap_or_else(|_| "download".to_string())
    };

    match url.rfind('/') {
        Some(idx) if idx + 1 < url.len() => {
            let segment = &url[idx + 1..];
            let cleaned: String = segment
                .chars()
                .map(|c| match c {
                    '?' | '=' | '/' | '\\' => '_',
                    other => other,
                })
                .collect();
            if cleaned.is_empty() {
                fallback()
            } else {
                cleaned
            }
        }
        _ => fallback(),
    }
}
