//! Filename extraction, sanitization, and path resolution for downloads.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Name used when neither the headers nor the URL yield one.
pub const DEFAULT_FILENAME: &str = "download";

/// `filename*=UTF-8''<percent-encoded>` (RFC 5987).
#[allow(clippy::expect_used)]
static EXTENDED_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)filename\*\s*=\s*UTF-8''([^;\s]+)").expect("extended filename regex is valid") // Static pattern, safe to panic
});

/// `filename="<name>"` or `filename=<name>`.
#[allow(clippy::expect_used)]
static PLAIN_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]*)"|([^;]+))"#).expect("filename regex is valid") // Static pattern, safe to panic
});

/// Derives the download filename from a `Content-Disposition` header value,
/// falling back to the last URL path segment and then to [`DEFAULT_FILENAME`].
///
/// The extended `filename*` form wins over `filename`. Both are
/// percent-decoded; a value that fails to decode is used as-is.
#[must_use]
pub fn extract_filename(content_disposition: Option<&str>, url: &str) -> String {
    content_disposition
        .and_then(parse_content_disposition)
        .or_else(|| filename_from_url(url))
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

/// Parses a `Content-Disposition` header value into a filename.
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(captures) = EXTENDED_FILENAME.captures(header) {
        let encoded = captures.get(1)?.as_str();
        return Some(percent_decode(encoded));
    }

    let captures = PLAIN_FILENAME.captures(header)?;
    let raw = captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().trim())?;
    (!raw.is_empty()).then(|| percent_decode(raw))
}

/// Last non-empty path segment of `url`, ignoring query and fragment.
fn filename_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path
        .split_once("://")
        .map_or(path, |(_, rest)| rest.split_once('/').map_or("", |(_, p)| p));
    let last = path.rsplit('/').next()?;
    (!last.is_empty()).then(|| percent_decode(last))
}

fn percent_decode(value: &str) -> String {
    urlencoding::decode(value).map_or_else(
        |e| {
            debug!(value = %value, error = %e, "percent-decoding failed, using raw value");
            value.to_string()
        },
        std::borrow::Cow::into_owned,
    )
}

/// Sanitizes a filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

/// Resolves a unique file path in `dir`, adding a numeric suffix if the file exists.
///
/// `report.pdf`, then `report_1.pdf`, `report_2.pdf`, ...
pub(crate) fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let filename = {
        let sanitized = sanitize_filename(filename);
        if sanitized.trim_matches('_').is_empty() {
            DEFAULT_FILENAME.to_string()
        } else {
            sanitized
        }
    };
    let base_path = dir.join(&filename);

    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename.as_str(), ""),
    };

    for i in 1..1000 {
        let new_path = dir.join(format!("{stem}_{i}{ext}"));
        if !new_path.exists() {
            return new_path;
        }
    }

    let timestamp = chrono::Utc::now().timestamp();
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
