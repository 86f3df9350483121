//! Destination filename generation.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use url::Url;

/// Date prefix format, e.g. `20240501`.
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Destination name `{YYYYMMDD}_{original_filename}`.
pub fn destination_name(run_date: NaiveDate, original_filename: &str) -> String {
    format!("{}_{}", run_date.format(DATE_FORMAT), original_filename)
}

/// Last path segment of `url`, percent-decoded, without query or fragment.
///
/// URLs without a final segment get `image_{hash}.jpg`, where `hash` is the
/// first 8 hex digits of the URL's SHA-256, so the name is stable across runs.
pub fn original_filename(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let cleaned = sanitize(&decoded);

    if cleaned.is_empty() {
        let hash = hex::encode(Sha256::digest(url.as_str().as_bytes()));
        format!("image_{}.jpg", &hash[..8])
    } else {
        cleaned
    }
}

/// Replace characters that would create subfolders or break object paths.
fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
