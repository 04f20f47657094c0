//! URL modeling and filename/MIME derivation.
//!
//! Derives safe local filenames from the Content-Disposition header or the
//! final URL path, and normalizes the response Content-Type.

mod content_disposition;
mod path;
mod sanitize;

pub use content_disposition::parse_content_disposition_filename;
pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename;

/// On-disk name used when neither the task nor its URL yields a usable name.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Resolves the filename for a fresh attempt from response metadata.
///
/// Prefers the filename from `content_disposition` (extended form first),
/// otherwise the last path segment of `final_url`, percent-decoded. Returns
/// `None` when nothing usable remains after sanitizing.
///
/// # Examples
///
/// - `resolve_filename("https://example.com/archive.zip", None, None)` → `Some("archive.zip")`
/// - `resolve_filename("https://example.com/", Some("attachment; filename=\"a.bin\""), None)` → `Some("a.bin")`
pub fn resolve_filename(
    final_url: &str,
    content_disposition: Option<&str>,
    charset: Option<&str>,
) -> Option<String> {
    content_disposition
        .and_then(|cd| parse_content_disposition_filename(cd, charset))
        .map(|name| sanitize_filename(&name))
        .filter(|name| !name.is_empty())
        .or_else(|| {
            filename_from_url_path(final_url)
                .map(|name| sanitize_filename(&name))
                .filter(|name| !name.is_empty())
        })
}

/// Name used on disk for a task whose filename was never resolved.
pub fn fallback_filename(url: &str) -> String {
    filename_from_url_path(url)
        .map(|name| sanitize_filename(&name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

/// MIME type of a `Content-Type` value without parameters, lowercased.
pub fn mime_type(content_type: Option<&str>) -> Option<String> {
    let essence = content_type?.split(';').next()?.trim();
    if essence.is_empty() {
        None
    } else {
        Some(essence.to_ascii_lowercase())
    }
}

/// `charset` parameter of a `Content-Type` value, if any.
pub fn charset(content_type: Option<&str>) -> Option<String> {
    content_type?.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}
