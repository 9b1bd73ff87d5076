//! File-type families and extension inference.

use std::path::Path;

pub const IMAGES: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "heic", "heif", "webp"];

pub const DOCUMENTS: &[&str] = &["pdf"];

/// Lower-cases a user-supplied type and strips a leading dot.
pub fn normalize(file_type: &str) -> String {
    file_type.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Infers a file type from the extension of a local path.
pub fn from_path(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(normalize)
        .filter(|ext| !ext.is_empty())
}

/// Infers a file type from the last path segment of a URL, ignoring query
/// and fragment.
pub fn from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let segment = parsed.path_segments()?.last()?.to_string();
    from_path(Path::new(&segment))
}
