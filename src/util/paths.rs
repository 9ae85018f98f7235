//! Path normalization and comparison utilities
//!
//! File paths inside torrents arrive with either separator depending on the
//! client platform. Internally everything is compared with forward slashes;
//! presentation keeps whatever form the client sent.

/// Normalize a torrent-internal path to forward slashes
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Normalize an info-hash for use as a map key
pub fn normalize_hash(hash: &str) -> String {
    hash.trim().to_lowercase()
}

/// Whether a path is an absolute Windows drive path (`C:/...` or `C:\...`).
///
/// URLs like `http://...` also carry a colon but are not drive paths.
pub fn is_windows_drive_abs(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}

/// Last path component of a torrent-internal path
pub fn base_name(path: &str) -> &str {
    let normalized_end = path.trim_end_matches(['/', '\\']);
    normalized_end
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(normalized_end)
}

/// File stem (basename without the final extension)
pub fn file_stem(path: &str) -> &str {
    let name = base_name(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Final extension, lowercased, without the dot
pub fn extension_lowercase(path: &str) -> Option<String> {
    let name = base_name(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_lowercase()),
        _ => None,
    }
}

/// Collapse a file name to a comparison key: the lowercased alphanumerics of
/// the stem plus the lowercased extension. `01 - Intro.FLAC` and
/// `01-intro.flac` collapse to the same key.
pub fn normalized_file_key(path: &str) -> String {
    let stem: String = file_stem(path)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();

    match extension_lowercase(path) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// First path segment when the path has at least one separator
pub fn first_segment(path: &str) -> Option<&str> {
    let normalized = path.trim_start_matches(['/', '\\']);
    let idx = normalized.find(['/', '\\'])?;
    Some(&normalized[..idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_path_converts_backslashes() {
        assert_eq!(normalize_path("Show\\Season 01\\e01.mkv"), "Show/Season 01/e01.mkv");
        assert_eq!(normalize_path("already/forward.mkv"), "already/forward.mkv");
    }

    #[test]
    fn test_windows_drive_detection() {
        assert!(is_windows_drive_abs("C:/downloads/x"));
        assert!(is_windows_drive_abs("d:\\torrents"));
        assert!(!is_windows_drive_abs("http://tracker.example/announce"));
        assert!(!is_windows_drive_abs("/mnt/storage"));
        assert!(!is_windows_drive_abs("relative/path"));
    }

    #[test]
    fn test_base_name_and_stem() {
        assert_eq!(base_name("Pack/Disc 1/Track01.flac"), "Track01.flac");
        assert_eq!(file_stem("Pack/Disc 1/Track01.flac"), "Track01");
        assert_eq!(file_stem("no-extension"), "no-extension");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[test]
    fn test_normalized_file_key_collapses_punctuation() {
        assert_eq!(normalized_file_key("01 - Intro.FLAC"), "01intro.flac");
        assert_eq!(normalized_file_key("01-intro.flac"), "01intro.flac");
        assert_eq!(normalized_file_key("README"), "readme");
    }

    #[test]
    fn test_first_segment() {
        assert_eq!(first_segment("Root/a/b.mkv"), Some("Root"));
        assert_eq!(first_segment("single.mkv"), None);
    }
}
