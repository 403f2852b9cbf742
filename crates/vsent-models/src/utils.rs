//! Filename helpers shared by the upload path and result naming.

/// Name used when sanitization leaves nothing behind.
pub const DEFAULT_FILENAME: &str = "upload";

/// Reduce a client-supplied filename to a safe single path component.
///
/// Path separators and whitespace runs become `_`, anything outside
/// `[A-Za-z0-9._-]` is dropped, and leading/trailing dots and underscores are
/// trimmed so the result can never climb out of its directory.
pub fn sanitize_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let filtered: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();

    let trimmed = filtered.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain_names() {
        assert_eq!(sanitize_filename("clip1.mp4"), "clip1.mp4");
        assert_eq!(sanitize_filename("My cool movie.mp4"), "My_cool_movie.mp4");
    }

    #[test]
    fn test_sanitize_traversal() {
        assert_eq!(sanitize_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("..\\windows\\system32"), "windows_system32");
    }

    #[test]
    fn test_sanitize_empty_results() {
        assert_eq!(sanitize_filename(""), DEFAULT_FILENAME);
        assert_eq!(sanitize_filename(".."), DEFAULT_FILENAME);
        assert_eq!(sanitize_filename("日本語"), DEFAULT_FILENAME);
    }
}
