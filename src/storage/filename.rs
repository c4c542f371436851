use crate::error::{GalleryError, Result};

/// Reduce a client-supplied name to a safe flat filename.
///
/// Non-ASCII characters are dropped, path separators and whitespace runs
/// become `_`, anything outside `[A-Za-z0-9_.-]` is removed and leading or
/// trailing `.`/`_` are trimmed. An empty result is rejected.
pub fn sanitize_filename(name: &str) -> Result<String> {
    let spaced: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        return Err(GalleryError::Validation(format!(
            "filename {:?} has no usable characters",
            name
        )));
    }

    Ok(trimmed.to_string())
}

/// Lowercased extension of `filename`, if it has one
pub fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn validate_extension(filename: &str, allowed: &[String]) -> Result<()> {
    match extension_of(filename) {
        Some(ext) if allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)) => Ok(()),
        Some(ext) => Err(GalleryError::Validation(format!(
            "extension .{} is not allowed (expected one of {})",
            ext,
            allowed.join(", ")
        ))),
        None => Err(GalleryError::Validation(format!(
            "filename {:?} has no extension",
            filename
        ))),
    }
}

/// Candidate storage name for the `attempt`-th try: `photo.jpg`, `photo-1.jpg`, ...
pub(crate) fn numbered(filename: &str, attempt: usize) -> String {
    if attempt == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) => format!("{}-{}.{}", stem, attempt, ext),
        None => format!("{}-{}", filename, attempt),
    }
}
