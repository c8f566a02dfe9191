//! Upload filename helpers

/// Longest file name stored against a SEFT instrument
pub const MAX_STORED_FILE_NAME: usize = 32;

/// Split a file name into base name and extension
///
/// The extension keeps its leading dot. A name without a dot (or whose only
/// dot is the first character) has an empty extension.
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (&file_name[..idx], &file_name[idx..]),
        _ => (file_name, ""),
    }
}

/// Check an extension (with leading dot) against a configured list
///
/// The list entries are given without dots (`xls`, `xlsx`). Matching is case
/// sensitive.
pub fn is_valid_extension(extension: &str, allowed: &[String]) -> bool {
    match extension.strip_prefix('.') {
        Some(ext) => allowed.iter().any(|a| a.trim_start_matches('.') == ext),
        None => false,
    }
}

/// Check a base name length (in characters) against the configured maximum
pub fn is_valid_name_length(base_name: &str, max_length: usize) -> bool {
    base_name.chars().count() <= max_length
}

/// Truncate a file name to the stored maximum on a character boundary
pub fn truncate_file_name(file_name: &str) -> String {
    file_name.chars().take(MAX_STORED_FILE_NAME).collect()
}
