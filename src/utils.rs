//! Naming helpers for job directories and archives

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Characters stripped from path components
///
/// The pattern is a constant; `unsafe_chars_pattern_compiles` pins it.
#[allow(clippy::expect_used)]
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^-\w.]").expect("constant pattern compiles"));

/// Make a string usable as a single path component
///
/// Whitespace becomes `_`, everything except word characters, `-` and `.`
/// is dropped.
///
/// # Examples
///
/// ```
/// use xbox_savegame_dl::utils::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("Test Player"), "Test_Player");
/// assert_eq!(sanitize_file_name("a/b:c"), "abc");
/// ```
pub fn sanitize_file_name(name: &str) -> String {
    let spaced: String = name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();

    let cleaned = UNSAFE_CHARS.replace_all(&spaced, "").into_owned();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Unique id of one download invocation: `{user_id}_{unix millis}`
pub fn request_id(user_id: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}", sanitize_file_name(user_id), at.timestamp_millis())
}

/// `{pfn}_Saves_{display_name}_{request_id}.zip`
pub fn archive_file_name(pfn: &str, display_name: &str, request_id: &str) -> String {
    format!(
        "{}_Saves_{}_{}.zip",
        sanitize_file_name(pfn),
        sanitize_file_name(display_name),
        request_id
    )
}
