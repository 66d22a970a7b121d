//! String utility functions for safe UTF-8 text manipulation

/// Safely truncate a string at a character boundary, adding ellipsis if truncated.
///
/// Unlike naive byte slicing (`&s[..n]`), this function ensures we don't slice
/// in the middle of a multi-byte UTF-8 character, which would cause a panic.
/// Used for log previews of inbound requests.
///
/// # Examples
/// ```
/// use solveit_core::utils::string::truncate_at_char_boundary;
///
/// assert_eq!(truncate_at_char_boundary("hello world", 5), "hello...");
/// assert_eq!(truncate_at_char_boundary("hello", 10), "hello");
/// assert_eq!(truncate_at_char_boundary("hello→world", 6), "hello→...");
/// ```
pub fn truncate_at_char_boundary(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((byte_idx, _)) => format!("{}...", &s[..byte_idx]),
    }
}

/// Longest prefix of `s` that fits in `max_bytes` without splitting a character.
///
/// # Examples
/// ```
/// use solveit_core::utils::string::prefix_within_bytes;
///
/// assert_eq!(prefix_within_bytes("abcdef", 4), "abcd");
/// // '→' is three bytes; it cannot be split
/// assert_eq!(prefix_within_bytes("ab→cd", 3), "ab");
/// ```
pub fn prefix_within_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
