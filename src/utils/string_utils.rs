//! UTF-8 safe helpers for log output

/// Cuts `s` to at most `max_bytes`, backing off to the previous char boundary.
///
/// ```
/// use ghl_sales_bot::utils::string_utils::truncate_safe;
///
/// assert_eq!(truncate_safe("Olá, mundo", 3), "Ol");
/// ```
pub fn truncate_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    &s[..end]
}

/// Short prefix of an identifier followed by `...`, for logging codes and ids
pub fn redact(s: &str, visible_bytes: usize) -> String {
    let prefix = truncate_safe(s, visible_bytes);
    if prefix.len() < s.len() {
        format!("{}...", prefix)
    } else {
        prefix.to_string()
    }
}
