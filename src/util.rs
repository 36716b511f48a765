use std::sync::OnceLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;

/// Format a UTC instant the way every timestamp column is stored:
/// RFC 3339, millisecond precision, `Z` suffix. Fixed width keeps string
/// comparison in SQL consistent with chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

fn non_digits() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9]+").expect("static regex"))
}

/// Strip everything but ASCII digits from a phone number.
///
/// Example: "+1 (555) 123-4567" → "15551234567"
pub fn digits_only(phone: &str) -> String {
    non_digits().replace_all(phone, "").into_owned()
}

/// Truncate `text` to at most `max` characters, appending "..." when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("+1 (555) 123-4567"), "15551234567");
        assert_eq!(digits_only("555-1234"), "5551234");
        assert_eq!(digits_only("ext."), "");
        // Non-ASCII digits (Arabic-Indic here) are not part of the key.
        assert_eq!(digits_only("\u{0665}\u{0665}\u{0665}-12"), "12");
        assert_eq!(digits_only(""), "");
    }

    #[test]
    fn test_timestamp_format_and_ordering() {
        let early = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 11, 2, 3, 4, 5).unwrap();
        let a = format_timestamp(early);
        let b = format_timestamp(late);
        assert_eq!(a, "2025-01-02T03:04:05.000Z");
        assert!(a < b);
    }

    #[test]
    fn test_truncate_chars_is_char_boundary_safe() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("Привет мир", 6), "Привет...");
    }
}
