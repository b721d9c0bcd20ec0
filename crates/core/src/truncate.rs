// SPDX-License-Identifier: MIT

//! UTF-8-safe truncation with a trailing marker, used by the automation
//! runtime to cap captured stdout/stderr at a fixed size (spec §3, §8).

/// Truncation marker appended when output is elided. Counted as part of
/// the `limit`, so the returned string is never longer than `limit` bytes.
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Truncate `s` to at most `limit` *characters*, appending
/// [`TRUNCATION_MARKER`] in place of the elided tail so the total length is
/// exactly `limit` characters when truncation occurs.
pub fn truncate_utf8(s: &str, limit: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= limit {
        return s.to_string();
    }
    let marker = TRUNCATION_MARKER;
    let marker_len = marker.chars().count();
    let keep = limit.saturating_sub(marker_len);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str(marker);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_pass_through() {
        assert_eq!(truncate_utf8("hello", 8000), "hello");
    }

    #[test]
    fn long_strings_are_capped_at_exactly_the_limit() {
        let s = "a".repeat(9000);
        let out = truncate_utf8(&s, 8000);
        assert_eq!(out.chars().count(), 8000);
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let s = "é".repeat(5000); // 2 bytes each, 5000 chars
        let out = truncate_utf8(&s, 4000);
        assert_eq!(out.chars().count(), 4000);
    }
}
