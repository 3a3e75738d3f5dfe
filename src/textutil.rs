//! Shared UTF-8-safe text normalization helpers.
//!
//! Tag names, checkout summaries, and dashboard previews all truncate or
//! normalize text. Byte slicing directly can panic when the cut falls inside
//! a multi-byte character, so these helpers centralize safe behavior.

/// Return a prefix of at most `max_chars` characters.
pub fn cap_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Truncate by characters and append `suffix` when truncation occurs.
pub fn truncate_with_suffix_by_chars(text: &str, max_chars: usize, suffix: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max_chars).collect();
    format!("{prefix}{suffix}")
}

/// Collapse every run of whitespace into a single `joiner` character.
///
/// Leading/trailing whitespace is dropped rather than replaced.
pub fn collapse_whitespace(text: &str, joiner: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            in_run = true;
            continue;
        }
        if in_run && !out.is_empty() {
            out.push(joiner);
        }
        in_run = false;
        out.push(ch);
    }
    out
}

/// Single-line preview used by dashboard rendering.
pub fn preview_line(text: &str, max_chars: usize) -> String {
    let flattened = collapse_whitespace(text, ' ');
    truncate_with_suffix_by_chars(&flattened, max_chars, "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_chars_keeps_short_text() {
        assert_eq!(cap_chars("hello", 10), "hello");
    }

    #[test]
    fn cap_chars_counts_characters_not_bytes() {
        assert_eq!(cap_chars("ab🙂cd", 3), "ab🙂");
    }

    #[test]
    fn truncate_with_suffix_by_chars_limits_by_character_count() {
        let out = truncate_with_suffix_by_chars("ab🙂cd", 3, "...");
        assert_eq!(out, "ab🙂...");
    }

    #[test]
    fn collapse_whitespace_joins_runs() {
        assert_eq!(collapse_whitespace("  keep   phase one\t\n", '_'), "keep_phase_one");
        assert_eq!(collapse_whitespace("single", '_'), "single");
        assert_eq!(collapse_whitespace("   ", '_'), "");
    }

    #[test]
    fn preview_line_flattens_and_truncates() {
        let out = preview_line("first line\nsecond  line", 14);
        assert_eq!(out, "first line sec...");
    }
}
