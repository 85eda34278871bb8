//! Text helpers shared by prompt construction

/// Prompt budget for diffs
pub const DIFF_LIMIT: usize = 4000;
/// Prompt budget for reviews handed to the evaluator
pub const REVIEW_LIMIT: usize = 4000;
/// Prompt budget for static analysis output
pub const STATIC_LIMIT: usize = 2000;
/// Prompt budget for retrieved context
pub const CONTEXT_LIMIT: usize = 2000;

const MARKER: &str = "... (Output truncated)";

/// Truncate to at most `max_len` bytes of the original, preferring a line break
///
/// Text that fits is returned unchanged. Otherwise the cut happens at the last
/// newline inside the budget (or at the budget when there is none) and a
/// truncation marker is appended.
pub fn safe_truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }

    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let truncated = &text[..cut];

    match truncated.rfind('\n') {
        Some(pos) => format!("{}\n\n{}", &truncated[..pos], MARKER),
        None => format!("{} {}", truncated, MARKER),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_unchanged() {
        assert_eq!(safe_truncate("abc", 10), "abc");
        assert_eq!(safe_truncate("", 0), "");
    }

    #[test]
    fn test_cuts_at_last_newline() {
        let text = "line one\nline two\nline three";
        assert_eq!(
            safe_truncate(text, 15),
            "line one\n\n... (Output truncated)"
        );
    }

    #[test]
    fn test_no_newline() {
        assert_eq!(safe_truncate("abcdefgh", 4), "abcd ... (Output truncated)");
    }

    #[test]
    fn test_respects_char_boundaries() {
        // 'é' is two bytes; a cut at byte 3 would split it
        let out = safe_truncate("abé", 3);
        assert_eq!(out, "ab ... (Output truncated)");
    }
}
