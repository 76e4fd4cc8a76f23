/// Returns at most `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text.get(..byte_idx).unwrap_or(text),
        None => text,
    }
}

/// Character count, as opposed to `str::len` which counts bytes.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_multibyte_characters() {
        assert_eq!(truncate_chars("東京都心", 2), "東京");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 3), "");
        assert_eq!(char_len("台北"), 2);
    }
}
