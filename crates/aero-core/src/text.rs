//! Text helpers shared by the control path.

/// Upper bound on error text persisted to the audit log.
pub const MAX_ERROR_CHARS: usize = 500;

/// Cut `message` to at most `max` characters, respecting UTF-8 boundaries.
pub fn truncate_chars(message: &str, max: usize) -> String {
    match message.char_indices().nth(max) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_are_untouched() {
        assert_eq!(truncate_chars("timeout", 500), "timeout");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn long_messages_are_cut() {
        let long = "x".repeat(600);
        assert_eq!(truncate_chars(&long, MAX_ERROR_CHARS).len(), 500);
    }

    #[test]
    fn cuts_on_char_boundaries() {
        assert_eq!(truncate_chars("µg/m³ too high", 5), "µg/m³");
    }
}
