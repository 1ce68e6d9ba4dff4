//! SQL `LIKE` pattern translation shared by the document and in-memory
//! backends, plus `LIKE`-metacharacter escaping for the SQL builder.

/// Translate a SQL `LIKE` pattern into an anchored regex: `%` matches any
/// run, `_` any single character, everything else literally.
pub(crate) fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out.push('$');
    out
}

/// Escape `LIKE` metacharacters in a user value so `CONTAINS`-family
/// rewrites match the value literally.
pub(crate) fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{escape_like, like_to_regex};
    use regex::Regex;

    #[test]
    fn like_wildcards_translate_to_regex() {
        assert_eq!(like_to_regex("Wire%"), "^Wire.*$");
        assert_eq!(like_to_regex("W_re"), "^W.re$");

        let re = Regex::new(&like_to_regex("Wire%")).expect("pattern should compile");
        assert!(re.is_match("Wireless"));
        assert!(!re.is_match("Hardwire"));
    }

    #[test]
    fn regex_metacharacters_in_patterns_are_literal() {
        let re = Regex::new(&like_to_regex("a.b%")).expect("pattern should compile");
        assert!(re.is_match("a.bc"));
        assert!(!re.is_match("aXbc"));
    }

    #[test]
    fn escape_like_neutralizes_metacharacters() {
        assert_eq!(escape_like("50%_off\\now"), "50\\%\\_off\\\\now");
        assert_eq!(escape_like("plain"), "plain");
    }
}
