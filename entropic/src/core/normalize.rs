//! Title keys used to match risks across independent samples.

/// Lower-case `s`, collapse every run of non-`[a-z0-9]` characters into a single
/// space, and trim.
pub fn normalize_key(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for ch in s.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_punctuation_insensitive() {
        assert_eq!(normalize_key("Cache Invalidation!"), "cache invalidation");
        assert_eq!(normalize_key("cache   invalidation"), "cache invalidation");
        assert_eq!(normalize_key("  --Cache__invalidation--  "), "cache invalidation");
    }

    #[test]
    fn idempotent() {
        for s in ["Cache Invalidation!", "  a.b  C ", "", "ÜBER-cache 2", "!!!"] {
            let once = normalize_key(s);
            assert_eq!(normalize_key(&once), once, "input {s:?}");
        }
    }

    #[test]
    fn non_ascii_letters_are_separators() {
        assert_eq!(normalize_key("café latency"), "caf latency");
        assert_eq!(normalize_key("!!!"), "");
    }
}
