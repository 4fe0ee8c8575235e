//! Wildcard matching for skip-user patterns.
//!
//! Supports `*` (zero or more characters) and `?` (exactly one character).
//! Matching is case-sensitive; skip patterns are matched against the
//! identity string the engine would otherwise look up.

/// Returns true if `candidate` matches any of `patterns`.
pub fn match_any(patterns: &[String], candidate: &str) -> bool {
    patterns.iter().any(|p| matches(p, candidate))
}

/// Returns true if `candidate` matches the wildcard `pattern`.
pub fn matches(pattern: &str, candidate: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = candidate.chars().collect();
    glob(&p, &t)
}

fn glob(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => {
            // try every possible span for the star, including empty
            (0..=text.len()).any(|i| glob(rest, &text[i..]))
        }
        Some(('?', rest)) => match text.split_first() {
            Some((_, text_rest)) => glob(rest, text_rest),
            None => false,
        },
        Some((c, rest)) => match text.split_first() {
            Some((t, text_rest)) if t == c => glob(rest, text_rest),
            _ => false,
        },
    }
}
