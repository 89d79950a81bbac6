//! Glob matching for KEYS patterns
//!
//! Supported syntax:
//! - `*` any run of characters (including none)
//! - `?` exactly one character
//! - `[abc]`, `[a-z]`, `[^abc]` character classes
//! - `\x` matches `x` literally

/// Match `text` against a glob `pattern`
///
/// Runs in `O(pattern * text)`: only the most recent `*` is ever retried.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let mut pattern = pattern.as_bytes();
    let mut text = text.as_bytes();
    // Pattern after the last star, and where that star's run currently ends
    let mut resume: Option<(&[u8], &[u8])> = None;

    loop {
        if pattern.first() == Some(&b'*') {
            while pattern.first() == Some(&b'*') {
                pattern = &pattern[1..];
            }
            if pattern.is_empty() {
                return true;
            }
            resume = Some((pattern, text));
            continue;
        }

        if pattern.is_empty() && text.is_empty() {
            return true;
        }

        if let Some((rest, remaining)) = match_one(pattern, text) {
            pattern = rest;
            text = remaining;
            continue;
        }

        // Mismatch: let the last star swallow one more byte and retry
        match resume {
            Some((after_star, [_, remaining @ ..])) => {
                resume = Some((after_star, remaining));
                pattern = after_star;
                text = remaining;
            }
            _ => return false,
        }
    }
}

/// Match the next non-star pattern element against the first text byte.
/// Returns what is left of both on success.
fn match_one<'p, 't>(pattern: &'p [u8], text: &'t [u8]) -> Option<(&'p [u8], &'t [u8])> {
    let (&p, &c) = (pattern.first()?, text.first()?);
    let rest = match p {
        b'?' => &pattern[1..],
        b'[' => {
            let (matched, rest) = match_class(&pattern[1..], c);
            if !matched {
                return None;
            }
            rest
        }
        b'\\' if pattern.len() > 1 => {
            if pattern[1] != c {
                return None;
            }
            &pattern[2..]
        }
        _ => {
            if p != c {
                return None;
            }
            &pattern[1..]
        }
    };
    Some((rest, &text[1..]))
}

/// Match one byte against a class body (after `[`). Returns the match result
/// and the pattern remaining after the closing `]`. An unterminated class
/// consumes the rest of the pattern.
fn match_class(mut class: &[u8], c: u8) -> (bool, &[u8]) {
    let negate = class.first() == Some(&b'^');
    if negate {
        class = &class[1..];
    }

    let mut matched = false;
    loop {
        match class {
            [] => break,
            [b']', rest @ ..] => {
                class = rest;
                return (matched != negate, class);
            }
            [b'\\', escaped, rest @ ..] => {
                matched |= *escaped == c;
                class = rest;
            }
            [start, b'-', end, rest @ ..] if *end != b']' => {
                let (lo, hi) = if start <= end { (*start, *end) } else { (*end, *start) };
                matched |= lo <= c && c <= hi;
                class = rest;
            }
            [single, rest @ ..] => {
                matched |= *single == c;
                class = rest;
            }
        }
    }
    (matched != negate, class)
}
