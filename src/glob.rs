//! Redis glob patterns compiled to anchored byte regexes.
//!
//! Used by KEYS, the SCAN family and PSUBSCRIBE.

use std::fmt::Write;

use regex::bytes::Regex;

use crate::commands::CommandError;

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: Vec<u8>,
    regex: Regex,
}

impl GlobPattern {
    /// Compiles a glob pattern.
    ///
    /// `?` matches one byte, `*` any run of bytes, `[...]` and `[^...]` are
    /// classes with `a-z` ranges, and `\` escapes the next byte. An empty
    /// class never matches while an empty negated class matches any byte.
    ///
    /// # Examples
    ///
    /// ```
    /// use fakeredis::glob::GlobPattern;
    ///
    /// let pattern = GlobPattern::compile(b"h?llo*").unwrap();
    /// assert!(pattern.matches(b"hello world"));
    /// assert!(!pattern.matches(b"hllo"));
    /// ```
    pub fn compile(pattern: &[u8]) -> Result<Self, CommandError> {
        let regex = Regex::new(&translate(pattern))
            .map_err(|error| CommandError::InvalidGlobPattern(error.to_string()))?;

        Ok(GlobPattern {
            source: pattern.to_vec(),
            regex,
        })
    }

    pub fn matches(&self, subject: &[u8]) -> bool {
        self.regex.is_match(subject)
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }
}

fn push_literal(out: &mut String, byte: u8) {
    let _ = write!(out, "\\x{:02x}", byte);
}

fn translate(pattern: &[u8]) -> String {
    let mut out = String::from("(?s-u)^");
    let mut i = 0;
    let length = pattern.len();

    while i < length {
        let byte = pattern[i];
        i += 1;
        match byte {
            b'?' => out.push('.'),
            b'*' => out.push_str(".*"),
            b'\\' => {
                if i == length {
                    i -= 1;
                }
                push_literal(&mut out, pattern[i]);
                i += 1;
            }
            b'[' => {
                let mut class = String::new();
                let mut negated = false;
                if i < length && pattern[i] == b'^' {
                    negated = true;
                    i += 1;
                }
                let mut empty = true;
                while i < length {
                    if pattern[i] == b'\\' && i + 1 < length {
                        i += 1;
                        push_literal(&mut class, pattern[i]);
                        i += 1;
                    } else if pattern[i] == b']' {
                        i += 1;
                        break;
                    } else if i + 2 < length && pattern[i + 1] == b'-' {
                        let mut start = pattern[i];
                        let mut end = pattern[i + 2];
                        if start > end {
                            std::mem::swap(&mut start, &mut end);
                        }
                        push_literal(&mut class, start);
                        class.push('-');
                        push_literal(&mut class, end);
                        i += 3;
                    } else {
                        push_literal(&mut class, pattern[i]);
                        i += 1;
                    }
                    empty = false;
                }

                match (empty, negated) {
                    (true, false) => out.push_str("(?:\\z.)"),
                    (true, true) => out.push('.'),
                    (false, false) => {
                        let _ = write!(out, "[{}]", class);
                    }
                    (false, true) => {
                        let _ = write!(out, "[^{}]", class);
                    }
                }
            }
            other => push_literal(&mut out, other),
        }
    }

    out.push_str("\\z");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_matching() {
        let test_cases: Vec<(&[u8], &[u8], bool)> = vec![
            (b"*", b"", true),
            (b"*", b"anything", true),
            (b"h?llo", b"hello", true),
            (b"h?llo", b"heello", false),
            (b"h*llo", b"heeeello", true),
            (b"h[ae]llo", b"hallo", true),
            (b"h[ae]llo", b"hillo", false),
            (b"h[^e]llo", b"hallo", true),
            (b"h[^e]llo", b"hello", false),
            (b"h[a-b]llo", b"hbllo", true),
            (b"h[b-a]llo", b"hallo", true),
            (b"h[a-b]llo", b"hcllo", false),
            (b"h\\*llo", b"h*llo", true),
            (b"h\\*llo", b"hello", false),
            (b"a[]b", b"ab", false),
            (b"a[]b", b"acb", false),
            (b"a[^]b", b"acb", true),
            (b"abc\\", b"abc\\", true),
            (b"[abc", b"b", true),
            (b"foo.bar", b"fooxbar", false),
            (b"foo.bar", b"foo.bar", true),
            (b"line*", b"line\nbreak", true),
            (b"foo", b"foobar", false),
        ];

        for (pattern, subject, expected) in test_cases {
            let compiled = GlobPattern::compile(pattern).unwrap();
            assert_eq!(
                compiled.matches(subject),
                expected,
                "pattern {:?} against {:?}",
                String::from_utf8_lossy(pattern),
                String::from_utf8_lossy(subject)
            );
        }
    }

    #[test]
    fn test_glob_matches_non_utf8_bytes() {
        let compiled = GlobPattern::compile(b"\xff?").unwrap();

        assert!(compiled.matches(b"\xff\xfe"));
        assert!(!compiled.matches(b"\xfe\xfe"));
    }
}
