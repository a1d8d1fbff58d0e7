//! Glob patterns over object keys.
//!
//! Supported wildcards: `*` matches within one path segment, `**/` matches
//! any number of directories, `?` matches a single character. Other
//! characters are passed to the regex engine unchanged, so alternations such
//! as `(2023|2024)` keep working; `.` is always literal.

use regex::Regex;

use crate::error::{Result, StorageError};

const WILDCARDS: &[char] = &['*', '?', '(', '['];

/// Compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
    prefix: String,
}

impl GlobPattern {
    /// Compiles `pattern`, failing with [`StorageError::InvalidPattern`].
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim_start_matches('/');
        let regex = Regex::new(&format!("^{}$", translate(pattern)))
            .map_err(|e| StorageError::invalid_pattern(pattern, e.to_string()))?;

        Ok(Self {
            source: pattern.to_owned(),
            regex,
            prefix: literal_prefix(pattern).to_owned(),
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Longest wildcard-free directory prefix, where listing starts.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether the pattern has no wildcard at all.
    pub fn is_literal(&self) -> bool {
        !self.source.contains(WILDCARDS)
    }

    /// Whether `key` matches the whole pattern.
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

/// Translates glob syntax into a regex body.
fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;

    while let Some(c) = rest.chars().next() {
        if let Some(tail) = rest.strip_prefix("**/") {
            out.push_str("(?:.*/)?");
            rest = tail;
            continue;
        }

        match c {
            '.' => out.push_str("[.]"),
            '*' => out.push_str("[^/]*"),
            '?' => out.push('.'),
            other => out.push(other),
        }
        rest = &rest[c.len_utf8()..];
    }

    out
}

fn literal_prefix(pattern: &str) -> &str {
    let literal = match pattern.find(WILDCARDS) {
        Some(index) => &pattern[..index],
        None => pattern,
    };

    match literal.rfind('/') {
        Some(index) => &literal[..index],
        None => "",
    }
}
