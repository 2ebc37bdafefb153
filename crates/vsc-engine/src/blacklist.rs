//! URL Blacklist
//!
//! One pattern per line: `/pattern/flags` lines are regular expressions,
//! anything else is a literal substring.

use regex::{Regex, RegexBuilder};

use crate::{Error, Result};

/// Sites the controller stays away from by default
pub const DEFAULT_BLACKLIST: &str = "www.instagram.com\ntwitter.com\nvine.co\nimgur.com\nteams.microsoft.com";

const FLAG_CHARS: &str = "gimsuy";

/// Compiled blacklist
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    patterns: Vec<Regex>,
}

impl Blacklist {
    /// Compile every line. Lines that fail to compile are logged and
    /// never match.
    pub fn parse(text: &str) -> Self {
        let mut patterns = Vec::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match compile_line(line) {
                Ok(regex) => patterns.push(regex),
                Err(err) => tracing::warn!("Ignoring blacklist line: {}", err),
            }
        }
        Self { patterns }
    }

    /// Number of usable patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(url))
    }
}

fn compile_line(line: &str) -> Result<Regex> {
    let pattern_error = |source| Error::Pattern { line: line.to_string(), source };

    if !line.starts_with('/') {
        return Regex::new(&regex::escape(line)).map_err(pattern_error);
    }

    let (pattern, flags) = match split_flags(line) {
        Some(parts) => parts,
        None => (line, ""),
    };
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'u' => builder.unicode(true),
            // global and sticky have no meaning for a single test
            _ => &mut builder,
        };
    }
    builder.build().map_err(pattern_error)
}

/// `/body/flags` → (body, flags) when the tail after the last slash is a
/// valid flag set
fn split_flags(line: &str) -> Option<(&str, &str)> {
    let last = line.rfind('/')?;
    if last == 0 {
        return None;
    }
    let flags = &line[last + 1..];
    let mut seen = String::new();
    for c in flags.chars() {
        if !FLAG_CHARS.contains(c) || seen.contains(c) {
            return None;
        }
        seen.push(c);
    }
    Some((&line[1..last], flags))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_line_matches_substring() {
        let list = Blacklist::parse("example.com");
        assert!(list.matches("https://example.com/x"));
        assert!(!list.matches("https://example.org/x"));
        // dots are literal
        assert!(!list.matches("https://exampleXcom/"));
    }

    #[test]
    fn test_regex_line_with_flags() {
        let list = Blacklist::parse(r"/^https:\/\/example\.com\//i");
        assert!(list.matches("https://example.com/x"));
        assert!(list.matches("HTTPS://EXAMPLE.COM/x"));
        assert!(!list.matches("https://www.example.com/x"));
    }

    #[test]
    fn test_invalid_line_does_not_block_others() {
        let list = Blacklist::parse("/(unclosed\n\n  example.com  \n");
        assert_eq!(list.len(), 1);
        assert!(list.matches("https://example.com/x"));
        assert!(!list.matches("https://other.net/(unclosed"));
    }

    #[test]
    fn test_slash_line_without_flags_compiles_whole() {
        assert_eq!(split_flags("/watch/"), Some(("watch", "")));
        assert_eq!(split_flags("/watch/gg"), None);
        assert_eq!(split_flags("/watch/abc"), None);
        let list = Blacklist::parse("/watch/abc");
        assert!(list.matches("https://example.com/watch/abc"));
    }

    #[test]
    fn test_default_blacklist() {
        let list = Blacklist::parse(DEFAULT_BLACKLIST);
        assert_eq!(list.len(), 5);
        assert!(list.matches("https://twitter.com/home"));
        assert!(!list.matches("https://www.youtube.com/watch?v=1"));
    }
}
