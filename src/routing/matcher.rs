//! Route pattern matching.
//!
//! # Responsibilities
//! - Compile route patterns into anchored regexes
//! - Extract capture groups for the path target
//! - Rank patterns by specificity
//!
//! # Design Decisions
//! - Patterns always match the whole path (`^(?:pattern)$`)
//! - Path matching is case-sensitive
//! - Specificity: literal patterns first, then longer literal prefix, then longer
//!   pattern; ties keep registration order

use std::cmp::Ordering;

use regex::Regex;

const META: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$',
];

/// Byte length of the leading literal text, and whether the whole pattern is
/// literal. Escaped punctuation (`\.`) counts as literal text.
fn literal_prefix(pattern: &str) -> (usize, bool) {
    let mut chars = pattern.char_indices();
    while let Some((index, c)) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some((_, escaped)) if !escaped.is_ascii_alphanumeric() => continue,
                _ => return (index, false),
            }
        }
        if META.contains(&c) {
            return (index, false);
        }
    }
    (pattern.len(), true)
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    raw: String,
    regex: Regex,
    literal: bool,
    literal_prefix: usize,
}

impl RoutePattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        let (literal_prefix, literal) = literal_prefix(pattern);

        Ok(Self {
            raw: pattern.to_string(),
            regex,
            literal,
            literal_prefix,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_literal(&self) -> bool {
        self.literal
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Capture groups of a full match. Groups that did not participate are empty.
    pub fn captures(&self, path: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(path)?;
        Some(
            caps.iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }

    /// Ordering where the more specific pattern sorts first.
    pub fn cmp_specificity(&self, other: &Self) -> Ordering {
        other
            .literal
            .cmp(&self.literal)
            .then_with(|| other.literal_prefix.cmp(&self.literal_prefix))
            .then_with(|| other.raw.len().cmp(&self.raw.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchored_match() {
        let pattern = RoutePattern::new("/online.txt").unwrap();
        assert!(pattern.is_match("/online.txt"));
        assert!(!pattern.is_match("/online.txt/extra"));
        assert!(!pattern.is_match("/x/online.txt"));
    }

    #[test]
    fn alternation_stays_anchored() {
        let pattern = RoutePattern::new("/a|/b").unwrap();
        assert!(pattern.is_match("/a"));
        assert!(!pattern.is_match("/a/c"));
    }

    #[test]
    fn captures_extracted() {
        let pattern = RoutePattern::new("/downloads/logs/([^/]*)").unwrap();
        assert_eq!(
            pattern.captures("/downloads/logs/serial.log"),
            Some(vec!["serial.log".to_string()])
        );
        assert_eq!(pattern.captures("/downloads/logs/a/b"), None);
    }

    #[test]
    fn literal_detection() {
        assert!(!RoutePattern::new("/online.gif").unwrap().is_literal());
        assert!(RoutePattern::new("/online").unwrap().is_literal());
        assert!(!RoutePattern::new("/files/(.*)").unwrap().is_literal());
        assert!(!RoutePattern::new(r"/logs/\d+").unwrap().is_literal());
    }

    #[test]
    fn escaped_paths_are_literal() {
        let pattern = RoutePattern::new(&regex::escape("/online.gif")).unwrap();
        assert!(pattern.is_literal());
        assert!(pattern.is_match("/online.gif"));
        assert!(!pattern.is_match("/onlineXgif"));

        let prefixed = RoutePattern::new(r"/plugin/my\.theme/(.*)").unwrap();
        assert!(!prefixed.is_literal());
        assert!(prefixed.is_match("/plugin/my.theme/x"));
        assert!(!prefixed.is_match("/plugin/myXtheme/x"));
    }

    #[test]
    fn specificity_ordering() {
        let literal = RoutePattern::new("/api/files").unwrap();
        let long_prefix = RoutePattern::new("/api/files/(.*)").unwrap();
        let short_prefix = RoutePattern::new("/api/(.*)").unwrap();

        let mut patterns = vec![&short_prefix, &long_prefix, &literal];
        patterns.sort_by(|a, b| a.cmp_specificity(b));

        let order: Vec<_> = patterns.iter().map(|p| p.as_str()).collect();
        assert_eq!(order, vec!["/api/files", "/api/files/(.*)", "/api/(.*)"]);
    }
}
