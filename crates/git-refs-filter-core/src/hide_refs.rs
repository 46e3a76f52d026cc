//! `hideRefs`-style patterns.
//!
//! A pattern is a ref prefix, optionally preceded by `!` to re-admit refs hidden
//! by an earlier pattern. Patterns are evaluated in declaration order and the
//! last pattern matching a ref decides, so a broad `refs/heads/sandbox/` can
//! coexist with a narrower `!refs/heads/sandbox/mine`.

use std::{fmt, str::FromStr};
use thiserror::Error;

const NEGATION: char = '!';
const REFS: &str = "refs/";

/// Invalid hide-ref pattern.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HideRefParseError {
    /// Pattern is empty (or only `!`).
    #[error("hide-ref pattern must not be empty")]
    Empty,
    /// Pattern does not name a ref namespace.
    #[error("hide-ref pattern '{0}' must start with 'refs/'")]
    NotARef(String),
}

/// A single hide (or re-admit) rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HideRefPattern {
    prefix: String,
    negated: bool,
}

impl HideRefPattern {
    /// Ref prefix the pattern applies to.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// True for `!` patterns, which re-admit matching refs.
    #[must_use]
    pub const fn is_negated(&self) -> bool {
        self.negated
    }

    /// Whether `name` falls under this pattern.
    ///
    /// Matching follows path components: `refs/heads/foo` matches
    /// `refs/heads/foo` and `refs/heads/foo/bar` but not `refs/heads/foobar`.
    /// A pattern ending in `/` matches everything below it.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix.as_str()).is_some_and(|rest| {
            rest.is_empty() || self.prefix.ends_with('/') || rest.starts_with('/')
        })
    }
}

impl FromStr for HideRefPattern {
    type Err = HideRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negated, prefix) = s
            .strip_prefix(NEGATION)
            .map_or((false, s), |rest| (true, rest));
        if prefix.is_empty() {
            return Err(HideRefParseError::Empty);
        }
        if !prefix.starts_with(REFS) {
            return Err(HideRefParseError::NotARef(s.to_owned()));
        }
        Ok(Self {
            prefix: prefix.to_owned(),
            negated,
        })
    }
}

impl fmt::Display for HideRefPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "{NEGATION}")?;
        }
        f.write_str(&self.prefix)
    }
}

/// Ordered hide-ref rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HideRefs(Vec<HideRefPattern>);

impl HideRefs {
    /// Parse patterns in declaration order.
    ///
    /// # Errors
    /// Returns the first invalid pattern.
    pub fn parse<I, S>(patterns: I) -> Result<Self, HideRefParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns
            .into_iter()
            .map(|p| p.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Append rules that take precedence over the existing ones.
    pub fn extend(&mut self, later: &Self) {
        self.0.extend(later.0.iter().cloned());
    }

    /// Whether no rules are configured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the last matching rule hides `name`.
    #[must_use]
    pub fn is_hidden(&self, name: &str) -> bool {
        self.0
            .iter()
            .rev()
            .find(|pattern| pattern.matches(name))
            .is_some_and(|pattern| !pattern.negated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negated_pattern_readmits_narrower_ref() -> Result<(), HideRefParseError> {
        let rules = HideRefs::parse(["refs/heads/sandbox/", "!refs/heads/sandbox/mine"])?;
        assert!(!rules.is_hidden("refs/heads/sandbox/mine"));
        assert!(rules.is_hidden("refs/heads/sandbox/foo"));
        assert!(!rules.is_hidden("refs/heads/main"));
        Ok(())
    }

    #[test]
    fn last_matching_pattern_wins() -> Result<(), HideRefParseError> {
        let rules = HideRefs::parse([
            "refs/heads/sandbox/",
            "!refs/heads/sandbox/team",
            "refs/heads/sandbox/team/secret",
        ])?;
        assert!(rules.is_hidden("refs/heads/sandbox/other"));
        assert!(!rules.is_hidden("refs/heads/sandbox/team/shared"));
        assert!(rules.is_hidden("refs/heads/sandbox/team/secret"));

        // A broad rule declared last overrides the earlier narrow exception.
        let rules = HideRefs::parse(["!refs/heads/sandbox/mine", "refs/heads/sandbox/"])?;
        assert!(rules.is_hidden("refs/heads/sandbox/mine"));
        Ok(())
    }

    #[test]
    fn matching_respects_path_components() -> Result<(), HideRefParseError> {
        let pattern: HideRefPattern = "refs/heads/foo".parse()?;
        assert!(pattern.matches("refs/heads/foo"));
        assert!(pattern.matches("refs/heads/foo/bar"));
        assert!(!pattern.matches("refs/heads/foobar"));
        Ok(())
    }

    #[test]
    fn rejects_empty_and_non_ref_patterns() {
        assert_eq!("".parse::<HideRefPattern>(), Err(HideRefParseError::Empty));
        assert_eq!("!".parse::<HideRefPattern>(), Err(HideRefParseError::Empty));
        assert_eq!(
            "heads/main".parse::<HideRefPattern>(),
            Err(HideRefParseError::NotARef("heads/main".into()))
        );
    }

    #[test]
    fn display_keeps_negation() -> Result<(), HideRefParseError> {
        let pattern: HideRefPattern = "!refs/heads/sandbox/mine".parse()?;
        assert!(pattern.is_negated());
        assert_eq!(pattern.prefix(), "refs/heads/sandbox/mine");
        assert_eq!(pattern.to_string(), "!refs/heads/sandbox/mine");
        Ok(())
    }
}
