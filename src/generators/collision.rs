//! Collision resolution.
//!
//! Given a proposed name and a way to tell whether a name is taken, produce
//! a name that is not. Probing is bounded.

use crate::models::preset::{ConflictResolution, ConflictStrategy, SuffixPosition};
use crate::utils::fs::split_file_name;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Default probe bound.
pub const DEFAULT_MAX_ATTEMPTS: usize = 100_000;

/// Produces non-colliding destination names.
#[derive(Debug, Clone)]
pub struct CollisionResolver {
    rule: ConflictResolution,
    max_attempts: usize,
}

impl Default for CollisionResolver {
    fn default() -> Self {
        Self::new(ConflictResolution::default(), DEFAULT_MAX_ATTEMPTS)
    }
}

impl CollisionResolver {
    /// Create a resolver for `rule`, probing at most `max_attempts` suffixes.
    pub fn new(rule: ConflictResolution, max_attempts: usize) -> Self {
        Self {
            rule,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Probe bound.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Names to try for `candidate`, in order: the candidate itself, then
    /// suffixed variants (`name_1.ext`, `name_2.ext`, ...).
    ///
    /// Under the timestamp strategy the first variant carries `modified`
    /// (`name_20231027_153000.ext`) and numbering continues after it.
    pub fn candidates<'a>(
        &'a self,
        candidate: &'a str,
        modified: Option<DateTime<Utc>>,
    ) -> impl Iterator<Item = String> + 'a {
        let timestamp = match (self.rule.strategy, modified) {
            (ConflictStrategy::Timestamp, Some(ts)) => {
                Some(ts.format("%Y%m%d_%H%M%S").to_string())
            }
            _ => None,
        };

        let first = std::iter::once(candidate.to_string());
        let stamped = timestamp
            .clone()
            .map(|ts| self.with_suffix(candidate, &ts))
            .into_iter();
        let numbered = (1..=self.max_attempts).map(move |n| {
            let number = format!("{:0width$}", n, width = self.rule.digits);
            let suffix = match &timestamp {
                Some(ts) => format!("{}_{}", ts, number),
                None => number,
            };
            self.with_suffix(candidate, &suffix)
        });

        first.chain(stamped).chain(numbered)
    }

    /// Resolve `candidate` against a predicate telling whether a name is taken.
    pub fn resolve<F>(
        &self,
        candidate: &str,
        modified: Option<DateTime<Utc>>,
        mut is_claimed: F,
    ) -> Result<String>
    where
        F: FnMut(&str) -> bool,
    {
        self.candidates(candidate, modified)
            .find(|name| !is_claimed(name))
            .ok_or_else(|| crate::Error::CollisionExhausted {
                name: candidate.to_string(),
                attempts: self.max_attempts,
            })
    }

    /// Resolve `candidate` against a set of existing names.
    pub fn resolve_against(&self, candidate: &str, existing: &HashSet<String>) -> Result<String> {
        self.resolve(candidate, None, |name| existing.contains(name))
    }

    fn with_suffix(&self, candidate: &str, suffix: &str) -> String {
        match self.rule.position {
            SuffixPosition::BeforeExtension => {
                let (stem, ext) = split_file_name(candidate);
                if ext.is_empty() {
                    format!("{}_{}", stem, suffix)
                } else {
                    format!("{}_{}.{}", stem, suffix, ext)
                }
            }
            SuffixPosition::AfterExtension => format!("{}_{}", candidate, suffix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unclaimed_name_unchanged() {
        let resolver = CollisionResolver::default();
        assert_eq!(
            resolver.resolve_against("IMG_0001.JPG", &set(&[])).unwrap(),
            "IMG_0001.JPG"
        );
    }

    #[test]
    fn test_numeric_suffix_before_extension() {
        let resolver = CollisionResolver::default();
        let existing = set(&["IMG_0001.JPG", "IMG_0001_1.JPG"]);
        assert_eq!(
            resolver.resolve_against("IMG_0001.JPG", &existing).unwrap(),
            "IMG_0001_2.JPG"
        );
    }

    #[test]
    fn test_digits_and_after_extension() {
        let rule = ConflictResolution {
            digits: 3,
            position: SuffixPosition::AfterExtension,
            ..Default::default()
        };
        let resolver = CollisionResolver::new(rule, 10);
        assert_eq!(
            resolver.resolve_against("a.jpg", &set(&["a.jpg"])).unwrap(),
            "a.jpg_001"
        );
    }

    #[test]
    fn test_timestamp_strategy() {
        let rule = ConflictResolution {
            strategy: ConflictStrategy::Timestamp,
            ..Default::default()
        };
        let resolver = CollisionResolver::new(rule, 10);
        let ts = Utc.with_ymd_and_hms(2023, 10, 27, 15, 30, 0).unwrap();
        let existing = set(&["a.jpg", "a_20231027_153000.jpg"]);
        assert_eq!(
            resolver.resolve("a.jpg", Some(ts), |n| existing.contains(n))
                .unwrap(),
            "a_20231027_153000_1.jpg"
        );
    }

    #[test]
    fn test_exhausted() {
        let resolver = CollisionResolver::new(ConflictResolution::default(), 2);
        let existing = set(&["a.jpg", "a_1.jpg", "a_2.jpg"]);
        let err = resolver.resolve_against("a.jpg", &existing).unwrap_err();
        assert!(matches!(err, crate::Error::CollisionExhausted { attempts: 2, .. }));
    }

    #[test]
    fn test_injective_over_many_claims() {
        let resolver = CollisionResolver::default();
        let mut claimed = HashSet::new();
        for _ in 0..50 {
            let name = resolver.resolve_against("same.png", &claimed).unwrap();
            assert!(claimed.insert(name));
        }
        assert_eq!(claimed.len(), 50);
    }
}
