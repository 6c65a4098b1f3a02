//! Version specifier ordering.
//!
//! Dependency values are compared by a numeric `(major, minor, patch)` tuple
//! read from the front of the specifier. Everything before the first digit
//! (`^`, `~`, `>=`, `v`, `workspace:`...) is skipped. Each component reads its
//! leading decimal digits; a missing or non-numeric component reads as 0, so
//! `^18.2.0` → (18, 2, 0), `~1.2` → (1, 2, 0), `4.x` → (4, 0, 0) and `latest`
//! → (0, 0, 0).
//!
//! This is a ranking heuristic, not semver: ranges are never intersected and
//! pre-release tags are ignored.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::OnceLock;

use regex_lite::Regex;

/// Numeric lead of a version specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VersionTuple {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
}

impl VersionTuple {
    /// Build a tuple.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Parse a specifier. Never fails.
    pub fn parse(specifier: &str) -> Self {
        let body = strip_lead_in(specifier.trim());
        let mut components = body.split('.').map(leading_number);
        Self {
            major: components.next().unwrap_or(0),
            minor: components.next().unwrap_or(0),
            patch: components.next().unwrap_or(0),
        }
    }
}

impl std::fmt::Display for VersionTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Drop everything before the first digit.
fn strip_lead_in(specifier: &str) -> Cow<'_, str> {
    static LEAD_IN: OnceLock<Option<Regex>> = OnceLock::new();
    match LEAD_IN.get_or_init(|| Regex::new(r"^[^0-9]*").ok()) {
        Some(re) => re.replace(specifier, ""),
        None => Cow::Borrowed(specifier.trim_start_matches(|c: char| !c.is_ascii_digit())),
    }
}

/// Leading decimal digits of a component; 0 when there are none or they overflow.
fn leading_number(component: &str) -> u64 {
    let digits: &str = {
        let end = component
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(component.len());
        &component[..end]
    };
    digits.parse().unwrap_or(0)
}

/// Order two specifiers so that the higher version sorts first.
pub fn compare_descending(a: &str, b: &str) -> Ordering {
    VersionTuple::parse(b).cmp(&VersionTuple::parse(a))
}

/// Pick the highest specifier from candidates given in first-seen order.
///
/// Equal tuples keep the earliest candidate.
pub fn highest<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, VersionTuple)> = None;
    for candidate in candidates {
        let tuple = VersionTuple::parse(candidate);
        match best {
            Some((_, current)) if tuple <= current => {}
            _ => best = Some((candidate, tuple)),
        }
    }
    best.map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_specifiers() {
        assert_eq!(VersionTuple::parse("^18.2.0"), VersionTuple::new(18, 2, 0));
        assert_eq!(VersionTuple::parse("~1.2"), VersionTuple::new(1, 2, 0));
        assert_eq!(VersionTuple::parse(">=3.1.4 <4"), VersionTuple::new(3, 1, 4));
        assert_eq!(VersionTuple::parse("v2.0.1"), VersionTuple::new(2, 0, 1));
        assert_eq!(VersionTuple::parse("4.x"), VersionTuple::new(4, 0, 0));
        assert_eq!(VersionTuple::parse("1.2.3-beta.4"), VersionTuple::new(1, 2, 3));
    }

    #[test]
    fn test_strip_lead_in() {
        assert_eq!(strip_lead_in("workspace:^1.2"), "1.2");
        assert_eq!(strip_lead_in(">= 3"), "3");
        assert_eq!(strip_lead_in("latest"), "");
        assert_eq!(strip_lead_in("18.2.0"), "18.2.0");
    }

    #[test]
    fn test_malformed_specifiers_are_zero() {
        for raw in ["latest", "*", "", "workspace:*", "file:../ui", "git+ssh://x"] {
            assert_eq!(VersionTuple::parse(raw), VersionTuple::default(), "{raw}");
        }
    }

    #[test]
    fn test_overflow_reads_as_zero() {
        assert_eq!(
            VersionTuple::parse("99999999999999999999999.1.2"),
            VersionTuple::new(0, 1, 2)
        );
    }

    #[test]
    fn test_highest_prefers_version_over_frequency() {
        let picked = highest(["^17.0.0", "^17.0.0", "^18.2.0"]);
        assert_eq!(picked, Some("^18.2.0"));
    }

    #[test]
    fn test_highest_ties_keep_first_seen() {
        assert_eq!(highest(["~1.2.0", "^1.2.0"]), Some("~1.2.0"));
        assert_eq!(highest(["^1.2.0", "~1.2.0"]), Some("^1.2.0"));
        // garbage ties with an explicit zero version and wins when seen first
        assert_eq!(highest(["latest", "0.0.0"]), Some("latest"));
    }

    #[test]
    fn test_compare_descending() {
        let mut values = vec!["1.0.0", "^2.1.0", "2.0.9"];
        values.sort_by(|a, b| compare_descending(a, b));
        assert_eq!(values, vec!["^2.1.0", "2.0.9", "1.0.0"]);
    }
}
