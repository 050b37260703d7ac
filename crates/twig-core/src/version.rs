//! Three-part utility versions ("1.4.2"). Published versions are branch names,
//! so only plain `major.minor.patch` is accepted: no ranges, no pre-release or
//! build suffixes.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Result, TwigError};

/// Immutable, parsed version. Equality is on the raw string, ordering on
/// (major, minor, patch).
#[derive(Clone, Debug, Eq, Hash)]
pub struct Version {
    raw: String,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

/// Comparison operators accepted by [`compare`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Version {
    /// Parse `\d+\.\d+\.\d+`. Anything else yields `None`.
    pub fn parse(raw: &str) -> Option<Version> {
        let mut parts = raw.split('.');
        let major = parse_component(parts.next()?)?;
        let minor = parse_component(parts.next()?)?;
        let patch = parse_component(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Version {
            raw: raw.to_string(),
            major,
            minor,
            patch,
        })
    }

    /// Parse or fail with a validation error naming the operation.
    pub fn parse_or_err(raw: &str, operation: &str) -> Result<Version> {
        Version::parse(raw).ok_or_else(|| {
            TwigError::validation(operation, raw, "not a valid version, expected <major>.<minor>.<patch>")
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

fn parse_component(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok()
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // "1.01.0" and "1.1.0" share a triple but are different branches;
        // the raw string breaks the tie so Ord stays consistent with Eq.
        self.triple()
            .cmp(&other.triple())
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for Version {
    type Err = TwigError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse_or_err(s, "parse version")
    }
}

/// `a <op> b`. `==` is exact raw-string equality; the ordering operators
/// compare major, then minor, then patch.
pub fn compare(a: &Version, op: Op, b: &Version) -> bool {
    let ord = a.triple().cmp(&b.triple());
    match op {
        Op::Eq => a.raw == b.raw,
        Op::Lt => ord == Ordering::Less,
        Op::Le => ord != Ordering::Greater,
        Op::Gt => ord == Ordering::Greater,
        Op::Ge => ord != Ordering::Less,
    }
}

/// Parse every candidate, drop invalid ones, sort ascending.
pub fn parse_sorted<'a, I>(candidates: I) -> Vec<Version>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut versions: Vec<Version> = candidates.into_iter().filter_map(Version::parse).collect();
    versions.sort();
    versions.dedup();
    versions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_valid() {
        let parsed = v("1.22.333");
        assert_eq!((parsed.major, parsed.minor, parsed.patch), (1, 22, 333));
        assert_eq!(parsed.as_str(), "1.22.333");
        assert_eq!(parsed.to_string(), "1.22.333");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "", "1", "1.2", "1.2.3.4", "v1.2.3", "1.2.3-beta", "1.2.3+build", "1..3", " 1.2.3", "1.2.-3",
            "a.b.c", "1.2.3 ",
        ] {
            assert!(Version::parse(bad).is_none(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_parse_of_display_is_identity() {
        for s in ["0.0.0", "0.1.0", "10.20.30", "4294967296.0.1"] {
            let parsed = v(s);
            assert_eq!(Version::parse(&parsed.to_string()), Some(parsed));
        }
    }

    #[test]
    fn test_compare_is_lexicographic() {
        assert!(compare(&v("1.0.0"), Op::Lt, &v("1.1.0")));
        assert!(compare(&v("1.9.9"), Op::Lt, &v("2.0.0")));
        assert!(compare(&v("1.10.0"), Op::Gt, &v("1.9.0")));
        assert!(compare(&v("1.0.10"), Op::Gt, &v("1.0.9")));
        assert!(compare(&v("1.2.3"), Op::Le, &v("1.2.3")));
        assert!(compare(&v("1.2.3"), Op::Ge, &v("1.2.3")));
        assert!(compare(&v("1.2.3"), Op::Eq, &v("1.2.3")));
    }

    #[test]
    fn test_equality_is_exact_raw() {
        let a = v("1.01.0");
        let b = v("1.1.0");
        assert!(!compare(&a, Op::Eq, &b));
        assert_ne!(a, b);
        // neither strictly less nor greater under the numeric operators
        assert!(!compare(&a, Op::Lt, &b));
        assert!(!compare(&a, Op::Gt, &b));
    }

    #[test]
    fn test_total_order_on_canonical_versions() {
        let all = ["0.0.1", "0.1.0", "1.0.0", "1.0.1", "1.1.0", "2.0.0", "10.0.0"];
        for a in all {
            for b in all {
                let (a, b) = (v(a), v(b));
                let holds = [compare(&a, Op::Lt, &b), compare(&a, Op::Eq, &b), compare(&a, Op::Gt, &b)];
                assert_eq!(holds.iter().filter(|x| **x).count(), 1, "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_parse_sorted_drops_non_versions() {
        let sorted = parse_sorted(["main", "1.10.0", "1.2.0", "feature/x", "0.9.1", "1.2.0"]);
        let raw: Vec<&str> = sorted.iter().map(|v| v.as_str()).collect();
        assert_eq!(raw, vec!["0.9.1", "1.2.0", "1.10.0"]);
    }
}
