//! Semantic version value type
//!
//! Versions are `MAJOR.MINOR.PATCH` with an optional `-pre` suffix.
//! Ordering compares the numeric triple first; a pre-release sorts before
//! the bare release with the same triple. Serialized as the string form.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use courier_utils::{CourierError, Result};

/// A parsed, immutable semantic version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Option<String>,
}

impl Version {
    /// Construct a release version without a pre-release tag.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    /// Parse a version string, e.g. `"1.2.3"` or `"1.2.3-rc.1"`.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| CourierError::InvalidVersion {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (numeric, pre) = match input.split_once('-') {
            Some((numeric, pre)) => (numeric, Some(pre)),
            None => (input, None),
        };

        let mut parts = numeric.split('.');
        let mut component = |name: &str| -> Result<u64> {
            let text = parts
                .next()
                .ok_or_else(|| invalid(&format!("missing {name} component")))?;
            if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(&format!("non-numeric {name} component '{text}'")));
            }
            text.parse::<u64>()
                .map_err(|_| invalid(&format!("{name} component out of range")))
        };

        let major = component("major")?;
        let minor = component("minor")?;
        let patch = component("patch")?;
        if parts.next().is_some() {
            return Err(invalid("too many components"));
        }

        let pre = match pre {
            Some(tag) => {
                if tag.is_empty()
                    || !tag
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
                {
                    return Err(invalid(&format!("invalid pre-release tag '{tag}'")));
                }
                Some(tag.to_string())
            }
            None => None,
        };

        Ok(Self {
            major,
            minor,
            patch,
            pre,
        })
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    /// Pre-release tag, if any.
    pub fn pre(&self) -> Option<&str> {
        self.pre.as_deref()
    }

    /// True if `self` is strictly newer than `other`. Equal versions are
    /// never an available update.
    pub fn is_newer_than(&self, other: &Version) -> bool {
        self > other
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                // A pre-release sorts before the bare release
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Version::parse(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    // ==================== Parse Tests ====================

    #[test]
    fn test_parse_plain() {
        let version = v("1.2.3");
        assert_eq!(version.major(), 1);
        assert_eq!(version.minor(), 2);
        assert_eq!(version.patch(), 3);
        assert_eq!(version.pre(), None);
    }

    #[test]
    fn test_parse_pre_release() {
        let version = v("1.0.0-rc.1");
        assert_eq!(version.pre(), Some("rc.1"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in [
            "", "1", "1.2", "1.2.3.4", "a.b.c", "1.x.0", "-1.0.0", "1.0.-3", "1..3", "1.0.0-",
            "+1.0.0", "1.0.0-b@d",
        ] {
            let err = Version::parse(input).unwrap_err();
            assert!(
                matches!(err, CourierError::InvalidVersion { .. }),
                "expected InvalidVersion for {input:?}"
            );
        }
    }

    #[test]
    fn test_parse_to_string_roundtrip() {
        for input in ["0.0.0", "1.2.3", "10.20.30", "1.0.0-alpha", "2.1.0-rc.2"] {
            assert_eq!(v(input).to_string(), input);
        }
    }

    #[test]
    fn test_from_str() {
        let version: Version = "3.1.4".parse().unwrap();
        assert_eq!(version, Version::new(3, 1, 4));
    }

    // ==================== Ordering Tests ====================

    #[test]
    fn test_ordering_numeric() {
        assert!(v("2.0.0") > v("1.9.9"));
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("1.0.10") > v("1.0.9"));
        assert_eq!(v("1.0.0"), v("1.0.0"));
    }

    #[test]
    fn test_pre_release_sorts_before_release() {
        assert!(v("1.0.0-rc.1") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
        assert!(v("1.0.0-rc.1") > v("0.9.9"));
    }

    #[test]
    fn test_compare_self_is_equal() {
        for input in ["0.9.0", "1.0.0", "1.0.0-beta"] {
            assert_eq!(v(input).cmp(&v(input)), Ordering::Equal);
        }
    }

    #[test]
    fn test_is_newer_than() {
        assert!(v("1.0.0").is_newer_than(&v("0.9.0")));
        assert!(!v("1.0.0").is_newer_than(&v("1.0.0")));
        assert!(!v("0.9.0").is_newer_than(&v("1.0.0")));
    }

    // ==================== Serde Tests ====================

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&v("1.2.3-rc.1")).unwrap();
        assert_eq!(json, "\"1.2.3-rc.1\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("1.2.3-rc.1"));
    }

    #[test]
    fn test_serde_rejects_malformed() {
        let result: std::result::Result<Version, _> = serde_json::from_str("\"not-a-version\"");
        assert!(result.is_err());
    }
}
