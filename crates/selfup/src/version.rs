//! Semantic version value type.
//!
//! Releases are tagged `major.minor.patch` (an optional `v` prefix and any
//! `-pre`/`+build` suffix are tolerated on parse). Ordering is lexicographic
//! on the numeric triple.

use crate::error::UpdateError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An ordered (major, minor, patch) version triple. Immutable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// True when `minimum` is absent or `self >= minimum`.
    pub fn satisfies(&self, minimum: Option<&Version>) -> bool {
        minimum.map_or(true, |m| self >= m)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let raw = trimmed.strip_prefix('v').unwrap_or(trimmed);
        // Drop prerelease/build suffixes; only the numeric core orders releases.
        let core = raw.split(['-', '+']).next().unwrap_or(raw);
        if core.is_empty() {
            return Err(UpdateError::InvalidVersion(s.to_string()));
        }

        let mut numbers = [0u64; 3];
        let mut count = 0;
        for part in core.split('.') {
            if count == 3 {
                return Err(UpdateError::InvalidVersion(s.to_string()));
            }
            numbers[count] = part
                .parse()
                .map_err(|_| UpdateError::InvalidVersion(s.to_string()))?;
            count += 1;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
