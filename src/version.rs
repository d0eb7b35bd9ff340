//! Product version parsing and comparison.
//!
//! Versions are `major.minor.patch` triples of unsigned integers. An empty
//! string is not a version: it means "no constraint" wherever a maximum
//! version is expected. Malformed strings are rejected with a
//! `ValidationError` rather than silently treated as `0.0.0`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::{LicenseError, LicenseResult};

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").unwrap();
}

/// A parsed `#.#.#` version. Ordering is lexicographic over (major, minor, patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a strict `#.#.#` string.
    pub fn parse(s: &str) -> LicenseResult<Self> {
        let caps = VERSION_RE.captures(s.trim()).ok_or_else(|| {
            LicenseError::validation(format!(
                "version '{s}' must be in #.#.# format (e.g., 1.0.0)"
            ))
        })?;

        let part = |i: usize| -> LicenseResult<u64> {
            caps[i]
                .parse::<u64>()
                .map_err(|_| LicenseError::validation(format!("version '{s}' is out of range")))
        };

        Ok(Self::new(part(1)?, part(2)?, part(3)?))
    }
}

impl FromStr for Version {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Parse a version constraint: empty means unconstrained (`None`).
pub fn parse_constraint(s: &str) -> LicenseResult<Option<Version>> {
    if s.trim().is_empty() {
        return Ok(None);
    }
    Version::parse(s).map(Some)
}

/// True when `s` is empty or a well-formed `#.#.#` version.
pub fn is_valid_version(s: &str) -> bool {
    parse_constraint(s).is_ok()
}

/// Compare two version strings.
pub fn compare(a: &str, b: &str) -> LicenseResult<Ordering> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

/// Whether `installed` may run under the license's `max` version.
///
/// An empty `max` allows everything; otherwise `installed <= max`.
pub fn is_allowed(installed: &str, max: &str) -> LicenseResult<bool> {
    match parse_constraint(max)? {
        None => Ok(true),
        Some(max) => Ok(Version::parse(installed)? <= max),
    }
}
