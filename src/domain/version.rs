//! Package versions and snapshot tags
//!
//! A version is `major.minor.patch` optionally followed by `-` and a
//! prerelease. Snapshot prereleases are dot-separated segments where an
//! 8-digit `YYYYMMDD` segment is the snapshot date, any other all-digit
//! segment is the increment, and everything else belongs to the tag.
//!
//! ```text
//! 1.2.3                      release
//! 1.2.4-dev.20261019.0       tag "dev", date 2026-10-19, increment 0
//! 1.2.4-20261019             date only
//! 1.2.4-rc.2                 tag "rc", increment 2
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum VersionError {
    #[error("Invalid version '{0}': expected 'major.minor.patch[-prerelease]'")]
    InvalidVersion(String),
}

/// Parsed prerelease part of a snapshot version
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub tag: Option<String>,
    pub date: Option<NaiveDate>,
    pub increment: Option<u64>,
}

impl Snapshot {
    /// Parses the prerelease part (the text after the first `-`)
    pub fn parse(prerelease: &str) -> Self {
        let mut snapshot = Snapshot::default();
        let mut tags: Vec<&str> = Vec::new();

        for segment in prerelease.split('.') {
            if segment.is_empty() {
                continue;
            }
            if segment.chars().all(|c| c.is_ascii_digit()) {
                if segment.len() == 8 && snapshot.date.is_none() {
                    if let Some(date) = parse_date(segment) {
                        snapshot.date = Some(date);
                        continue;
                    }
                }
                if snapshot.increment.is_none() {
                    if let Ok(n) = segment.parse() {
                        snapshot.increment = Some(n);
                        continue;
                    }
                }
            }
            tags.push(segment);
        }

        if !tags.is_empty() {
            snapshot.tag = Some(tags.join("."));
        }
        snapshot
    }
}

/// Parses an all-digit `YYYYMMDD` segment
fn parse_date(segment: &str) -> Option<NaiveDate> {
    let year = segment.get(0..4)?.parse().ok()?;
    let month = segment.get(4..6)?.parse().ok()?;
    let day = segment.get(6..8)?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut segments = Vec::new();
        if let Some(tag) = &self.tag {
            segments.push(tag.clone());
        }
        if let Some(date) = self.date {
            segments.push(date.format("%Y%m%d").to_string());
        }
        if let Some(increment) = self.increment {
            segments.push(increment.to_string());
        }
        f.write_str(&segments.join("."))
    }
}

/// A package version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Raw prerelease text after the first `-`
    pub prerelease: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
        }
    }

    pub fn is_release(&self) -> bool {
        self.prerelease.is_none()
    }

    /// Returns the parsed snapshot prerelease, if any
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.prerelease.as_deref().map(Snapshot::parse)
    }

    /// Returns the next snapshot version for `tag` on `today`
    ///
    /// Releases bump the patch number first. A snapshot taken again on the
    /// same date with the same tag bumps the increment; anything else
    /// restarts the increment at zero on the current core version.
    pub fn next_snapshot(&self, tag: &str, today: NaiveDate) -> Version {
        let tag = Some(tag.to_string()).filter(|t| !t.is_empty());

        let (core, increment) = match self.snapshot() {
            None => (Version::new(self.major, self.minor, self.patch + 1), 0),
            Some(previous) => {
                let core = Version::new(self.major, self.minor, self.patch);
                if previous.date == Some(today) && previous.tag == tag {
                    (core, previous.increment.map_or(1, |n| n + 1))
                } else {
                    (core, 0)
                }
            }
        };

        let snapshot = Snapshot {
            tag,
            date: Some(today),
            increment: Some(increment),
        };
        Version {
            prerelease: Some(snapshot.to_string()),
            ..core
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(prerelease) = &self.prerelease {
            write!(f, "-{}", prerelease)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::InvalidVersion(s.to_string());
        let s = s.trim();

        let (core, prerelease) = match s.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return Err(invalid()),
            None => (s, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }
        let number = |p: &str| p.parse::<u64>().map_err(|_| invalid());

        Ok(Version {
            major: number(parts[0])?,
            minor: number(parts[1])?,
            patch: number(parts[2])?,
            prerelease,
        })
    }
}

/// Replaces the version in a dependency range, keeping its operator
///
/// `^1.2.3` with `1.3.0` becomes `^1.3.0`; `*` and other non-version
/// ranges are returned as-is.
pub fn rewrite_range(range: &str, version: &str) -> String {
    let split = range
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(range.len());
    let (operator, rest) = range.split_at(split);
    if rest.is_empty() || operator.chars().any(|c| !matches!(c, '^' | '~' | '>' | '<' | '=' | ' ' | 'v')) {
        return range.to_string();
    }
    format!("{}{}", operator, version)
}
