//! Semantic version parsing and drift counting.
//!
//! Everything here is pure: no I/O, no panics on bad input. Deployed version
//! labels come straight from pod templates and are frequently prefixed
//! (`v1.2.3`, `release-1.2.3`) or outright garbage, so parsing is lenient on
//! the way in and strict on structure.

use std::cmp::Ordering;
use std::fmt;

use serde::{Serialize, Serializer};

/// Parsed `MAJOR.MINOR.PATCH[-prerelease][+build]`.
///
/// Ordering ignores build metadata; a pre-release sorts below the plain
/// release with the same numeric triple.
#[derive(Debug, Clone, Eq)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: Option<String>,
    pub build: Option<String>,
}

impl SemanticVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: None,
            build: None,
        }
    }

    /// The same version with pre-release and build qualifiers removed.
    /// A deployed `1.4.0-rc1` is compared as `1.4.0`.
    pub fn without_qualifiers(&self) -> Self {
        Self::new(self.major, self.minor, self.patch)
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let numeric =
            (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch));
        if numeric != Ordering::Equal {
            return numeric;
        }
        match (&self.pre_release, &other.pre_release) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{pre}")?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parse a loosely-formatted version label.
///
/// Leading non-digit characters are stripped first, so `v1.2.3` and
/// `release-1.2.3` both parse. Returns `None` on anything that does not
/// reduce to `MAJOR.MINOR.PATCH[-prerelease][+build]`.
pub fn parse_version(raw: &str) -> Option<SemanticVersion> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let trimmed = &raw[start..];

    let (rest, build) = match trimmed.split_once('+') {
        Some((r, b)) if !b.is_empty() => (r, Some(b.to_string())),
        Some((r, _)) => (r, None),
        None => (trimmed, None),
    };
    let (numeric, pre_release) = match rest.split_once('-') {
        Some((n, p)) if !p.is_empty() => (n, Some(p.to_string())),
        Some((n, _)) => (n, None),
        None => (rest, None),
    };

    let parts: Vec<&str> = numeric.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    let major = parts[0].parse::<u64>().ok()?;
    let minor = parts[1].parse::<u64>().ok()?;
    let patch = parts[2].parse::<u64>().ok()?;

    Some(SemanticVersion {
        major,
        minor,
        patch,
        pre_release,
        build,
    })
}

/// How far behind upstream a deployed version is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Drift {
    /// Exactly this many fetched releases are strictly newer.
    Behind(u64),
    /// Every fetched release is newer; the true count exceeds what was
    /// fetched and is unknown.
    Unbounded,
    /// The deployed version did not parse, or no release history exists.
    Unknown,
}

/// Presentation bucket for a drift count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftIndicator {
    Unknown,
    UpToDate,
    Minor,
    Moderate,
    Severe,
}

impl Drift {
    pub fn indicator(&self) -> DriftIndicator {
        match self {
            Drift::Unknown => DriftIndicator::Unknown,
            Drift::Behind(0) => DriftIndicator::UpToDate,
            Drift::Behind(1..=10) => DriftIndicator::Minor,
            Drift::Behind(11..=20) => DriftIndicator::Moderate,
            Drift::Behind(_) | Drift::Unbounded => DriftIndicator::Severe,
        }
    }
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::Behind(n) => write!(f, "{n}"),
            Drift::Unbounded => write!(f, ">fetched"),
            Drift::Unknown => write!(f, "?"),
        }
    }
}

/// Count how many entries of a newest-first release list are strictly newer
/// than the deployed version.
///
/// The list is assumed sorted newest-first, so the answer is a prefix count:
/// scanning stops at the first entry that is not strictly greater. When the
/// scan consumes the whole list the true count is unbounded above the list
/// length and [`Drift::Unbounded`] is returned instead of the prefix length.
pub fn count_newer_releases(deployed: &str, releases: &[SemanticVersion]) -> Drift {
    let Some(deployed) = parse_version(deployed) else {
        return Drift::Unknown;
    };
    if releases.is_empty() {
        return Drift::Unknown;
    }
    let baseline = deployed.without_qualifiers();

    let mut newer = 0u64;
    for release in releases {
        if *release > baseline {
            newer += 1;
        } else {
            return Drift::Behind(newer);
        }
    }
    Drift::Unbounded
}
