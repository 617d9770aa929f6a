//! Upstream release history resolution.

pub mod github;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::version::SemanticVersion;

/// One upstream release or tag, newest-first within a resolved list and
/// deduplicated by semantic version.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseRecord {
    pub version: SemanticVersion,
    pub published_at: DateTime<Utc>,
    pub prerelease: bool,
}

/// Errors from one application's release lookup. The orchestrator treats
/// these as non-fatal and degrades to an empty history.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("authentication rejected while fetching releases for {repo}")]
    Auth { repo: String },
    #[error("rate limit exhausted while fetching releases for {repo}")]
    RateLimited { repo: String },
    #[error("repository {repo} not found")]
    RepoNotFound { repo: String },
    #[error("release query for {repo} returned {status}")]
    Status { repo: String, status: StatusCode },
    #[error("release query for {repo} failed: {message}")]
    Query { repo: String, message: String },
    #[error("release request for {repo} failed: {source}")]
    Network {
        repo: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed decoding release response for {repo}: {source}")]
    Decode {
        repo: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Drop all but the first (newest) record for each distinct semantic
/// version. Input is assumed newest-first.
pub fn dedup_by_version(records: Vec<ReleaseRecord>) -> Vec<ReleaseRecord> {
    let mut seen: Vec<SemanticVersion> = Vec::new();
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        if seen.contains(&record.version) {
            continue;
        }
        seen.push(record.version.clone());
        out.push(record);
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::version::parse_version;

    fn release(version: &str, day: u32) -> ReleaseRecord {
        ReleaseRecord {
            version: parse_version(version).expect("test version"),
            published_at: Utc.with_ymd_and_hms(2026, 8, day, 0, 0, 0).unwrap(),
            prerelease: false,
        }
    }

    #[test]
    fn first_occurrence_wins_on_duplicate_versions() {
        let deduped = dedup_by_version(vec![
            release("2.0.0", 20),
            release("2.0.0", 18),
            release("1.9.0", 15),
        ]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].published_at, release("2.0.0", 20).published_at);
    }

    #[test]
    fn build_metadata_counts_as_same_version() {
        let deduped = dedup_by_version(vec![release("1.0.0+a", 10), release("1.0.0+b", 9)]);
        assert_eq!(deduped.len(), 1);
    }
}
