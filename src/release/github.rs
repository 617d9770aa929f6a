//! GitHub-backed release history with a two-tier lookup: the formal releases
//! REST endpoint first, then a bulk tag query over GraphQL when a repository
//! publishes too few releases to rank against.

use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::GithubSettings;
use crate::release::{dedup_by_version, ReleaseError, ReleaseRecord};
use crate::version::parse_version;

const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
const GITHUB_JSON: &str = "application/vnd.github+json";

const TAG_HISTORY_QUERY: &str = r#"
query($owner: String!, $name: String!, $count: Int!) {
  repository(owner: $owner, name: $name) {
    refs(refPrefix: "refs/tags/", first: $count,
         orderBy: { field: TAG_COMMIT_DATE, direction: DESC }) {
      nodes {
        name
        target {
          __typename
          ... on Commit { committedDate }
          ... on Tag { tagger { date } }
        }
      }
    }
  }
}"#;

/// Client for one GitHub organization's release and tag history.
pub struct GithubClient {
    http: Client,
    api_base: String,
    graphql_url: String,
    org: String,
    token: Option<String>,
    history_min: usize,
    tag_window: u32,
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
}

#[derive(Debug, Deserialize)]
struct GraphqlEnvelope {
    data: Option<GraphqlData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphqlData {
    repository: Option<GraphqlRepository>,
}

#[derive(Debug, Deserialize)]
struct GraphqlRepository {
    refs: GraphqlRefs,
}

#[derive(Debug, Deserialize)]
struct GraphqlRefs {
    #[serde(default)]
    nodes: Vec<TagNode>,
}

#[derive(Debug, Deserialize)]
struct TagNode {
    name: String,
    target: Option<TagTarget>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagTarget {
    committed_date: Option<DateTime<Utc>>,
    tagger: Option<Tagger>,
}

#[derive(Debug, Deserialize)]
struct Tagger {
    date: Option<DateTime<Utc>>,
}

impl GithubClient {
    pub fn new(settings: &GithubSettings, token: Option<String>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("driftscan/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        let api_base = settings.api_base.trim_end_matches('/').to_string();
        let graphql_url = settings
            .graphql_url
            .clone()
            .unwrap_or_else(|| format!("{api_base}/graphql"));
        Ok(Self {
            http,
            api_base,
            graphql_url,
            org: settings.org.clone(),
            token,
            history_min: settings.history_min,
            tag_window: settings.tag_window,
        })
    }

    /// Ordered (newest-first), deduplicated release history for one
    /// repository. Falls back to the tag query when the releases endpoint
    /// yields fewer than the configured minimum; an empty result is not an
    /// error and produces unknown drift downstream.
    pub async fn resolve_history(&self, repo: &str) -> Result<Vec<ReleaseRecord>, ReleaseError> {
        let releases = self.fetch_releases(repo).await?;
        if !needs_tag_fallback(&releases, self.history_min) {
            return Ok(releases);
        }
        debug!(
            "{repo}: {} releases below minimum {}, falling back to tag history",
            releases.len(),
            self.history_min
        );
        let tags = self.fetch_tag_history(repo).await?;
        Ok(select_history(releases, tags))
    }

    async fn fetch_releases(&self, repo: &str) -> Result<Vec<ReleaseRecord>, ReleaseError> {
        let url = format!("{}/repos/{}/{}/releases", self.api_base, self.org, repo);
        let mut request = self.http.get(&url).header(ACCEPT, GITHUB_JSON);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|source| ReleaseError::Network {
            repo: repo.to_string(),
            source,
        })?;
        let response = check_status(repo, response)?;
        let body = response.text().await.map_err(|source| ReleaseError::Network {
            repo: repo.to_string(),
            source,
        })?;
        let items: Vec<GithubRelease> =
            serde_json::from_str(&body).map_err(|source| ReleaseError::Decode {
                repo: repo.to_string(),
                source,
            })?;
        Ok(releases_to_history(items))
    }

    async fn fetch_tag_history(&self, repo: &str) -> Result<Vec<ReleaseRecord>, ReleaseError> {
        let payload = json!({
            "query": TAG_HISTORY_QUERY,
            "variables": { "owner": self.org, "name": repo, "count": self.tag_window },
        });
        let mut request = self.http.post(&self.graphql_url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|source| ReleaseError::Network {
            repo: repo.to_string(),
            source,
        })?;
        let response = check_status(repo, response)?;
        let body = response.text().await.map_err(|source| ReleaseError::Network {
            repo: repo.to_string(),
            source,
        })?;
        let envelope: GraphqlEnvelope =
            serde_json::from_str(&body).map_err(|source| ReleaseError::Decode {
                repo: repo.to_string(),
                source,
            })?;

        let GraphqlEnvelope { data, errors } = envelope;
        let Some(repository) = data.and_then(|d| d.repository) else {
            return Err(classify_graphql_failure(repo, errors));
        };
        Ok(tags_to_history(repository.refs.nodes))
    }
}

/// The fallback fires when the primary release list is below the configured
/// minimum.
fn needs_tag_fallback(primary: &[ReleaseRecord], history_min: usize) -> bool {
    primary.len() < history_min
}

/// Prefer the tag fallback once it has fired; when the fallback itself came
/// back empty, the short primary list is still the best partial answer.
fn select_history(primary: Vec<ReleaseRecord>, fallback: Vec<ReleaseRecord>) -> Vec<ReleaseRecord> {
    if fallback.is_empty() {
        primary
    } else {
        fallback
    }
}

/// A null `repository` in a 200 GraphQL response is not always a missing
/// repo: secondary rate limits and auth problems also null it out and carry
/// an `errors` array instead.
fn classify_graphql_failure(repo: &str, errors: Vec<GraphqlError>) -> ReleaseError {
    let repo = repo.to_string();
    if errors
        .iter()
        .any(|e| e.error_type.as_deref() == Some("RATE_LIMITED"))
    {
        return ReleaseError::RateLimited { repo };
    }
    if errors.iter().any(|e| {
        matches!(
            e.error_type.as_deref(),
            Some("FORBIDDEN") | Some("INSUFFICIENT_SCOPES")
        )
    }) {
        return ReleaseError::Auth { repo };
    }
    if let Some(other) = errors
        .into_iter()
        .find(|e| e.error_type.as_deref() != Some("NOT_FOUND"))
    {
        return ReleaseError::Query {
            repo,
            message: other.message,
        };
    }
    ReleaseError::RepoNotFound { repo }
}

fn check_status(repo: &str, response: Response) -> Result<Response, ReleaseError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let remaining = response
        .headers()
        .get(RATE_LIMIT_REMAINING_HEADER)
        .and_then(|v| v.to_str().ok());
    if remaining == Some("0") {
        return Err(ReleaseError::RateLimited {
            repo: repo.to_string(),
        });
    }
    match status {
        StatusCode::UNAUTHORIZED => Err(ReleaseError::Auth {
            repo: repo.to_string(),
        }),
        StatusCode::NOT_FOUND => Err(ReleaseError::RepoNotFound {
            repo: repo.to_string(),
        }),
        status => Err(ReleaseError::Status {
            repo: repo.to_string(),
            status,
        }),
    }
}

/// Map the releases payload into history: drafts skipped, unparseable tag
/// names dropped, newest-first, one record per version.
fn releases_to_history(items: Vec<GithubRelease>) -> Vec<ReleaseRecord> {
    let mut records: Vec<ReleaseRecord> = items
        .into_iter()
        .filter(|item| !item.draft)
        .filter_map(|item| {
            parse_version(&item.tag_name).map(|version| ReleaseRecord {
                version,
                published_at: item.created_at,
                prerelease: item.prerelease,
            })
        })
        .collect();
    records.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    dedup_by_version(records)
}

/// Map tag nodes into history. Tags carry no pre-release flag upstream, so
/// every record is marked non-pre-release; a tag without a commit or tagger
/// date keeps a distant-past timestamp rather than being dropped.
fn tags_to_history(nodes: Vec<TagNode>) -> Vec<ReleaseRecord> {
    let records = nodes
        .into_iter()
        .filter_map(|node| {
            let version = parse_version(&node.name)?;
            let published_at = node
                .target
                .and_then(|t| t.committed_date.or_else(|| t.tagger.and_then(|g| g.date)))
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            Some(ReleaseRecord {
                version,
                published_at,
                prerelease: false,
            })
        })
        .collect();
    dedup_by_version(records)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn releases_skip_drafts_and_unparseable_tags() {
        let items: Vec<GithubRelease> = serde_json::from_value(json!([
            { "tag_name": "v3.0.0", "created_at": "2026-08-01T00:00:00Z" },
            { "tag_name": "v2.9.0", "created_at": "2026-07-01T00:00:00Z", "draft": true },
            { "tag_name": "nightly", "created_at": "2026-06-15T00:00:00Z" },
            { "tag_name": "v2.5.0", "created_at": "2026-06-01T00:00:00Z", "prerelease": true }
        ]))
        .expect("fixture");
        let history = releases_to_history(items);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version.to_string(), "3.0.0");
        assert!(history[1].prerelease);
    }

    #[test]
    fn releases_are_reordered_newest_first() {
        let items: Vec<GithubRelease> = serde_json::from_value(json!([
            { "tag_name": "v1.0.0", "created_at": "2026-01-01T00:00:00Z" },
            { "tag_name": "v2.0.0", "created_at": "2026-05-01T00:00:00Z" }
        ]))
        .expect("fixture");
        let history = releases_to_history(items);
        assert_eq!(history[0].version.to_string(), "2.0.0");
    }

    #[test]
    fn tags_dedup_by_version_and_use_either_date() {
        let nodes: Vec<TagNode> = serde_json::from_value(json!([
            { "name": "v2.0.0", "target": { "committedDate": "2026-08-10T00:00:00Z" } },
            { "name": "2.0.0", "target": { "tagger": { "date": "2026-08-09T00:00:00Z" } } },
            { "name": "v1.9.0", "target": { "tagger": { "date": "2026-07-01T00:00:00Z" } } },
            { "name": "not-a-tag", "target": { "committedDate": "2026-06-01T00:00:00Z" } }
        ]))
        .expect("fixture");
        let history = tags_to_history(nodes);
        assert_eq!(history.len(), 2);
        assert_eq!(
            history[0].published_at.to_rfc3339(),
            "2026-08-10T00:00:00+00:00"
        );
        assert!(history.iter().all(|r| !r.prerelease));
    }

    #[test]
    fn tag_without_any_date_falls_back_to_epoch() {
        let nodes: Vec<TagNode> = serde_json::from_value(json!([
            { "name": "v1.0.0", "target": { "__typename": "Blob" } }
        ]))
        .expect("fixture");
        let history = tags_to_history(nodes);
        assert_eq!(history[0].published_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn graphql_envelope_with_null_repository_decodes() {
        let envelope: GraphqlEnvelope =
            serde_json::from_value(json!({ "data": { "repository": null } })).expect("decode");
        assert!(envelope.data.unwrap().repository.is_none());
        assert!(envelope.errors.is_empty());
    }

    #[test]
    fn fallback_fires_only_below_the_minimum() {
        let three: Vec<ReleaseRecord> = serde_json::from_value::<Vec<GithubRelease>>(json!([
            { "tag_name": "v3.0.0", "created_at": "2026-08-01T00:00:00Z" },
            { "tag_name": "v2.0.0", "created_at": "2026-07-01T00:00:00Z" },
            { "tag_name": "v1.0.0", "created_at": "2026-06-01T00:00:00Z" }
        ]))
        .map(releases_to_history)
        .expect("fixture");
        assert!(!needs_tag_fallback(&three, 3));
        assert!(needs_tag_fallback(&three[..2].to_vec(), 3));
        assert!(needs_tag_fallback(&[], 1));
    }

    #[test]
    fn fallback_result_replaces_a_short_primary_and_is_deduplicated() {
        let primary: Vec<ReleaseRecord> = serde_json::from_value::<Vec<GithubRelease>>(json!([
            { "tag_name": "v2.0.0", "created_at": "2026-07-01T00:00:00Z" }
        ]))
        .map(releases_to_history)
        .expect("fixture");
        assert!(needs_tag_fallback(&primary, 3));

        let nodes: Vec<TagNode> = serde_json::from_value(json!([
            { "name": "v2.0.0", "target": { "committedDate": "2026-07-01T00:00:00Z" } },
            { "name": "2.0.0", "target": { "committedDate": "2026-06-30T00:00:00Z" } },
            { "name": "v1.5.0", "target": { "committedDate": "2026-05-01T00:00:00Z" } }
        ]))
        .expect("fixture");
        let history = select_history(primary, tags_to_history(nodes));
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version.to_string(), "2.0.0");
        assert_eq!(history[1].version.to_string(), "1.5.0");
    }

    #[test]
    fn empty_fallback_keeps_the_short_primary_list() {
        let primary: Vec<ReleaseRecord> = serde_json::from_value::<Vec<GithubRelease>>(json!([
            { "tag_name": "v2.0.0", "created_at": "2026-07-01T00:00:00Z" }
        ]))
        .map(releases_to_history)
        .expect("fixture");
        let history = select_history(primary, Vec::new());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version.to_string(), "2.0.0");
    }

    #[test]
    fn null_repository_failures_are_classified_by_error_type() {
        let rate_limited: Vec<GraphqlError> = serde_json::from_value(json!([
            { "type": "RATE_LIMITED", "message": "API rate limit exceeded" }
        ]))
        .expect("fixture");
        assert!(matches!(
            classify_graphql_failure("svc", rate_limited),
            ReleaseError::RateLimited { .. }
        ));

        let forbidden: Vec<GraphqlError> = serde_json::from_value(json!([
            { "type": "FORBIDDEN", "message": "Resource not accessible" }
        ]))
        .expect("fixture");
        assert!(matches!(
            classify_graphql_failure("svc", forbidden),
            ReleaseError::Auth { .. }
        ));

        let not_found: Vec<GraphqlError> = serde_json::from_value(json!([
            { "type": "NOT_FOUND", "message": "Could not resolve to a Repository" }
        ]))
        .expect("fixture");
        assert!(matches!(
            classify_graphql_failure("svc", not_found),
            ReleaseError::RepoNotFound { .. }
        ));
        assert!(matches!(
            classify_graphql_failure("svc", Vec::new()),
            ReleaseError::RepoNotFound { .. }
        ));

        let other: Vec<GraphqlError> = serde_json::from_value(json!([
            { "message": "Something went wrong" }
        ]))
        .expect("fixture");
        assert!(matches!(
            classify_graphql_failure("svc", other),
            ReleaseError::Query { .. }
        ));
    }
}
