//! List-endpoint fetching and normalization into [`WorkloadRecord`]s.
//!
//! One GET per (context, kind); normalization is pure so the decode path is
//! testable from JSON fixtures without a live API server.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::kube::auth::ClusterConnection;
use crate::kube::{
    encode_label_selector, label_value, LabelSelector, WorkloadKind, WorkloadRecord, UNKNOWN_APP,
    UNKNOWN_VERSION,
};

/// Errors for one context's workload fetch. Fatal for that context only;
/// the orchestrator degrades them to an empty result set.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{kind} list request failed: {source}")]
    Request {
        kind: WorkloadKind,
        #[source]
        source: reqwest::Error,
    },
    #[error("{kind} list returned {status}")]
    Status {
        kind: WorkloadKind,
        status: StatusCode,
    },
    #[error("failed decoding {kind} list body: {source}")]
    Decode {
        kind: WorkloadKind,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct WorkloadList {
    #[serde(default)]
    items: Vec<WorkloadItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkloadItem {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    spec: WorkloadSpec,
    #[serde(default)]
    status: WorkloadStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkloadSpec {
    replicas: Option<u32>,
    template: Option<PodTemplate>,
}

#[derive(Debug, Default, Deserialize)]
struct PodTemplate {
    #[serde(default)]
    metadata: ObjectMeta,
}

#[derive(Debug, Default, Deserialize)]
struct WorkloadStatus {
    #[serde(default)]
    conditions: Vec<StatusCondition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusCondition {
    #[serde(rename = "type", default)]
    condition_type: String,
    last_update_time: Option<DateTime<Utc>>,
    last_transition_time: Option<DateTime<Utc>>,
}

/// List all workloads of `kind` matching `selector` in one context.
///
/// A 404 on the list endpoint is an empty result, not an error: the Rollout
/// CRD may legitimately not be installed in a cluster.
pub async fn list_workloads(
    connection: &ClusterConnection,
    client: &Client,
    context: &str,
    namespace: &str,
    selector: &LabelSelector,
    kind: WorkloadKind,
) -> Result<Vec<WorkloadRecord>, FetchError> {
    let url = format!(
        "{}{}",
        connection.server.trim_end_matches('/'),
        kind.list_path(namespace)
    );
    let mut request = client.get(&url);
    let encoded = encode_label_selector(selector);
    if !encoded.is_empty() {
        request = request.query(&[("labelSelector", encoded.as_str())]);
    }
    let response = connection
        .authorize(request)
        .send()
        .await
        .map_err(|source| FetchError::Request { kind, source })?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        debug!("{kind} endpoint absent in {context}, treating as empty");
        return Ok(Vec::new());
    }
    if !status.is_success() {
        return Err(FetchError::Status { kind, status });
    }

    let body = response
        .text()
        .await
        .map_err(|source| FetchError::Request { kind, source })?;
    let list: WorkloadList =
        serde_json::from_str(&body).map_err(|source| FetchError::Decode { kind, source })?;

    Ok(list
        .items
        .into_iter()
        .map(|item| normalize_item(item, context, kind))
        .collect())
}

/// Normalize one decoded resource into a [`WorkloadRecord`].
pub(crate) fn normalize_item(
    item: WorkloadItem,
    context: &str,
    kind: WorkloadKind,
) -> WorkloadRecord {
    let app_name = label_value(&item.metadata.labels, "app")
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            if item.metadata.name.is_empty() {
                UNKNOWN_APP.to_string()
            } else {
                item.metadata.name.clone()
            }
        });

    let deployed_version = item
        .spec
        .template
        .as_ref()
        .and_then(|t| label_value(&t.metadata.labels, "version"))
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_VERSION)
        .to_string();

    WorkloadRecord {
        app_name,
        deployed_version,
        observed_at: observation_time(&item.status),
        context: context.to_string(),
        ready_replicas: item.spec.replicas.unwrap_or(0),
        kind,
    }
}

/// `lastUpdateTime` of the most recent `Progressing` condition that has a
/// transition time set; distant past when no such condition exists.
fn observation_time(status: &WorkloadStatus) -> DateTime<Utc> {
    status
        .conditions
        .iter()
        .filter(|c| c.condition_type == "Progressing" && c.last_transition_time.is_some())
        .filter_map(|c| c.last_update_time)
        .max()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
