//! Cluster-side workload discovery: connection descriptors, list-endpoint
//! fetching, and reconciliation of the two workload kinds.

pub mod auth;
pub mod fetcher;
pub mod reconcile;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Version label value used when a pod template carries no `version` label.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Application name used when a resource has neither an `app` label nor a
/// metadata name.
pub const UNKNOWN_APP: &str = "unknown";

/// The two workload resource kinds the scanner understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    PlainDeployment,
    ProgressiveRollout,
}

impl WorkloadKind {
    /// Namespaced list endpoint for this kind.
    pub fn list_path(&self, namespace: &str) -> String {
        match self {
            WorkloadKind::PlainDeployment => {
                format!("/apis/apps/v1/namespaces/{namespace}/deployments")
            }
            WorkloadKind::ProgressiveRollout => {
                format!("/apis/argoproj.io/v1alpha1/namespaces/{namespace}/rollouts")
            }
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadKind::PlainDeployment => write!(f, "Deployment"),
            WorkloadKind::ProgressiveRollout => write!(f, "Rollout"),
        }
    }
}

/// One running workload observation, normalized from either kind.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadRecord {
    pub app_name: String,
    pub deployed_version: String,
    pub observed_at: DateTime<Utc>,
    pub context: String,
    pub ready_replicas: u32,
    pub kind: WorkloadKind,
}

/// Label selector: items are ANDed, values within an item are ORed.
pub type LabelSelector = BTreeMap<String, Vec<String>>;

/// Encode a selector into the `labelSelector` query-parameter syntax.
///
/// Single-valued items render as `key=value`, multi-valued as
/// `key in (a,b)`. BTreeMap iteration keeps the output deterministic.
pub fn encode_label_selector(selector: &LabelSelector) -> String {
    selector
        .iter()
        .map(|(key, values)| match values.as_slice() {
            [single] => format!("{key}={single}"),
            many => format!("{key} in ({})", many.join(",")),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Case-insensitive label lookup; Kubernetes labels are case-sensitive but
/// the version/app conventions in the wild are not.
pub fn label_value<'a>(labels: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    labels.get(key).map(String::as_str).or_else(|| {
        labels
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_anded_items_and_ored_values() {
        let mut selector = LabelSelector::new();
        selector.insert("team".to_string(), vec!["payments".to_string()]);
        selector.insert(
            "tier".to_string(),
            vec!["web".to_string(), "worker".to_string()],
        );
        assert_eq!(
            encode_label_selector(&selector),
            "team=payments,tier in (web,worker)"
        );
    }

    #[test]
    fn empty_selector_encodes_to_empty_string() {
        assert_eq!(encode_label_selector(&LabelSelector::new()), "");
    }

    #[test]
    fn label_lookup_ignores_case() {
        let mut labels = BTreeMap::new();
        labels.insert("Version".to_string(), "1.2.3".to_string());
        assert_eq!(label_value(&labels, "version"), Some("1.2.3"));
        assert_eq!(label_value(&labels, "app"), None);
    }
}
