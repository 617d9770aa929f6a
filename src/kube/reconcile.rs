//! Merge per-kind workload records into one record per application.
//!
//! During a migration between Deployments and Rollouts both kinds can exist
//! for the same application; whichever currently serves traffic (positive
//! replicas, most recent observation) wins.

use std::collections::BTreeMap;

use crate::kube::WorkloadRecord;

/// Collapse records from both kinds to one per distinct application name.
///
/// Within a name group, prefer the most recently observed record with ready
/// replicas > 0; when no record has positive replicas, take the most recent
/// one regardless. Output order follows application name.
pub fn reconcile(records: Vec<WorkloadRecord>) -> Vec<WorkloadRecord> {
    let mut groups: BTreeMap<String, Vec<WorkloadRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.app_name.clone()).or_default().push(record);
    }

    groups
        .into_values()
        .filter_map(|group| {
            let serving = group
                .iter()
                .filter(|r| r.ready_replicas > 0)
                .max_by_key(|r| r.observed_at)
                .cloned();
            serving.or_else(|| group.into_iter().max_by_key(|r| r.observed_at))
        })
        .collect()
}
