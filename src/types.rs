use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::release::ReleaseRecord;
use crate::version::Drift;

/// What one context is running for an application, with its computed drift.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentVersionInfo {
    pub deployed_version: String,
    pub observed_at: DateTime<Utc>,
    pub drift: Drift,
}

/// Final per-application output unit: one entry per context that runs the
/// application, plus the most recent upstream release when one exists.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDriftInfo {
    pub app_name: String,
    pub contexts: BTreeMap<String, DeploymentVersionInfo>,
    pub latest_release: Option<ReleaseRecord>,
}
