//! End-to-end scan orchestration: bounded fan-out over contexts, then over
//! applications, then drift assembly.
//!
//! Two independent fan-out/fan-in stages. Stage 1 launches one task per
//! configured context (context counts are small, no explicit ceiling);
//! stage 2 runs sequential batches capped by the configured concurrency
//! ceiling to respect upstream rate limits. Tasks never share mutable state
//! and never cancel each other; all merging happens after each barrier.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{bail, Result};
use futures::future::join_all;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::kube::auth::ClusterConnection;
use crate::kube::fetcher::list_workloads;
use crate::kube::reconcile::reconcile;
use crate::kube::{LabelSelector, WorkloadKind, WorkloadRecord};
use crate::release::github::GithubClient;
use crate::release::ReleaseRecord;
use crate::types::{ApplicationDriftInfo, DeploymentVersionInfo};
use crate::version::{count_newer_releases, SemanticVersion};

/// Run one point-in-time scan and return drift records sorted by
/// application name.
pub async fn run_scan(
    config: &Config,
    github_token: Option<String>,
) -> Result<Vec<ApplicationDriftInfo>> {
    config.validate()?;

    // Credential resolution happens before any fetch so bad configuration
    // aborts the run instead of degrading it.
    let mut resolved = Vec::new();
    for ctx in &config.contexts {
        resolved.push((ctx.alias().to_string(), ctx.resolve_connection()?));
    }
    let github = Arc::new(GithubClient::new(&config.github, github_token)?);

    let by_context = fetch_all_contexts(config, resolved).await;

    let apps: BTreeSet<String> = by_context
        .values()
        .flatten()
        .map(|record| record.app_name.clone())
        .collect();
    if apps.is_empty() {
        bail!("no applications found in any configured context");
    }
    info!(
        "found {} distinct applications across {} contexts",
        apps.len(),
        by_context.len()
    );

    let histories = fetch_all_histories(config, github, &apps).await;

    Ok(assemble(&by_context, &histories))
}

/// Stage 1: one task per context, both kinds fetched and reconciled inside
/// the task. A failing context degrades to an empty result set.
async fn fetch_all_contexts(
    config: &Config,
    resolved: Vec<(String, ClusterConnection)>,
) -> BTreeMap<String, Vec<WorkloadRecord>> {
    let mut handles = Vec::new();
    for (alias, connection) in resolved {
        let namespace = config.namespace.clone();
        let labels = config.labels.clone();
        let rollout_labels = config.rollout_selector().clone();
        handles.push(tokio::spawn(async move {
            let result =
                fetch_context(&connection, &alias, &namespace, &labels, &rollout_labels).await;
            (alias, result)
        }));
    }

    let mut outcomes = Vec::new();
    for outcome in join_all(handles).await {
        match outcome {
            Ok(pair) => outcomes.push(pair),
            Err(err) => error!("context fetch task aborted: {err}"),
        }
    }
    merge_context_results(outcomes)
}

/// Fan-in for stage 1: a failed context degrades to an empty result set for
/// its alias so the remaining contexts still produce drift entries.
fn merge_context_results(
    outcomes: Vec<(String, Result<Vec<WorkloadRecord>>)>,
) -> BTreeMap<String, Vec<WorkloadRecord>> {
    let mut by_context = BTreeMap::new();
    for (alias, result) in outcomes {
        match result {
            Ok(records) => {
                info!("context {alias}: {} workloads after reconcile", records.len());
                by_context.insert(alias, records);
            }
            Err(err) => {
                error!("context {alias} fetch failed: {err:#}");
                by_context.insert(alias, Vec::new());
            }
        }
    }
    by_context
}

async fn fetch_context(
    connection: &ClusterConnection,
    alias: &str,
    namespace: &str,
    labels: &LabelSelector,
    rollout_labels: &LabelSelector,
) -> Result<Vec<WorkloadRecord>> {
    let client = connection.build_client()?;
    let mut records = list_workloads(
        connection,
        &client,
        alias,
        namespace,
        labels,
        WorkloadKind::PlainDeployment,
    )
    .await?;
    records.extend(
        list_workloads(
            connection,
            &client,
            alias,
            namespace,
            rollout_labels,
            WorkloadKind::ProgressiveRollout,
        )
        .await?,
    );
    Ok(reconcile(records))
}

/// Stage 2: sequential batches no larger than the configured ceiling, one
/// task per application within a batch. A failing lookup degrades to an
/// empty history for that application.
async fn fetch_all_histories(
    config: &Config,
    github: Arc<GithubClient>,
    apps: &BTreeSet<String>,
) -> BTreeMap<String, Vec<ReleaseRecord>> {
    let app_list: Vec<String> = apps.iter().cloned().collect();
    let batch_size = config.github.concurrency.max(1);

    let mut histories = BTreeMap::new();
    for batch in app_list.chunks(batch_size) {
        let mut handles = Vec::new();
        for app in batch {
            let github = Arc::clone(&github);
            let app = app.clone();
            let repo = config.repo_for(&app).to_string();
            handles.push(tokio::spawn(async move {
                let result = github.resolve_history(&repo).await;
                (app, repo, result)
            }));
        }
        for outcome in join_all(handles).await {
            match outcome {
                Ok((app, _, Ok(history))) => {
                    histories.insert(app, history);
                }
                Ok((app, repo, Err(err))) => {
                    warn!("release lookup for {app} (repo {repo}) failed: {err}");
                    histories.insert(app, Vec::new());
                }
                Err(err) => warn!("release lookup task aborted: {err}"),
            }
        }
    }
    histories
}

/// Pair every (application, context) observation with the application's
/// release history and compute drift. Output is sorted by application name;
/// applications with no context entry are omitted.
pub fn assemble(
    by_context: &BTreeMap<String, Vec<WorkloadRecord>>,
    histories: &BTreeMap<String, Vec<ReleaseRecord>>,
) -> Vec<ApplicationDriftInfo> {
    let apps: BTreeSet<&str> = by_context
        .values()
        .flatten()
        .map(|record| record.app_name.as_str())
        .collect();

    let mut out = Vec::new();
    for app in apps {
        let history: &[ReleaseRecord] = histories.get(app).map(Vec::as_slice).unwrap_or(&[]);
        let versions: Vec<SemanticVersion> =
            history.iter().map(|record| record.version.clone()).collect();

        let mut contexts = BTreeMap::new();
        for (alias, records) in by_context {
            let Some(record) = records.iter().find(|r| r.app_name == app) else {
                continue;
            };
            contexts.insert(
                alias.clone(),
                DeploymentVersionInfo {
                    deployed_version: record.deployed_version.clone(),
                    observed_at: record.observed_at,
                    drift: count_newer_releases(&record.deployed_version, &versions),
                },
            );
        }
        if contexts.is_empty() {
            continue;
        }
        out.push(ApplicationDriftInfo {
            app_name: app.to_string(),
            contexts,
            latest_release: history.first().cloned(),
        });
    }
    out
}
