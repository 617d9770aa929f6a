//! Release-drift scanner for Kubernetes workloads.
//!
//! Discovers running Deployments and Argo Rollouts across one or more
//! cluster contexts, resolves each application's upstream GitHub release
//! history, and reports how many releases behind each deployed version is.

pub mod config;
pub mod engine;
pub mod kube;
pub mod output;
pub mod release;
pub mod types;
pub mod version;
