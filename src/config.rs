use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::kube::auth::{
    parse_ca_bundle, parse_client_identity, ClusterAuth, ClusterConnection,
};
use crate::kube::LabelSelector;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Workload label selector: items ANDed, values within an item ORed.
    #[serde(default)]
    pub labels: LabelSelector,
    /// Optional separate selector for progressive-delivery Rollouts; falls
    /// back to `labels` when absent.
    #[serde(default)]
    pub rollout_labels: Option<LabelSelector>,
    #[serde(default)]
    pub contexts: Vec<ContextConfig>,
    #[serde(default)]
    pub github: GithubSettings,
    /// Application name → repository name. Unmapped applications default to
    /// their own name.
    #[serde(default)]
    pub repositories: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextConfig {
    pub name: String,
    /// Short display alias; defaults to the context name.
    #[serde(default)]
    pub alias: Option<String>,
    pub server: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub client_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub client_key_path: Option<PathBuf>,
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubSettings {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// GraphQL endpoint; derived from `api_base` when absent.
    #[serde(default)]
    pub graphql_url: Option<String>,
    #[serde(default)]
    pub org: String,
    /// Minimum release count below which the tag-history fallback kicks in.
    #[serde(default = "default_history_min")]
    pub history_min: usize,
    /// Concurrency ceiling for release lookups (batch size).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// How many tags the fallback query requests.
    #[serde(default = "default_tag_window")]
    pub tag_window: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub namespace: Option<String>,
    /// Restrict the scan to these context aliases.
    pub contexts: Option<Vec<String>>,
    pub org: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/driftscan/config.yaml")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = serde_yaml::from_str(&data)
            .with_context(|| format!("failed parsing YAML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(namespace) = overrides.namespace {
            self.namespace = namespace;
        }
        if let Some(org) = overrides.org {
            self.github.org = org;
        }
        if let Some(aliases) = overrides.contexts {
            self.contexts
                .retain(|ctx| aliases.iter().any(|a| a == ctx.alias()));
        }
    }

    /// Fatal-before-fetch validation.
    pub fn validate(&self) -> Result<()> {
        if self.contexts.is_empty() {
            bail!("no contexts configured");
        }
        for ctx in &self.contexts {
            if ctx.server.trim().is_empty() {
                bail!("context {} has no server URL", ctx.name);
            }
        }
        if self.github.org.trim().is_empty() {
            bail!("github.org is not configured");
        }
        if self.github.concurrency == 0 {
            bail!("github.concurrency must be at least 1");
        }
        Ok(())
    }

    pub fn rollout_selector(&self) -> &LabelSelector {
        self.rollout_labels.as_ref().unwrap_or(&self.labels)
    }

    pub fn repo_for<'a>(&'a self, app: &'a str) -> &'a str {
        self.repositories.get(app).map(String::as_str).unwrap_or(app)
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn default_template() -> String {
        let template = r#"namespace: default

# Workload label selector. Items are ANDed; values within an item are ORed.
labels:
  team: [payments]

# Optional separate selector for Argo Rollouts; omit to reuse `labels`.
# rollout_labels:
#   team: [payments]

contexts:
  - name: prod-cluster
    alias: Prod
    server: https://kube-prod.example.com:6443
    token: YourServiceAccountToken
    # username: admin
    # password: secret
    # client_cert_path: ~/.kube/prod-client.crt
    # client_key_path: ~/.kube/prod-client.key
    # ca_cert_path: ~/.kube/prod-ca.crt
    # insecure_skip_tls_verify: false

github:
  api_base: https://api.github.com
  org: your-org
  history_min: 3
  concurrency: 5
  tag_window: 50

# Application name -> repository name. Unmapped applications default to
# their own name.
repositories:
  checkout: checkout-service
"#;
        template.to_string()
    }
}

impl ContextConfig {
    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Resolve this context into an opaque connection descriptor, reading
    /// and parsing any credential files. Errors here, including unparseable
    /// PEM material, are configuration errors and abort the run before any
    /// fetch.
    pub fn resolve_connection(&self) -> Result<ClusterConnection> {
        let auth = if let Some(token) = self.token.as_ref().filter(|t| !t.trim().is_empty()) {
            ClusterAuth::Bearer {
                token: token.clone(),
            }
        } else if let (Some(username), Some(password)) = (&self.username, &self.password) {
            ClusterAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            }
        } else if let (Some(cert), Some(key)) = (&self.client_cert_path, &self.client_key_path) {
            let mut identity_pem = fs::read(cert)
                .with_context(|| format!("failed reading client cert: {}", cert.display()))?;
            identity_pem.extend(
                fs::read(key)
                    .with_context(|| format!("failed reading client key: {}", key.display()))?,
            );
            let identity = parse_client_identity(&identity_pem)
                .with_context(|| format!("bad client certificate for context {}", self.name))?;
            ClusterAuth::ClientCert { identity }
        } else {
            bail!(
                "context {} has no credentials (token, username/password, or client cert)",
                self.name
            );
        };

        let ca_bundle = match &self.ca_cert_path {
            Some(path) => {
                let pem = fs::read(path)
                    .with_context(|| format!("failed reading CA bundle: {}", path.display()))?;
                Some(
                    parse_ca_bundle(&pem)
                        .with_context(|| format!("bad CA bundle: {}", path.display()))?,
                )
            }
            None => None,
        };

        Ok(ClusterConnection {
            server: self.server.clone(),
            auth,
            ca_bundle,
            insecure_skip_tls_verify: self.insecure_skip_tls_verify,
        })
    }
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            graphql_url: None,
            org: String::new(),
            history_min: default_history_min(),
            concurrency: default_concurrency(),
            tag_window: default_tag_window(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_history_min() -> usize {
    3
}

fn default_concurrency() -> usize {
    5
}

fn default_tag_window() -> u32 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_and_validates() {
        let config: Config = serde_yaml::from_str(&Config::default_template()).expect("template");
        assert!(config.validate().is_ok());
        assert_eq!(config.contexts[0].alias(), "Prod");
        assert_eq!(config.github.history_min, 3);
        assert_eq!(config.repo_for("checkout"), "checkout-service");
        assert_eq!(config.repo_for("orders"), "orders");
    }

    #[test]
    fn minimal_yaml_gets_defaults() {
        let config: Config = serde_yaml::from_str(
            "contexts:\n  - name: dev\n    server: https://dev:6443\n    token: t\ngithub:\n  org: acme\n",
        )
        .expect("parse");
        assert_eq!(config.namespace, "default");
        assert_eq!(config.github.concurrency, 5);
        assert!(config.rollout_labels.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_missing_pieces() {
        let empty = Config::default();
        assert!(empty.validate().is_err());

        let mut config: Config = serde_yaml::from_str(
            "contexts:\n  - name: dev\n    server: https://dev:6443\ngithub:\n  org: acme\n",
        )
        .expect("parse");
        config.github.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overrides_filter_contexts_by_alias() {
        let mut config: Config = serde_yaml::from_str(&Config::default_template()).expect("parse");
        config.apply_overrides(ConfigOverrides {
            contexts: Some(vec!["Staging".to_string()]),
            ..Default::default()
        });
        assert!(config.contexts.is_empty());
    }

    #[test]
    fn context_without_credentials_fails_resolution() {
        let ctx = ContextConfig {
            name: "dev".to_string(),
            server: "https://dev:6443".to_string(),
            ..Default::default()
        };
        assert!(ctx.resolve_connection().is_err());
    }

    #[test]
    fn garbage_ca_bundle_is_a_fatal_config_error() {
        let path = std::env::temp_dir().join("driftscan-test-bad-ca.pem");
        fs::write(&path, "definitely not pem").unwrap();
        let ctx = ContextConfig {
            name: "dev".to_string(),
            server: "https://dev:6443".to_string(),
            token: Some("abc".to_string()),
            ca_cert_path: Some(path.clone()),
            ..Default::default()
        };
        let err = ctx.resolve_connection().unwrap_err();
        assert!(format!("{err:#}").contains("bad CA bundle"));
        fs::remove_file(path).ok();
    }

    #[test]
    fn garbage_client_cert_is_a_fatal_config_error() {
        let cert = std::env::temp_dir().join("driftscan-test-bad-client.crt");
        let key = std::env::temp_dir().join("driftscan-test-bad-client.key");
        fs::write(&cert, "not a cert").unwrap();
        fs::write(&key, "not a key").unwrap();
        let ctx = ContextConfig {
            name: "dev".to_string(),
            server: "https://dev:6443".to_string(),
            client_cert_path: Some(cert.clone()),
            client_key_path: Some(key.clone()),
            ..Default::default()
        };
        let err = ctx.resolve_connection().unwrap_err();
        assert!(format!("{err:#}").contains("bad client certificate"));
        fs::remove_file(cert).ok();
        fs::remove_file(key).ok();
    }

    #[test]
    fn bearer_token_resolves_without_disk_access() {
        let ctx = ContextConfig {
            name: "dev".to_string(),
            server: "https://dev:6443".to_string(),
            token: Some("abc".to_string()),
            ..Default::default()
        };
        let connection = ctx.resolve_connection().expect("resolve");
        assert!(matches!(connection.auth, ClusterAuth::Bearer { .. }));
    }
}
