use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::retry::RetryPolicy;
use crate::walker::WalkOptions;

pub const DEFAULT_BASE_URL: &str = "https://api.figma.com/v1";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Everything one snapshot run needs, except the credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub api: ApiConfig,
    pub retry: RetryPolicy,
    pub walk: WalkOptions,
    pub team_ids_file: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            retry: RetryPolicy::default(),
            walk: WalkOptions::default(),
            team_ids_file: PathBuf::from("team_ids"),
            output_dir: PathBuf::from("data"),
        }
    }
}

impl SnapshotConfig {
    pub fn trace_loaded(&self) {
        info!(
            base_url = %self.api.base_url,
            team_ids_file = %self.team_ids_file.display(),
            output_dir = %self.output_dir.display(),
            concurrency = self.walk.concurrency,
            strict = self.walk.strict,
            "Loaded SnapshotConfig"
        );
        debug!(?self, "SnapshotConfig loaded (full debug)");
    }
}

/// How the credential is presented to the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// Personal access token in `X-Figma-Token`.
    #[default]
    Token,
    /// OAuth access token in `Authorization: Bearer`.
    Bearer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub auth_scheme: AuthScheme,
    pub page_size: u32,
    pub timeout_secs: u64,
    /// Proactive request budget shared by every branch of a walk. Unlimited when absent.
    pub requests_per_minute: Option<u32>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_scheme: AuthScheme::Token,
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            requests_per_minute: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg: SnapshotConfig = serde_yaml::from_str(
            "api:\n  auth_scheme: bearer\nretry:\n  max_attempts: 2\n",
        )
        .unwrap();
        assert_eq!(cfg.api.auth_scheme, AuthScheme::Bearer);
        assert_eq!(cfg.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.retry.max_attempts, 2);
        assert_eq!(cfg.retry.max_delay_ms, crate::retry::DEFAULT_MAX_DELAY_MS);
        assert_eq!(cfg.team_ids_file, PathBuf::from("team_ids"));
        assert_eq!(cfg.walk.concurrency, 1);
    }
}
