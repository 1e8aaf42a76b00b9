use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figma_snapshot_core::config::SnapshotConfig;
use figma_snapshot_core::model::Credential;
use tracing::{error, info};

/// Environment variable holding the personal access or OAuth token.
pub const TOKEN_ENV: &str = "FIGMA_ACCESS_TOKEN";

/// Loads the YAML config file, or the defaults when no path is given.
///
/// Every field is optional in the file; missing ones keep their defaults.
pub fn load_config(path: Option<&Path>) -> Result<SnapshotConfig> {
    let Some(path) = path else {
        info!("No config file given, using defaults");
        return Ok(SnapshotConfig::default());
    };
    info!(config_path = ?path, "Loading configuration from file");

    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path, e)
    })?;

    // An empty file parses as YAML null.
    if content.trim().is_empty() {
        return Ok(SnapshotConfig::default());
    }

    let config: SnapshotConfig = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML {:?}: {e}", path)
    })?;
    info!(config_path = ?path, "Parsed config YAML successfully");
    Ok(config)
}

/// Reads the token from the environment. Missing or blank is fatal.
pub fn load_credential() -> Result<Credential> {
    let token = std::env::var(TOKEN_ENV)
        .with_context(|| format!("{TOKEN_ENV} environment variable not set"))?;
    let token = token.trim();
    if token.is_empty() {
        error!("{} is set but empty", TOKEN_ENV);
        anyhow::bail!("{TOKEN_ENV} environment variable is empty");
    }
    info!("{} found in env", TOKEN_ENV);
    Ok(Credential::new(token))
}

/// Command-line values that win over the config file.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub team_ids_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub strict: bool,
    pub include_pages: bool,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut SnapshotConfig) {
        if let Some(path) = self.team_ids_file {
            config.team_ids_file = path;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(n) = self.concurrency {
            config.walk.concurrency = n;
        }
        // Flags can only switch these on.
        config.walk.strict |= self.strict;
        config.walk.include_pages |= self.include_pages;
    }
}
