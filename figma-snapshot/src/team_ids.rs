use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use figma_snapshot_core::model::TeamId;
use tracing::{debug, info};

/// One id per line. Blank lines and `#` comments are skipped.
pub fn parse_team_ids(content: &str) -> Vec<TeamId> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(TeamId::new)
        .collect()
}

pub fn read_team_ids(path: &Path) -> Result<Vec<TeamId>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read team ids file {:?}", path))?;
    let ids = parse_team_ids(&content);
    if ids.is_empty() {
        anyhow::bail!("Team ids file {:?} contains no team ids", path);
    }
    info!(path = ?path, teams = ids.len(), "Read team ids");
    debug!(?ids, "Team ids");
    Ok(ids)
}
