use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use figma_snapshot_core::model::ExtractionRun;
use serde::Serialize;
use tracing::info;

/// `figma_snapshot_<YYYYMMDDTHHMMSSZ>.json` for a run started at `started_at`.
pub fn snapshot_file_name(started_at: DateTime<Utc>) -> String {
    format!("figma_snapshot_{}.json", started_at.format("%Y%m%dT%H%M%SZ"))
}

/// Writes `run` as pretty JSON into `dir`, creating it if needed.
///
/// Fails instead of replacing an earlier snapshot with the same name.
pub fn write_snapshot(run: &ExtractionRun, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {:?}", dir))?;
    let path = dir.join(snapshot_file_name(run.summary().started_at));
    write_json(run, &path)?;

    info!(
        path = %path.display(),
        teams = run.summary().teams,
        errors = run.summary().errors,
        "Snapshot written"
    );
    Ok(path)
}

/// Serializes fully before creating `path`; a failed write removes the partial file.
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let mut document = serde_json::to_vec_pretty(value)
        .with_context(|| format!("Failed to serialize snapshot {:?}", path))?;
    document.push(b'\n');

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Refusing to write snapshot {:?}", path))?;
    if let Err(e) = file.write_all(&document).and_then(|_| file.sync_all()) {
        let _ = fs::remove_file(path);
        return Err(e).with_context(|| format!("Failed to write snapshot {:?}", path));
    }
    Ok(())
}
