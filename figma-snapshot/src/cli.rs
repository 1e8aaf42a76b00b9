//! Command-line surface of figma-snapshot.
//!
//! Everything that talks to the API or shapes the tree lives in `figma-snapshot-core`;
//! this module wires configuration, the team id list, the client and the snapshot
//! writer together.
//!
//! - `snapshot` walks every listed team and writes one JSON document.
//! - `whoami` checks the credential against the API.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figma_snapshot_core::client::FigmaClient;
use figma_snapshot_core::config::SnapshotConfig;
use figma_snapshot_core::contract::FigmaApi;
use figma_snapshot_core::model::{ExtractionRun, RunSummary, TeamId};
use figma_snapshot_core::walker::walk;
use tracing::info;

use crate::load_config::{load_config, load_credential, ConfigOverrides};
use crate::output::write_snapshot;
use crate::team_ids::read_team_ids;

/// CLI for figma-snapshot: export team, project and file metadata.
#[derive(Parser)]
#[clap(
    name = "figma-snapshot",
    version,
    about = "Export Figma teams, projects and files into one timestamped JSON snapshot"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Walk every listed team and write a snapshot document
    Snapshot {
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// File with one team id per line
        #[clap(long)]
        team_ids: Option<PathBuf>,
        /// Directory the snapshot is written to
        #[clap(long)]
        output_dir: Option<PathBuf>,
        /// Number of teams fetched at once
        #[clap(long)]
        concurrency: Option<usize>,
        /// Abort on the first team that fails
        #[clap(long)]
        strict: bool,
        /// Also fetch the canvas pages of every file
        #[clap(long)]
        include_pages: bool,
    },
    /// Check the access token and print the account it belongs to
    Whoami {
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

/// Async CLI entrypoint for main() and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Snapshot {
            config,
            team_ids,
            output_dir,
            concurrency,
            strict,
            include_pages,
        } => {
            let mut config = load_config(config.as_deref())?;
            ConfigOverrides {
                team_ids_file: team_ids,
                output_dir,
                concurrency,
                strict,
                include_pages,
            }
            .apply(&mut config);
            config.trace_loaded();

            let credential = load_credential()?;
            let team_ids = read_team_ids(&config.team_ids_file)?;
            let client =
                FigmaClient::from_config(config.api.clone(), config.retry.clone(), credential)
                    .context("Failed to build HTTP client")?;

            info!(command = "snapshot", teams = team_ids.len(), "Starting snapshot");
            let (path, run) = snapshot(&client, &team_ids, &config).await?;
            println!("Snapshot written to {}", path.display());
            println!("{}", summary_line(run.summary()));
            Ok(())
        }
        Commands::Whoami { config } => {
            let config = load_config(config.as_deref())?;
            let credential = load_credential()?;
            let client = FigmaClient::from_config(config.api, config.retry, credential)
                .context("Failed to build HTTP client")?;
            let me = client.me().await.context("Failed to validate access token")?;
            match &me.email {
                Some(email) => println!("Authenticated as {} <{}>", me.handle, email),
                None => println!("Authenticated as {}", me.handle),
            }
            Ok(())
        }
    }
}

/// Walk `team_ids` and write the resulting document into `config.output_dir`.
///
/// Nothing is written when the walk aborts.
pub async fn snapshot<A>(
    api: &A,
    team_ids: &[TeamId],
    config: &SnapshotConfig,
) -> Result<(PathBuf, ExtractionRun)>
where
    A: FigmaApi + ?Sized,
{
    let run = walk(api, team_ids, &config.walk)
        .await
        .context("Extraction aborted, no snapshot written")?;
    let path = write_snapshot(&run, &config.output_dir)?;
    Ok((path, run))
}

pub fn summary_line(summary: &RunSummary) -> String {
    format!(
        "{} of {} teams, {} projects, {} files, {} errors",
        summary.teams, summary.requested_teams, summary.projects, summary.files, summary.errors
    )
}
