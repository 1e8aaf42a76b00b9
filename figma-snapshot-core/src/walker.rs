//! Team → project → file traversal.
//!
//! Each team is fetched as an independent branch; up to `concurrency` branches are in flight
//! on the calling task, and finished branches are handed to the [`Aggregator`] strictly in
//! input order. The walker decides what a failure means:
//!   - team lookup fails: error record for the team id, no node, next team
//!   - a project or file listing breaks: keep what arrived, mark the parent partial, record it
//!   - canvas pages of a file fail: keep the file without pages, record it
//!   - credential rejected anywhere: abort the whole run with [`WalkError::Unauthorized`]
//!
//! With `strict` set, the first team-level failure aborts the run instead.

use std::collections::HashSet;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::aggregate::Aggregator;
use crate::contract::FigmaApi;
use crate::error::{ApiError, WalkError};
use crate::model::{ErrorRecord, ErrorScope, ExtractionRun, FileNode, ProjectRecord, TeamId, TeamRecord};
use crate::paginate::{collect_pages, Collected};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkOptions {
    /// Team branches fetched at once. Output order does not depend on it.
    pub concurrency: usize,
    /// Abort on the first team-level failure instead of recording it.
    pub strict: bool,
    /// Also fetch each file's canvases.
    pub include_pages: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            strict: false,
            include_pages: false,
        }
    }
}

struct TeamBranch {
    id: TeamId,
    outcome: Result<FetchedTeam, ApiError>,
}

struct FetchedTeam {
    record: TeamRecord,
    projects: Vec<FetchedProject>,
    interrupted: Option<ApiError>,
}

struct FetchedProject {
    record: ProjectRecord,
    files: Vec<FileNode>,
    interrupted: Option<ApiError>,
    file_errors: Vec<ErrorRecord>,
}

/// Credential failures escalate; everything else stays with the node.
fn local(err: ApiError) -> Result<ApiError, ApiError> {
    if err.is_auth() {
        Err(err)
    } else {
        Ok(err)
    }
}

/// Listing with the first-page failure folded into `interrupted`.
fn settle<T>(listing: Result<Collected<T>, ApiError>) -> Result<Collected<T>, ApiError> {
    let listing = match listing {
        Ok(listing) => listing,
        Err(err) => Collected {
            items: Vec::new(),
            interrupted: Some(err),
        },
    };
    match listing.interrupted {
        Some(err) => Ok(Collected {
            items: listing.items,
            interrupted: Some(local(err)?),
        }),
        None => Ok(listing),
    }
}

/// Walk every team id in order and return the finished snapshot.
pub async fn walk<A>(
    api: &A,
    team_ids: &[TeamId],
    options: &WalkOptions,
) -> Result<ExtractionRun, WalkError>
where
    A: FigmaApi + ?Sized,
{
    let started_at = Utc::now();

    let mut seen = HashSet::new();
    let unique: Vec<&TeamId> = team_ids
        .iter()
        .filter(|id| {
            let first = seen.insert(*id);
            if !first {
                warn!(team_id = %id, "[WALK] Duplicate team id in input, walking it once");
            }
            first
        })
        .collect();

    info!(
        teams = unique.len(),
        concurrency = options.concurrency.max(1),
        strict = options.strict,
        include_pages = options.include_pages,
        "[WALK] Starting extraction run"
    );

    let mut aggregator = Aggregator::new(unique.len());
    let branches = stream::iter(unique)
        .map(move |id| fetch_team(api, id, options))
        .buffered(options.concurrency.max(1));
    futures::pin_mut!(branches);

    while let Some(branch) = branches.next().await {
        let branch = branch.map_err(|err| {
            error!(error = %err, "[WALK][ERROR] Credential rejected, aborting run");
            WalkError::Unauthorized(err)
        })?;

        if options.strict {
            let failure = match &branch.outcome {
                Err(err) => Some(err.clone()),
                Ok(team) => team.interrupted.clone(),
            };
            if let Some(source) = failure {
                error!(team_id = %branch.id, error = %source, "[WALK][ERROR] Strict mode, aborting run");
                return Err(WalkError::Aborted {
                    team_id: branch.id.to_string(),
                    source,
                });
            }
        }

        append_branch(&mut aggregator, branch);
    }

    let run = aggregator.finalize(started_at);
    let summary = run.summary();
    info!(
        teams = summary.teams,
        failed_teams = summary.failed_teams,
        projects = summary.projects,
        files = summary.files,
        errors = summary.errors,
        "[WALK] Extraction run complete"
    );
    Ok(run)
}

async fn fetch_team<A>(api: &A, id: &TeamId, options: &WalkOptions) -> Result<TeamBranch, ApiError>
where
    A: FigmaApi + ?Sized,
{
    info!(team_id = %id, "[WALK] Fetching team");
    let record = match api.team(id).await {
        Ok(record) => record,
        Err(err) => {
            let err = local(err)?;
            error!(team_id = %id, error = %err, "[WALK][ERROR] Team lookup failed");
            return Ok(TeamBranch {
                id: id.clone(),
                outcome: Err(err),
            });
        }
    };

    let listing = settle(collect_pages(move |cursor| api.projects_page(id, cursor)).await)?;
    if let Some(err) = &listing.interrupted {
        error!(
            team_id = %id,
            received = listing.items.len(),
            error = %err,
            "[WALK][ERROR] Project listing incomplete"
        );
    }
    info!(team_id = %id, team_name = %record.name, projects = listing.items.len(), "[WALK] Found projects");

    let mut projects = Vec::with_capacity(listing.items.len());
    let mut seen = HashSet::new();
    for project in listing.items {
        if !seen.insert(project.id.clone()) {
            warn!(team_id = %id, project_id = %project.id, "[WALK] Project listed twice, fetching it once");
            continue;
        }
        projects.push(fetch_project(api, project, options).await?);
    }

    Ok(TeamBranch {
        id: id.clone(),
        outcome: Ok(FetchedTeam {
            record,
            projects,
            interrupted: listing.interrupted,
        }),
    })
}

async fn fetch_project<A>(
    api: &A,
    record: ProjectRecord,
    options: &WalkOptions,
) -> Result<FetchedProject, ApiError>
where
    A: FigmaApi + ?Sized,
{
    debug!(project_id = %record.id, project_name = %record.name, "[WALK] Fetching files");
    let project_id = record.id.as_str();
    let listing = settle(collect_pages(move |cursor| api.files_page(project_id, cursor)).await)?;
    if let Some(err) = &listing.interrupted {
        error!(
            project_id = %record.id,
            received = listing.items.len(),
            error = %err,
            "[WALK][ERROR] File listing incomplete"
        );
    }

    let mut files = Vec::with_capacity(listing.items.len());
    let mut file_errors = Vec::new();
    for file in listing.items {
        let mut node = FileNode::from(file);
        if options.include_pages {
            match api.file_pages(&node.key).await {
                Ok(pages) => node.pages = Some(pages),
                Err(err) => {
                    let err = local(err)?;
                    warn!(file_key = %node.key, error = %err, "[WALK] Canvas pages unavailable");
                    file_errors.push(ErrorRecord::new(ErrorScope::File, node.key.clone(), &err));
                }
            }
        }
        files.push(node);
    }
    debug!(project_id = %record.id, files = files.len(), "[WALK] Found files");

    Ok(FetchedProject {
        record,
        files,
        interrupted: listing.interrupted,
        file_errors,
    })
}

fn append_branch(aggregator: &mut Aggregator, branch: TeamBranch) {
    let TeamBranch { id, outcome } = branch;
    let team = match outcome {
        Ok(team) => team,
        Err(err) => {
            aggregator.fail_team(&id, &err);
            return;
        }
    };

    let Some(slot) = aggregator.append_team(id.clone(), team.record) else {
        return;
    };
    if let Some(err) = &team.interrupted {
        aggregator.mark_team_partial(slot);
        aggregator.record_error(ErrorRecord::new(ErrorScope::Team, id.as_str(), err));
    }

    for project in team.projects {
        let project_id = project.record.id.clone();
        // Across teams the first occurrence owns the subtree and its errors.
        let Some(project_slot) = aggregator.append_project(slot, project.record) else {
            warn!(
                team_id = %id,
                project_id = %project_id,
                dropped_files = project.files.len(),
                dropped_errors = project.file_errors.len(),
                "[WALK] Project already owned by an earlier team, discarding this copy"
            );
            continue;
        };
        if let Some(err) = &project.interrupted {
            aggregator.mark_project_partial(project_slot);
            aggregator.record_error(ErrorRecord::new(ErrorScope::Project, project_id, err));
        }
        for file in project.files {
            aggregator.append_file(project_slot, file);
        }
        for record in project.file_errors {
            aggregator.record_error(record);
        }
    }
}
