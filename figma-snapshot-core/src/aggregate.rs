//! Run-scoped accumulator for the output tree.
//!
//! The [`Aggregator`] is the only writer of the tree. Nodes are inserted under an
//! already-resolved parent slot, and a counter moves only after its node is in place,
//! so the summary can never disagree with the tree. Identifiers already present are
//! rejected, which keeps every project under exactly one team and every file under
//! exactly one project even if the API returns overlaps.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::model::{
    ErrorRecord, ErrorScope, ExtractionRun, FileNode, ProjectNode, ProjectRecord, RunSummary,
    TeamId, TeamNode, TeamRecord,
};

/// Handle to a team already in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamSlot(usize);

/// Handle to a project already in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectSlot {
    team: usize,
    project: usize,
}

#[derive(Debug, Default)]
struct Counters {
    teams: usize,
    failed_teams: usize,
    projects: usize,
    files: usize,
}

#[derive(Debug)]
pub struct Aggregator {
    requested_teams: usize,
    teams: Vec<TeamNode>,
    errors: Vec<ErrorRecord>,
    counters: Counters,
    seen_teams: HashSet<TeamId>,
    seen_projects: HashSet<String>,
    seen_files: HashSet<String>,
}

impl Aggregator {
    pub fn new(requested_teams: usize) -> Self {
        Self {
            requested_teams,
            teams: Vec::new(),
            errors: Vec::new(),
            counters: Counters::default(),
            seen_teams: HashSet::new(),
            seen_projects: HashSet::new(),
            seen_files: HashSet::new(),
        }
    }

    pub fn append_team(&mut self, id: TeamId, record: TeamRecord) -> Option<TeamSlot> {
        if !self.seen_teams.insert(id.clone()) {
            warn!(team_id = %id, "[AGGREGATE] Duplicate team skipped");
            return None;
        }
        self.teams.push(TeamNode {
            id,
            name: record.name,
            partial: false,
            projects: Vec::new(),
        });
        self.counters.teams += 1;
        Some(TeamSlot(self.teams.len() - 1))
    }

    pub fn append_project(&mut self, team: TeamSlot, record: ProjectRecord) -> Option<ProjectSlot> {
        let owner = &mut self.teams[team.0];
        if !self.seen_projects.insert(record.id.clone()) {
            warn!(
                team_id = %owner.id,
                project_id = %record.id,
                "[AGGREGATE] Project already present in tree, skipped"
            );
            return None;
        }
        owner.projects.push(ProjectNode {
            id: record.id,
            name: record.name,
            team_id: owner.id.clone(),
            partial: false,
            files: Vec::new(),
        });
        self.counters.projects += 1;
        Some(ProjectSlot {
            team: team.0,
            project: owner.projects.len() - 1,
        })
    }

    pub fn append_file(&mut self, project: ProjectSlot, file: FileNode) -> bool {
        if !self.seen_files.insert(file.key.clone()) {
            warn!(file_key = %file.key, "[AGGREGATE] File already present in tree, skipped");
            return false;
        }
        self.teams[project.team].projects[project.project]
            .files
            .push(file);
        self.counters.files += 1;
        true
    }

    pub fn mark_team_partial(&mut self, team: TeamSlot) {
        self.teams[team.0].partial = true;
    }

    pub fn mark_project_partial(&mut self, project: ProjectSlot) {
        self.teams[project.team].projects[project.project].partial = true;
    }

    /// Attach an error to the run. Node counters are untouched.
    pub fn record_error(&mut self, record: ErrorRecord) {
        debug!(scope = ?record.scope, id = %record.id, kind = ?record.kind, "[AGGREGATE] Error recorded");
        self.errors.push(record);
    }

    /// A team id that produced no node at all.
    pub fn fail_team(&mut self, id: &TeamId, error: &ApiError) {
        self.counters.failed_teams += 1;
        self.record_error(ErrorRecord::new(ErrorScope::Team, id.as_str(), error));
    }

    /// Stamp the end time and hand out the finished snapshot.
    pub fn finalize(self, started_at: DateTime<Utc>) -> ExtractionRun {
        debug_assert_eq!(self.counters.teams, self.teams.len());
        let summary = RunSummary {
            requested_teams: self.requested_teams,
            teams: self.counters.teams,
            failed_teams: self.counters.failed_teams,
            projects: self.counters.projects,
            files: self.counters.files,
            errors: self.errors.len(),
            started_at,
            finished_at: Utc::now(),
        };
        ExtractionRun {
            summary,
            teams: self.teams,
            errors: self.errors,
        }
    }
}
