//! Scripted in-memory `FigmaApi` used by the walker tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use figma_snapshot_core::contract::{FigmaApi, Page};
use figma_snapshot_core::error::ApiError;
use figma_snapshot_core::model::{
    CanvasPage, FileRecord, ProjectRecord, TeamId, TeamRecord, UserInfo,
};
use serde_json::Map;

/// One scripted page: its items, or the error that page returns.
pub type PageScript<T> = Result<Vec<T>, ApiError>;

#[derive(Default)]
pub struct FakeApi {
    teams: HashMap<String, Result<TeamRecord, ApiError>>,
    projects: HashMap<String, Vec<PageScript<ProjectRecord>>>,
    files: HashMap<String, Vec<PageScript<FileRecord>>>,
    canvases: HashMap<String, Result<Vec<CanvasPage>, ApiError>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn team(mut self, id: &str, name: &str, pages: Vec<PageScript<ProjectRecord>>) -> Self {
        self.teams.insert(
            id.to_string(),
            Ok(TeamRecord {
                name: name.to_string(),
            }),
        );
        self.projects.insert(id.to_string(), pages);
        self
    }

    pub fn failing_team(mut self, id: &str, err: ApiError) -> Self {
        self.teams.insert(id.to_string(), Err(err));
        self
    }

    pub fn project_files(mut self, project_id: &str, pages: Vec<PageScript<FileRecord>>) -> Self {
        self.files.insert(project_id.to_string(), pages);
        self
    }

    pub fn canvases(mut self, file_key: &str, result: Result<Vec<CanvasPage>, ApiError>) -> Self {
        self.canvases.insert(file_key.to_string(), result);
        self
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn serve<T: Clone>(
        scripts: Option<&Vec<PageScript<T>>>,
        cursor: Option<String>,
    ) -> Result<Page<T>, ApiError> {
        let idx: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let scripts = match scripts {
            Some(s) if !s.is_empty() => s,
            _ => {
                return Ok(Page {
                    items: vec![],
                    next_cursor: None,
                })
            }
        };
        let items = scripts[idx].clone()?;
        let next_cursor = (idx + 1 < scripts.len()).then(|| (idx + 1).to_string());
        Ok(Page { items, next_cursor })
    }
}

#[async_trait]
impl FigmaApi for FakeApi {
    async fn team(&self, team_id: &TeamId) -> Result<TeamRecord, ApiError> {
        self.log(format!("team:{team_id}"));
        self.teams
            .get(team_id.as_str())
            .cloned()
            .unwrap_or_else(|| Err(ApiError::not_found(format!("teams/{team_id}/projects"))))
    }

    async fn projects_page(
        &self,
        team_id: &TeamId,
        cursor: Option<String>,
    ) -> Result<Page<ProjectRecord>, ApiError> {
        self.log(format!("projects:{team_id}:{cursor:?}"));
        Self::serve(self.projects.get(team_id.as_str()), cursor)
    }

    async fn files_page(
        &self,
        project_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<FileRecord>, ApiError> {
        self.log(format!("files:{project_id}:{cursor:?}"));
        Self::serve(self.files.get(project_id), cursor)
    }

    async fn file_pages(&self, file_key: &str) -> Result<Vec<CanvasPage>, ApiError> {
        self.log(format!("canvases:{file_key}"));
        self.canvases
            .get(file_key)
            .cloned()
            .unwrap_or_else(|| Ok(vec![]))
    }

    async fn me(&self) -> Result<UserInfo, ApiError> {
        Ok(UserInfo {
            id: "1".into(),
            handle: "tester".into(),
            email: None,
        })
    }
}

pub fn project(id: &str) -> ProjectRecord {
    ProjectRecord {
        id: id.to_string(),
        name: format!("Project {id}"),
    }
}

pub fn file(key: &str) -> FileRecord {
    FileRecord {
        key: key.to_string(),
        name: format!("File {key}"),
        last_modified: "2024-06-01T12:00:00Z".to_string(),
        thumbnail_url: Some(format!("https://thumbs.example/{key}.png")),
        extra: Map::new(),
    }
}

pub fn transient() -> ApiError {
    ApiError::Transient {
        attempts: 5,
        message: "status 503: upstream unavailable".into(),
    }
}

pub fn ids(raw: &[&str]) -> Vec<TeamId> {
    raw.iter().map(|s| TeamId::new(s)).collect()
}
