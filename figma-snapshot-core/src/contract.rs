#![allow(unused)]

//! # contract: seams between the pipeline and the outside world
//!
//! Three traits separate the traversal from its I/O:
//! - [`Transport`]: one raw HTTP GET. Implemented over reqwest in production.
//! - [`Sleeper`]: the only way the client waits between retries, so backoff can be
//!   tested without real delays.
//! - [`FigmaApi`]: the typed, retried API operations the walker consumes.
//!
//! ## Mocking & Testing
//! - All traits are annotated for `mockall` (exported with the default `test-export-mocks`
//!   feature) so downstream crates can build deterministic mocks.

use std::time::Duration;

use async_trait::async_trait;
use mockall::{automock, predicate::*};
use thiserror::Error;

use crate::error::ApiError;
use crate::model::{CanvasPage, FileRecord, ProjectRecord, TeamId, TeamRecord, UserInfo};

/// A single GET request, already resolved to an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Connection-level failure (DNS, TLS, timeout, reset). Always considered transient.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Typed read-only operations against the platform.
///
/// Implementations are responsible for retries; every error returned here is terminal
/// for that call.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FigmaApi: Send + Sync {
    /// Resolve a team id to its metadata.
    async fn team(&self, team_id: &TeamId) -> Result<TeamRecord, ApiError>;

    /// One page of the team's projects.
    async fn projects_page(
        &self,
        team_id: &TeamId,
        cursor: Option<String>,
    ) -> Result<Page<ProjectRecord>, ApiError>;

    /// One page of the project's files.
    async fn files_page(
        &self,
        project_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<FileRecord>, ApiError>;

    /// Canvases (pages) of a single file.
    async fn file_pages(&self, file_key: &str) -> Result<Vec<CanvasPage>, ApiError>;

    /// The user owning the credential.
    async fn me(&self) -> Result<UserInfo, ApiError>;
}
