//! Data model: credential, wire records validated at the client boundary, and the
//! output tree owned by [`ExtractionRun`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApiError, ErrorKind};

/// Access token for the platform API. Held in memory for one run, never logged or serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for header injection only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Operator-supplied team identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TeamId(String);

impl TeamId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TeamId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---- wire records ----

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TeamRecord {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProjectRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileRecord {
    pub key: String,
    pub name: String,
    pub last_modified: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Any other fields the platform sends.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Top-level canvas of a file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanvasPage {
    pub id: String,
    pub name: String,
    pub children_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UserInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub handle: String,
    #[serde(default)]
    pub email: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

// ---- output tree ----

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamNode {
    pub id: TeamId,
    pub name: String,
    /// Some project pages could not be fetched.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
    pub projects: Vec<ProjectNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectNode {
    pub id: String,
    pub name: String,
    /// Back-reference to the owning team.
    pub team_id: TeamId,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
    pub files: Vec<FileNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileNode {
    pub key: String,
    pub name: String,
    pub last_modified: String,
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<CanvasPage>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<FileRecord> for FileNode {
    fn from(record: FileRecord) -> Self {
        Self {
            key: record.key,
            name: record.name,
            last_modified: record.last_modified,
            thumbnail_url: record.thumbnail_url,
            pages: None,
            extra: record.extra,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorScope {
    Team,
    Project,
    File,
}

/// One failed fetch, attached to the run instead of aborting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub scope: ErrorScope,
    pub id: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(scope: ErrorScope, id: impl Into<String>, error: &ApiError) -> Self {
        Self {
            scope,
            id: id.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub requested_teams: usize,
    pub teams: usize,
    pub failed_teams: usize,
    pub projects: usize,
    pub files: usize,
    pub errors: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Completed snapshot of one run. Only [`crate::aggregate::Aggregator::finalize`] builds it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionRun {
    pub(crate) summary: RunSummary,
    pub(crate) teams: Vec<TeamNode>,
    pub(crate) errors: Vec<ErrorRecord>,
}

impl ExtractionRun {
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn teams(&self) -> &[TeamNode] {
        &self.teams
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }
}
