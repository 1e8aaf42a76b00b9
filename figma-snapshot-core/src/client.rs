//! HTTP client for the platform API.
//!
//! [`FigmaClient`] injects the credential, classifies every response into an
//! [`Attempt`], and drives [`RetryState`] until the call succeeds or fails terminally.
//! Intermediate retries are never visible to callers. Response bodies are validated here
//! and turned into typed records, so downstream code never sees raw JSON.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ApiConfig, AuthScheme};
use crate::contract::{ApiRequest, ApiResponse, FigmaApi, Page, Sleeper, Transport, TransportError};
use crate::error::ApiError;
use crate::model::{CanvasPage, Credential, FileRecord, ProjectRecord, TeamId, TeamRecord, UserInfo};
use crate::retry::{parse_retry_after, Attempt, RetryPolicy, RetryState};

const BODY_SNIPPET_LEN: usize = 200;

/// Production transport backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("figma-snapshot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self.client.get(&request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError(e.to_string()))?
            .to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Proactive request budget. Clones share one quota.
#[derive(Clone)]
pub struct RateBudget {
    inner: Arc<DirectLimiter>,
}

impl RateBudget {
    pub fn per_minute(requests: u32) -> Self {
        let rpm = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_minute(rpm))),
        }
    }

    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

pub struct FigmaClient<T, S> {
    transport: T,
    sleeper: S,
    credential: Credential,
    config: ApiConfig,
    policy: RetryPolicy,
    budget: Option<RateBudget>,
    /// Project page 1 per team, parsed from the response that also carried the team name.
    first_pages: Mutex<HashMap<TeamId, Result<Page<ProjectRecord>, ApiError>>>,
}

impl FigmaClient<ReqwestTransport, TokioSleeper> {
    /// Client over reqwest and the tokio timer, with the budget from `config` if set.
    pub fn from_config(
        config: ApiConfig,
        policy: RetryPolicy,
        credential: Credential,
    ) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::with_timeout(Duration::from_secs(config.timeout_secs))?;
        let budget = config.requests_per_minute.map(RateBudget::per_minute);
        info!(
            base_url = %config.base_url,
            auth_scheme = ?config.auth_scheme,
            max_attempts = policy.attempts_bound(),
            requests_per_minute = ?config.requests_per_minute,
            "Initialized FigmaClient"
        );
        let client = Self::new(config, policy, credential, transport, TokioSleeper);
        Ok(match budget {
            Some(budget) => client.with_budget(budget),
            None => client,
        })
    }
}

impl<T, S> FigmaClient<T, S>
where
    T: Transport,
    S: Sleeper,
{
    pub fn new(
        config: ApiConfig,
        policy: RetryPolicy,
        credential: Credential,
        transport: T,
        sleeper: S,
    ) -> Self {
        Self {
            transport,
            sleeper,
            credential,
            config,
            policy,
            budget: None,
            first_pages: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_budget(mut self, budget: RateBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    fn auth_header(&self) -> (String, String) {
        match self.config.auth_scheme {
            AuthScheme::Token => (
                "X-Figma-Token".to_string(),
                self.credential.expose().to_string(),
            ),
            AuthScheme::Bearer => (
                "Authorization".to_string(),
                format!("Bearer {}", self.credential.expose()),
            ),
        }
    }

    /// GET `endpoint` and return its JSON body, retrying rate limits and transient failures.
    pub async fn request(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Value, ApiError> {
        let request = ApiRequest {
            url: self.url(endpoint),
            headers: vec![self.auth_header()],
            query: query
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        };

        let mut state = RetryState::start();
        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    debug!(endpoint, attempt, "[CLIENT] Sending request");
                    let outcome = self.attempt_once(endpoint, &request).await;
                    self.policy.step(attempt, outcome)
                }
                RetryState::Backoff { attempt, delay } => {
                    warn!(
                        endpoint,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "[CLIENT] Request throttled or failed transiently, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                RetryState::Succeeded(body) => return Ok(body),
                RetryState::Failed(err) => {
                    warn!(endpoint, error = %err, "[CLIENT] Request failed");
                    return Err(err);
                }
            };
        }
    }

    async fn attempt_once(&self, endpoint: &str, request: &ApiRequest) -> Result<Value, Attempt> {
        if let Some(budget) = &self.budget {
            budget.wait().await;
        }
        let response = self
            .transport
            .get(request.clone())
            .await
            .map_err(|e| Attempt::Transient(e.to_string()))?;
        classify(endpoint, response)
    }

    fn page_query(&self, cursor: Option<String>) -> Vec<(&'static str, String)> {
        let mut query = vec![("page_size", self.config.page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        query
    }

    async fn page<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        field: &str,
        cursor: Option<String>,
    ) -> Result<Page<R>, ApiError> {
        let mut body = self.request(endpoint, &self.page_query(cursor)).await?;
        parse_page(&mut body, field)
    }

    fn first_pages(&self) -> MutexGuard<'_, HashMap<TeamId, Result<Page<ProjectRecord>, ApiError>>> {
        self.first_pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<T, S> FigmaApi for FigmaClient<T, S>
where
    T: Transport,
    S: Sleeper,
{
    /// The team name arrives with the first project page; that page is kept for the
    /// following `projects_page(team_id, None)` so each team costs one request.
    async fn team(&self, team_id: &TeamId) -> Result<TeamRecord, ApiError> {
        let mut body = self
            .request(&format!("teams/{team_id}/projects"), &self.page_query(None))
            .await?;
        let name = body
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ApiError::parse(format!("team {team_id}: missing `name`")))?;
        let first_page = parse_page(&mut body, "projects");
        self.first_pages().insert(team_id.clone(), first_page);
        Ok(TeamRecord { name })
    }

    async fn projects_page(
        &self,
        team_id: &TeamId,
        cursor: Option<String>,
    ) -> Result<Page<ProjectRecord>, ApiError> {
        if cursor.is_none() {
            let cached = self.first_pages().remove(team_id);
            if let Some(first_page) = cached {
                debug!(team_id = %team_id, "[CLIENT] Serving first project page from team lookup");
                return first_page;
            }
        }
        self.page(&format!("teams/{team_id}/projects"), "projects", cursor)
            .await
    }

    async fn files_page(
        &self,
        project_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<FileRecord>, ApiError> {
        self.page(&format!("projects/{project_id}/files"), "files", cursor)
            .await
    }

    async fn file_pages(&self, file_key: &str) -> Result<Vec<CanvasPage>, ApiError> {
        let body = self
            .request(&format!("files/{file_key}"), &[("depth", "2".to_string())])
            .await?;
        canvas_pages(&body)
    }

    async fn me(&self) -> Result<UserInfo, ApiError> {
        let body = self.request("me", &[]).await?;
        serde_json::from_value(body).map_err(|e| ApiError::parse(format!("me: {e}")))
    }
}

fn snippet(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(BODY_SNIPPET_LEN)
        .collect()
}

fn classify(endpoint: &str, response: ApiResponse) -> Result<Value, Attempt> {
    match response.status {
        200..=299 => serde_json::from_slice(&response.body)
            .map_err(|e| Attempt::Parse(format!("{endpoint}: invalid JSON: {e}"))),
        401 => Err(Attempt::Auth(snippet(&response.body))),
        // 403 also means "no access to this team"; only a rejected token is fatal to the run.
        403 => {
            let message = snippet(&response.body);
            if message.to_ascii_lowercase().contains("invalid token") {
                Err(Attempt::Auth(message))
            } else {
                Err(Attempt::Fatal {
                    status: 403,
                    message,
                })
            }
        }
        404 => Err(Attempt::NotFound(endpoint.to_string())),
        429 => Err(Attempt::RateLimited {
            retry_after: parse_retry_after(response.header("retry-after")),
        }),
        status @ 500..=599 => Err(Attempt::Transient(format!(
            "status {status}: {}",
            snippet(&response.body)
        ))),
        status => Err(Attempt::Fatal {
            status,
            message: snippet(&response.body),
        }),
    }
}

/// Continuation cursor from `pagination.next_cursor`, falling back to top-level `cursor`.
fn next_cursor(body: &Value) -> Option<String> {
    let raw = body
        .get("pagination")
        .and_then(|p| p.get("next_cursor"))
        .or_else(|| body.get("cursor"));
    match raw {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_page<R: DeserializeOwned>(body: &mut Value, field: &str) -> Result<Page<R>, ApiError> {
    let next_cursor = next_cursor(body);
    let items = take_items(body, field)?;
    Ok(Page { items, next_cursor })
}

fn take_items<R: DeserializeOwned>(body: &mut Value, field: &str) -> Result<Vec<R>, ApiError> {
    let raw = body
        .get_mut(field)
        .map(Value::take)
        .ok_or_else(|| ApiError::parse(format!("missing `{field}` array")))?;
    serde_json::from_value(raw).map_err(|e| ApiError::parse(format!("invalid `{field}`: {e}")))
}

fn canvas_pages(body: &Value) -> Result<Vec<CanvasPage>, ApiError> {
    let children = body
        .get("document")
        .and_then(|d| d.get("children"))
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::parse("missing `document.children`"))?;

    children
        .iter()
        .filter(|c| c.get("type").and_then(Value::as_str) == Some("CANVAS"))
        .map(|c| {
            let id = c.get("id").and_then(Value::as_str);
            let name = c.get("name").and_then(Value::as_str);
            match (id, name) {
                (Some(id), Some(name)) => Ok(CanvasPage {
                    id: id.to_string(),
                    name: name.to_string(),
                    children_count: c
                        .get("children")
                        .and_then(Value::as_array)
                        .map_or(0, Vec::len),
                    background_color: c.get("backgroundColor").cloned(),
                }),
                _ => Err(ApiError::parse("canvas without `id` or `name`")),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse {
            status,
            headers: vec![],
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn classifies_statuses() {
        assert!(matches!(
            classify("x", response(401, "no")),
            Err(Attempt::Auth(_))
        ));
        assert!(matches!(
            classify("x", response(403, "{\"status\":403,\"err\":\"Invalid token\"}")),
            Err(Attempt::Auth(_))
        ));
        assert!(matches!(
            classify("x", response(403, "{\"err\":\"Forbidden\"}")),
            Err(Attempt::Fatal { status: 403, .. })
        ));
        assert!(matches!(
            classify("teams/1/projects", response(404, "")),
            Err(Attempt::NotFound(r)) if r == "teams/1/projects"
        ));
        assert!(matches!(
            classify("x", response(502, "bad gateway")),
            Err(Attempt::Transient(_))
        ));
        assert!(matches!(
            classify("x", response(400, "bad")),
            Err(Attempt::Fatal { status: 400, .. })
        ));
        assert!(matches!(
            classify("x", response(200, "not json")),
            Err(Attempt::Parse(_))
        ));
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let mut resp = response(429, "");
        resp.headers.push(("Retry-After".into(), "3".into()));
        assert_eq!(
            classify("x", resp),
            Err(Attempt::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            })
        );
    }

    #[test]
    fn cursor_sources() {
        assert_eq!(
            next_cursor(&json!({"pagination": {"next_cursor": "abc"}})),
            Some("abc".to_string())
        );
        assert_eq!(next_cursor(&json!({"cursor": 40})), Some("40".to_string()));
        assert_eq!(next_cursor(&json!({"cursor": ""})), None);
        assert_eq!(next_cursor(&json!({"cursor": null})), None);
        assert_eq!(next_cursor(&json!({})), None);
    }

    #[test]
    fn missing_items_is_parse_error() {
        let mut body = json!({"name": "Team"});
        let res: Result<Vec<ProjectRecord>, _> = take_items(&mut body, "projects");
        assert!(matches!(res, Err(ApiError::Parse { .. })));
    }

    #[test]
    fn canvas_pages_filters_non_canvas_nodes() {
        let body = json!({"document": {"children": [
            {"id": "0:1", "name": "Cover", "type": "CANVAS", "children": [{}, {}],
             "backgroundColor": {"r": 1.0}},
            {"id": "0:2", "name": "Stray", "type": "FRAME"},
            {"id": "0:3", "name": "Specs", "type": "CANVAS"}
        ]}});
        let pages = canvas_pages(&body).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].children_count, 2);
        assert!(pages[0].background_color.is_some());
        assert_eq!(pages[1].name, "Specs");
        assert_eq!(pages[1].children_count, 0);
    }
}
