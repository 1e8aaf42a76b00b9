use serde::Serialize;
use thiserror::Error;

/// Terminal outcome of a single logical API call (after retries).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Credential rejected. Never retried.
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Still rate limited after exhausting the retry budget.
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Network failure or 5xx, still failing after exhausting the retry budget.
    #[error("transient failure after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    /// Any other non-success status.
    #[error("request failed with status {status}: {message}")]
    Fatal { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("malformed response: {message}")]
    Parse { message: String },
}

impl ApiError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } => ErrorKind::Auth,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Fatal { .. } => ErrorKind::Fatal,
            Self::Parse { .. } => ErrorKind::Parse,
        }
    }
}

/// Serializable error classification used in error records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    RateLimited,
    NotFound,
    Transient,
    Fatal,
    Parse,
}

/// Failures that stop a whole walk. Everything else becomes an error record.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("credential rejected, aborting run: {0}")]
    Unauthorized(#[source] ApiError),

    /// Only produced in strict mode.
    #[error("team {team_id} failed in strict mode: {source}")]
    Aborted {
        team_id: String,
        #[source]
        source: ApiError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ApiError::RateLimited { attempts: 3 }.kind()).unwrap();
        assert_eq!(json, "\"rate_limited\"");
    }

    #[test]
    fn only_auth_is_auth() {
        assert!(ApiError::Auth {
            message: "bad token".into()
        }
        .is_auth());
        assert!(!ApiError::not_found("team 1").is_auth());
    }
}
