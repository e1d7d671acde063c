use thiserror::Error;

/// Reasons a time entry or timer command is refused before it reaches the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("a project must be selected")]
    MissingProject,
    #[error("a task must be selected")]
    MissingTask,
    #[error("end time must be after start time")]
    EndNotAfterStart,
    #[error("invalid time of day: {0}")]
    InvalidClockTime(String),
    #[error("an edit must change at least one field")]
    EmptyPatch,
}

/// Errors surfaced by the time tracking client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("not authenticated")]
    Unauthenticated,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ApiError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ApiError::Unauthenticated)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Why a refresh cycle failed. Shared between every request waiting on the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum RefreshError {
    #[error("refresh request failed: {0}")]
    Network(String),
    #[error("refresh rejected with status {0}")]
    Rejected(u16),
    #[error("refresh response could not be decoded: {0}")]
    Decode(String),
    #[error("no session to attach the renewed token to")]
    NoSession,
}
