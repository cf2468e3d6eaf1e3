use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, CoworkErr>;

#[derive(Error, Debug)]
pub enum CoworkErr {
    #[error("no session with id: {0}")]
    SessionNotFound(Uuid),

    #[error("session {0} is busy")]
    SessionBusy(Uuid),

    #[error("path denied: {0} is outside the session's permitted roots")]
    PathDenied(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool input failed validation: {0}")]
    ToolValidation(String),

    #[error("command timed out")]
    Timeout,

    #[error("command was killed by a signal: {0}")]
    Signal(i32),

    #[error("turn was cancelled")]
    Cancelled,

    #[error("step budget of {0} exceeded without a final assistant message")]
    StepBudgetExceeded(usize),

    /// Returned when a provider's SSE stream disconnects before completion.
    /// The turn loop treats this as transient and may retry.
    #[error("stream disconnected before completion: {0}")]
    Stream(String, Option<Duration>),

    #[error("provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TokioJoin(#[from] JoinError),

    #[error("{0}")]
    Other(String),
}

impl CoworkErr {
    /// Maps an internal error onto the small, stable taxonomy surfaced to
    /// clients over the wire (protocol's `ErrorCode`).
    pub fn code(&self) -> cowork_protocol::ErrorCode {
        use cowork_protocol::ErrorCode;
        match self {
            CoworkErr::PathDenied(_) => ErrorCode::PathDenied,
            CoworkErr::UnknownTool(_) | CoworkErr::ToolValidation(_) => ErrorCode::ToolError,
            CoworkErr::Timeout | CoworkErr::Signal(_) | CoworkErr::Cancelled => {
                ErrorCode::ToolError
            }
            CoworkErr::Provider(_) | CoworkErr::Stream(..) => ErrorCode::ProviderError,
            _ => ErrorCode::InternalError,
        }
    }
}
