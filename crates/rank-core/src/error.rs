//! Error taxonomy shared by the store, platform and interaction layers.

use thiserror::Error;

/// Failure talking to the spreadsheet store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store quota exhausted (rate limited)")]
    RateLimited,

    #[error("store server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("store rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("table '{0}' does not exist")]
    MissingTable(String),

    #[error("malformed store response: {0}")]
    Malformed(String),

    #[error("store transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// Map an HTTP status from the store API onto the taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => StoreError::RateLimited,
            500..=599 => StoreError::Server { status, message },
            _ => StoreError::Rejected { status, message },
        }
    }

    /// Rate limits and 5xx responses are worth retrying; everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::RateLimited | StoreError::Server { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, StoreError::RateLimited)
    }
}

/// Failure talking to the chat platform.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("missing permission: {0}")]
    Forbidden(String),

    #[error("platform api error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed platform response: {0}")]
    Malformed(String),

    #[error("platform transport error: {0}")]
    Transport(String),
}

impl PlatformError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            403 => PlatformError::Forbidden(message),
            404 => PlatformError::NotFound(message),
            _ => PlatformError::Api { status, message },
        }
    }
}

/// Failure building an aggregate results view.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResultsError {
    #[error("Dinosaur ID '{0}' not found")]
    EntityNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of a user-initiated flow (rate or results command).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("thread id must contain digits only")]
    InvalidThreadId,

    #[error("destination is not a thread or is inaccessible")]
    NotAThread,

    #[error("Dinosaur ID '{0}' not found")]
    EntityNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl From<ResultsError> for FlowError {
    fn from(err: ResultsError) -> Self {
        match err {
            ResultsError::EntityNotFound(id) => FlowError::EntityNotFound(id),
            ResultsError::Store(e) => FlowError::Store(e),
        }
    }
}

impl FlowError {
    /// Short reply shown to the requesting user.
    pub fn user_message(&self) -> String {
        match self {
            FlowError::InvalidThreadId => "❌ `thread_id` digits only".to_string(),
            FlowError::NotAThread => "❌ Not a thread or inaccessible".to_string(),
            FlowError::EntityNotFound(id) => format!("Dinosaur ID '{id}' not found"),
            FlowError::Store(e) if e.is_rate_limited() => {
                "⚠️ Sheets quota reached; try in a minute.".to_string()
            }
            FlowError::Store(_) => "⚠️ Could not reach the ratings sheet, try later.".to_string(),
            FlowError::Platform(_) => "⚠️ Could not post there, check my permissions.".to_string(),
        }
    }

    /// Validation failures are the user's to fix and need no log escalation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FlowError::InvalidThreadId | FlowError::NotAThread | FlowError::EntityNotFound(_)
        )
    }
}
