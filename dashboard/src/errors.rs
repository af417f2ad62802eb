use thiserror::Error;

/// Problems with what the user typed into the login form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("please enter a password")]
    MissingPassword,

    #[error("please enter a user name")]
    MissingUser,

    #[error("invalid user name or password")]
    InvalidCredentials,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed record in sheet {sheet}: {reason}")]
    Parse { sheet: String, reason: String },

    #[error("Workbook unavailable: {0}")]
    SinkUnavailable(std::io::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("Not found: {0}")]
    LookupMiss(String),

    #[error("Invalid bounds: upper {upper} must be greater than lower {lower}")]
    InvalidBounds { upper: f64, lower: f64 },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn parse(sheet: &str, reason: impl Into<String>) -> Self {
        Error::Parse {
            sheet: sheet.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
