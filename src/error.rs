use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Initialization failed: {0}")]
    Initialization(#[source] anyhow::Error),
    #[error("Messaging identity unavailable after retry")]
    IdentityUnavailable,
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Permission requested before the transport is connected")]
    PermissionQueryMisuse,
    #[error("Push stream is closed")]
    StreamClosed,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedPayload(e.to_string())
    }
}
