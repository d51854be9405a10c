use thiserror::Error;

/// Failure of a call to the hosted backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Network Error: {0}")]
    Network(String),
    #[error("Storage Error: {0}")]
    Storage(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid Input: {0}")]
    InvalidInput(String),
}

#[cfg(feature = "server")]
impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => BackendError::NotFound("row not found".to_string()),
            other => BackendError::Storage(other.to_string()),
        }
    }
}

/// Error returned by the send pipeline once local state has been rolled back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("message body is empty")]
    EmptyBody,
    #[error("no conversation selected")]
    NoActiveConversation,
    #[error("session is no longer active")]
    SessionExpired,
    #[error("failed to create thread: {0}")]
    CreateThread(#[source] BackendError),
    #[error("failed to send message: {0}")]
    CreateMessage(#[source] BackendError),
}

impl SendError {
    /// The backend failure behind this error, if any.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            SendError::CreateThread(e) | SendError::CreateMessage(e) => Some(e),
            _ => None,
        }
    }
}
