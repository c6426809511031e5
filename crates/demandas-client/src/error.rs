use crate::bridge::BridgeError;
use crate::session::SessionError;
use crate::store::StoreError;
use crate::validation::ValidationError;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("backend rejected `{action}`: {message}")]
    Backend { action: String, message: String },
    #[error("unexpected response to `{action}`: {message}")]
    UnexpectedResponse { action: String, message: String },
    #[error("no cached demand with id `{id}`")]
    UnknownDemand { id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no user is logged in")]
    NotLoggedIn,
}

impl ClientError {
    /// Timeout or transport failures, the cases callers answer from the cache.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Bridge(error) if error.is_recoverable())
    }

    pub(crate) fn unexpected(action: &str, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            action: action.to_string(),
            message: message.into(),
        }
    }
}

impl From<SessionError> for ClientError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::NotLoggedIn => Self::NotLoggedIn,
            SessionError::Store(error) => Self::Store(error),
        }
    }
}
