use shared::domain::MessageId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("credential rejected by server (HTTP {status}): {message}")]
    Auth { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{route} returned HTTP {status}: {message}")]
    Status {
        route: String,
        status: u16,
        message: String,
    },
    #[error("delete of message {message_id} failed (HTTP {status}): {message}")]
    Delete {
        message_id: MessageId,
        status: u16,
        message: String,
    },
    #[error("unexpected response body from {route}: {source}")]
    Decode {
        route: String,
        source: serde_json::Error,
    },
}

impl ClientError {
    /// The request was sent (or attempted) but no HTTP status came back: timeouts, refused or
    /// reset connections. Requests that could not even be built do not count.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(err) if err.is_timeout() || err.is_connect() || err.is_request()
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::InvalidCredential(_))
    }
}
