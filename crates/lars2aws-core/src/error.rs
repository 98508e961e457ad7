//! Typed errors for the capability seams (HTTP, object store, remote exec).
//!
//! Higher layers wrap these in `anyhow` with context; callers that need to
//! branch on the failure kind (existence checks, pollers) match on them.

/// Failure fetching a document or byte stream over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

impl FetchError {
    /// Statuses the catalog client retries with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Transport { .. } => true,
            Self::InvalidUrl { .. } => false,
        }
    }
}

/// Failure talking to the object store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object s3://{bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("{operation} s3://{bucket}/{key} failed: {message}")]
    Request {
        operation: &'static str,
        bucket: String,
        key: String,
        message: String,
    },

    #[error("reading source body for s3://{bucket}/{key} failed: {source}")]
    Body {
        bucket: String,
        key: String,
        #[source]
        source: FetchError,
    },
}

/// Failure talking to the remote-execution service.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("invalid inject request: {0}")]
    InvalidRequest(String),

    #[error("send-command to {instance} failed: {message}")]
    Send { instance: String, message: String },

    #[error("invocation {command_id} on {instance} does not exist yet")]
    InvocationNotFound { command_id: String, instance: String },

    #[error("get-command-invocation {command_id} on {instance} failed: {message}")]
    Poll {
        command_id: String,
        instance: String,
        message: String,
    },
}
