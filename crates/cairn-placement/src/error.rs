//! Backend client errors. These are logged by the gateway and never
//! reach a caller.

/// Error from a data backend client
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {0}")]
    Status(u16),

    #[error("no data under key {0}")]
    NotFound(String),

    #[error("malformed data key: {0}")]
    InvalidKey(String),

    #[error("invalid backend configuration: {0}")]
    Config(String),
}
