use std::time::Duration;

/// Core error type for the forwarder.
///
/// Adapter crates map their specific errors into this type so the run loop can
/// abort consistently and the binary can report a single failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by platform, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
