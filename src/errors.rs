use std::time::Duration;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("dispatcher is not loaded; call initialize first")]
    NotLoaded,

    #[error("network is unreachable")]
    Unreachable,

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("token refresh failed; pending request discarded")]
    RefreshFailed,

    #[error("HTTP {0}: {1}")]
    Http(StatusCode, String),

    #[error("request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request was dropped before completing")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
