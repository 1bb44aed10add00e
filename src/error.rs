use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{endpoint} returned status {status}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model constants unavailable: {0}")]
    ConstantsUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
