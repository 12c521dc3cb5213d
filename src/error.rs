use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid conversation state: {0}")]
    InvalidState(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Responder failed: {0}")]
    Responder(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CodegenError>;
