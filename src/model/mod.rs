use thiserror::Error;

pub mod package;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading package spec: {0}")]
    IO(#[from] std::io::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid project id `{0}`")]
    InvalidProjectId(String),
    #[error("Unsupported api_version {0} (expected {1})")]
    UnsupportedApiVersion(i64, i64),
}
