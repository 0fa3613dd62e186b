use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("wal2json parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid LSN format: {0}")]
    InvalidLsn(String),
}

pub type Result<T> = std::result::Result<T, Error>;
