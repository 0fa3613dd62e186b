use thiserror::Error;

#[derive(Debug, Error)]
pub enum PgError {
    #[error("postgres error: {0}")]
    Postgres(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("replication slot setup failed: {0}")]
    SlotSetup(String),

    #[error("replication connection unhealthy: {0}")]
    ConnectionDead(String),

    #[error("could not decode wal2json payload: {0}")]
    Decode(#[from] lode_core::Error),

    #[error("on_message handler failed: {0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),

    #[error("could not send standby status: {0}")]
    Ack(String),

    #[error("replication session cancelled")]
    Cancelled,

    #[error("replication protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_postgres::Error> for PgError {
    fn from(e: tokio_postgres::Error) -> Self {
        // Extract database error details if available
        if let Some(db_err) = e.as_db_error() {
            let msg = format!(
                "{}: {} (code: {})",
                db_err.severity(),
                db_err.message(),
                db_err.code().code()
            );
            PgError::Postgres(msg)
        } else {
            PgError::Postgres(e.to_string())
        }
    }
}

pub type PgResult<T> = std::result::Result<T, PgError>;
