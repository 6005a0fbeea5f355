use thiserror::Error;

/// Failures raised by the tool executor. These never reach the JSON-RPC
/// `error` field; they are folded into the tool's result payload.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQL_SERVER_CONNECTION_STRING not configured")]
    NotConfigured,

    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Driver(#[from] tiberius::error::Error),

    #[error("unexpected column value: {0}")]
    Conversion(String),
}

pub type DbResult<T> = std::result::Result<T, DbError>;
