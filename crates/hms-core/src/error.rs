use thiserror::Error;

/// SQLSTATE for `insufficient_privilege`.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// SQLSTATE codes (or classes) that mean the server could not be reached
/// or refused the session.
const CONNECTION_STATES: &[&str] = &["08", "28", "3D000", "57P03"];

/// Core error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Schema conflict: {}", .0.join("; "))]
    Conflict(Vec<String>),

    #[error("Permission error: {0}")]
    Permission(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Aborted: {0}")]
    Aborted(String),

    #[error("Schema drift: {0} pending change(s)")]
    Drift(usize),
}

impl MigrateError {
    /// Classify a sqlx error and prefix it with what was being attempted.
    pub fn sql(context: &str, err: sqlx::Error) -> Self {
        let message = format!("{}: {}", context, err);

        match classify(&err) {
            ErrorClass::Connection => MigrateError::Connection(message),
            ErrorClass::Permission => MigrateError::Permission(message),
            ErrorClass::Other => MigrateError::Database(message),
        }
    }

    /// Process exit code reported by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Connection(_) => 2,
            MigrateError::Conflict(_) => 3,
            MigrateError::Permission(_) => 4,
            MigrateError::Aborted(_) => 5,
            MigrateError::Drift(_) => 6,
            _ => 1,
        }
    }
}

impl From<sqlx::Error> for MigrateError {
    fn from(err: sqlx::Error) -> Self {
        match classify(&err) {
            ErrorClass::Connection => MigrateError::Connection(err.to_string()),
            ErrorClass::Permission => MigrateError::Permission(err.to_string()),
            ErrorClass::Other => MigrateError::Database(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClass {
    Connection,
    Permission,
    Other,
}

fn classify(err: &sqlx::Error) -> ErrorClass {
    match err {
        sqlx::Error::Database(db) => match db.code() {
            Some(code) => classify_sqlstate(&code),
            None => ErrorClass::Other,
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Configuration(_) => ErrorClass::Connection,
        _ => ErrorClass::Other,
    }
}

fn classify_sqlstate(code: &str) -> ErrorClass {
    if code == INSUFFICIENT_PRIVILEGE {
        return ErrorClass::Permission;
    }

    if CONNECTION_STATES.iter().any(|state| code.starts_with(state)) {
        ErrorClass::Connection
    } else {
        ErrorClass::Other
    }
}

/// Result type alias using MigrateError.
pub type Result<T> = std::result::Result<T, MigrateError>;
