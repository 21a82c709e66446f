//! Error types for the database system
//!
//! Two layers live here. [`DriverError`] is the value a driver or result set records
//! as its "last error" and never propagates by itself. [`DatabaseError`] is what the
//! layers above the driver boundary (connections, the repository, the migrator)
//! return through `Result`.

use std::fmt;

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Classification of a driver-level error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DriverErrorKind {
    /// No error occurred
    #[default]
    NoError,
    /// Opening or using the physical connection failed
    Connection,
    /// Preparing or executing a statement failed
    Statement,
    /// Beginning, committing or rolling back a transaction failed
    Transaction,
    /// Anything the driver could not classify
    Unknown,
}

/// Error object recorded by drivers and results (`last_error()`)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DriverError {
    kind: DriverErrorKind,
    message: String,
    native_code: Option<String>,
}

impl DriverError {
    /// Create a new driver error
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            native_code: None,
        }
    }

    /// Attach the backend's native error code
    pub fn with_native_code(mut self, code: impl Into<String>) -> Self {
        self.native_code = Some(code.into());
        self
    }

    /// The "no error" value
    pub fn none() -> Self {
        Self::default()
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Connection, message)
    }

    pub fn statement(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Statement, message)
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Transaction, message)
    }

    pub fn kind(&self) -> DriverErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn native_code(&self) -> Option<&str> {
        self.native_code.as_deref()
    }

    /// Whether this object describes an actual error
    pub fn is_error(&self) -> bool {
        self.kind != DriverErrorKind::NoError
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.native_code {
            Some(code) => write!(f, "{} ({:?}, native code {})", self.message, self.kind, code),
            None => write!(f, "{} ({:?})", self.message, self.kind),
        }
    }
}

/// Error types for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// A connection name that isn't registered in the registry
    #[error("The '{0}' connection isn't registered")]
    ConnectionNotRegistered(String),

    /// A connection resolved for use from a thread other than the one that created its driver
    #[error("Connection '{connection}' was created in a different thread and can't be used from this one")]
    DifferentThread { connection: String },

    /// The driver behind a connection, query or result is gone
    #[error("The database driver is no longer available (connection closed or removed)")]
    DriverInvalidated,

    /// Unknown driver name passed to a factory
    #[error("Unsupported driver '{driver}', available drivers: {available}")]
    UnsupportedDriver { driver: String, available: String },

    /// An empty SQL string was executed or prepared
    #[error("Query execution error: the query is empty")]
    EmptyQuery,

    /// A statement failed at the driver level
    #[error("Query failed: {error} [SQL: {query}]")]
    Query { query: String, error: DriverError },

    /// Type conversion error
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Column not found
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Transaction error
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Two migration units share a name
    #[error("Duplicate migration name '{0}'")]
    DuplicateMigration(String),

    /// The migration list isn't sorted alphabetically
    #[error("Migrations must always be sorted alphabetically ({previous} < {current})")]
    MigrationsNotSorted { previous: String, current: String },

    /// A migration name without the datetime prefix
    #[error("Migration name '{0}' has to start with the datetime prefix (YYYY_MM_DD_HHMMSS_)")]
    InvalidMigrationName(String),

    /// Unsupported operation
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DatabaseError {
    /// Wrap a driver-level failure of the given statement
    pub fn query_failed(query: impl Into<String>, error: DriverError) -> Self {
        DatabaseError::Query {
            query: query.into(),
            error,
        }
    }

    /// Create a new type mismatch error
    pub fn type_mismatch(expected: &str, actual: &str) -> Self {
        DatabaseError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a new transaction error
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        DatabaseError::TransactionError(msg.into())
    }

    /// Create a new migration error
    pub fn migration<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Migration(msg.into())
    }

    /// Create a new unsupported operation error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        DatabaseError::UnsupportedOperation(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Other(msg.into())
    }

    /// Whether this error reports a programming-contract violation
    ///
    /// These are not meant to be retried.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateMigration(_)
                | DatabaseError::MigrationsNotSorted { .. }
                | DatabaseError::InvalidMigrationName(_)
                | DatabaseError::DifferentThread { .. }
                | DatabaseError::EmptyQuery
        )
    }
}
