//! Migration units
//!
//! A migration is a named, orderable pair of `up`/`down` schema changes. Names start
//! with a `YYYY_MM_DD_HHMMSS_` datetime prefix, which is what keeps them sortable.
//!
//! # Example
//!
//! ```rust
//! use rust_db_migrator::core::SqlMigration;
//!
//! let migration = SqlMigration::new(
//!     "2024_01_01_000000_create_users_table",
//!     "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
//!     "DROP TABLE users",
//! );
//! ```

use super::connection::Connection;
use super::error::{DatabaseError, Result};
use chrono::NaiveDateTime;

/// chrono format of the datetime prefix
pub const DATETIME_PREFIX_FORMAT: &str = "%Y_%m_%d_%H%M%S";

/// Length of `YYYY_MM_DD_HHMMSS`
const DATETIME_PREFIX_LENGTH: usize = 17;

/// A schema change that can be applied and reverted
pub trait Migration: Send + Sync {
    /// Source identifier, `_YYYY_MM_DD_HHMMSS_description` or the same without
    /// the leading underscore
    fn name(&self) -> &str;

    /// Connection to run on, `None` uses the migrator's connection
    fn connection(&self) -> Option<&str> {
        None
    }

    /// Whether to wrap `up`/`down` in a transaction where the driver can roll back DDL
    ///
    /// Without a transaction a failing `up` leaves whatever it already executed in
    /// place while the migration stays unrecorded.
    fn within_transaction(&self) -> bool {
        true
    }

    fn up(&self, connection: &Connection) -> Result<()>;

    fn down(&self, connection: &Connection) -> Result<()>;
}

/// Whether the name starts with a valid `YYYY_MM_DD_HHMMSS_` prefix followed by at
/// least one more character
pub fn has_datetime_prefix(name: &str) -> bool {
    if name.len() <= DATETIME_PREFIX_LENGTH + 1 {
        return false;
    }
    let (Some(prefix), Some(b'_')) = (
        name.get(..DATETIME_PREFIX_LENGTH),
        name.as_bytes().get(DATETIME_PREFIX_LENGTH),
    ) else {
        return false;
    };

    let layout_matches = prefix
        .split('_')
        .map(|part| part.len())
        .eq([4, 2, 2, 6])
        && prefix.bytes().all(|b| b.is_ascii_digit() || b == b'_');

    layout_matches && NaiveDateTime::parse_from_str(prefix, DATETIME_PREFIX_FORMAT).is_ok()
}

/// Derive the stored migration name from a source identifier
///
/// One leading `_` is stripped, the rest has to carry the datetime prefix.
///
/// # Errors
///
/// Returns [`DatabaseError::InvalidMigrationName`] when the prefix is missing or
/// isn't a valid date and time.
pub fn migration_name(identifier: &str) -> Result<String> {
    let name = identifier.strip_prefix('_').unwrap_or(identifier);

    if !has_datetime_prefix(name) {
        return Err(DatabaseError::InvalidMigrationName(identifier.to_string()));
    }
    Ok(name.to_string())
}

/// Migration made of raw SQL statements
#[derive(Debug, Clone)]
pub struct SqlMigration {
    name: String,
    connection: Option<String>,
    within_transaction: bool,
    up_sql: Vec<String>,
    down_sql: Vec<String>,
}

impl SqlMigration {
    /// Create a migration with one statement per direction
    ///
    /// # Arguments
    ///
    /// * `name` - Datetime-prefixed name of this migration
    /// * `up_sql` - SQL statement to apply the migration
    /// * `down_sql` - SQL statement to revert the migration
    pub fn new(name: impl Into<String>, up_sql: impl Into<String>, down_sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection: None,
            within_transaction: true,
            up_sql: vec![up_sql.into()],
            down_sql: vec![down_sql.into()],
        }
    }

    /// Append another statement to run on `up`
    #[must_use]
    pub fn and_up(mut self, sql: impl Into<String>) -> Self {
        self.up_sql.push(sql.into());
        self
    }

    /// Append another statement to run on `down`
    #[must_use]
    pub fn and_down(mut self, sql: impl Into<String>) -> Self {
        self.down_sql.push(sql.into());
        self
    }

    /// Run on the named connection instead of the migrator's
    #[must_use]
    pub fn on_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    /// Never wrap this migration in a transaction
    #[must_use]
    pub fn without_transaction(mut self) -> Self {
        self.within_transaction = false;
        self
    }

    pub fn up_sql(&self) -> &[String] {
        &self.up_sql
    }

    pub fn down_sql(&self) -> &[String] {
        &self.down_sql
    }

    fn run(connection: &Connection, statements: &[String]) -> Result<()> {
        for statement in statements.iter().filter(|s| !s.trim().is_empty()) {
            connection.unprepared(statement)?;
        }
        Ok(())
    }
}

impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn connection(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    fn within_transaction(&self) -> bool {
        self.within_transaction
    }

    fn up(&self, connection: &Connection) -> Result<()> {
        Self::run(connection, &self.up_sql)
    }

    fn down(&self, connection: &Connection) -> Result<()> {
        Self::run(connection, &self.down_sql)
    }
}
