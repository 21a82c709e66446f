//! # Rust DB Migrator
//!
//! A synchronous SQL access layer with a batch-based schema migrator on top.
//!
//! The access layer is split the usual way:
//!
//! - a [`Driver`](core::Driver) talks to one database engine and hands out cursors,
//! - a [`Connection`](core::Connection) is a named, cheaply clonable handle to a driver
//!   which can also *pretend*, recording statements instead of running them,
//! - a [`Query`](core::Query) wraps a cursor with positional navigation using the
//!   `-1` (before first) and `-2` (after last) row sentinels,
//! - a [`ConnectionRegistry`](core::ConnectionRegistry) owns named connections and
//!   refuses to hand them to a thread other than the one that created them.
//!
//! The [`Migrator`](core::Migrator) keeps a `migrations` table through the
//! [`MigrationRepository`](core::MigrationRepository) and runs, rolls back and resets
//! datetime-prefixed migrations in batches.
//!
//! ## Supported Databases
//!
//! | Database | Status | Features |
//! |----------|--------|----------|
//! | SQLite | Implemented | Bundled, transactional DDL |
//! | Others | Pluggable | Register a factory for any [`Driver`](core::Driver) |
//!
//! ## Quick Start
//!
//! ```rust
//! use rust_db_migrator::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let registry = Arc::new(ConnectionRegistry::new());
//!     registry.add_database("sqlite", DEFAULT_CONNECTION)?;
//!
//!     let repository = MigrationRepository::new(Arc::clone(&registry));
//!     let migrations: Vec<Arc<dyn Migration>> = vec![Arc::new(SqlMigration::new(
//!         "2024_01_01_000000_create_users",
//!         "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
//!         "DROP TABLE users",
//!     ))];
//!
//!     let migrator = Migrator::new(repository, Arc::clone(&registry), migrations)?;
//!     migrator.install()?;
//!     migrator.run(MigrateOptions::default())?;
//!
//!     let connection = registry.connection(DEFAULT_CONNECTION)?;
//!     connection.statement("INSERT INTO users (name) VALUES (?)", &["Alice".into()])?;
//!
//!     let mut users = connection.select("SELECT name FROM users", &[])?;
//!     while users.next() {
//!         println!("User: {}", users.value(0).as_string());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! rust_db_migrator/
//! ├── src/
//! │   ├── core/              # Core types and traits
//! │   │   ├── driver.rs      # Driver trait and driver state
//! │   │   ├── result.rs      # Cursor trait and buffered cursor
//! │   │   ├── query.rs       # Positional cursor over a result
//! │   │   ├── connection.rs  # Connection handle and pretend mode
//! │   │   ├── registry.rs    # Named connections and driver factories
//! │   │   ├── repository.rs  # Migration bookkeeping table
//! │   │   ├── migrator.rs    # run / rollback / reset
//! │   │   └── ...
//! │   ├── backends/          # Driver implementations
//! │   │   └── sqlite.rs
//! │   └── lib.rs
//! ├── demos/                 # Example programs
//! ├── tests/                 # Integration and property tests
//! ├── benches/
//! └── Cargo.toml
//! ```

/// Core types and traits
pub mod core;

/// Driver implementations
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_db_migrator::prelude::*;
///
/// let registry = ConnectionRegistry::new();
/// assert_eq!(registry.default_connection(), DEFAULT_CONNECTION);
/// ```
pub mod prelude {
    pub use crate::core::{
        Connection, ConnectionConfig, ConnectionRegistry, DatabaseError, DatabaseType,
        DatabaseValue, Driver, DriverFeature, MigrateOptions, Migration, MigrationRepository,
        MigrationStatus, Migrator, OrderDirection, Query, QueryLog, Result, SqlMigration,
        TransactionGuard,
        AFTER_LAST_ROW, BEFORE_FIRST_ROW, DEFAULT_CONNECTION,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::backends::SqliteDriver;
}

// Re-export at root level for convenience
pub use core::{
    Connection, ConnectionConfig, ConnectionRegistry, DatabaseError, DatabaseType, DatabaseValue,
    Migration, Migrator, Query, Result, SqlMigration,
};

#[cfg(feature = "sqlite")]
pub use backends::SqliteDriver;
