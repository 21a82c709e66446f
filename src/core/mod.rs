//! Core types and traits
//!
//! This module provides the building blocks of the crate: the driver and result
//! abstractions, connections and their registry, the query cursor, and the
//! migration repository and migrator built on top of them.

pub mod connection;
pub mod database_types;
pub mod driver;
pub mod error;
pub mod migration;
pub mod migrator;
pub mod query;
pub mod query_builder;
pub mod record;
pub mod registry;
pub mod repository;
pub mod result;
pub mod schema;
pub mod transaction;
pub mod value;

// Re-export commonly used types
pub use connection::{Connection, ConnectionConfig, QueryLog};
pub use database_types::DatabaseType;
pub use driver::{
    ConnectOptions, ConnectParams, Driver, DriverFeature, DriverResult, DriverState,
    IdentifierType, SharedDriver, StatementOutput, WeakDriver,
};
pub use error::{DatabaseError, DriverError, DriverErrorKind, Result};
pub use migration::{Migration, SqlMigration};
pub use migrator::{MigrateOptions, MigrationStatus, MigrationStatusRow, Migrator, RollbackItem};
pub use query::Query;
pub use query_builder::{Operator, OrderDirection, TableQuery};
pub use record::{SqlField, SqlRecord};
pub use registry::{ConnectionRegistry, DriverFactory, DEFAULT_CONNECTION};
pub use repository::{MigrationItem, MigrationRepository, DEFAULT_MIGRATIONS_TABLE};
pub use result::{
    BindingSyntax, BufferedResult, CursorPosition, ResultState, SqlResult, AFTER_LAST_ROW,
    BEFORE_FIRST_ROW,
};
pub use schema::{Blueprint, ColumnType, SchemaBuilder};
pub use transaction::TransactionGuard;
pub use value::{DatabaseValue, NumericalPrecisionPolicy};
