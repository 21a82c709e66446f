//! Database backend implementations
//!
//! This module contains concrete implementations of the Driver trait
//! for various database systems.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;
