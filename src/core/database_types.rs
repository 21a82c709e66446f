//! Database type definitions
//!
//! This module defines the DBMS families a driver can report.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// DBMS type tag reported by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum DatabaseType {
    /// Driver didn't report a known DBMS
    #[default]
    Unknown = 0,
    /// MySQL/MariaDB database
    Mysql = 1,
    /// PostgreSQL database
    Postgres = 2,
    /// SQLite database
    Sqlite = 3,
}

impl DatabaseType {
    /// Convert database type to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            DatabaseType::Unknown => "unknown",
            DatabaseType::Mysql => "mysql",
            DatabaseType::Postgres => "postgres",
            DatabaseType::Sqlite => "sqlite",
        }
    }

    /// Whether DDL statements take part in transactions
    ///
    /// MySQL commits implicitly around every DDL statement, so wrapping a schema
    /// migration in a transaction there buys nothing.
    pub fn supports_schema_transactions(&self) -> bool {
        matches!(self, DatabaseType::Postgres | DatabaseType::Sqlite)
    }

    /// Identifier quote characters (opening, closing)
    pub fn identifier_quotes(&self) -> (char, char) {
        match self {
            DatabaseType::Mysql => ('`', '`'),
            _ => ('"', '"'),
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(DatabaseType::Unknown),
            "mysql" | "mariadb" | "qmysql" => Ok(DatabaseType::Mysql),
            "postgres" | "postgresql" | "qpsql" => Ok(DatabaseType::Postgres),
            "sqlite" | "sqlite3" | "qsqlite" => Ok(DatabaseType::Sqlite),
            _ => Err(format!("Invalid database type: '{}'", s)),
        }
    }
}
