//! SQLite driver implementation
//!
//! This module provides a SQLite implementation of the [`Driver`] trait on top of
//! rusqlite.

use crate::core::{
    database_types::DatabaseType,
    driver::{
        ConnectParams, Driver, DriverFeature, DriverResult, DriverState, IdentifierType,
        StatementOutput,
    },
    error::{DriverError, DriverErrorKind},
    record::SqlRecord,
    value::DatabaseValue,
};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::time::Duration;

/// Database used when the connection doesn't name one
const IN_MEMORY_DATABASE: &str = ":memory:";

/// SQLite driver
///
/// Supported connect options: `busy_timeout=<ms>`, `foreign_keys=<on|off>`
/// (default on) and the `readonly` flag.
pub struct SqliteDriver {
    state: DriverState,
    connection: Option<Connection>,
    in_transaction: bool,
}

impl SqliteDriver {
    /// Create a new, closed SQLite driver
    pub fn new() -> Self {
        Self {
            state: DriverState::new(),
            connection: None,
            in_transaction: false,
        }
    }

    /// Whether a transaction begun through this driver is still open
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn native_error(kind: DriverErrorKind, err: &rusqlite::Error) -> DriverError {
        let error = DriverError::new(kind, err.to_string());
        match err {
            rusqlite::Error::SqliteFailure(failure, _) => {
                error.with_native_code(failure.extended_code.to_string())
            }
            _ => error,
        }
    }

    fn statement_error(err: rusqlite::Error) -> DriverError {
        Self::native_error(DriverErrorKind::Statement, &err)
    }

    fn to_sqlite_value(value: &DatabaseValue) -> Value {
        match value {
            DatabaseValue::Null => Value::Null,
            DatabaseValue::Bool(v) => Value::Integer(*v as i64),
            DatabaseValue::Int(v) => Value::Integer(*v as i64),
            DatabaseValue::Long(v) => Value::Integer(*v),
            DatabaseValue::Double(v) => Value::Real(*v),
            DatabaseValue::String(v) => Value::Text(v.clone()),
            DatabaseValue::Bytes(v) => Value::Blob(v.clone()),
        }
    }

    fn from_value_ref(value: ValueRef<'_>) -> DatabaseValue {
        match value {
            ValueRef::Null => DatabaseValue::Null,
            ValueRef::Integer(v) => DatabaseValue::Long(v),
            ValueRef::Real(v) => DatabaseValue::Double(v),
            ValueRef::Text(v) => DatabaseValue::String(String::from_utf8_lossy(v).to_string()),
            ValueRef::Blob(v) => DatabaseValue::Bytes(v.to_vec()),
        }
    }

    fn connect(params: &ConnectParams<'_>) -> rusqlite::Result<Connection> {
        let path = if params.database.is_empty() {
            IN_MEMORY_DATABASE
        } else {
            params.database
        };

        let connection = if params.options.get_bool("readonly").unwrap_or(false) {
            Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            Connection::open(path)?
        };

        if let Some(timeout) = params.options.get_u64("busy_timeout") {
            connection.busy_timeout(Duration::from_millis(timeout))?;
        }

        let foreign_keys = params.options.get_bool("foreign_keys").unwrap_or(true);
        connection.execute_batch(if foreign_keys {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        })?;

        Ok(connection)
    }

    fn run_transaction_statement(&mut self, sql: &str, in_transaction_after: bool) -> bool {
        let Some(connection) = self.connection.as_ref() else {
            return self
                .state
                .set_last_error(DriverError::transaction("Not connected to database"));
        };

        if self.in_transaction == in_transaction_after {
            let message = if in_transaction_after {
                "Already in a transaction"
            } else {
                "Not in a transaction"
            };
            return self.state.set_last_error(DriverError::transaction(message));
        }

        match connection.execute_batch(sql) {
            Ok(()) => {
                self.in_transaction = in_transaction_after;
                true
            }
            Err(err) => {
                let error = Self::native_error(DriverErrorKind::Transaction, &err);
                self.state.set_last_error(error)
            }
        }
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for SqliteDriver {
    fn state(&self) -> &DriverState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut DriverState {
        &mut self.state
    }

    fn driver_name(&self) -> &str {
        "sqlite"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn open(&mut self, params: &ConnectParams<'_>) -> bool {
        self.close();

        match Self::connect(params) {
            Ok(connection) => {
                self.connection = Some(connection);
                self.in_transaction = false;
                self.state.reset_last_error();
                self.state.set_open_error(false);
                self.state.set_open(true);
                true
            }
            Err(err) => {
                self.state.set_open_error(true);
                let error = Self::native_error(DriverErrorKind::Connection, &err);
                self.state.set_last_error(error)
            }
        }
    }

    fn close(&mut self) {
        if self.connection.take().is_some() {
            self.in_transaction = false;
            self.state.set_open(false);
            self.state.set_open_error(false);
        }
    }

    fn has_feature(&self, feature: DriverFeature) -> bool {
        match feature {
            DriverFeature::Transactions => self.connection.is_some(),
            DriverFeature::Blob
            | DriverFeature::LastInsertId
            | DriverFeature::LowPrecisionNumbers
            | DriverFeature::PositionalPlaceholders
            | DriverFeature::PreparedQueries
            | DriverFeature::QuerySize
            | DriverFeature::SimpleLocking
            | DriverFeature::Unicode => true,
            DriverFeature::BatchOperations
            | DriverFeature::CancelQuery
            | DriverFeature::EventNotifications
            | DriverFeature::FinishQuery
            | DriverFeature::MultipleResultSets
            | DriverFeature::NamedPlaceholders => false,
        }
    }

    fn begin_transaction(&mut self) -> bool {
        self.run_transaction_statement("BEGIN", true)
    }

    fn commit_transaction(&mut self) -> bool {
        self.run_transaction_statement("COMMIT", false)
    }

    fn rollback_transaction(&mut self) -> bool {
        self.run_transaction_statement("ROLLBACK", false)
    }

    fn is_identifier_escaped(&self, identifier: &str, _kind: IdentifierType) -> bool {
        let bytes = identifier.as_bytes();
        bytes.len() >= 2
            && matches!(
                (bytes[0], bytes[bytes.len() - 1]),
                (b'"', b'"') | (b'`', b'`') | (b'[', b']')
            )
    }

    fn escape_identifier(&self, identifier: &str, kind: IdentifierType) -> String {
        if identifier.is_empty() || self.is_identifier_escaped(identifier, kind) {
            return identifier.to_string();
        }

        identifier
            .split('.')
            .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn prepare_statement(&mut self, query: &str) -> DriverResult<usize> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| DriverError::connection("Not connected to database"))?;

        let statement = connection.prepare(query).map_err(Self::statement_error);
        match statement {
            Ok(statement) => Ok(statement.parameter_count()),
            Err(err) => {
                self.state.set_last_error(err.clone());
                Err(err)
            }
        }
    }

    fn execute_statement(
        &mut self,
        query: &str,
        bindings: &[DatabaseValue],
    ) -> DriverResult<StatementOutput> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| DriverError::connection("Not connected to database"))?;

        let values: Vec<Value> = bindings.iter().map(Self::to_sqlite_value).collect();
        let output = (|| -> rusqlite::Result<StatementOutput> {
            let mut statement = connection.prepare(query)?;

            if statement.parameter_count() != values.len() {
                return Err(rusqlite::Error::InvalidParameterCount(
                    values.len(),
                    statement.parameter_count(),
                ));
            }

            if statement.column_count() == 0 {
                let affected = statement.execute(params_from_iter(values.iter()))?;
                return Ok(StatementOutput::affected(
                    affected as u64,
                    Some(connection.last_insert_rowid()),
                ));
            }

            let record = SqlRecord::from_names(statement.column_names());
            let column_count = record.count();
            let mut rows = Vec::new();
            let mut cursor = statement.query(params_from_iter(values.iter()))?;
            while let Some(row) = cursor.next()? {
                let mut row_values = Vec::with_capacity(column_count);
                for index in 0..column_count {
                    row_values.push(Self::from_value_ref(row.get_ref(index)?));
                }
                rows.push(row_values);
            }

            Ok(StatementOutput::rows(record, rows))
        })()
        .map_err(Self::statement_error);

        if let Err(err) = &output {
            self.state.set_last_error(err.clone());
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::driver::ConnectOptions;

    fn open_driver(options: &str) -> SqliteDriver {
        let options = ConnectOptions::parse(options);
        let mut driver = SqliteDriver::new();
        assert!(driver.open(&ConnectParams {
            database: "",
            username: "",
            password: "",
            host: "",
            port: -1,
            options: &options,
        }));
        driver
    }

    #[test]
    fn test_sqlite_open_close() {
        let mut driver = open_driver("busy_timeout=250");
        assert!(driver.is_open());
        assert!(driver.has_feature(DriverFeature::Transactions));
        assert!(!driver.has_feature(DriverFeature::NamedPlaceholders));

        let generation = driver.generation();
        driver.close();
        driver.close();
        assert!(!driver.is_open());
        assert_eq!(driver.generation(), generation + 1);
        assert!(!driver.has_feature(DriverFeature::Transactions));
    }

    #[test]
    fn test_sqlite_execute_and_select() {
        let mut driver = open_driver("");
        driver
            .execute_statement("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT, score REAL)", &[])
            .unwrap();

        let output = driver
            .execute_statement(
                "INSERT INTO test (name, score) VALUES (?, ?)",
                &[DatabaseValue::from("Alice"), DatabaseValue::Double(1.5)],
            )
            .unwrap();
        assert!(!output.is_select);
        assert_eq!(output.rows_affected, 1);
        assert_eq!(output.last_insert_id, Some(1));

        let output = driver.execute_statement("SELECT name, score FROM test", &[]).unwrap();
        assert!(output.is_select);
        assert_eq!(output.record.field_name(0), Some("name"));
        assert_eq!(
            output.rows,
            vec![vec![DatabaseValue::from("Alice"), DatabaseValue::Double(1.5)]]
        );
    }

    #[test]
    fn test_sqlite_statement_error() {
        let mut driver = open_driver("");
        let err = driver.execute_statement("SELECT * FROM missing", &[]).unwrap_err();
        assert!(err.message().contains("missing"));
        assert!(driver.last_error().is_error());

        let err = driver.execute_statement("SELECT ?", &[]).unwrap_err();
        assert!(err.is_error());
        assert_eq!(driver.prepare_statement("SELECT ?, ?").unwrap(), 2);
    }

    #[test]
    fn test_sqlite_transaction() {
        let mut driver = open_driver("");
        driver
            .execute_statement("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .unwrap();

        assert!(driver.begin_transaction());
        assert!(driver.in_transaction());
        assert!(!driver.begin_transaction());
        driver
            .execute_statement("INSERT INTO test (name) VALUES ('Bob')", &[])
            .unwrap();
        assert!(driver.rollback_transaction());
        assert!(!driver.in_transaction());
        assert!(!driver.commit_transaction());

        let output = driver.execute_statement("SELECT * FROM test", &[]).unwrap();
        assert!(output.rows.is_empty());
    }

    #[test]
    fn test_sqlite_identifiers() {
        let driver = SqliteDriver::new();
        assert_eq!(
            driver.escape_identifier("migrations", IdentifierType::TableName),
            "\"migrations\""
        );
        assert_eq!(
            driver.escape_identifier("\"done\"", IdentifierType::TableName),
            "\"done\""
        );
        assert_eq!(
            driver.strip_delimiters("[name]", IdentifierType::FieldName),
            "name"
        );
        assert_eq!(driver.database_type(), DatabaseType::Sqlite);
    }
}
