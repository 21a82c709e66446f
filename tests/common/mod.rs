//! Shared test doubles

#![allow(dead_code)]

use parking_lot::Mutex;
use rust_db_migrator::core::{
    ConnectParams, DatabaseType, DatabaseValue, Driver, DriverError, DriverFeature, DriverResult,
    DriverState, Migration, Result, SqlRecord, StatementOutput,
};
use rust_db_migrator::Connection;
use std::sync::Arc;

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Driver that records every statement and transaction call instead of running it
///
/// Statements starting with `select` answer with the configured rows, statements
/// containing the failure marker fail.
pub struct RecordingDriver {
    state: DriverState,
    database_type: DatabaseType,
    transactions: bool,
    columns: Vec<String>,
    rows: Vec<Vec<DatabaseValue>>,
    fail_marker: Option<String>,
    events: EventLog,
}

impl RecordingDriver {
    pub fn new(events: EventLog) -> Self {
        Self {
            state: DriverState::new(),
            database_type: DatabaseType::Postgres,
            transactions: true,
            columns: Vec::new(),
            rows: Vec::new(),
            fail_marker: None,
            events,
        }
    }

    pub fn with_database_type(mut self, database_type: DatabaseType) -> Self {
        self.database_type = database_type;
        self
    }

    pub fn without_transactions(mut self) -> Self {
        self.transactions = false;
        self
    }

    pub fn with_rows(mut self, columns: &[&str], rows: Vec<Vec<DatabaseValue>>) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self.rows = rows;
        self
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }
}

impl Driver for RecordingDriver {
    fn state(&self) -> &DriverState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut DriverState {
        &mut self.state
    }

    fn driver_name(&self) -> &str {
        "recording"
    }

    fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    fn open(&mut self, _params: &ConnectParams<'_>) -> bool {
        self.state.set_open(true);
        self.state.set_open_error(false);
        true
    }

    fn close(&mut self) {
        self.state.set_open(false);
    }

    fn has_feature(&self, feature: DriverFeature) -> bool {
        match feature {
            DriverFeature::Transactions => self.transactions,
            DriverFeature::PreparedQueries
            | DriverFeature::PositionalPlaceholders
            | DriverFeature::QuerySize => true,
            _ => false,
        }
    }

    fn begin_transaction(&mut self) -> bool {
        self.record("BEGIN");
        true
    }

    fn commit_transaction(&mut self) -> bool {
        self.record("COMMIT");
        true
    }

    fn rollback_transaction(&mut self) -> bool {
        self.record("ROLLBACK");
        true
    }

    fn prepare_statement(&mut self, query: &str) -> DriverResult<usize> {
        Ok(query.matches('?').count())
    }

    fn execute_statement(
        &mut self,
        query: &str,
        _bindings: &[DatabaseValue],
    ) -> DriverResult<StatementOutput> {
        self.record(query);

        if let Some(marker) = &self.fail_marker {
            if query.contains(marker.as_str()) {
                let error = DriverError::statement(format!("refused: {}", query));
                self.state.set_last_error(error.clone());
                return Err(error);
            }
        }

        if query.trim_start().to_lowercase().starts_with("select") {
            return Ok(StatementOutput::rows(
                SqlRecord::from_names(self.columns.iter().cloned()),
                self.rows.clone(),
            ));
        }
        Ok(StatementOutput::affected(1, None))
    }
}

/// Migration that logs its `up`/`down` calls and optionally fails halfway
pub struct TrackedMigration {
    name: String,
    table: String,
    calls: EventLog,
    connection: Option<String>,
    within_transaction: bool,
    fail_up: bool,
}

impl TrackedMigration {
    pub fn new(name: &str, table: &str, calls: EventLog) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            calls,
            connection: None,
            within_transaction: true,
            fail_up: false,
        }
    }

    pub fn on_connection(mut self, connection: &str) -> Self {
        self.connection = Some(connection.to_string());
        self
    }

    pub fn without_transaction(mut self) -> Self {
        self.within_transaction = false;
        self
    }

    pub fn failing_up(mut self) -> Self {
        self.fail_up = true;
        self
    }

    pub fn into_arc(self) -> Arc<dyn Migration> {
        Arc::new(self)
    }
}

impl Migration for TrackedMigration {
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
        self.calls.lock().push(format!("up:{}", self.name));
        connection.unprepared(&format!(
            "CREATE TABLE {} (id INTEGER PRIMARY KEY)",
            self.table
        ))?;
        if self.fail_up {
            connection.unprepared("THIS IS NOT SQL")?;
        }
        Ok(())
    }

    fn down(&self, connection: &Connection) -> Result<()> {
        self.calls.lock().push(format!("down:{}", self.name));
        connection.unprepared(&format!("DROP TABLE {}", self.table))?;
        Ok(())
    }
}
