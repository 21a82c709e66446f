//! Driver abstraction
//!
//! A driver owns the physical connection of one backend, answers capability
//! questions, controls transactions and hands out result sets. Drivers are shared
//! through [`SharedDriver`]: the owning connection keeps the strong handle, result
//! sets keep a [`WeakDriver`] so a removed connection is observable as "gone"
//! instead of dangling.

use super::database_types::DatabaseType;
use super::error::DriverError;
use super::record::SqlRecord;
use super::result::{BufferedResult, SqlResult};
use super::value::{DatabaseValue, NumericalPrecisionPolicy};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

/// Result type used at the driver boundary, errors are plain values here
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Strong, shared handle to a driver
pub type SharedDriver = Arc<Mutex<Box<dyn Driver>>>;

/// Non-owning handle to a driver
pub type WeakDriver = Weak<Mutex<Box<dyn Driver>>>;

/// Wrap a driver into a shared handle
pub fn share_driver(driver: Box<dyn Driver>) -> SharedDriver {
    Arc::new(Mutex::new(driver))
}

/// Capabilities a driver may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverFeature {
    BatchOperations,
    Blob,
    CancelQuery,
    EventNotifications,
    FinishQuery,
    LastInsertId,
    LowPrecisionNumbers,
    MultipleResultSets,
    NamedPlaceholders,
    PositionalPlaceholders,
    PreparedQueries,
    QuerySize,
    SimpleLocking,
    Transactions,
    Unicode,
}

impl DriverFeature {
    pub const ALL: [DriverFeature; 15] = [
        DriverFeature::BatchOperations,
        DriverFeature::Blob,
        DriverFeature::CancelQuery,
        DriverFeature::EventNotifications,
        DriverFeature::FinishQuery,
        DriverFeature::LastInsertId,
        DriverFeature::LowPrecisionNumbers,
        DriverFeature::MultipleResultSets,
        DriverFeature::NamedPlaceholders,
        DriverFeature::PositionalPlaceholders,
        DriverFeature::PreparedQueries,
        DriverFeature::QuerySize,
        DriverFeature::SimpleLocking,
        DriverFeature::Transactions,
        DriverFeature::Unicode,
    ];
}

/// Kind of identifier passed to the quoting helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierType {
    FieldName,
    TableName,
}

/// Parsed connect options (`key=value;flag;key2=value2`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    entries: BTreeMap<String, Option<String>>,
}

impl ConnectOptions {
    /// Parse a `;`-separated options string, keys are case-insensitive
    pub fn parse(options: &str) -> Self {
        let entries = options
            .split(';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) => (
                    key.trim().to_ascii_lowercase(),
                    Some(value.trim().to_string()),
                ),
                None => (entry.to_ascii_lowercase(), None),
            })
            .collect();

        Self { entries }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .and_then(|value| value.as_deref())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|value| value.parse().ok())
    }

    /// A bare flag counts as `true`
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.entries.get(&key.to_ascii_lowercase())? {
            None => Some(true),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => Some(true),
                "0" | "false" | "off" | "no" => Some(false),
                _ => None,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a driver needs to open a physical connection
#[derive(Debug, Clone, Copy)]
pub struct ConnectParams<'a> {
    pub database: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub host: &'a str,
    /// `-1` when unset
    pub port: i32,
    pub options: &'a ConnectOptions,
}

/// Fully fetched output of one executed statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOutput {
    pub record: SqlRecord,
    pub rows: Vec<Vec<DatabaseValue>>,
    pub is_select: bool,
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

impl StatementOutput {
    /// Output of a statement that produced rows
    pub fn rows(record: SqlRecord, rows: Vec<Vec<DatabaseValue>>) -> Self {
        Self {
            record,
            rows,
            is_select: true,
            ..Self::default()
        }
    }

    /// Output of a statement that only affected rows
    pub fn affected(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
            ..Self::default()
        }
    }
}

/// Bookkeeping shared by every driver implementation
#[derive(Debug, Clone)]
pub struct DriverState {
    open: bool,
    open_error: bool,
    last_error: DriverError,
    precision: NumericalPrecisionPolicy,
    thread_id: ThreadId,
    generation: u64,
}

impl DriverState {
    /// Records the constructing thread as the owning thread
    pub fn new() -> Self {
        Self {
            open: false,
            open_error: false,
            last_error: DriverError::none(),
            precision: NumericalPrecisionPolicy::default(),
            thread_id: thread::current().id(),
            generation: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Every open/close transition starts a new generation, result sets from an
    /// older generation are stale.
    pub fn set_open(&mut self, open: bool) {
        if self.open != open {
            self.generation += 1;
        }
        self.open = open;
    }

    pub fn is_open_error(&self) -> bool {
        self.open_error
    }

    pub fn set_open_error(&mut self, error: bool) {
        self.open_error = error;
    }

    pub fn last_error(&self) -> &DriverError {
        &self.last_error
    }

    /// Always returns `false` so failure paths can `return state.set_last_error(..)`
    pub fn set_last_error(&mut self, error: DriverError) -> bool {
        self.last_error = error;
        false
    }

    pub fn reset_last_error(&mut self) {
        self.last_error = DriverError::none();
    }

    pub fn precision(&self) -> NumericalPrecisionPolicy {
        self.precision
    }

    pub fn set_precision(&mut self, precision: NumericalPrecisionPolicy) {
        self.precision = precision;
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Default for DriverState {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend-specific physical connection, statement execution and capabilities
///
/// A driver is never copied; the connection that owns it shares it through a
/// [`SharedDriver`] handle. Ordinary failures are reported by the boolean return
/// values together with [`Driver::last_error`], never by panicking.
pub trait Driver: Send {
    /// Common driver bookkeeping
    fn state(&self) -> &DriverState;

    fn state_mut(&mut self) -> &mut DriverState;

    /// Name the driver is registered under (e.g. `sqlite`)
    fn driver_name(&self) -> &str;

    fn database_type(&self) -> DatabaseType;

    /// Establish the physical connection
    fn open(&mut self, params: &ConnectParams<'_>) -> bool;

    /// Release the physical connection, calling it on a closed driver is a no-op
    fn close(&mut self);

    fn has_feature(&self, feature: DriverFeature) -> bool;

    fn begin_transaction(&mut self) -> bool;

    fn commit_transaction(&mut self) -> bool;

    fn rollback_transaction(&mut self) -> bool;

    /// Validate a statement and return the number of positional placeholders
    fn prepare_statement(&mut self, query: &str) -> DriverResult<usize>;

    /// Execute one statement with positional bindings and fetch its whole output
    fn execute_statement(
        &mut self,
        query: &str,
        bindings: &[DatabaseValue],
    ) -> DriverResult<StatementOutput>;

    fn is_open(&self) -> bool {
        self.state().is_open()
    }

    fn is_open_error(&self) -> bool {
        self.state().is_open_error()
    }

    fn last_error(&self) -> DriverError {
        self.state().last_error().clone()
    }

    fn thread_id(&self) -> ThreadId {
        self.state().thread_id()
    }

    fn generation(&self) -> u64 {
        self.state().generation()
    }

    fn default_numerical_precision_policy(&self) -> NumericalPrecisionPolicy {
        self.state().precision()
    }

    fn set_default_numerical_precision_policy(&mut self, precision: NumericalPrecisionPolicy) {
        self.state_mut().set_precision(precision);
    }

    /// Whether schema (DDL) statements can be rolled back
    fn supports_schema_transactions(&self) -> bool {
        self.database_type().supports_schema_transactions()
            && self.has_feature(DriverFeature::Transactions)
    }

    fn maximum_identifier_length(&self, _kind: IdentifierType) -> usize {
        i32::MAX as usize
    }

    fn is_identifier_escaped(&self, _identifier: &str, _kind: IdentifierType) -> bool {
        false
    }

    fn strip_delimiters(&self, identifier: &str, kind: IdentifierType) -> String {
        if self.is_identifier_escaped(identifier, kind) && identifier.len() >= 2 {
            identifier[1..identifier.len() - 1].to_string()
        } else {
            identifier.to_string()
        }
    }

    fn escape_identifier(&self, identifier: &str, _kind: IdentifierType) -> String {
        identifier.to_string()
    }

    /// Result set factory, the result only keeps the weak handle
    fn create_result(&self, driver: WeakDriver) -> Box<dyn SqlResult> {
        Box::new(BufferedResult::new(
            driver,
            self.default_numerical_precision_policy(),
            self.generation(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options_parse() {
        let options = ConnectOptions::parse(" busy_timeout = 5000 ; READONLY;foreign_keys=off;;");
        assert_eq!(options.len(), 3);
        assert_eq!(options.get_u64("busy_timeout"), Some(5000));
        assert_eq!(options.get_bool("readonly"), Some(true));
        assert_eq!(options.get_bool("Foreign_Keys"), Some(false));
        assert_eq!(options.get("missing"), None);
        assert!(ConnectOptions::parse("").is_empty());
    }

    #[test]
    fn test_driver_state_generation() {
        let mut state = DriverState::new();
        assert_eq!(state.generation(), 0);
        state.set_open(true);
        state.set_open(true);
        assert_eq!(state.generation(), 1);
        state.set_open(false);
        assert_eq!(state.generation(), 2);
        assert_eq!(state.thread_id(), thread::current().id());
    }

    #[test]
    fn test_set_last_error_returns_false() {
        let mut state = DriverState::new();
        assert!(!state.set_last_error(DriverError::connection("refused")));
        assert!(state.last_error().is_error());
        state.reset_last_error();
        assert!(!state.last_error().is_error());
    }
}
