//! Named connections
//!
//! A [`Connection`] couples a configuration with the shared driver that serves it.
//! Copies of a connection share the same state, so a connection invalidated by the
//! registry turns every copy into an invalid handle.

use super::database_types::DatabaseType;
use super::driver::{
    share_driver, ConnectOptions, ConnectParams, Driver, DriverFeature, IdentifierType,
    SharedDriver,
};
use super::error::{DatabaseError, DriverError, Result};
use super::query::Query;
use super::query_builder::TableQuery;
use super::schema::SchemaBuilder;
use super::transaction::TransactionGuard;
use super::value::{DatabaseValue, NumericalPrecisionPolicy};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Instant;

/// Connection parameters
///
/// The password is accepted when deserializing but never serialized or printed.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub driver: String,
    pub host: String,
    /// `-1` leaves the port to the driver
    pub port: i32,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// `;`-separated `key=value` driver options
    pub options: String,
    pub precision: NumericalPrecisionPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            host: String::new(),
            port: -1,
            database: String::new(),
            username: String::new(),
            password: String::new(),
            options: String::new(),
            precision: NumericalPrecisionPolicy::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            ..Self::default()
        }
    }

    /// Load the configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>, port: i32) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }

    pub fn with_precision(mut self, precision: NumericalPrecisionPolicy) -> Self {
        self.precision = precision;
        self
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("options", &self.options)
            .field("precision", &self.precision)
            .finish()
    }
}

/// One statement captured while pretending
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryLog {
    pub query: String,
    pub bound_values: Vec<DatabaseValue>,
}

impl QueryLog {
    /// The statement with its positional placeholders replaced by literals
    pub fn to_sql(&self) -> String {
        let mut values = self.bound_values.iter();
        let mut sql = String::with_capacity(self.query.len());

        for ch in self.query.chars() {
            if ch == '?' {
                if let Some(value) = values.next() {
                    sql.push_str(&value.to_sql_literal());
                    continue;
                }
            }
            sql.push(ch);
        }
        sql
    }
}

struct ConnectionInner {
    name: RwLock<String>,
    driver_name: String,
    config: RwLock<ConnectionConfig>,
    driver: RwLock<Option<SharedDriver>>,
    pretending: AtomicBool,
    pretended: Mutex<Vec<QueryLog>>,
    debug_sql: AtomicBool,
}

/// Named configuration plus a shared driver handle
///
/// Cloning is cheap and every clone observes the same driver and settings.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Wrap a driver into a connection with the given name and parameters
    pub fn new(name: impl Into<String>, driver: Box<dyn Driver>, config: ConnectionConfig) -> Self {
        let driver_name = driver.driver_name().to_string();
        let driver = share_driver(driver);
        driver
            .lock()
            .set_default_numerical_precision_policy(config.precision);

        Self {
            inner: Arc::new(ConnectionInner {
                name: RwLock::new(name.into()),
                driver_name,
                config: RwLock::new(config),
                driver: RwLock::new(Some(driver)),
                pretending: AtomicBool::new(false),
                pretended: Mutex::new(Vec::new()),
                debug_sql: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn driver(&self) -> Option<SharedDriver> {
        self.inner.driver.read().clone()
    }

    fn with_driver<T>(&self, default: T, f: impl FnOnce(&mut dyn Driver) -> T) -> T {
        match self.driver() {
            Some(driver) => {
                let mut driver = driver.lock();
                f(&mut **driver)
            }
            None => default,
        }
    }

    /// Drop the driver and the name, every copy becomes invalid
    pub(crate) fn invalidate(&self) {
        if Arc::strong_count(&self.inner) > 1 {
            log::warn!(
                "Connection '{}' is still in use, all queries will cease to work",
                self.connection_name()
            );
        }

        self.close();
        *self.inner.driver.write() = None;
        self.inner.name.write().clear();
    }

    #[cfg(test)]
    pub(crate) fn shares_state_with(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Open with the configured parameters
    pub fn open(&self) -> bool {
        let config = self.inner.config.read().clone();
        self.open_with_config(&config, &config.username, &config.password)
    }

    /// Open with the given credentials, the password is not stored
    pub fn open_with(&self, username: &str, password: &str) -> bool {
        let config = {
            let mut config = self.inner.config.write();
            config.username = username.to_string();
            config.clone()
        };
        self.open_with_config(&config, username, password)
    }

    fn open_with_config(&self, config: &ConnectionConfig, username: &str, password: &str) -> bool {
        let Some(driver) = self.driver() else {
            log::warn!("Connection::open: invalid connection, no driver loaded");
            return false;
        };
        let mut driver = driver.lock();

        if driver.is_open() {
            driver.close();
        }

        let options = ConnectOptions::parse(&config.options);
        let params = ConnectParams {
            database: &config.database,
            username,
            password,
            host: &config.host,
            port: config.port,
            options: &options,
        };

        let opened = driver.open(&params);
        if opened {
            log::debug!(
                "Opened '{}' connection using the '{}' driver",
                self.connection_name(),
                self.inner.driver_name
            );
        }
        opened
    }

    /// Close the physical connection, results created before become invalid
    pub fn close(&self) {
        self.with_driver((), |driver| driver.close());
    }

    pub fn is_open(&self) -> bool {
        self.with_driver(false, |driver| driver.is_open())
    }

    /// The last open attempt failed
    pub fn is_open_error(&self) -> bool {
        self.with_driver(false, |driver| driver.is_open_error())
    }

    /// Has a driver, `false` for a handle whose connection was removed
    pub fn is_valid(&self) -> bool {
        self.inner.driver.read().is_some()
    }

    pub fn last_error(&self) -> DriverError {
        self.with_driver(
            DriverError::connection("Invalid connection, no driver loaded"),
            |driver| driver.last_error(),
        )
    }

    pub fn has_feature(&self, feature: DriverFeature) -> bool {
        self.with_driver(false, |driver| driver.has_feature(feature))
    }

    pub fn database_type(&self) -> DatabaseType {
        self.with_driver(DatabaseType::Unknown, |driver| driver.database_type())
    }

    pub fn supports_schema_transactions(&self) -> bool {
        self.with_driver(false, |driver| driver.supports_schema_transactions())
    }

    pub(crate) fn driver_thread_id(&self) -> Option<ThreadId> {
        self.driver().map(|driver| driver.lock().thread_id())
    }

    pub fn connection_name(&self) -> String {
        self.inner.name.read().clone()
    }

    pub fn driver_name(&self) -> &str {
        &self.inner.driver_name
    }

    pub fn config(&self) -> ConnectionConfig {
        self.inner.config.read().clone()
    }

    pub fn host_name(&self) -> String {
        self.inner.config.read().host.clone()
    }

    pub fn set_host_name(&self, host: impl Into<String>) {
        self.inner.config.write().host = host.into();
    }

    pub fn port(&self) -> i32 {
        self.inner.config.read().port
    }

    pub fn set_port(&self, port: i32) {
        self.inner.config.write().port = port;
    }

    pub fn database_name(&self) -> String {
        self.inner.config.read().database.clone()
    }

    pub fn set_database_name(&self, database: impl Into<String>) {
        self.inner.config.write().database = database.into();
    }

    pub fn user_name(&self) -> String {
        self.inner.config.read().username.clone()
    }

    pub fn set_user_name(&self, username: impl Into<String>) {
        self.inner.config.write().username = username.into();
    }

    pub fn set_password(&self, password: impl Into<String>) {
        self.inner.config.write().password = password.into();
    }

    pub fn connect_options(&self) -> String {
        self.inner.config.read().options.clone()
    }

    pub fn set_connect_options(&self, options: impl Into<String>) {
        self.inner.config.write().options = options.into();
    }

    pub fn numerical_precision_policy(&self) -> NumericalPrecisionPolicy {
        self.inner.config.read().precision
    }

    /// Applies to queries created afterwards
    pub fn set_numerical_precision_policy(&self, precision: NumericalPrecisionPolicy) {
        self.inner.config.write().precision = precision;
        self.with_driver((), |driver| {
            driver.set_default_numerical_precision_policy(precision)
        });
    }

    pub fn is_debug_sql(&self) -> bool {
        self.inner.debug_sql.load(Ordering::Acquire)
    }

    pub fn set_debug_sql(&self, debug: bool) {
        self.inner.debug_sql.store(debug, Ordering::Release);
    }

    /// Begin a transaction, `false` when unsupported or refused
    pub fn transaction(&self) -> bool {
        self.with_driver(false, |driver| {
            driver.has_feature(DriverFeature::Transactions) && driver.begin_transaction()
        })
    }

    pub fn commit(&self) -> bool {
        self.with_driver(false, |driver| {
            driver.has_feature(DriverFeature::Transactions) && driver.commit_transaction()
        })
    }

    pub fn rollback(&self) -> bool {
        self.with_driver(false, |driver| {
            driver.has_feature(DriverFeature::Transactions) && driver.rollback_transaction()
        })
    }

    /// Run the callback inside a transaction
    ///
    /// The transaction is committed when the callback succeeds. On error it is
    /// rolled back and the callback's error is returned unchanged.
    pub fn within_transaction<T, F>(&self, callback: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = TransactionGuard::begin(self)?;

        match callback(self) {
            Ok(value) => {
                guard.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = guard.rollback() {
                    log::error!("{}", rollback_err);
                }
                Err(err)
            }
        }
    }

    pub fn is_pretending(&self) -> bool {
        self.inner.pretending.load(Ordering::Acquire)
    }

    /// Run the callback with statement execution intercepted
    ///
    /// Statements issued through this connection are recorded instead of being
    /// sent to the driver, the recorded log is returned.
    pub fn pretend<F>(&self, callback: F) -> Result<Vec<QueryLog>>
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        let scope = PretendScope::enter(self);
        callback(self)?;
        Ok(scope.finish())
    }

    fn record_pretended(&self, query: &str, bindings: &[DatabaseValue]) {
        self.inner.pretended.lock().push(QueryLog {
            query: query.to_string(),
            bound_values: bindings.to_vec(),
        });
    }

    /// Execute one statement, or record it while pretending
    fn run(&self, query: &str, bindings: &[DatabaseValue], prepared: bool) -> Result<Option<Query>> {
        if self.is_pretending() {
            self.record_pretended(query, bindings);
            return Ok(None);
        }

        let started = Instant::now();
        let mut statement = Query::new(self)?;

        let ok = if prepared {
            if statement.prepare(query)? {
                for value in bindings {
                    statement.add_bind_value(value.clone());
                }
                statement.exec_prepared()?
            } else {
                false
            }
        } else {
            statement.exec(query)?
        };

        if !ok {
            let error = statement.last_error();
            let error = if error.is_error() {
                error
            } else {
                DriverError::connection("Database not open")
            };
            return Err(DatabaseError::query_failed(query, error));
        }

        if self.is_debug_sql() {
            log::debug!(
                "[{}] Executed in {:?}: {}",
                self.connection_name(),
                started.elapsed(),
                QueryLog {
                    query: query.to_string(),
                    bound_values: bindings.to_vec(),
                }
                .to_sql()
            );
        }

        Ok(Some(statement))
    }

    /// Run a select statement and return its cursor
    ///
    /// While pretending an empty, inactive query is returned.
    pub fn select(&self, query: &str, bindings: &[DatabaseValue]) -> Result<Query> {
        match self.run(query, bindings, true)? {
            Some(statement) => Ok(statement),
            None => Query::new(self),
        }
    }

    /// First column of the first row of a select, null when there is none
    pub fn scalar(&self, query: &str, bindings: &[DatabaseValue]) -> Result<DatabaseValue> {
        let mut statement = self.select(query, bindings)?;
        if statement.first() {
            Ok(statement.value(0))
        } else {
            Ok(DatabaseValue::Null)
        }
    }

    /// Run a prepared statement
    pub fn statement(&self, query: &str, bindings: &[DatabaseValue]) -> Result<bool> {
        self.run(query, bindings, true).map(|_| true)
    }

    /// Run a prepared statement and return the number of affected rows
    pub fn affecting_statement(&self, query: &str, bindings: &[DatabaseValue]) -> Result<u64> {
        Ok(self
            .run(query, bindings, true)?
            .map_or(0, |statement| statement.num_rows_affected().max(0) as u64))
    }

    /// Run a raw statement without preparing it
    pub fn unprepared(&self, query: &str) -> Result<bool> {
        self.run(query, &[], false).map(|_| true)
    }

    /// Query builder over one table of this connection
    pub fn table(&self, table: impl Into<String>) -> TableQuery<'_> {
        TableQuery::new(self, table)
    }

    /// Schema builder over this connection
    pub fn schema(&self) -> SchemaBuilder<'_> {
        SchemaBuilder::new(self)
    }

    /// Quote an identifier with the driver's rules
    pub fn escape_identifier(&self, identifier: &str, kind: IdentifierType) -> String {
        self.with_driver(identifier.to_string(), |driver| {
            driver.escape_identifier(identifier, kind)
        })
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.connection_name())
            .field("driver", &self.inner.driver_name)
            .field("valid", &self.is_valid())
            .field("open", &self.is_open())
            .finish()
    }
}

/// Restores the previous pretend state and log on every exit path
struct PretendScope<'a> {
    connection: &'a Connection,
    was_pretending: bool,
    previous: Option<Vec<QueryLog>>,
}

impl<'a> PretendScope<'a> {
    fn enter(connection: &'a Connection) -> Self {
        let was_pretending = connection.inner.pretending.swap(true, Ordering::AcqRel);
        let previous = std::mem::take(&mut *connection.inner.pretended.lock());

        Self {
            connection,
            was_pretending,
            previous: Some(previous),
        }
    }

    fn finish(mut self) -> Vec<QueryLog> {
        let previous = self.previous.take().unwrap_or_default();
        std::mem::replace(&mut *self.connection.inner.pretended.lock(), previous)
    }
}

impl Drop for PretendScope<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.connection.inner.pretended.lock() = previous;
        }
        self.connection
            .inner
            .pretending
            .store(self.was_pretending, Ordering::Release);
    }
}
