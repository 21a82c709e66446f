//! Named connection registry
//!
//! The registry owns every named [`Connection`], knows how to construct drivers by
//! name and enforces that a connection is only used from the thread that created
//! its driver. It is passed around explicitly as an `Arc<ConnectionRegistry>`.

use super::connection::{Connection, ConnectionConfig};
use super::driver::Driver;
use super::error::{DatabaseError, Result};
use super::query::Query;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Name of the connection used when none is given
pub const DEFAULT_CONNECTION: &str = "default";

/// Constructs a fresh driver instance
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn Driver> + Send + Sync>;

/// Named connection store
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Connection>>,
    factories: RwLock<BTreeMap<String, DriverFactory>>,
    default_connection: RwLock<String>,
    thread_check: AtomicBool,
}

impl ConnectionRegistry {
    /// Create a registry with the built-in drivers registered
    pub fn new() -> Self {
        let registry = Self {
            connections: Mutex::new(HashMap::new()),
            factories: RwLock::new(BTreeMap::new()),
            default_connection: RwLock::new(DEFAULT_CONNECTION.to_string()),
            thread_check: AtomicBool::new(true),
        };

        #[cfg(feature = "sqlite")]
        registry.register_driver("sqlite", || {
            Box::new(crate::backends::SqliteDriver::new()) as Box<dyn Driver>
        });

        registry
    }

    /// Make a driver available under the given name (case-insensitive)
    pub fn register_driver<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Driver> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .insert(name.to_ascii_lowercase(), Arc::new(factory));
    }

    /// Names of the registered drivers, sorted
    pub fn drivers(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }

    pub fn is_driver_available(&self, name: &str) -> bool {
        self.factories.read().contains_key(&name.to_ascii_lowercase())
    }

    fn create_driver(&self, name: &str) -> Result<Box<dyn Driver>> {
        let factory = self.factories.read().get(&name.to_ascii_lowercase()).cloned();

        match factory {
            Some(factory) => Ok(factory()),
            None => Err(DatabaseError::UnsupportedDriver {
                driver: name.to_string(),
                available: self.drivers().join(", "),
            }),
        }
    }

    /// Add a connection using a registered driver
    pub fn add_database(&self, driver_name: &str, connection: &str) -> Result<Connection> {
        self.add_from_config(connection, ConnectionConfig::new(driver_name))
    }

    /// Add a connection described by a configuration
    pub fn add_from_config(&self, connection: &str, config: ConnectionConfig) -> Result<Connection> {
        let driver = self.create_driver(&config.driver)?;
        Ok(self.insert(Connection::new(connection, driver, config)))
    }

    /// Add a connection around an already constructed driver
    pub fn add_database_with_driver(&self, driver: Box<dyn Driver>, connection: &str) -> Connection {
        let config = ConnectionConfig::new(driver.driver_name());
        self.insert(Connection::new(connection, driver, config))
    }

    /// Register a new connection with the same parameters as `other`
    ///
    /// The copy gets its own driver, the password is carried over.
    pub fn clone_database(&self, other: &Connection, connection: &str) -> Result<Connection> {
        if !other.is_valid() {
            return Err(DatabaseError::DriverInvalidated);
        }

        self.add_from_config(connection, other.config())
    }

    fn insert(&self, connection: Connection) -> Connection {
        let name = connection.connection_name();
        let replaced = self.connections.lock().insert(name.clone(), connection.clone());

        if let Some(old) = replaced {
            log::warn!(
                "Duplicate connection name '{}', old connection removed",
                name
            );
            old.invalidate();
        }

        connection
    }

    /// Invalidate and forget a connection
    ///
    /// Copies that are still held become invalid handles.
    pub fn remove_database(&self, connection: &str) {
        let removed = self.connections.lock().remove(connection);

        if let Some(removed) = removed {
            removed.invalidate();
        }
    }

    pub fn contains(&self, connection: &str) -> bool {
        self.connections.lock().contains_key(connection)
    }

    /// Registered connection names, sorted
    pub fn connection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Look up a registered connection to read or change its settings
    ///
    /// Skips the same-thread check and never opens the connection, use
    /// [`ConnectionRegistry::database`] to get a connection to run statements on.
    pub fn lookup(&self, connection: &str) -> Result<Connection> {
        self.connections
            .lock()
            .get(connection)
            .cloned()
            .ok_or_else(|| DatabaseError::ConnectionNotRegistered(connection.to_string()))
    }

    /// Look up a registered connection, optionally opening it
    ///
    /// # Errors
    ///
    /// Fails when the name isn't registered or when the connection's driver was
    /// created on another thread while the thread check is enabled. A failed open
    /// is only logged, check [`Connection::is_open`].
    pub fn database(&self, connection: &str, open: bool) -> Result<Connection> {
        let found = self.lookup(connection)?;

        self.check_thread(connection, &found)?;

        if open && !found.is_open() && !found.open() {
            log::warn!(
                "Connection::open: unable to open '{}' database connection: {}",
                connection,
                found.last_error()
            );
        }

        Ok(found)
    }

    /// Resolve a connection for use, an empty name means the default connection
    pub fn connection(&self, connection: &str) -> Result<Connection> {
        if connection.is_empty() {
            self.database(&self.default_connection(), true)
        } else {
            self.database(connection, true)
        }
    }

    /// Query bound to the named connection (or the default one)
    pub fn query(&self, connection: &str) -> Result<Query> {
        Query::new(&self.connection(connection)?)
    }

    fn check_thread(&self, name: &str, connection: &Connection) -> Result<()> {
        if !self.is_thread_check_enabled() {
            return Ok(());
        }

        match connection.driver_thread_id() {
            Some(owner) if owner != thread::current().id() => Err(DatabaseError::DifferentThread {
                connection: name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn default_connection(&self) -> String {
        self.default_connection.read().clone()
    }

    pub fn set_default_connection(&self, connection: impl Into<String>) {
        *self.default_connection.write() = connection.into();
    }

    pub fn is_thread_check_enabled(&self) -> bool {
        self.thread_check.load(Ordering::Acquire)
    }

    pub fn set_thread_check(&self, enabled: bool) {
        self.thread_check.store(enabled, Ordering::Release);
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connection_names())
            .field("drivers", &self.drivers())
            .field("default_connection", &self.default_connection())
            .field("thread_check", &self.is_thread_check_enabled())
            .finish()
    }
}
