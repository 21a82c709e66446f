//! Migration orchestration
//!
//! The [`Migrator`] diffs the statically supplied migrations against the
//! [`MigrationRepository`] and runs, rolls back or resets them, optionally inside
//! transactions or as a dry run.

use super::connection::{Connection, QueryLog};
use super::error::{DatabaseError, Result};
use super::migration::{migration_name, Migration};
use super::query_builder::OrderDirection;
use super::registry::ConnectionRegistry;
use super::repository::{MigrationItem, MigrationRepository};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Options of `run` and `rollback`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrateOptions {
    /// Print the statements instead of running them
    pub pretend: bool,
    /// `run`: give every migration its own batch
    pub step: bool,
    /// `rollback`: roll back this many migrations instead of the last batch
    pub step_value: u32,
}

impl MigrateOptions {
    pub fn pretend() -> Self {
        Self {
            pretend: true,
            ..Self::default()
        }
    }

    pub fn step() -> Self {
        Self {
            step: true,
            ..Self::default()
        }
    }

    pub fn steps(step_value: u32) -> Self {
        Self {
            step_value,
            ..Self::default()
        }
    }
}

/// A migration selected for rolling back
#[derive(Clone)]
pub struct RollbackItem {
    pub id: u64,
    pub migration_name: String,
    pub migration: Arc<dyn Migration>,
}

impl std::fmt::Debug for RollbackItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackItem")
            .field("id", &self.id)
            .field("migration_name", &self.migration_name)
            .finish()
    }
}

/// Whether a known migration has run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationStatus {
    /// Migration has been applied in the given batch
    Applied { batch: i32 },
    /// Migration is pending
    Pending,
}

/// Status line of one known migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatusRow {
    pub name: String,
    pub status: MigrationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Runs, rolls back and resets an ordered set of migrations
pub struct Migrator {
    repository: MigrationRepository,
    registry: Arc<ConnectionRegistry>,
    migrations: Vec<(String, Arc<dyn Migration>)>,
    instances: HashMap<String, Arc<dyn Migration>>,
    connection: RwLock<String>,
    notes: Mutex<Vec<String>>,
}

impl Migrator {
    /// Validate the migrations and create the migrator
    ///
    /// # Errors
    ///
    /// Fails before touching any database when a name lacks the datetime prefix,
    /// when two migrations share a name or when the list isn't sorted ascending.
    pub fn new(
        repository: MigrationRepository,
        registry: Arc<ConnectionRegistry>,
        migrations: Vec<Arc<dyn Migration>>,
    ) -> Result<Self> {
        let mut ordered: Vec<(String, Arc<dyn Migration>)> = Vec::with_capacity(migrations.len());
        let mut instances = HashMap::with_capacity(migrations.len());

        for migration in migrations {
            let name = migration_name(migration.name())?;

            if instances.contains_key(&name) {
                return Err(DatabaseError::DuplicateMigration(name));
            }
            if let Some((previous, _)) = ordered.last() {
                if previous >= &name {
                    return Err(DatabaseError::MigrationsNotSorted {
                        previous: previous.clone(),
                        current: name,
                    });
                }
            }

            instances.insert(name.clone(), Arc::clone(&migration));
            ordered.push((name, migration));
        }

        Ok(Self {
            repository,
            registry,
            migrations: ordered,
            instances,
            connection: RwLock::new(String::new()),
            notes: Mutex::new(Vec::new()),
        })
    }

    /// Run every pending migration, returns the migrations that ran
    pub fn run(&self, options: MigrateOptions) -> Result<Vec<Arc<dyn Migration>>> {
        let ran: HashSet<String> = self.repository.get_ran_simple()?.into_iter().collect();
        let pending: Vec<&(String, Arc<dyn Migration>)> = self
            .migrations
            .iter()
            .filter(|(name, _)| !ran.contains(name))
            .collect();

        if pending.is_empty() {
            self.info("Nothing to migrate.");
            return Ok(Vec::new());
        }

        let mut batch = self.repository.get_next_batch_number()?;

        for (name, migration) in &pending {
            self.run_up(name, migration.as_ref(), batch, options.pretend)?;

            if options.step {
                batch += 1;
            }
        }

        Ok(pending
            .into_iter()
            .map(|(_, migration)| Arc::clone(migration))
            .collect())
    }

    /// Roll back the last batch, or the last `step_value` migrations
    pub fn rollback(&self, options: MigrateOptions) -> Result<Vec<RollbackItem>> {
        if !self.ensure_repository()? {
            return Ok(Vec::new());
        }

        let rows = if options.step_value > 0 {
            self.repository.get_migrations(options.step_value)?
        } else {
            self.repository.get_last()?
        };

        let items = self.rollback_items(&rows);
        self.rollback_migrations(&items, options.pretend)?;
        Ok(items)
    }

    /// Roll back every migration that ran
    pub fn reset(&self, pretend: bool) -> Result<Vec<RollbackItem>> {
        if !self.ensure_repository()? {
            return Ok(Vec::new());
        }

        let rows = self.repository.get_ran(OrderDirection::Desc)?;
        let items = self.rollback_items(&rows);
        self.rollback_migrations(&items, pretend)?;
        Ok(items)
    }

    /// Roll back and run again
    ///
    /// With a `step_value` only that many migrations are rolled back, otherwise
    /// everything is reset. The following run honours `step`.
    pub fn refresh(&self, options: MigrateOptions) -> Result<Vec<Arc<dyn Migration>>> {
        if options.step_value > 0 {
            self.rollback(MigrateOptions {
                step: false,
                ..options
            })?;
        } else {
            self.reset(options.pretend)?;
        }

        self.run(MigrateOptions {
            step_value: 0,
            ..options
        })
    }

    /// Drop every table of the migrator's connection, then run every migration
    ///
    /// Unlike [`Migrator::reset`] no `down` is called, tables that no migration
    /// knows about are dropped too.
    pub fn fresh(&self, step: bool) -> Result<Vec<Arc<dyn Migration>>> {
        let connection = self.repository.connection()?;
        connection.schema().drop_all_tables()?;
        self.info("Dropped all tables successfully.");

        self.install()?;
        self.run(MigrateOptions {
            step,
            ..MigrateOptions::default()
        })
    }

    /// Known migrations of the rows, in the order the rows came in
    ///
    /// Rows for migrations that aren't compiled in are skipped with a warning.
    fn rollback_items(&self, rows: &[MigrationItem]) -> Vec<RollbackItem> {
        rows.iter()
            .filter_map(|row| match self.instances.get(&row.migration) {
                Some(migration) => Some(RollbackItem {
                    id: row.id,
                    migration_name: row.migration.clone(),
                    migration: Arc::clone(migration),
                }),
                None => {
                    log::warn!(
                        "Migration '{}' is recorded in the repository but unknown, skipping it",
                        row.migration
                    );
                    None
                }
            })
            .collect()
    }

    fn rollback_migrations(&self, items: &[RollbackItem], pretend: bool) -> Result<()> {
        if items.is_empty() {
            self.info("Nothing to rollback.");
            return Ok(());
        }

        for item in items {
            self.run_down(item, pretend)?;
        }
        Ok(())
    }

    fn ensure_repository(&self) -> Result<bool> {
        if self.repository.repository_exists()? {
            return Ok(true);
        }

        self.error("Migration table not found.");
        Ok(false)
    }

    fn run_up(&self, name: &str, migration: &dyn Migration, batch: i32, pretend: bool) -> Result<()> {
        if pretend {
            return self.pretend_to_run(name, migration, Direction::Up);
        }

        self.comment(format!("Migrating: {}", name));
        let started = Instant::now();

        self.run_migration(migration, Direction::Up)?;
        self.repository.log(name, batch)?;

        self.info(format!(
            "Migrated:  {} ({}ms)",
            name,
            started.elapsed().as_millis()
        ));
        Ok(())
    }

    fn run_down(&self, item: &RollbackItem, pretend: bool) -> Result<()> {
        let name = &item.migration_name;

        if pretend {
            return self.pretend_to_run(name, item.migration.as_ref(), Direction::Down);
        }

        self.comment(format!("Rolling back: {}", name));
        let started = Instant::now();

        self.run_migration(item.migration.as_ref(), Direction::Down)?;
        self.repository.delete_migration(item.id)?;

        self.info(format!(
            "Rolled back:  {} ({}ms)",
            name,
            started.elapsed().as_millis()
        ));
        Ok(())
    }

    /// Run `up` or `down`, inside a transaction when both the driver and the
    /// migration allow it
    ///
    /// Outside a transaction a failure can leave part of the migration applied,
    /// its repository row is not touched in that case either.
    fn run_migration(&self, migration: &dyn Migration, direction: Direction) -> Result<()> {
        let connection = self.resolve_connection(migration.connection())?;
        let within = connection.supports_schema_transactions() && migration.within_transaction();

        if within {
            return connection.within_transaction(|connection| {
                Self::migrate_by_direction(migration, direction, connection)
            });
        }

        Self::migrate_by_direction(migration, direction, &connection).map_err(|err| {
            log::warn!(
                "Migration '{}' failed outside of a transaction, changes made before the failure stay applied",
                migration.name()
            );
            err
        })
    }

    fn migrate_by_direction(
        migration: &dyn Migration,
        direction: Direction,
        connection: &Connection,
    ) -> Result<()> {
        match direction {
            Direction::Up => migration.up(connection),
            Direction::Down => migration.down(connection),
        }
    }

    fn pretend_to_run(&self, name: &str, migration: &dyn Migration, direction: Direction) -> Result<()> {
        for query in self.get_queries(migration, direction)? {
            self.info(format!("{}: {}", name, query.to_sql()));
        }
        Ok(())
    }

    /// Statements the migration would run, captured without executing them
    fn get_queries(&self, migration: &dyn Migration, direction: Direction) -> Result<Vec<QueryLog>> {
        let connection = self.resolve_connection(migration.connection())?;
        connection.pretend(|connection| Self::migrate_by_direction(migration, direction, connection))
    }

    /// Statements `up` of the named migration would run
    pub fn pretend_up(&self, name: &str) -> Result<Vec<QueryLog>> {
        let migration = self.find(name)?;
        self.get_queries(migration.as_ref(), Direction::Up)
    }

    /// Statements `down` of the named migration would run
    pub fn pretend_down(&self, name: &str) -> Result<Vec<QueryLog>> {
        let migration = self.find(name)?;
        self.get_queries(migration.as_ref(), Direction::Down)
    }

    fn find(&self, name: &str) -> Result<Arc<dyn Migration>> {
        let name = migration_name(name)?;
        self.instances
            .get(&name)
            .cloned()
            .ok_or_else(|| DatabaseError::migration(format!("Unknown migration '{}'", name)))
    }

    fn resolve_connection(&self, name: Option<&str>) -> Result<Connection> {
        match name.filter(|name| !name.is_empty()) {
            Some(name) => self.registry.connection(name),
            None => self.registry.connection(&self.connection_name()),
        }
    }

    /// Run the callback with `connection` as the default connection
    ///
    /// The previous default connection and its SQL debug flag are restored on
    /// every exit path.
    pub fn using_connection<T, F>(&self, connection: &str, debug_sql: bool, callback: F) -> Result<T>
    where
        F: FnOnce(&Migrator) -> Result<T>,
    {
        let previous_connection = self.registry.default_connection();
        let previous_debug_sql = self.debug_sql_of(&previous_connection);
        let connection = if connection.is_empty() {
            previous_connection.clone()
        } else {
            connection.to_string()
        };

        if connection == previous_connection && previous_debug_sql == Some(debug_sql) {
            return callback(self);
        }

        let _restore = ConnectionRestore {
            migrator: self,
            connection: previous_connection,
            debug_sql: previous_debug_sql,
        };
        self.set_connection(&connection, Some(debug_sql))?;

        callback(self)
    }

    fn debug_sql_of(&self, connection: &str) -> Option<bool> {
        self.registry
            .lookup(connection)
            .ok()
            .map(|connection| connection.is_debug_sql())
    }

    /// Switch the migrator, the repository and the registry default to `connection`
    pub fn set_connection(&self, connection: &str, debug_sql: Option<bool>) -> Result<()> {
        if !connection.is_empty() {
            self.registry.set_default_connection(connection);
        }

        self.repository.set_connection(connection);
        *self.connection.write() = connection.to_string();

        if let Some(debug_sql) = debug_sql {
            let resolved = if connection.is_empty() {
                self.registry.default_connection()
            } else {
                connection.to_string()
            };
            self.registry.lookup(&resolved)?.set_debug_sql(debug_sql);
        }
        Ok(())
    }

    /// Name of the connection in use, empty means the registry default
    pub fn connection_name(&self) -> String {
        self.connection.read().clone()
    }

    /// Status of every known migration, `None` when the repository is missing
    pub fn status(&self) -> Result<Option<Vec<MigrationStatusRow>>> {
        if !self.ensure_repository()? {
            return Ok(None);
        }

        let batches = self.repository.get_migration_batches()?;
        Ok(Some(
            self.migrations
                .iter()
                .map(|(name, _)| MigrationStatusRow {
                    name: name.clone(),
                    status: match batches.get(name) {
                        Some(batch) => MigrationStatus::Applied { batch: *batch },
                        None => MigrationStatus::Pending,
                    },
                })
                .collect(),
        ))
    }

    /// Create the repository table unless it exists, `true` when it was created
    pub fn install(&self) -> Result<bool> {
        if self.repository.repository_exists()? {
            return Ok(false);
        }

        self.repository.create_repository()?;
        self.info("Migration table created successfully.");
        Ok(true)
    }

    /// Drop the repository table
    pub fn uninstall(&self) -> Result<()> {
        self.repository.drop_repository_if_exists()?;
        self.info("Migration table dropped.");
        Ok(())
    }

    pub fn repository_exists(&self) -> Result<bool> {
        self.repository.repository_exists()
    }

    pub fn has_run_any_migrations(&self) -> Result<bool> {
        Ok(self.repository_exists()? && !self.repository.get_ran_simple()?.is_empty())
    }

    /// Stored names of the known migrations, sorted
    pub fn migration_names(&self) -> Vec<String> {
        self.migrations.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn migrations(&self) -> Vec<Arc<dyn Migration>> {
        self.migrations
            .iter()
            .map(|(_, migration)| Arc::clone(migration))
            .collect()
    }

    pub fn repository(&self) -> &MigrationRepository {
        &self.repository
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Progress lines reported so far
    pub fn notes(&self) -> Vec<String> {
        self.notes.lock().clone()
    }

    pub fn take_notes(&self) -> Vec<String> {
        std::mem::take(&mut *self.notes.lock())
    }

    fn info(&self, note: impl Into<String>) {
        let note = note.into();
        log::info!("{}", note);
        self.notes.lock().push(note);
    }

    fn comment(&self, note: impl Into<String>) {
        let note = note.into();
        log::debug!("{}", note);
        self.notes.lock().push(note);
    }

    fn error(&self, note: impl Into<String>) {
        let note = note.into();
        log::error!("{}", note);
        self.notes.lock().push(note);
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("migrations", &self.migration_names())
            .field("connection", &self.connection_name())
            .field("repository", &self.repository)
            .finish()
    }
}

/// Puts the previous connection back when `using_connection` returns or unwinds
struct ConnectionRestore<'a> {
    migrator: &'a Migrator,
    connection: String,
    debug_sql: Option<bool>,
}

impl Drop for ConnectionRestore<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.migrator.set_connection(&self.connection, self.debug_sql) {
            log::warn!(
                "Unable to restore the '{}' connection: {}",
                self.connection,
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::migration::SqlMigration;

    fn migration(name: &str) -> Arc<dyn Migration> {
        Arc::new(SqlMigration::new(name, "select 1", "select 1"))
    }

    fn migrator(names: &[&str]) -> Result<Migrator> {
        let registry = Arc::new(ConnectionRegistry::new());
        let repository = MigrationRepository::new(Arc::clone(&registry));
        Migrator::new(
            repository,
            registry,
            names.iter().map(|name| migration(name)).collect(),
        )
    }

    #[test]
    fn test_sorted_migrations_are_accepted() {
        let migrator = migrator(&[
            "_2024_01_01_000000_create_users",
            "_2024_01_02_000000_create_posts",
        ])
        .unwrap();
        assert_eq!(
            migrator.migration_names(),
            vec![
                "2024_01_01_000000_create_users".to_string(),
                "2024_01_02_000000_create_posts".to_string(),
            ]
        );
    }

    #[test]
    fn test_unsorted_migrations_are_rejected() {
        let err = migrator(&[
            "2024_01_02_000000_create_posts",
            "2024_01_01_000000_create_users",
        ])
        .unwrap_err();
        assert!(matches!(err, DatabaseError::MigrationsNotSorted { .. }));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_duplicate_migrations_are_rejected() {
        let err = migrator(&[
            "_2024_01_01_000000_create_users",
            "2024_01_01_000000_create_users",
        ])
        .unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateMigration(_)));
    }

    #[test]
    fn test_malformed_name_is_rejected() {
        let err = migrator(&["create_users"]).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidMigrationName(_)));
    }

    #[test]
    fn test_migrate_options_deserialize() {
        let options: MigrateOptions = serde_json::from_str(r#"{"step_value": 2}"#).unwrap();
        assert_eq!(options, MigrateOptions::steps(2));
        assert!(MigrateOptions::pretend().pretend);
        assert!(MigrateOptions::step().step);
    }
}
