//! Migration bookkeeping
//!
//! The repository persists which migrations ran and in which batch, in a table
//! (`migrations` by default) with the columns `id`, `migration` and `batch`.

use super::connection::Connection;
use super::error::{DatabaseError, Result};
use super::query::Query;
use super::query_builder::{OrderDirection, TableQuery};
use super::registry::ConnectionRegistry;
use super::value::DatabaseValue;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default name of the bookkeeping table
pub const DEFAULT_MIGRATIONS_TABLE: &str = "migrations";

/// One row of the bookkeeping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationItem {
    pub id: u64,
    pub migration: String,
    pub batch: i32,
}

/// Persisted record of the migrations that ran
#[derive(Debug)]
pub struct MigrationRepository {
    registry: Arc<ConnectionRegistry>,
    table: String,
    connection: RwLock<String>,
}

impl MigrationRepository {
    /// Repository over the default `migrations` table and the default connection
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self::with_table(registry, DEFAULT_MIGRATIONS_TABLE)
    }

    pub fn with_table(registry: Arc<ConnectionRegistry>, table: impl Into<String>) -> Self {
        Self {
            registry,
            table: table.into(),
            connection: RwLock::new(String::new()),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Name of the connection used for the bookkeeping, empty means the default one
    pub fn connection_name(&self) -> String {
        self.connection.read().clone()
    }

    pub fn set_connection(&self, connection: impl Into<String>) {
        *self.connection.write() = connection.into();
    }

    /// Resolve the connection used for the bookkeeping
    pub fn connection(&self) -> Result<Connection> {
        self.registry.connection(&self.connection_name())
    }

    fn hydrate(mut cursor: Query) -> Result<Vec<MigrationItem>> {
        let mut items = Vec::new();

        while cursor.next() {
            let id = cursor.try_value_by_name("id")?;
            let migration = cursor.try_value_by_name("migration")?;
            let batch = cursor.try_value_by_name("batch")?;

            items.push(MigrationItem {
                id: id
                    .as_u64()
                    .ok_or_else(|| DatabaseError::type_mismatch("u64", id.type_name()))?,
                migration: migration
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| DatabaseError::type_mismatch("string", migration.type_name()))?,
                batch: batch
                    .as_int()
                    .ok_or_else(|| DatabaseError::type_mismatch("i32", batch.type_name()))?,
            });
        }

        Ok(items)
    }

    fn rows<F>(&self, build: F) -> Result<Vec<MigrationItem>>
    where
        F: for<'a> FnOnce(TableQuery<'a>) -> TableQuery<'a>,
    {
        let connection = self.connection()?;
        let cursor = build(connection.table(self.table.as_str())).get()?;
        Self::hydrate(cursor)
    }

    /// Names of the ran migrations, ordered by batch then name
    pub fn get_ran_simple(&self) -> Result<Vec<String>> {
        let connection = self.connection()?;
        let names = connection
            .table(self.table.as_str())
            .order_by("batch", OrderDirection::Asc)
            .order_by("migration", OrderDirection::Asc)
            .pluck("migration")?;

        Ok(names
            .into_iter()
            .filter_map(|name| match name {
                DatabaseValue::String(name) => Some(name),
                _ => None,
            })
            .collect())
    }

    /// All rows ordered by batch and name in the given direction
    pub fn get_ran(&self, order: OrderDirection) -> Result<Vec<MigrationItem>> {
        self.rows(|query| query.order_by("batch", order).order_by("migration", order))
    }

    /// The most recent `steps` migrations across all batches
    pub fn get_migrations(&self, steps: u32) -> Result<Vec<MigrationItem>> {
        self.rows(|query| {
            query
                .where_ge("batch", 1)
                .order_by("batch", OrderDirection::Desc)
                .order_by("migration", OrderDirection::Desc)
                .limit(steps as usize)
        })
    }

    /// Every migration of the last batch, name descending
    pub fn get_last(&self) -> Result<Vec<MigrationItem>> {
        let last = self.get_last_batch_number()?;
        self.rows(|query| {
            query
                .where_eq("batch", last)
                .order_by("migration", OrderDirection::Desc)
        })
    }

    /// Migration name to batch number
    pub fn get_migration_batches(&self) -> Result<BTreeMap<String, i32>> {
        Ok(self
            .get_ran(OrderDirection::Asc)?
            .into_iter()
            .map(|item| (item.migration, item.batch))
            .collect())
    }

    /// Record that a migration ran
    pub fn log(&self, migration: &str, batch: i32) -> Result<()> {
        let connection = self.connection()?;
        connection.table(self.table.as_str()).insert(&[
            ("migration", DatabaseValue::from(migration)),
            ("batch", DatabaseValue::Int(batch)),
        ])?;
        Ok(())
    }

    /// Remove a migration's row by primary key
    pub fn delete_migration(&self, id: u64) -> Result<()> {
        let connection = self.connection()?;
        connection
            .table(self.table.as_str())
            .where_eq("id", id)
            .delete()?;
        Ok(())
    }

    pub fn get_next_batch_number(&self) -> Result<i32> {
        Ok(self.get_last_batch_number()? + 1)
    }

    /// Highest batch number, `0` on an empty table
    pub fn get_last_batch_number(&self) -> Result<i32> {
        let connection = self.connection()?;
        let last = connection.table(self.table.as_str()).max("batch")?;
        Ok(last.as_int().unwrap_or(0).max(0))
    }

    /// Create the bookkeeping table
    pub fn create_repository(&self) -> Result<()> {
        let connection = self.connection()?;
        connection.schema().create(&self.table, |table| {
            table.id();
            table.string("migration").unique();
            table.integer("batch");
        })
    }

    pub fn repository_exists(&self) -> Result<bool> {
        let connection = self.connection()?;
        connection.schema().has_table(&self.table)
    }

    pub fn delete_repository(&self) -> Result<()> {
        let connection = self.connection()?;
        connection.schema().drop(&self.table)
    }

    pub fn drop_repository_if_exists(&self) -> Result<()> {
        let connection = self.connection()?;
        connection.schema().drop_if_exists(&self.table)
    }
}
