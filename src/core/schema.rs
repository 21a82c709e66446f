//! Minimal schema builder
//!
//! Covers the DDL the migration repository and simple migrations need: creating a
//! table from a [`Blueprint`], dropping it, checking whether it exists and wiping
//! the whole database. Column types are rendered per [`DatabaseType`].

use super::connection::Connection;
use super::database_types::DatabaseType;
use super::driver::IdentifierType;
use super::error::{DatabaseError, Result};
use super::value::DatabaseValue;

/// Column types a blueprint can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing primary key
    Increments,
    String(u32),
    Integer,
    BigInteger,
    Text,
    Boolean,
}

/// One column of a blueprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    name: String,
    kind: ColumnType,
    nullable: bool,
    unique: bool,
}

impl ColumnDefinition {
    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnType {
        self.kind
    }
}

/// Table definition passed to [`SchemaBuilder::create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blueprint {
    table: String,
    columns: Vec<ColumnDefinition>,
}

impl Blueprint {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    fn add(&mut self, name: &str, kind: ColumnType) -> &mut ColumnDefinition {
        self.columns.push(ColumnDefinition {
            name: name.to_string(),
            kind,
            nullable: false,
            unique: false,
        });
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    /// Auto-incrementing `id` primary key
    pub fn id(&mut self) -> &mut ColumnDefinition {
        self.add("id", ColumnType::Increments)
    }

    pub fn increments(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add(name, ColumnType::Increments)
    }

    /// Variable-length string of at most 255 characters
    pub fn string(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add(name, ColumnType::String(255))
    }

    pub fn string_with_length(&mut self, name: &str, length: u32) -> &mut ColumnDefinition {
        self.add(name, ColumnType::String(length))
    }

    pub fn integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add(name, ColumnType::Integer)
    }

    pub fn big_integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add(name, ColumnType::BigInteger)
    }

    pub fn text(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add(name, ColumnType::Text)
    }

    pub fn boolean(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add(name, ColumnType::Boolean)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }
}

fn column_type_sql(kind: ColumnType, db_type: DatabaseType) -> String {
    match (db_type, kind) {
        (DatabaseType::Sqlite, ColumnType::Increments) => "integer primary key autoincrement".into(),
        (DatabaseType::Postgres, ColumnType::Increments) => "serial primary key".into(),
        (DatabaseType::Mysql, ColumnType::Increments) => {
            "int unsigned auto_increment primary key".into()
        }
        (_, ColumnType::Increments) => "integer primary key".into(),
        (DatabaseType::Sqlite, ColumnType::String(_)) => "varchar".into(),
        (_, ColumnType::String(length)) => format!("varchar({})", length),
        (DatabaseType::Mysql, ColumnType::Integer) => "int".into(),
        (_, ColumnType::Integer) => "integer".into(),
        (DatabaseType::Sqlite, ColumnType::BigInteger) => "integer".into(),
        (_, ColumnType::BigInteger) => "bigint".into(),
        (_, ColumnType::Text) => "text".into(),
        (DatabaseType::Sqlite, ColumnType::Boolean) => "tinyint(1)".into(),
        (DatabaseType::Mysql, ColumnType::Boolean) => "tinyint(1)".into(),
        (_, ColumnType::Boolean) => "boolean".into(),
    }
}

/// Compile a blueprint into `create table` plus one `create unique index` per
/// unique column
pub fn compile_create<F>(blueprint: &Blueprint, db_type: DatabaseType, wrap: F) -> Vec<String>
where
    F: Fn(&str) -> String,
{
    let columns: Vec<String> = blueprint
        .columns
        .iter()
        .map(|column| {
            let mut sql = format!(
                "{} {}",
                wrap(&column.name),
                column_type_sql(column.kind, db_type)
            );
            sql.push_str(if column.nullable { " null" } else { " not null" });
            sql
        })
        .collect();

    let mut statements = vec![format!(
        "create table {} ({})",
        wrap(&blueprint.table),
        columns.join(", ")
    )];

    for column in blueprint.columns.iter().filter(|column| column.unique) {
        let index = format!("{}_{}_unique", blueprint.table, column.name).to_lowercase();
        statements.push(format!(
            "create unique index {} on {} ({})",
            wrap(&index),
            wrap(&blueprint.table),
            wrap(&column.name)
        ));
    }

    statements
}

/// Schema operations over one connection
#[derive(Debug, Clone, Copy)]
pub struct SchemaBuilder<'a> {
    connection: &'a Connection,
}

impl<'a> SchemaBuilder<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        Self { connection }
    }

    fn wrap_table(&self, table: &str) -> String {
        self.connection
            .escape_identifier(table, IdentifierType::TableName)
    }

    /// Create a table described by the callback
    pub fn create<F>(&self, table: &str, callback: F) -> Result<()>
    where
        F: FnOnce(&mut Blueprint),
    {
        let mut blueprint = Blueprint::new(table);
        callback(&mut blueprint);

        let statements = compile_create(&blueprint, self.connection.database_type(), |name| {
            self.connection
                .escape_identifier(name, IdentifierType::FieldName)
        });
        for statement in statements {
            self.connection.unprepared(&statement)?;
        }
        Ok(())
    }

    pub fn drop(&self, table: &str) -> Result<()> {
        self.connection
            .unprepared(&format!("drop table {}", self.wrap_table(table)))
            .map(|_| ())
    }

    pub fn drop_if_exists(&self, table: &str) -> Result<()> {
        self.connection
            .unprepared(&format!("drop table if exists {}", self.wrap_table(table)))
            .map(|_| ())
    }

    /// Whether the table exists, always `false` while pretending
    pub fn has_table(&self, table: &str) -> Result<bool> {
        let sql = match self.connection.database_type() {
            DatabaseType::Sqlite => {
                "select count(*) as aggregate from sqlite_master where type = 'table' and name = ?"
            }
            DatabaseType::Postgres => {
                "select count(*) as aggregate from information_schema.tables \
                 where table_schema = current_schema() and table_name = ? and table_type = 'BASE TABLE'"
            }
            DatabaseType::Mysql => {
                "select count(*) as aggregate from information_schema.tables \
                 where table_schema = database() and table_name = ? and table_type = 'BASE TABLE'"
            }
            DatabaseType::Unknown => return Err(self.unsupported("has_table")),
        };

        let count = self
            .connection
            .scalar(sql, &[DatabaseValue::from(table)])?;
        Ok(count.as_long().unwrap_or(0) > 0)
    }

    /// Names of the base tables in the current database, empty while pretending
    pub fn get_all_tables(&self) -> Result<Vec<String>> {
        let sql = match self.connection.database_type() {
            DatabaseType::Sqlite => {
                "select name from sqlite_master where type = 'table' and name not like 'sqlite_%'"
            }
            DatabaseType::Postgres => {
                "select table_name from information_schema.tables \
                 where table_schema = current_schema() and table_type = 'BASE TABLE'"
            }
            DatabaseType::Mysql => {
                "select table_name from information_schema.tables \
                 where table_schema = database() and table_type = 'BASE TABLE'"
            }
            DatabaseType::Unknown => return Err(self.unsupported("get_all_tables")),
        };

        let mut query = self.connection.select(sql, &[])?;
        let mut tables = Vec::new();
        while query.next() {
            tables.push(query.value(0).as_string());
        }
        Ok(tables)
    }

    /// Drop every base table, the migrations table included
    pub fn drop_all_tables(&self) -> Result<()> {
        let mut tables = self.get_all_tables()?;
        if tables.is_empty() {
            return Ok(());
        }

        let wrapped = |tables: &[String]| {
            tables
                .iter()
                .map(|table| self.wrap_table(table))
                .collect::<Vec<_>>()
                .join(", ")
        };

        match self.connection.database_type() {
            DatabaseType::Postgres => {
                self.connection
                    .unprepared(&format!("drop table {} cascade", wrapped(&tables)))?;
            }
            DatabaseType::Mysql => {
                self.connection.unprepared("set foreign_key_checks = 0")?;
                let dropped = self
                    .connection
                    .unprepared(&format!("drop table {}", wrapped(&tables)));
                self.connection.unprepared("set foreign_key_checks = 1")?;
                dropped?;
            }
            _ => {
                // children are usually created after their parents
                tables.reverse();
                for table in &tables {
                    self.drop(table)?;
                }
            }
        }
        Ok(())
    }

    fn unsupported(&self, operation: &str) -> DatabaseError {
        DatabaseError::unsupported(format!(
            "{} isn't supported by the '{}' driver",
            operation,
            self.connection.driver_name()
        ))
    }
}
