//! Table query builder
//!
//! Provides a small fluent API over one table with automatic parameter binding.
//! Identifiers are quoted by the connection's driver, values are always bound to
//! positional placeholders.

use super::connection::Connection;
use super::driver::IdentifierType;
use super::error::Result;
use super::query::Query;
use super::value::DatabaseValue;

/// SQL comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equal to (=)
    Eq,
    /// Not equal to (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
}

impl Operator {
    fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }
}

/// WHERE clause condition
#[derive(Debug, Clone)]
struct Condition {
    column: String,
    operator: Operator,
    value: DatabaseValue,
}

/// ORDER BY direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Ascending order
    #[default]
    Asc,
    /// Descending order
    Desc,
}

impl OrderDirection {
    fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "asc",
            OrderDirection::Desc => "desc",
        }
    }
}

/// Query builder bound to one table of a connection
#[derive(Debug, Clone)]
pub struct TableQuery<'a> {
    connection: &'a Connection,
    table: String,
    columns: Vec<String>,
    wheres: Vec<Condition>,
    orders: Vec<(String, OrderDirection)>,
    limit: Option<usize>,
}

impl<'a> TableQuery<'a> {
    /// Create a new builder over the given table
    pub fn new(connection: &'a Connection, table: impl Into<String>) -> Self {
        Self {
            connection,
            table: table.into(),
            columns: Vec::new(),
            wheres: Vec::new(),
            orders: Vec::new(),
            limit: None,
        }
    }

    /// Select specific columns instead of `*`
    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add a WHERE condition, conditions are joined with AND
    #[must_use]
    pub fn where_op(mut self, column: &str, operator: Operator, value: impl Into<DatabaseValue>) -> Self {
        self.wheres.push(Condition {
            column: column.to_string(),
            operator,
            value: value.into(),
        });
        self
    }

    /// Add a WHERE column = value condition
    #[must_use]
    pub fn where_eq(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.where_op(column, Operator::Eq, value)
    }

    /// Add a WHERE column >= value condition
    #[must_use]
    pub fn where_ge(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.where_op(column, Operator::Ge, value)
    }

    /// Add ORDER BY clause
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.orders.push((column.to_string(), direction));
        self
    }

    /// Add LIMIT clause
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn wrap(&self, column: &str) -> String {
        self.connection
            .escape_identifier(column, IdentifierType::FieldName)
    }

    fn wrap_table(&self) -> String {
        self.connection
            .escape_identifier(&self.table, IdentifierType::TableName)
    }

    fn where_clause(&self) -> String {
        if self.wheres.is_empty() {
            return String::new();
        }

        let conditions: Vec<String> = self
            .wheres
            .iter()
            .map(|cond| format!("{} {} ?", self.wrap(&cond.column), cond.operator.as_sql()))
            .collect();
        format!(" where {}", conditions.join(" and "))
    }

    fn params(&self) -> Vec<DatabaseValue> {
        self.wheres.iter().map(|cond| cond.value.clone()).collect()
    }

    /// Build the SELECT statement
    pub fn to_select_sql(&self) -> String {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|column| self.wrap(column))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("select {} from {}", columns, self.wrap_table());
        sql.push_str(&self.where_clause());

        if !self.orders.is_empty() {
            let orders: Vec<String> = self
                .orders
                .iter()
                .map(|(column, direction)| format!("{} {}", self.wrap(column), direction.as_sql()))
                .collect();
            sql.push_str(&format!(" order by {}", orders.join(", ")));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" limit {}", limit));
        }

        sql
    }

    /// Run the SELECT and return its cursor
    pub fn get(&self) -> Result<Query> {
        self.connection.select(&self.to_select_sql(), &self.params())
    }

    /// Values of one column over all matching rows
    pub fn pluck(self, column: &str) -> Result<Vec<DatabaseValue>> {
        let query = self.columns(&[column]);
        let mut cursor = query.get()?;

        let mut values = Vec::new();
        while cursor.next() {
            values.push(cursor.value(0));
        }
        Ok(values)
    }

    /// Maximum of a column, null on an empty table
    pub fn max(&self, column: &str) -> Result<DatabaseValue> {
        let sql = format!(
            "select max({}) as aggregate from {}{}",
            self.wrap(column),
            self.wrap_table(),
            self.where_clause()
        );
        self.connection.scalar(&sql, &self.params())
    }

    /// Insert one row
    pub fn insert(&self, values: &[(&str, DatabaseValue)]) -> Result<bool> {
        let columns: Vec<String> = values.iter().map(|(column, _)| self.wrap(column)).collect();
        let placeholders = vec!["?"; values.len()];
        let sql = format!(
            "insert into {} ({}) values ({})",
            self.wrap_table(),
            columns.join(", "),
            placeholders.join(", ")
        );
        let bindings: Vec<DatabaseValue> = values.iter().map(|(_, value)| value.clone()).collect();

        self.connection.statement(&sql, &bindings)
    }

    /// Delete the matching rows and return how many were removed
    pub fn delete(&self) -> Result<u64> {
        let sql = format!("delete from {}{}", self.wrap_table(), self.where_clause());
        self.connection.affecting_statement(&sql, &self.params())
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::backends::SqliteDriver;
    use crate::core::connection::ConnectionConfig;

    fn connection() -> Connection {
        let connection = Connection::new(
            "builder",
            Box::new(SqliteDriver::new()),
            ConnectionConfig::default(),
        );
        assert!(connection.open());
        connection
    }

    #[test]
    fn test_select_sql() {
        let connection = connection();
        let sql = TableQuery::new(&connection, "migrations")
            .where_ge("batch", 1)
            .order_by("batch", OrderDirection::Desc)
            .order_by("migration", OrderDirection::Desc)
            .limit(2)
            .to_select_sql();

        assert_eq!(
            sql,
            r#"select * from "migrations" where "batch" >= ? order by "batch" desc, "migration" desc limit 2"#
        );
    }

    #[test]
    fn test_insert_pluck_max_delete() {
        let connection = connection();
        connection
            .unprepared("create table items (id integer primary key, name text, rank integer)")
            .unwrap();

        let items = TableQuery::new(&connection, "items");
        items.insert(&[("name", "b".into()), ("rank", 2.into())]).unwrap();
        items.insert(&[("name", "a".into()), ("rank", 5.into())]).unwrap();

        let names = TableQuery::new(&connection, "items")
            .order_by("name", OrderDirection::Asc)
            .pluck("name")
            .unwrap();
        assert_eq!(names, vec![DatabaseValue::from("a"), DatabaseValue::from("b")]);

        assert_eq!(items.max("rank").unwrap().as_long(), Some(5));

        let removed = TableQuery::new(&connection, "items")
            .where_eq("name", "a")
            .delete()
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(items.max("rank").unwrap().as_long(), Some(2));
    }
}
