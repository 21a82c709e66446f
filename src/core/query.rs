//! User-facing query handle
//!
//! A [`Query`] owns exactly one result set and forwards navigation, binding and
//! value extraction to it.

use super::connection::Connection;
use super::driver::WeakDriver;
use super::error::{DatabaseError, DriverError, Result};
use super::record::SqlRecord;
use super::registry::ConnectionRegistry;
use super::result::{CursorPosition, SqlResult, AFTER_LAST_ROW, BEFORE_FIRST_ROW};
use super::value::{DatabaseValue, NumericalPrecisionPolicy};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::time::Instant;

/// Executes statements and navigates over their rows
///
/// Movable but not cloneable, a live cursor can't be duplicated.
pub struct Query {
    result: Box<dyn SqlResult>,
    field_cache: OnceCell<HashMap<String, usize>>,
}

impl Query {
    /// Create a query bound to the given connection
    pub fn new(connection: &Connection) -> Result<Self> {
        let driver = connection.driver().ok_or(DatabaseError::DriverInvalidated)?;
        let weak = std::sync::Arc::downgrade(&driver);
        let result = driver.lock().create_result(weak);

        Ok(Self::from_result(result))
    }

    /// Create a query bound to the registry's default connection
    pub fn with_default_connection(registry: &ConnectionRegistry) -> Result<Self> {
        let connection = registry.database(&registry.default_connection(), false)?;
        Self::new(&connection)
    }

    /// Wrap a pre-built result set
    pub fn from_result(result: Box<dyn SqlResult>) -> Self {
        Self {
            result,
            field_cache: OnceCell::new(),
        }
    }

    fn ensure_open(&self, caller: &str) -> Result<bool> {
        let driver = self
            .result
            .driver_weak()
            .upgrade()
            .ok_or(DatabaseError::DriverInvalidated)?;
        let driver = driver.lock();

        if !driver.is_open() || driver.is_open_error() {
            log::warn!("Query::{}: database not open", caller);
            return Ok(false);
        }

        Ok(true)
    }

    fn reset_for_exec(&mut self) {
        self.field_cache = OnceCell::new();
        self.result.state_mut().reset_last_error();
        self.result.state_mut().set_active(false);
        self.result.set_at(BEFORE_FIRST_ROW);
    }

    /// Execute a statement directly
    ///
    /// Returns `Ok(false)` when the statement failed at the driver or the database
    /// isn't open, details are in [`Query::last_error`].
    pub fn exec(&mut self, query: &str) -> Result<bool> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DatabaseError::EmptyQuery);
        }
        if !self.ensure_open("exec")? {
            return Ok(false);
        }

        self.reset_for_exec();
        self.result.clear_bound_values();

        let started = Instant::now();
        let ok = self.result.exec(query);
        log::trace!("Executed in {:?}: {}", started.elapsed(), query);

        Ok(ok)
    }

    /// Prepare a statement with positional `?` placeholders
    pub fn prepare(&mut self, query: &str) -> Result<bool> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DatabaseError::EmptyQuery);
        }
        if !self.ensure_open("prepare")? {
            return Ok(false);
        }

        self.reset_for_exec();
        self.result.clear_bound_values();

        Ok(self.result.prepare(query))
    }

    /// Execute the prepared statement with the bound values
    pub fn exec_prepared(&mut self) -> Result<bool> {
        if self.result.last_query().is_empty() {
            return Err(DatabaseError::EmptyQuery);
        }
        if !self.ensure_open("exec_prepared")? {
            return Ok(false);
        }

        self.reset_for_exec();

        let started = Instant::now();
        let ok = self.result.exec_prepared();
        log::trace!(
            "Executed prepared in {:?}: {}",
            started.elapsed(),
            self.result.last_query()
        );

        Ok(ok)
    }

    pub fn bind_value(&mut self, index: usize, value: impl Into<DatabaseValue>) {
        self.result.bind_value(index, value.into());
    }

    pub fn add_bind_value(&mut self, value: impl Into<DatabaseValue>) {
        self.result.add_bind_value(value.into());
    }

    pub fn bound_value(&self, index: usize) -> DatabaseValue {
        self.result.bound_value(index)
    }

    pub fn bound_values(&self) -> Vec<DatabaseValue> {
        self.result.bound_values()
    }

    fn can_navigate(&self) -> bool {
        self.result.is_active() && self.result.is_select()
    }

    /// Advance to the next row, `false` once past the last one
    pub fn next(&mut self) -> bool {
        if !self.can_navigate() {
            return false;
        }

        match self.result.state().position() {
            CursorPosition::AfterLast => false,
            CursorPosition::BeforeFirst => self.result.fetch_first(),
            CursorPosition::At(_) => {
                if self.result.fetch_next() {
                    true
                } else {
                    self.result.set_at(AFTER_LAST_ROW);
                    false
                }
            }
        }
    }

    pub fn previous(&mut self) -> bool {
        if !self.can_navigate() {
            return false;
        }

        match self.result.state().position() {
            CursorPosition::BeforeFirst => false,
            CursorPosition::AfterLast => self.result.fetch_last(),
            CursorPosition::At(_) => {
                if self.result.fetch_previous() {
                    true
                } else {
                    self.result.set_at(BEFORE_FIRST_ROW);
                    false
                }
            }
        }
    }

    pub fn first(&mut self) -> bool {
        self.can_navigate() && self.result.fetch_first()
    }

    pub fn last(&mut self) -> bool {
        self.can_navigate() && self.result.fetch_last()
    }

    /// Position the cursor on the given row
    ///
    /// An absolute seek goes straight to the row. A relative seek offsets the
    /// current position, where before-first counts as `-1` and after-last as the
    /// row count. Landing exactly on a sentinel moves there and returns `false`,
    /// landing beyond one fails and keeps the current position.
    pub fn seek(&mut self, index: i64, relative: bool) -> bool {
        if !self.can_navigate() {
            return false;
        }

        if !relative {
            if index < 0 {
                self.result.set_at(BEFORE_FIRST_ROW);
                return false;
            }
            return self.seek_to_fetch(index);
        }

        let size = self.result.size();
        let current = match self.result.state().position() {
            CursorPosition::BeforeFirst => BEFORE_FIRST_ROW,
            CursorPosition::At(row) => row as i64,
            CursorPosition::AfterLast if size >= 0 => size,
            CursorPosition::AfterLast => return false,
        };
        let target = current + index;

        if target < BEFORE_FIRST_ROW || (size >= 0 && target > size) {
            return false;
        }
        if target == BEFORE_FIRST_ROW {
            self.result.set_at(BEFORE_FIRST_ROW);
            return false;
        }
        if target == size {
            self.result.set_at(AFTER_LAST_ROW);
            return false;
        }

        self.seek_to_fetch(target)
    }

    /// Reach an absolute row through the cheapest fetch the result offers
    fn seek_to_fetch(&mut self, target: i64) -> bool {
        let current = self.result.state().position();

        match current {
            CursorPosition::At(row) if target == row as i64 + 1 => {
                if self.result.fetch_next() {
                    return true;
                }
                self.result.set_at(AFTER_LAST_ROW);
                false
            }
            CursorPosition::BeforeFirst if target == 0 => self.result.fetch_next(),
            CursorPosition::At(row) if target == row as i64 - 1 => {
                self.result.fetch_previous() || self.result.fetch(target)
            }
            _ => self.result.fetch(target),
        }
    }

    /// Value of the given column on the current row
    pub fn value(&self, index: usize) -> DatabaseValue {
        if self.can_navigate() && self.result.is_valid() {
            return self.result.data(index);
        }

        log::warn!("Query::value: not positioned on a valid record");
        DatabaseValue::Null
    }

    /// Value of the named column on the current row
    pub fn value_by_name(&self, name: &str) -> DatabaseValue {
        match self.index_of(name) {
            Some(index) => self.value(index),
            None => {
                log::warn!("Query::value_by_name: there is no field named '{}'", name);
                DatabaseValue::Null
            }
        }
    }

    /// Value of the named column on the current row, failing on an unknown name
    pub fn try_value_by_name(&self, name: &str) -> Result<DatabaseValue> {
        self.index_of(name)
            .map(|index| self.value(index))
            .ok_or_else(|| DatabaseError::ColumnNotFound(name.to_string()))
    }

    /// Column position by name, exact matches win over case-insensitive ones
    pub fn index_of(&self, name: &str) -> Option<usize> {
        let cache = self.field_cache.get_or_init(|| {
            let record = self.result.record();
            let mut cache = HashMap::with_capacity(record.count() * 2);
            for (index, field) in record.fields().iter().enumerate() {
                cache.entry(field.name().to_string()).or_insert(index);
                cache
                    .entry(field.name().to_ascii_lowercase())
                    .or_insert(index);
            }
            cache
        });

        cache
            .get(name)
            .or_else(|| cache.get(&name.to_ascii_lowercase()))
            .copied()
    }

    /// Whether the given column of the current row is null
    pub fn is_null(&self, index: usize) -> bool {
        if self.can_navigate() && self.result.is_valid() {
            return self.result.is_null(index);
        }

        log::warn!("Query::is_null: not positioned on a valid record");
        true
    }

    /// Field metadata, filled with the current row's values when on a row
    pub fn record(&self) -> SqlRecord {
        if !self.result.is_active() || !self.result.is_select() {
            return SqlRecord::new();
        }

        let mut record = self.result.record();
        if self.result.is_valid() {
            for index in 0..record.count() {
                record.set_value(index, self.result.data(index));
            }
        }
        record
    }

    pub fn size(&self) -> i64 {
        if self.can_navigate() {
            self.result.size()
        } else {
            -1
        }
    }

    pub fn num_rows_affected(&self) -> i64 {
        if self.result.is_active() {
            self.result.num_rows_affected()
        } else {
            -1
        }
    }

    pub fn last_insert_id(&self) -> DatabaseValue {
        if self.result.is_active() {
            self.result.last_insert_id()
        } else {
            DatabaseValue::Null
        }
    }

    /// Raw cursor position, see [`BEFORE_FIRST_ROW`] and [`AFTER_LAST_ROW`]
    pub fn at(&self) -> i64 {
        self.result.at()
    }

    pub fn is_valid(&self) -> bool {
        self.result.is_valid()
    }

    pub fn is_active(&self) -> bool {
        self.result.is_active()
    }

    pub fn is_select(&self) -> bool {
        self.result.is_select()
    }

    pub fn last_query(&self) -> &str {
        self.result.last_query()
    }

    pub fn last_error(&self) -> DriverError {
        self.result.last_error()
    }

    pub fn numerical_precision_policy(&self) -> NumericalPrecisionPolicy {
        self.result.numerical_precision_policy()
    }

    pub fn set_numerical_precision_policy(&mut self, precision: NumericalPrecisionPolicy) {
        self.result.set_numerical_precision_policy(precision);
    }

    pub fn driver_weak(&self) -> WeakDriver {
        self.result.driver_weak()
    }

    /// Done fetching, metadata stays available
    pub fn finish(&mut self) {
        if self.result.is_active() {
            self.result.detach_from_result_set();
        }
    }

    /// Release everything and start over with a fresh inactive result
    pub fn clear(&mut self) {
        self.result.detach_from_result_set();
        self.field_cache = OnceCell::new();

        let weak = self.result.driver_weak();
        match weak.upgrade() {
            Some(driver) => {
                let fresh = driver.lock().create_result(weak);
                self.result = fresh;
            }
            None => {
                let state = self.result.state_mut();
                state.set_active(false);
                state.set_select(false);
                state.set_query(String::new());
                state.clear_bound_values();
                state.reset_last_error();
            }
        }
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("query", &self.result.last_query())
            .field("at", &self.result.at())
            .field("active", &self.result.is_active())
            .field("select", &self.result.is_select())
            .finish()
    }
}
