//! Result sets and cursor state
//!
//! A result set executes statements through its driver and keeps the cursor over
//! the fetched rows. Results hold only a [`WeakDriver`], every access first checks
//! that the driver still exists, is open and was not reopened since the statement
//! ran.

use super::driver::{SharedDriver, StatementOutput, WeakDriver};
use super::error::DriverError;
use super::record::SqlRecord;
use super::value::{DatabaseValue, NumericalPrecisionPolicy};

/// Raw cursor position before the first row
pub const BEFORE_FIRST_ROW: i64 = -1;

/// Raw cursor position after the last row
pub const AFTER_LAST_ROW: i64 = -2;

/// Cursor position over a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CursorPosition {
    #[default]
    BeforeFirst,
    AfterLast,
    At(usize),
}

impl CursorPosition {
    /// Map a raw position, any negative value other than `AFTER_LAST_ROW` is
    /// treated as before the first row
    pub fn from_raw(position: i64) -> Self {
        match position {
            AFTER_LAST_ROW => CursorPosition::AfterLast,
            p if p < 0 => CursorPosition::BeforeFirst,
            p => CursorPosition::At(p as usize),
        }
    }

    pub fn to_raw(self) -> i64 {
        match self {
            CursorPosition::BeforeFirst => BEFORE_FIRST_ROW,
            CursorPosition::AfterLast => AFTER_LAST_ROW,
            CursorPosition::At(index) => index as i64,
        }
    }

    pub fn row(self) -> Option<usize> {
        match self {
            CursorPosition::At(index) => Some(index),
            _ => None,
        }
    }
}

/// Placeholder style of the bound values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSyntax {
    Positional,
    Named,
}

/// State every result set carries
#[derive(Debug, Clone)]
pub struct ResultState {
    driver: WeakDriver,
    generation: u64,
    position: CursorPosition,
    active: bool,
    select: bool,
    query: String,
    bound_values: Vec<DatabaseValue>,
    precision: NumericalPrecisionPolicy,
    last_error: DriverError,
}

impl ResultState {
    pub fn new(driver: WeakDriver, precision: NumericalPrecisionPolicy, generation: u64) -> Self {
        Self {
            driver,
            generation,
            position: CursorPosition::BeforeFirst,
            active: false,
            select: false,
            query: String::new(),
            bound_values: Vec::new(),
            precision,
            last_error: DriverError::none(),
        }
    }

    pub fn driver_weak(&self) -> WeakDriver {
        self.driver.clone()
    }

    pub fn driver(&self) -> Option<SharedDriver> {
        self.driver.upgrade()
    }

    /// The driver exists, is open and is in the session this result was created in
    pub fn is_driver_alive(&self) -> bool {
        self.driver.upgrade().is_some_and(|driver| {
            let driver = driver.lock();
            driver.is_open() && driver.generation() == self.generation
        })
    }

    pub fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn position(&self) -> CursorPosition {
        self.position
    }

    pub fn set_position(&mut self, position: CursorPosition) {
        self.position = position;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_select(&self) -> bool {
        self.select
    }

    pub fn set_select(&mut self, select: bool) {
        self.select = select;
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn precision(&self) -> NumericalPrecisionPolicy {
        self.precision
    }

    pub fn set_precision(&mut self, precision: NumericalPrecisionPolicy) {
        self.precision = precision;
    }

    pub fn last_error(&self) -> &DriverError {
        &self.last_error
    }

    /// Always returns `false`
    pub fn set_last_error(&mut self, error: DriverError) -> bool {
        self.last_error = error;
        false
    }

    pub fn reset_last_error(&mut self) {
        self.last_error = DriverError::none();
    }

    /// Grows the bound values with nulls when the index is past the end
    pub fn bind_value(&mut self, index: usize, value: DatabaseValue) {
        if index >= self.bound_values.len() {
            self.bound_values.resize(index + 1, DatabaseValue::Null);
        }
        self.bound_values[index] = value;
    }

    pub fn add_bind_value(&mut self, value: DatabaseValue) {
        self.bound_values.push(value);
    }

    pub fn bound_value(&self, index: usize) -> DatabaseValue {
        self.bound_values.get(index).cloned().unwrap_or_default()
    }

    pub fn bound_values(&self) -> &[DatabaseValue] {
        &self.bound_values
    }

    pub fn clear_bound_values(&mut self) {
        self.bound_values.clear();
    }
}

/// Cursor-capable result of one statement
///
/// Implementors provide execution and fetching, the cursor bookkeeping lives in
/// [`ResultState`] and is shared through the provided methods.
pub trait SqlResult: Send {
    fn state(&self) -> &ResultState;

    fn state_mut(&mut self) -> &mut ResultState;

    /// Execute a statement directly
    fn exec(&mut self, query: &str) -> bool;

    /// Prepare a statement for [`SqlResult::exec_prepared`]
    fn prepare(&mut self, query: &str) -> bool;

    /// Execute the prepared statement with the current bound values
    fn exec_prepared(&mut self) -> bool;

    /// Move to the given absolute row
    fn fetch(&mut self, index: i64) -> bool;

    fn fetch_first(&mut self) -> bool;

    fn fetch_last(&mut self) -> bool;

    fn fetch_next(&mut self) -> bool;

    /// Forward-only results can't go back
    fn fetch_previous(&mut self) -> bool {
        false
    }

    /// Column value of the current row
    fn data(&self, index: usize) -> DatabaseValue;

    fn is_null(&self, index: usize) -> bool;

    fn record(&self) -> SqlRecord;

    /// Number of rows of a select, `-1` when unknown
    fn size(&self) -> i64;

    /// Rows affected by a non-select statement, `-1` when unknown
    fn num_rows_affected(&self) -> i64;

    fn last_insert_id(&self) -> DatabaseValue;

    /// Release the fetched rows but keep the metadata, the result becomes inactive
    fn detach_from_result_set(&mut self);

    fn at(&self) -> i64 {
        self.state().position().to_raw()
    }

    fn set_at(&mut self, index: i64) {
        self.state_mut().set_position(CursorPosition::from_raw(index));
    }

    /// Positioned on a row of a result whose driver is still usable
    fn is_valid(&self) -> bool {
        self.state().position().row().is_some() && self.state().is_driver_alive()
    }

    fn is_active(&self) -> bool {
        self.state().is_active()
    }

    fn is_select(&self) -> bool {
        self.state().is_select()
    }

    fn last_query(&self) -> &str {
        self.state().query()
    }

    fn last_error(&self) -> DriverError {
        self.state().last_error().clone()
    }

    fn numerical_precision_policy(&self) -> NumericalPrecisionPolicy {
        self.state().precision()
    }

    fn set_numerical_precision_policy(&mut self, precision: NumericalPrecisionPolicy) {
        self.state_mut().set_precision(precision);
    }

    fn bind_value(&mut self, index: usize, value: DatabaseValue) {
        self.state_mut().bind_value(index, value);
    }

    fn add_bind_value(&mut self, value: DatabaseValue) {
        self.state_mut().add_bind_value(value);
    }

    fn bound_value(&self, index: usize) -> DatabaseValue {
        self.state().bound_value(index)
    }

    fn bound_values(&self) -> Vec<DatabaseValue> {
        self.state().bound_values().to_vec()
    }

    fn clear_bound_values(&mut self) {
        self.state_mut().clear_bound_values();
    }

    /// Only positional placeholders are supported
    fn binding_syntax(&self) -> BindingSyntax {
        BindingSyntax::Positional
    }

    fn driver_weak(&self) -> WeakDriver {
        self.state().driver_weak()
    }
}

/// Result set that fetches the whole output of a statement up front
///
/// Every driver that doesn't provide its own result uses this one. Navigation is
/// fully scrollable.
#[derive(Debug)]
pub struct BufferedResult {
    state: ResultState,
    output: Option<StatementOutput>,
    placeholders: Option<usize>,
}

impl BufferedResult {
    pub fn new(driver: WeakDriver, precision: NumericalPrecisionPolicy, generation: u64) -> Self {
        Self {
            state: ResultState::new(driver, precision, generation),
            output: None,
            placeholders: None,
        }
    }

    fn row_count(&self) -> usize {
        self.output.as_ref().map_or(0, |output| output.rows.len())
    }

    fn run(&mut self, query: &str, bindings: &[DatabaseValue]) -> bool {
        let Some(driver) = self.state.driver() else {
            return self
                .state
                .set_last_error(DriverError::connection("The driver is no longer available"));
        };
        let mut driver = driver.lock();

        if !driver.is_open() {
            return self
                .state
                .set_last_error(DriverError::connection("Driver not open"));
        }

        self.output = None;
        self.state.set_active(false);
        self.state.set_position(CursorPosition::BeforeFirst);

        match driver.execute_statement(query, bindings) {
            Ok(output) => {
                self.state.set_generation(driver.generation());
                self.state.set_select(output.is_select);
                self.state.set_active(true);
                self.output = Some(output);
                true
            }
            Err(err) => self.state.set_last_error(err),
        }
    }
}

impl SqlResult for BufferedResult {
    fn state(&self) -> &ResultState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ResultState {
        &mut self.state
    }

    fn exec(&mut self, query: &str) -> bool {
        self.state.set_query(query);
        self.placeholders = None;
        self.run(query, &[])
    }

    fn prepare(&mut self, query: &str) -> bool {
        self.state.set_query(query);
        self.placeholders = None;

        let Some(driver) = self.state.driver() else {
            return self
                .state
                .set_last_error(DriverError::connection("The driver is no longer available"));
        };
        let result = driver.lock().prepare_statement(query);

        match result {
            Ok(count) => {
                self.placeholders = Some(count);
                true
            }
            Err(err) => self.state.set_last_error(err),
        }
    }

    fn exec_prepared(&mut self) -> bool {
        if self.state.query().is_empty() {
            return self
                .state
                .set_last_error(DriverError::statement("Unable to execute an empty query"));
        }

        let bindings = self.state.bound_values().to_vec();
        if let Some(expected) = self.placeholders {
            if expected != bindings.len() {
                return self.state.set_last_error(DriverError::statement(format!(
                    "Wrong number of bound values, the statement expects {} but {} were bound",
                    expected,
                    bindings.len()
                )));
            }
        }

        let query = self.state.query().to_string();
        self.run(&query, &bindings)
    }

    fn fetch(&mut self, index: i64) -> bool {
        if !self.state.is_active() {
            return false;
        }
        if !self.state.is_driver_alive() {
            self.state.set_position(CursorPosition::BeforeFirst);
            return self
                .state
                .set_last_error(DriverError::connection("The driver is no longer available"));
        }

        if index < 0 {
            self.state.set_position(CursorPosition::BeforeFirst);
            return false;
        }
        if index as usize >= self.row_count() {
            self.state.set_position(CursorPosition::AfterLast);
            return false;
        }

        self.state.set_position(CursorPosition::At(index as usize));
        true
    }

    fn fetch_first(&mut self) -> bool {
        self.fetch(0)
    }

    fn fetch_last(&mut self) -> bool {
        self.fetch(self.row_count() as i64 - 1)
    }

    fn fetch_next(&mut self) -> bool {
        match self.state.position() {
            CursorPosition::BeforeFirst => self.fetch(0),
            CursorPosition::AfterLast => false,
            CursorPosition::At(index) => self.fetch(index as i64 + 1),
        }
    }

    fn fetch_previous(&mut self) -> bool {
        match self.state.position() {
            CursorPosition::BeforeFirst => false,
            CursorPosition::AfterLast => self.fetch_last(),
            CursorPosition::At(index) => self.fetch(index as i64 - 1),
        }
    }

    fn data(&self, index: usize) -> DatabaseValue {
        if !self.is_valid() {
            log::warn!("BufferedResult::data: not positioned on a valid record");
            return DatabaseValue::Null;
        }

        let value = self
            .state
            .position()
            .row()
            .and_then(|row| self.output.as_ref()?.rows.get(row)?.get(index).cloned());

        match value {
            Some(value) => self.state.precision().apply(value),
            None => {
                log::warn!("BufferedResult::data: column {} out of range", index);
                DatabaseValue::Null
            }
        }
    }

    fn is_null(&self, index: usize) -> bool {
        self.data(index).is_null()
    }

    fn record(&self) -> SqlRecord {
        self.output
            .as_ref()
            .map(|output| output.record.clone())
            .unwrap_or_default()
    }

    fn size(&self) -> i64 {
        match &self.output {
            Some(output) if self.state.is_active() && output.is_select => output.rows.len() as i64,
            _ => -1,
        }
    }

    fn num_rows_affected(&self) -> i64 {
        match &self.output {
            Some(output) if !output.is_select => output.rows_affected as i64,
            _ => -1,
        }
    }

    fn last_insert_id(&self) -> DatabaseValue {
        self.output
            .as_ref()
            .and_then(|output| output.last_insert_id)
            .map_or(DatabaseValue::Null, DatabaseValue::Long)
    }

    fn detach_from_result_set(&mut self) {
        if let Some(output) = self.output.as_mut() {
            output.rows.clear();
        }
        self.state.set_position(CursorPosition::BeforeFirst);
        self.state.set_active(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    #[test]
    fn test_cursor_position_raw() {
        assert_eq!(CursorPosition::from_raw(-1), CursorPosition::BeforeFirst);
        assert_eq!(CursorPosition::from_raw(-2), CursorPosition::AfterLast);
        assert_eq!(CursorPosition::from_raw(-7), CursorPosition::BeforeFirst);
        assert_eq!(CursorPosition::from_raw(3), CursorPosition::At(3));
        assert_eq!(CursorPosition::At(3).to_raw(), 3);
        assert_eq!(CursorPosition::AfterLast.to_raw(), AFTER_LAST_ROW);
    }

    #[test]
    fn test_bind_value_grows_with_nulls() {
        let mut state = ResultState::new(Weak::new(), NumericalPrecisionPolicy::default(), 0);
        state.bind_value(2, DatabaseValue::Int(7));
        assert_eq!(
            state.bound_values(),
            &[DatabaseValue::Null, DatabaseValue::Null, DatabaseValue::Int(7)]
        );
        state.add_bind_value(DatabaseValue::from("x"));
        assert_eq!(state.bound_value(3), DatabaseValue::from("x"));
        assert_eq!(state.bound_value(9), DatabaseValue::Null);
    }

    #[test]
    fn test_result_without_driver() {
        let mut result = BufferedResult::new(Weak::new(), NumericalPrecisionPolicy::default(), 0);
        assert!(!result.exec("select 1"));
        assert!(result.last_error().is_error());
        assert!(!result.is_active());
        assert!(!result.fetch_next());
        assert!(!result.is_valid());
        assert_eq!(result.data(0), DatabaseValue::Null);
        assert_eq!(result.size(), -1);
        assert_eq!(result.binding_syntax(), BindingSyntax::Positional);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_detach_makes_result_inactive() {
        use crate::backends::SqliteDriver;
        use crate::core::driver::{share_driver, ConnectOptions, ConnectParams, Driver};
        use std::sync::Arc;

        let options = ConnectOptions::default();
        let mut driver = SqliteDriver::new();
        assert!(driver.open(&ConnectParams {
            database: "",
            username: "",
            password: "",
            host: "",
            port: -1,
            options: &options,
        }));
        let shared = share_driver(Box::new(driver));
        let mut result = shared.lock().create_result(Arc::downgrade(&shared));

        assert!(result.exec("select 1 as v"));
        assert!(result.fetch_first());
        assert_eq!(result.size(), 1);

        result.detach_from_result_set();
        assert!(!result.is_active());
        assert_eq!(result.at(), BEFORE_FIRST_ROW);
        assert_eq!(result.size(), -1);
        assert!(!result.fetch_first());
        assert_eq!(result.record().field_name(0), Some("v"));
    }
}
