//! Field metadata of a result set row

use super::value::DatabaseValue;

/// One column of a record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlField {
    name: String,
    table: Option<String>,
    value: DatabaseValue,
}

impl SqlField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            value: DatabaseValue::Null,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn value(&self) -> &DatabaseValue {
        &self.value
    }

    pub fn set_value(&mut self, value: DatabaseValue) {
        self.value = value;
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }
}

/// Ordered list of fields describing one row of a result set
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlRecord {
    fields: Vec<SqlField>,
}

impl SqlRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from bare column names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: names.into_iter().map(SqlField::new).collect(),
        }
    }

    pub fn append(&mut self, field: SqlField) {
        self.fields.push(field);
    }

    pub fn count(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of the field with the given name
    ///
    /// An exact match wins, otherwise the first case-insensitive match is returned.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|field| field.name == name)
            .or_else(|| {
                self.fields
                    .iter()
                    .position(|field| field.name.eq_ignore_ascii_case(name))
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn field(&self, index: usize) -> Option<&SqlField> {
        self.fields.get(index)
    }

    pub fn field_name(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(SqlField::name)
    }

    pub fn value(&self, index: usize) -> Option<&DatabaseValue> {
        self.fields.get(index).map(SqlField::value)
    }

    pub fn value_by_name(&self, name: &str) -> Option<&DatabaseValue> {
        self.index_of(name).and_then(|index| self.value(index))
    }

    pub fn set_value(&mut self, index: usize, value: DatabaseValue) {
        if let Some(field) = self.fields.get_mut(index) {
            field.set_value(value);
        }
    }

    pub fn fields(&self) -> &[SqlField] {
        &self.fields
    }
}
