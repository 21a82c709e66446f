//! Database value types
//!
//! This module defines the values bound to statements and fetched from result sets,
//! and the numerical precision policy that decides how fetched numbers are decoded.

use serde::{Deserialize, Serialize};

/// Database value that can hold different types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum DatabaseValue {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 64-bit floating point
    Double(f64),
    /// String value (also used for exact numeric text)
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
}

impl DatabaseValue {
    /// Get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DatabaseValue::Bool(v) => Some(*v),
            DatabaseValue::Int(v) => Some(*v != 0),
            DatabaseValue::Long(v) => Some(*v != 0),
            DatabaseValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Get the value as an i32
    pub fn as_int(&self) -> Option<i32> {
        match self {
            DatabaseValue::Int(v) => Some(*v),
            DatabaseValue::Long(v) => i32::try_from(*v).ok(),
            DatabaseValue::Double(v) => Some(*v as i32),
            DatabaseValue::String(s) => s.trim().parse().ok(),
            DatabaseValue::Bool(v) => Some(*v as i32),
            _ => None,
        }
    }

    /// Get the value as an i64
    pub fn as_long(&self) -> Option<i64> {
        match self {
            DatabaseValue::Long(v) => Some(*v),
            DatabaseValue::Int(v) => Some(*v as i64),
            DatabaseValue::Double(v) => Some(*v as i64),
            DatabaseValue::String(s) => s.trim().parse().ok(),
            DatabaseValue::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Get the value as a u64 (rejects negative numbers)
    pub fn as_u64(&self) -> Option<u64> {
        self.as_long().and_then(|v| u64::try_from(v).ok())
    }

    /// Get the value as an f64
    pub fn as_double(&self) -> Option<f64> {
        match self {
            DatabaseValue::Double(v) => Some(*v),
            DatabaseValue::Int(v) => Some(*v as f64),
            DatabaseValue::Long(v) => Some(*v as f64),
            DatabaseValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get the value as a string (zero-copy for String values)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the value as a string (with conversion)
    pub fn as_string(&self) -> String {
        match self {
            DatabaseValue::Null => "null".to_string(),
            DatabaseValue::Bool(v) => v.to_string(),
            DatabaseValue::Int(v) => v.to_string(),
            DatabaseValue::Long(v) => v.to_string(),
            DatabaseValue::Double(v) => v.to_string(),
            DatabaseValue::String(s) => s.clone(),
            DatabaseValue::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }

    /// Get the value as bytes (zero-copy)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DatabaseValue::Bytes(b) => Some(b),
            DatabaseValue::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            DatabaseValue::Null => "null",
            DatabaseValue::Bool(_) => "bool",
            DatabaseValue::Int(_) => "int",
            DatabaseValue::Long(_) => "long",
            DatabaseValue::Double(_) => "double",
            DatabaseValue::String(_) => "string",
            DatabaseValue::Bytes(_) => "bytes",
        }
    }

    /// Render the value as an SQL literal, used to display pretended statements
    pub fn to_sql_literal(&self) -> String {
        match self {
            DatabaseValue::Null => "null".to_string(),
            DatabaseValue::Bool(v) => (*v as i32).to_string(),
            DatabaseValue::Int(v) => v.to_string(),
            DatabaseValue::Long(v) => v.to_string(),
            DatabaseValue::Double(v) => v.to_string(),
            DatabaseValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            DatabaseValue::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
                format!("x'{}'", hex)
            }
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(v: bool) -> Self {
        DatabaseValue::Bool(v)
    }
}

impl From<i32> for DatabaseValue {
    fn from(v: i32) -> Self {
        DatabaseValue::Int(v)
    }
}

impl From<i64> for DatabaseValue {
    fn from(v: i64) -> Self {
        DatabaseValue::Long(v)
    }
}

impl From<u64> for DatabaseValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => DatabaseValue::Long(v),
            Err(_) => DatabaseValue::String(v.to_string()),
        }
    }
}

impl From<f64> for DatabaseValue {
    fn from(v: f64) -> Self {
        DatabaseValue::Double(v)
    }
}

impl From<String> for DatabaseValue {
    fn from(v: String) -> Self {
        DatabaseValue::String(v)
    }
}

impl From<&str> for DatabaseValue {
    fn from(v: &str) -> Self {
        DatabaseValue::String(v.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(v: Vec<u8>) -> Self {
        DatabaseValue::Bytes(v)
    }
}

impl<T: Into<DatabaseValue>> From<Option<T>> for DatabaseValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// How fetched non-integer numeric columns are decoded
///
/// Inherited driver → connection → query and consulted by the result set each
/// time a column value is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NumericalPrecisionPolicy {
    /// Force 32-bit integer, the fraction is discarded
    LowPrecisionInt32,
    /// Force 64-bit integer, the fraction is discarded
    LowPrecisionInt64,
    /// Force double
    #[default]
    LowPrecisionDouble,
    /// Keep the exact text, no precision is lost
    HighPrecision,
}

impl NumericalPrecisionPolicy {
    /// Decode a numeric column delivered as a double by the backend
    pub fn decode_double(&self, value: f64) -> DatabaseValue {
        match self {
            NumericalPrecisionPolicy::HighPrecision => DatabaseValue::String(value.to_string()),
            NumericalPrecisionPolicy::LowPrecisionDouble => DatabaseValue::Double(value),
            NumericalPrecisionPolicy::LowPrecisionInt64 => DatabaseValue::Long(value.trunc() as i64),
            NumericalPrecisionPolicy::LowPrecisionInt32 => DatabaseValue::Int(value.trunc() as i32),
        }
    }

    /// Apply the policy to an already fetched value
    ///
    /// Only doubles are affected, integers, text and blobs pass through.
    pub fn apply(&self, value: DatabaseValue) -> DatabaseValue {
        match value {
            DatabaseValue::Double(v) => self.decode_double(v),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        let val = DatabaseValue::Int(42);
        assert_eq!(val.as_int(), Some(42));
        assert_eq!(val.as_long(), Some(42));
        assert_eq!(val.as_string(), "42");

        let val = DatabaseValue::String("123".to_string());
        assert_eq!(val.as_int(), Some(123));
        assert_eq!(val.as_u64(), Some(123));

        let val = DatabaseValue::Long(-1);
        assert_eq!(val.as_u64(), None);
    }

    #[test]
    fn test_value_from_types() {
        let val: DatabaseValue = "hello".into();
        assert_eq!(val, DatabaseValue::String("hello".to_string()));

        let val: DatabaseValue = Option::<i32>::None.into();
        assert_eq!(val, DatabaseValue::Null);

        let val: DatabaseValue = u64::MAX.into();
        assert_eq!(val, DatabaseValue::String(u64::MAX.to_string()));
    }

    #[test]
    fn test_sql_literal() {
        assert_eq!(DatabaseValue::from("O'Brien").to_sql_literal(), "'O''Brien'");
        assert_eq!(DatabaseValue::Null.to_sql_literal(), "null");
        assert_eq!(DatabaseValue::Bool(true).to_sql_literal(), "1");
        assert_eq!(DatabaseValue::Bytes(vec![0xde, 0xad]).to_sql_literal(), "x'dead'");
    }

    #[test]
    fn test_precision_policy_apply() {
        let policy = NumericalPrecisionPolicy::LowPrecisionInt32;
        assert_eq!(policy.apply(DatabaseValue::Double(3.99)), DatabaseValue::Int(3));
        assert_eq!(policy.apply(DatabaseValue::Long(10)), DatabaseValue::Long(10));
        assert_eq!(
            NumericalPrecisionPolicy::HighPrecision.apply(DatabaseValue::Double(12345.6789)),
            DatabaseValue::String("12345.6789".into())
        );
        assert_eq!(
            NumericalPrecisionPolicy::LowPrecisionInt64.apply(DatabaseValue::Double(-7.9)),
            DatabaseValue::Long(-7)
        );
        assert_eq!(NumericalPrecisionPolicy::default(), NumericalPrecisionPolicy::LowPrecisionDouble);
    }
}
