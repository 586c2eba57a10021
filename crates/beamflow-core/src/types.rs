/*!
 * Core data types for beamflow.
 *
 * This module defines the values carried by process variables and the small
 * helper types shared by the device crates.
 */
use std::fmt;

use serde::{Deserialize, Serialize};

/// A strongly-typed value read from or written to a process variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value (disconnected or never written)
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (enum indices, raw ADC counts)
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value (engineering units, enum labels)
    String(String),
}

impl Value {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if the value is numeric (integer or float)
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Try to get a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Try to get an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if *f == (*f as i64) as f64 => Some(*f as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Try to get a float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "-"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Access mode of a process variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    /// Read-only signal (readbacks)
    ReadOnly,
    /// Read-write signal (setpoints, calibration constants)
    ReadWrite,
}

/// How prominently a control point is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// Primary readback of a device
    Hinted,
    /// Regular readback
    Normal,
    /// Configuration value
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        let v: Value = 3.5.into();
        assert_eq!(v.as_float(), Some(3.5));
        assert_eq!(v.as_integer(), None);

        let v: Value = 42i64.into();
        assert_eq!(v.as_float(), Some(42.0));
        assert_eq!(v.as_bool(), Some(true));

        let v: Value = "keV".into();
        assert_eq!(v.as_str(), Some("keV"));
        assert!(!v.is_numeric());

        let v: Value = Option::<f64>::None.into();
        assert!(v.is_null());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "-");
        assert_eq!(Value::Float(1.25).to_string(), "1.25");
        assert_eq!(Value::from("mm").to_string(), "mm");
    }

    #[test]
    fn test_value_serde_untagged() {
        let json = serde_json::to_string(&Value::Float(2.0)).unwrap();
        assert_eq!(json, "2.0");
        let v: Value = serde_json::from_str("\"Torr\"").unwrap();
        assert_eq!(v, Value::String("Torr".to_string()));
    }
}
