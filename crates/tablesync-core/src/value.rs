//! Values crossing the executor boundary.
//!
//! Statements generated by this crate carry named parameters
//! (`@PropertyName`); the caller-supplied [`Executor`](crate::executor::Executor)
//! binds them. [`Value`] is the closed set of things a parameter or a
//! result cell can hold, and [`Row`] is the shape rows come back in.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Boxed error type used at the executor boundary. Driver errors pass
/// through the core wrapped but otherwise unchanged.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Named statement parameters, in bind order.
pub type Params = Vec<(String, Value)>;

/// A single database value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    TinyInt(u8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Char(char),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Uuid(Uuid),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value counts as "absent" when a model instance is
    /// used as a criteria object: null, the empty string, and the host
    /// type's zero value all mean "don't filter on this column".
    pub fn is_absent(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(_) => false,
            Self::TinyInt(v) => *v == 0,
            Self::SmallInt(v) => *v == 0,
            Self::Int(v) => *v == 0,
            Self::BigInt(v) => *v == 0,
            Self::Float(v) => *v == 0.0,
            Self::Double(v) => *v == 0.0,
            Self::Decimal(v) => v.is_zero(),
            Self::Text(s) => s.is_empty(),
            Self::Char(c) => *c == '\0',
            Self::Bytes(b) => b.is_empty(),
            Self::Date(_) | Self::DateTime(_) | Self::Time(_) => false,
            Self::Uuid(u) => u.is_nil(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::TinyInt(v) => Some(i64::from(*v)),
            Self::SmallInt(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            other => other.as_i64().map(|v| v != 0),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// One result row: ordered `(column, value)` pairs with by-name access.
///
/// This is the materialization boundary. The executor decodes driver
/// rows into this shape; [`Model::from_row`](crate::model::Model::from_row)
/// picks it apart.
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    /// Looks a cell up by column name, case-insensitively.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(col, _)| col.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// String cell, `None` for absent or SQL null.
    pub fn string(&self, name: &str) -> Option<String> {
        self.value(name)?.as_str().map(str::to_string)
    }

    /// Integer cell, coerced from any integral width.
    pub fn int(&self, name: &str) -> Option<i64> {
        self.value(name)?.as_i64()
    }

    /// Boolean cell, coerced from integral bit columns.
    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.value(name)?.as_bool()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.columns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absence_rules_for_criteria() {
        assert!(Value::Null.is_absent());
        assert!(Value::Text(String::new()).is_absent());
        assert!(Value::Int(0).is_absent());
        assert!(Value::Uuid(Uuid::nil()).is_absent());

        assert!(!Value::Text("x".into()).is_absent());
        assert!(!Value::Int(7).is_absent());
        assert!(!Value::Bool(false).is_absent());
        assert!(!Value::Date(NaiveDate::from_ymd_opt(2020, 5, 1).unwrap()).is_absent());
    }

    #[test]
    fn row_lookup_is_case_insensitive() {
        let row = Row::new(vec![
            ("TableName".into(), Value::Text("Employee".into())),
            ("RowCount".into(), Value::BigInt(42)),
            ("IsNullable".into(), Value::TinyInt(1)),
        ]);
        assert_eq!(row.string("tablename").as_deref(), Some("Employee"));
        assert_eq!(row.int("ROWCOUNT"), Some(42));
        assert_eq!(row.boolean("IsNullable"), Some(true));
        assert!(row.value("Missing").is_none());
    }

    #[test]
    fn null_cells_read_as_none() {
        let row = Row::new(vec![("Collation".into(), Value::Null)]);
        assert!(row.string("Collation").is_none());
        assert!(row.int("Collation").is_none());
    }
}
