//! The metadata value types shared by the generators and the merge
//! engine.
//!
//! These are pure data. [`TableInfo`] and [`ColumnInfo`] are produced
//! both by extraction (from model declarations) and by the catalog
//! reader (from the live database); their equality impls are the join
//! keys the diff engine partitions on, so both are case-insensitive
//! over names and ignore everything else.

use std::fmt;

use crate::dialect::Dialect;
use crate::model::SaveActions;

/// One table, identified by `(schema, name)`.
#[derive(Debug, Clone, Default)]
pub struct TableInfo {
    /// Owning schema; empty on dialects without schema support.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Name of the source model type; empty for catalog-sourced tables.
    pub model: String,
    /// Live row count, when the catalog reports one.
    pub row_count: Option<i64>,
}

impl TableInfo {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            model: String::new(),
            row_count: None,
        }
    }

    /// `schema.name`, or just `name` when the schema is empty.
    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }

    /// The qualified name with dots replaced by underscores, used for
    /// deterministic constraint naming.
    pub fn constraint_stem(&self) -> String {
        self.qualified_name().replace('.', "_")
    }

    /// Whether the live table is known to hold no rows.
    pub fn is_empty(&self) -> bool {
        self.row_count == Some(0)
    }
}

impl PartialEq for TableInfo {
    fn eq(&self, other: &Self) -> bool {
        self.schema.eq_ignore_ascii_case(&other.schema) && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for TableInfo {}

impl fmt::Display for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// A `(schema, table, column)` triple, the end of a foreign key.
#[derive(Debug, Clone, Default)]
pub struct ColumnRef {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn table_info(&self) -> TableInfo {
        TableInfo::new(self.schema.clone(), self.table.clone())
    }
}

impl PartialEq for ColumnRef {
    fn eq(&self, other: &Self) -> bool {
        self.schema.eq_ignore_ascii_case(&other.schema)
            && self.table.eq_ignore_ascii_case(&other.table)
            && self.column.eq_ignore_ascii_case(&other.column)
    }
}

impl Eq for ColumnRef {}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.schema.is_empty() {
            write!(f, "{}.{}", self.table, self.column)
        } else {
            write!(f, "{}.{}.{}", self.schema, self.table, self.column)
        }
    }
}

/// A foreign-key constraint between a referencing (child) column and
/// the referenced (parent) identity column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    pub parent: ColumnRef,
    pub child: ColumnRef,
    pub constraint_name: String,
    pub cascade_delete: bool,
}

/// One column, identified by `(schema, table, column)`.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub table: TableInfo,
    /// Source property name; for catalog-sourced columns this equals
    /// the column name.
    pub property_name: String,
    pub column_name: String,
    /// Resolved SQL type. Model-sourced columns carry the formatted
    /// name (explicit override or dialect-inferred, sizes included);
    /// catalog-sourced columns carry the raw base name, with sizes in
    /// the fields below.
    pub data_type: String,
    pub nullable: bool,
    /// Catalog-reported storage length; `-1` is the unbounded marker.
    pub byte_length: i32,
    pub precision: u8,
    pub scale: u8,
    pub collation: Option<String>,
    pub save: SaveActions,
    pub calculated: bool,
    pub expression: Option<String>,
    /// Whether a calculated column's value is stored rather than
    /// computed on read.
    pub persisted: bool,
    /// Column-level unique marker; only meaningful on model-sourced
    /// columns (the catalog reader does not inspect indexes).
    pub unique: bool,
    pub foreign_key: Option<ForeignKeyInfo>,
}

impl ColumnInfo {
    /// A bare catalog-shaped column with everything else defaulted.
    pub fn named(
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        let column = column.into();
        Self {
            table: TableInfo::new(schema, table),
            property_name: column.clone(),
            column_name: column,
            data_type: String::new(),
            nullable: false,
            byte_length: 0,
            precision: 0,
            scale: 0,
            collation: None,
            save: SaveActions::BOTH,
            calculated: false,
            expression: None,
            persisted: false,
            unique: false,
            foreign_key: None,
        }
    }

    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key.is_some()
    }

    /// Whether this column differs from its live counterpart in a way
    /// that requires DDL: after normalizing both sides' type strings
    /// through the dialect, any of type, nullability, or the
    /// calculated flag/expression differ.
    pub fn is_altered_from(&self, live: &Self, dialect: &dyn Dialect) -> bool {
        if self.calculated != live.calculated {
            return true;
        }
        if self.calculated {
            let own = self.expression.as_deref().unwrap_or_default().trim();
            let theirs = live.expression.as_deref().unwrap_or_default().trim();
            return !own.eq_ignore_ascii_case(theirs);
        }
        if self.nullable != live.nullable {
            return true;
        }
        dialect.normalize_type(self) != dialect.normalize_type(live)
    }
}

impl PartialEq for ColumnInfo {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.column_name.eq_ignore_ascii_case(&other.column_name)
    }
}

impl Eq for ColumnInfo {}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column_name)
    }
}

/// Key structure of an extracted model table.
#[derive(Debug, Clone)]
pub struct KeyLayout {
    /// The identity column name; `None` only for the change-tracking
    /// bookkeeping tables, which have composite keys and no identity.
    pub identity_column: Option<String>,
    /// The identity property name, for `@id`-style parameter lookups.
    pub identity_property: Option<String>,
    /// Primary-key column names; falls back to the identity column when
    /// no explicit primary key is declared.
    pub primary_key_columns: Vec<String>,
    /// When `true`, no separate unique constraint on the identity
    /// column is needed.
    pub identity_is_primary_key: bool,
}

/// The referenced side of a foreign key, resolved from the parent
/// model's declaration.
#[derive(Debug, Clone)]
pub struct ParentTable {
    pub table: TableInfo,
    pub identity_column: String,
    /// The parent model's label-lookup query, when it declares one.
    pub dereference: Option<&'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_equality_is_case_insensitive() {
        let a = TableInfo::new("dbo", "Employee");
        let b = TableInfo::new("DBO", "employee");
        let c = TableInfo::new("hr", "Employee");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn table_equality_ignores_row_count_and_model() {
        let mut a = TableInfo::new("dbo", "Employee");
        a.model = "Employee".into();
        let mut b = TableInfo::new("dbo", "Employee");
        b.row_count = Some(10);
        assert_eq!(a, b);
    }

    #[test]
    fn column_equality_is_the_schema_table_column_triple() {
        let a = ColumnInfo::named("dbo", "Employee", "FirstName");
        let b = ColumnInfo::named("DBO", "EMPLOYEE", "firstname");
        let c = ColumnInfo::named("dbo", "Employee", "LastName");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn qualified_names() {
        assert_eq!(TableInfo::new("dbo", "Employee").qualified_name(), "dbo.Employee");
        assert_eq!(TableInfo::new("", "Employee").qualified_name(), "Employee");
        assert_eq!(TableInfo::new("dbo", "Employee").constraint_stem(), "dbo_Employee");
    }

    #[test]
    fn empty_table_detection() {
        let mut t = TableInfo::new("dbo", "Employee");
        assert!(!t.is_empty());
        t.row_count = Some(0);
        assert!(t.is_empty());
        t.row_count = Some(5);
        assert!(!t.is_empty());
    }
}
