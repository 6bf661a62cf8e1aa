//! The dialect provider contract.
//!
//! Everything that turns metadata into SQL text goes through
//! [`Dialect`]. Statement shapes shared by all backends live here as
//! default methods; backends implement only the leaves that genuinely
//! differ (quoting, type names, identity retrieval, catalog queries).
//! Implementations live in the driver crates.

use crate::metadata::{ColumnInfo, ForeignKeyInfo, KeyLayout, TableInfo};
use crate::model::HostType;

/// A resolved SQL type name: the bare base name plus the formatted name
/// with sizes applied (`nvarchar` vs `nvarchar(50)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTypeInfo {
    pub base_name: &'static str,
    pub formatted_name: String,
}

impl SqlTypeInfo {
    pub fn new(base_name: &'static str) -> Self {
        Self {
            base_name,
            formatted_name: base_name.to_string(),
        }
    }

    pub fn sized(base_name: &'static str, formatted_name: String) -> Self {
        Self {
            base_name,
            formatted_name,
        }
    }
}

/// A database backend: identifier quoting, type mapping, and the
/// backend-specific corners of statement and catalog-query text.
pub trait Dialect {
    fn name(&self) -> &'static str;

    /// Quotes a single identifier part (no dots).
    fn quote_part(&self, part: &str) -> String;

    fn supports_schemas(&self) -> bool;

    fn default_schema(&self) -> &'static str;

    /// Line-comment prefix, used by the script emitter.
    fn comment_prefix(&self) -> &'static str;

    /// The column-definition fragment that makes the identity column
    /// autoincrementing.
    fn identity_column_syntax(&self) -> &'static str;

    /// The canonical type table. `None` means the host type is not
    /// representable on this backend and mapping must fail.
    fn sql_type(&self, host: HostType, length: u16, precision: u8, scale: u8)
        -> Option<SqlTypeInfo>;

    /// Expands a catalog-reported base type name into a fully sized
    /// type string, folding the reported length/precision/scale in
    /// (`nvarchar` + byte length 8000 → `nvarchar(max)`).
    fn expand_catalog_type(&self, base: &str, byte_length: i32, precision: u8, scale: u8)
        -> String;

    /// Insert returning the generated identity value; retrieval syntax
    /// is backend-specific.
    fn insert_command(&self, table: &TableInfo, columns: &[ColumnInfo], key: &KeyLayout)
        -> String;

    fn drop_foreign_key_sql(&self, key: &ForeignKeyInfo) -> String;

    /// Catalog query returning `Schema`, `Name`, `RowCount` rows.
    fn schema_tables_sql(&self, exclude_schemas: &[String]) -> String;

    /// Catalog query returning the column shape described in the
    /// crate docs (`Schema`, `TableName`, `ColumnName`, `DataType`,
    /// `ByteLength`, `IsNullable`, `Precision`, `Scale`, `Collation`,
    /// `IsCalculated`, `Expression`, and the `Referenced*` /
    /// `ForeignKeyConstraint` / `CascadeDelete` FK fields).
    fn schema_columns_sql(&self, exclude_schemas: &[String]) -> String;

    /// Catalog query returning the foreign keys referencing the table
    /// bound as `@schema` / `@table`, as `ConstraintName`,
    /// `Referenced*`, `Referencing*`, `CascadeDelete` rows.
    fn dependent_foreign_keys_sql(&self) -> String;

    /// Scalar existence probe for a schema, bound as `@name`.
    fn schema_exists_sql(&self) -> String;

    /// Scalar existence probe for a table, bound as `@schema` / `@name`.
    fn table_exists_sql(&self) -> String;

    // ---- shared statement shapes --------------------------------

    /// Quotes a possibly dotted identifier part-by-part.
    fn apply_delimiter(&self, name: &str) -> String {
        name.split('.')
            .map(|part| self.quote_part(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Canonical form of a column's type for comparison purposes.
    /// Model-sourced columns already carry sizes; catalog-sourced ones
    /// are expanded from the reported length fields.
    fn normalize_type(&self, column: &ColumnInfo) -> String {
        let data_type = column.data_type.to_ascii_lowercase();
        if data_type.contains('(') {
            data_type
        } else {
            self.expand_catalog_type(
                &data_type,
                column.byte_length,
                column.precision,
                column.scale,
            )
        }
    }

    /// One column definition inside CREATE TABLE / ADD / ALTER.
    fn column_syntax(&self, column: &ColumnInfo, is_identity: bool) -> String {
        let name = self.quote_part(&column.column_name);
        if column.calculated {
            let expression = column.expression.as_deref().unwrap_or_default();
            return if column.persisted {
                format!("{name} AS {expression} PERSISTED")
            } else {
                format!("{name} AS {expression}")
            };
        }
        let null_syntax = if column.nullable { "NULL" } else { "NOT NULL" };
        let mut data_type = column.data_type.clone();
        if is_identity {
            data_type.push(' ');
            data_type.push_str(self.identity_column_syntax());
        }
        format!("{name} {data_type} {null_syntax}")
    }

    /// Full CREATE TABLE text, with deterministically named primary-key
    /// and unique constraints (`PK_<schema>_<table>` / `U_<schema>_<table>`)
    /// so reruns produce identical DDL.
    fn create_table_sql(&self, table: &TableInfo, columns: &[ColumnInfo], key: &KeyLayout)
        -> String {
        let stem = table.constraint_stem();
        let mut members: Vec<String> = columns
            .iter()
            .map(|col| {
                let is_identity = key
                    .identity_column
                    .as_deref()
                    .is_some_and(|id| id.eq_ignore_ascii_case(&col.column_name));
                self.column_syntax(col, is_identity)
            })
            .collect();

        let pk_columns = key
            .primary_key_columns
            .iter()
            .map(|c| self.quote_part(c))
            .collect::<Vec<_>>()
            .join(", ");
        members.push(format!(
            "CONSTRAINT {} PRIMARY KEY ({pk_columns})",
            self.quote_part(&format!("PK_{stem}"))
        ));

        if let Some(identity) = key.identity_column.as_deref() {
            if !key.identity_is_primary_key {
                members.push(format!(
                    "CONSTRAINT {} UNIQUE ({})",
                    self.quote_part(&format!("U_{stem}")),
                    self.quote_part(identity)
                ));
            }
        }

        for col in columns.iter().filter(|c| c.unique) {
            let in_primary_key = key
                .primary_key_columns
                .iter()
                .any(|pk| pk.eq_ignore_ascii_case(&col.column_name));
            let is_identity = key
                .identity_column
                .as_deref()
                .is_some_and(|id| id.eq_ignore_ascii_case(&col.column_name));
            if in_primary_key || is_identity {
                continue;
            }
            members.push(format!(
                "CONSTRAINT {} UNIQUE ({})",
                self.quote_part(&format!("U_{stem}_{}", col.column_name)),
                self.quote_part(&col.column_name)
            ));
        }

        format!(
            "CREATE TABLE {} (\n\t{}\n)",
            self.apply_delimiter(&table.qualified_name()),
            members.join(",\n\t")
        )
    }

    fn create_schema_sql(&self, schema: &str) -> String {
        format!("CREATE SCHEMA {}", self.quote_part(schema))
    }

    /// Column list and matching `@Property` placeholder list for an
    /// insert statement.
    fn insert_components(&self, columns: &[ColumnInfo]) -> (String, String) {
        let column_list = columns
            .iter()
            .map(|c| self.quote_part(&c.column_name))
            .collect::<Vec<_>>()
            .join(", ");
        let value_list = columns
            .iter()
            .map(|c| format!("@{}", c.property_name))
            .collect::<Vec<_>>()
            .join(", ");
        (column_list, value_list)
    }

    /// Insert without identity retrieval; the table name override is
    /// used when appending rows to auxiliary tables.
    fn plain_insert_command(
        &self,
        table: &TableInfo,
        columns: &[ColumnInfo],
        table_name: Option<&str>,
    ) -> String {
        let name = table_name.map_or_else(|| table.qualified_name(), str::to_string);
        let (column_list, value_list) = self.insert_components(columns);
        format!(
            "INSERT INTO {} ({column_list}) VALUES ({value_list})",
            self.apply_delimiter(&name)
        )
    }

    fn update_command(&self, table: &TableInfo, columns: &[ColumnInfo], identity_column: &str)
        -> String {
        let assignments = columns
            .iter()
            .map(|c| format!("{}=@{}", self.quote_part(&c.column_name), c.property_name))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} SET {assignments} WHERE {}=@id",
            self.apply_delimiter(&table.qualified_name()),
            self.quote_part(identity_column)
        )
    }

    fn delete_command(&self, table: &TableInfo, identity_column: &str) -> String {
        format!(
            "DELETE FROM {} WHERE {}=@id",
            self.apply_delimiter(&table.qualified_name()),
            self.quote_part(identity_column)
        )
    }

    fn find_command(&self, table: &TableInfo, columns: &[ColumnInfo], where_clause: &str)
        -> String {
        let column_list = columns
            .iter()
            .map(|c| self.quote_part(&c.column_name))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {column_list} FROM {} WHERE {where_clause}",
            self.apply_delimiter(&table.qualified_name())
        )
    }

    fn add_column_sql(&self, column: &ColumnInfo) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.apply_delimiter(&column.table.qualified_name()),
            self.column_syntax(column, false)
        )
    }

    /// The verb between `ALTER TABLE t` and the column definition.
    fn alter_column_verb(&self) -> &'static str {
        "ALTER COLUMN"
    }

    fn alter_column_sql(&self, column: &ColumnInfo) -> String {
        format!(
            "ALTER TABLE {} {} {}",
            self.apply_delimiter(&column.table.qualified_name()),
            self.alter_column_verb(),
            self.column_syntax(column, false)
        )
    }

    fn drop_column_sql(&self, column: &ColumnInfo) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.apply_delimiter(&column.table.qualified_name()),
            self.quote_part(&column.column_name)
        )
    }

    fn drop_table_sql(&self, table: &TableInfo) -> String {
        format!("DROP TABLE {}", self.apply_delimiter(&table.qualified_name()))
    }

    fn add_foreign_key_sql(&self, key: &ForeignKeyInfo) -> String {
        let mut sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.apply_delimiter(&key.child.table_info().qualified_name()),
            self.quote_part(&key.constraint_name),
            self.quote_part(&key.child.column),
            self.apply_delimiter(&key.parent.table_info().qualified_name()),
            self.quote_part(&key.parent.column),
        );
        if key.cascade_delete {
            sql.push_str(" ON DELETE CASCADE");
        }
        sql
    }
}
