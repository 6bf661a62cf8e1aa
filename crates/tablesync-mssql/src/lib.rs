//! # tablesync-mssql
//!
//! SQL Server dialect: bracket-quoted identifiers, `identity(1,1)`
//! identity columns, schema support with `dbo` as the default, catalog
//! reads against the `sys.*` views, and identity retrieval through an
//! `OUTPUT [inserted]` clause.

use tablesync_core::dialect::{Dialect, SqlTypeInfo};
use tablesync_core::metadata::{ColumnInfo, ForeignKeyInfo, KeyLayout, TableInfo};
use tablesync_core::model::HostType;

/// SQL Server dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct MssqlDialect;

impl MssqlDialect {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// `nvarchar`/`varbinary` at or beyond this byte length report as the
/// `max` form.
const MAX_BYTE_LENGTH: i32 = 8000;

fn schema_criteria(exclude_schemas: &[String]) -> String {
    if exclude_schemas.is_empty() {
        return String::new();
    }
    let list = exclude_schemas
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" AND SCHEMA_NAME([t].[schema_id]) NOT IN ({list})")
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quote_part(&self, part: &str) -> String {
        format!("[{part}]")
    }

    fn supports_schemas(&self) -> bool {
        true
    }

    fn default_schema(&self) -> &'static str {
        "dbo"
    }

    fn comment_prefix(&self) -> &'static str {
        "-- "
    }

    fn identity_column_syntax(&self) -> &'static str {
        "identity(1,1)"
    }

    fn sql_type(
        &self,
        host: HostType,
        length: u16,
        precision: u8,
        scale: u8,
    ) -> Option<SqlTypeInfo> {
        Some(match host {
            HostType::Bool => SqlTypeInfo::new("bit"),
            HostType::TinyInt => SqlTypeInfo::new("tinyint"),
            HostType::SmallInt => SqlTypeInfo::new("smallint"),
            HostType::Int | HostType::IntEnum => SqlTypeInfo::new("int"),
            HostType::BigInt => SqlTypeInfo::new("bigint"),
            HostType::Float | HostType::Double => SqlTypeInfo::new("float"),
            HostType::Decimal => {
                let (p, s) = if precision == 0 { (18, 0) } else { (precision, scale) };
                SqlTypeInfo::sized("decimal", format!("decimal({p}, {s})"))
            }
            HostType::Text => {
                let size = if length == 0 {
                    "max".to_string()
                } else {
                    length.to_string()
                };
                SqlTypeInfo::sized("nvarchar", format!("nvarchar({size})"))
            }
            HostType::Char => SqlTypeInfo::sized("char", "char(1)".to_string()),
            HostType::Bytes => {
                let size = if length == 0 {
                    "max".to_string()
                } else {
                    length.to_string()
                };
                SqlTypeInfo::sized("varbinary", format!("varbinary({size})"))
            }
            HostType::Date => SqlTypeInfo::new("date"),
            HostType::DateTime => SqlTypeInfo::new("datetime"),
            HostType::Time => SqlTypeInfo::new("time"),
            HostType::Uuid => SqlTypeInfo::new("uniqueidentifier"),
        })
    }

    fn expand_catalog_type(
        &self,
        base: &str,
        byte_length: i32,
        precision: u8,
        scale: u8,
    ) -> String {
        match base {
            // sys.columns reports nvarchar lengths in bytes, two per
            // character; -1 marks the max form.
            "nvarchar" | "nchar" => {
                if byte_length < 0 || byte_length >= MAX_BYTE_LENGTH {
                    format!("{base}(max)")
                } else {
                    format!("{base}({})", byte_length / 2)
                }
            }
            "varchar" | "varbinary" => {
                if byte_length < 0 || byte_length >= MAX_BYTE_LENGTH {
                    format!("{base}(max)")
                } else {
                    format!("{base}({byte_length})")
                }
            }
            "char" | "binary" => format!("{base}({byte_length})"),
            "decimal" | "numeric" => format!("decimal({precision}, {scale})"),
            other => other.to_string(),
        }
    }

    fn insert_command(
        &self,
        table: &TableInfo,
        columns: &[ColumnInfo],
        key: &KeyLayout,
    ) -> String {
        let (column_list, value_list) = self.insert_components(columns);
        let identity = key.identity_column.as_deref().unwrap_or_default();
        format!(
            "INSERT INTO {} ({column_list}) OUTPUT [inserted].{} VALUES ({value_list})",
            self.apply_delimiter(&table.qualified_name()),
            self.quote_part(identity)
        )
    }

    fn drop_foreign_key_sql(&self, key: &ForeignKeyInfo) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.apply_delimiter(&key.child.table_info().qualified_name()),
            self.quote_part(&key.constraint_name)
        )
    }

    fn schema_tables_sql(&self, exclude_schemas: &[String]) -> String {
        format!(
            "SELECT\n\
             \tSCHEMA_NAME([t].[schema_id]) AS [Schema], [t].[name] AS [Name],\n\
             \t(SELECT SUM(row_count) FROM [sys].[dm_db_partition_stats] \
             WHERE [object_id]=[t].[object_id] AND ([index_id]=0 OR [index_id]=1)) AS [RowCount]\n\
             FROM\n\
             \t[sys].[tables] [t]\n\
             WHERE\n\
             \t[t].[is_ms_shipped]=0{}",
            schema_criteria(exclude_schemas)
        )
    }

    fn schema_columns_sql(&self, exclude_schemas: &[String]) -> String {
        format!(
            "SELECT\n\
             \tSCHEMA_NAME([t].[schema_id]) AS [Schema],\n\
             \t[t].[name] AS [TableName], [c].[name] AS [ColumnName],\n\
             \tTYPE_NAME([c].[system_type_id]) AS [DataType],\n\
             \t[c].[max_length] AS [ByteLength],\n\
             \t[c].[is_nullable] AS [IsNullable],\n\
             \t[c].[precision] AS [Precision],\n\
             \t[c].[scale] AS [Scale],\n\
             \t[c].[collation_name] AS [Collation],\n\
             \t[c].[is_computed] AS [IsCalculated],\n\
             \tSCHEMA_NAME([parentTbl].[schema_id]) AS [ReferencedSchema],\n\
             \t[parentTbl].[name] AS [ReferencedTable],\n\
             \t[parentCol].[name] AS [ReferencedColumn],\n\
             \t[fk].[name] AS [ForeignKeyConstraint],\n\
             \tCONVERT(bit, CASE [fk].[delete_referential_action] WHEN 1 THEN 1 ELSE 0 END) \
             AS [CascadeDelete],\n\
             \t[ccol].[definition] AS [Expression]\n\
             FROM\n\
             \t[sys].[tables] [t] INNER JOIN [sys].[columns] [c] ON [t].[object_id]=[c].[object_id]\n\
             \tLEFT JOIN [sys].[foreign_key_columns] [fkcol] ON\n\
             \t\t[c].[object_id]=[fkcol].[parent_object_id] AND\n\
             \t\t[c].[column_id]=[fkcol].[parent_column_id]\n\
             \tLEFT JOIN [sys].[foreign_keys] [fk] ON [fkcol].[constraint_object_id]=[fk].[object_id]\n\
             \tLEFT JOIN [sys].[computed_columns] [ccol] ON\n\
             \t\t[c].[object_id]=[ccol].[object_id] AND [c].[name]=[ccol].[name]\n\
             \tLEFT JOIN [sys].[columns] [parentCol] ON\n\
             \t\t[fkcol].[referenced_object_id]=[parentCol].[object_id] AND\n\
             \t\t[fkcol].[referenced_column_id]=[parentCol].[column_id]\n\
             \tLEFT JOIN [sys].[tables] [parentTbl] ON [parentCol].[object_id]=[parentTbl].[object_id]\n\
             WHERE\n\
             \t[t].[is_ms_shipped]=0{}",
            schema_criteria(exclude_schemas)
        )
    }

    fn dependent_foreign_keys_sql(&self) -> String {
        "SELECT\n\
         \t[fk].[name] AS [ConstraintName],\n\
         \tSCHEMA_NAME([parent].[schema_id]) AS [ReferencedSchema],\n\
         \t[parent].[name] AS [ReferencedTable],\n\
         \t[refdcol].[name] AS [ReferencedColumn],\n\
         \tSCHEMA_NAME([child].[schema_id]) AS [ReferencingSchema],\n\
         \t[child].[name] AS [ReferencingTable],\n\
         \t[rfincol].[name] AS [ReferencingColumn],\n\
         \tCONVERT(bit, CASE [fk].[delete_referential_action] WHEN 1 THEN 1 ELSE 0 END) \
         AS [CascadeDelete]\n\
         FROM\n\
         \t[sys].[foreign_keys] [fk] INNER JOIN [sys].[tables] [child] ON \
         [fk].[parent_object_id]=[child].[object_id]\n\
         \tINNER JOIN [sys].[tables] [parent] ON [fk].[referenced_object_id]=[parent].[object_id]\n\
         \tINNER JOIN [sys].[foreign_key_columns] [fkcol] ON\n\
         \t\t[fk].[parent_object_id]=[fkcol].[parent_object_id] AND\n\
         \t\t[fk].[object_id]=[fkcol].[constraint_object_id]\n\
         \tINNER JOIN [sys].[columns] [refdcol] ON\n\
         \t\t[fkcol].[referenced_column_id]=[refdcol].[column_id] AND\n\
         \t\t[fkcol].[referenced_object_id]=[refdcol].[object_id]\n\
         \tINNER JOIN [sys].[columns] [rfincol] ON\n\
         \t\t[fkcol].[parent_column_id]=[rfincol].[column_id] AND\n\
         \t\t[fkcol].[parent_object_id]=[rfincol].[object_id]\n\
         WHERE\n\
         \t[fk].[referenced_object_id]=OBJECT_ID(@schema+'.'+@table)"
            .to_string()
    }

    fn schema_exists_sql(&self) -> String {
        "SELECT 1 FROM [sys].[schemas] WHERE [name]=@name".to_string()
    }

    fn table_exists_sql(&self) -> String {
        "SELECT 1 FROM [sys].[tables] WHERE SCHEMA_NAME([schema_id])=@schema AND [name]=@name"
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablesync_core::metadata::ColumnRef;

    #[test]
    fn delimits_each_part_of_a_dotted_name() {
        let dialect = MssqlDialect::new();
        assert_eq!(dialect.apply_delimiter("dbo.Employee"), "[dbo].[Employee]");
        assert_eq!(dialect.apply_delimiter("Employee"), "[Employee]");
    }

    #[test]
    fn unsized_strings_map_to_nvarchar_max() {
        let dialect = MssqlDialect::new();
        let unsized_text = dialect.sql_type(HostType::Text, 0, 0, 0).unwrap();
        assert_eq!(unsized_text.formatted_name, "nvarchar(max)");
        let sized = dialect.sql_type(HostType::Text, 50, 0, 0).unwrap();
        assert_eq!(sized.formatted_name, "nvarchar(50)");
    }

    #[test]
    fn unsized_decimals_get_explicit_precision() {
        let dialect = MssqlDialect::new();
        let plain = dialect.sql_type(HostType::Decimal, 0, 0, 0).unwrap();
        assert_eq!(plain.formatted_name, "decimal(18, 0)");
        let sized = dialect.sql_type(HostType::Decimal, 0, 10, 2).unwrap();
        assert_eq!(sized.formatted_name, "decimal(10, 2)");
    }

    #[test]
    fn catalog_nvarchar_lengths_fold_into_the_type() {
        let dialect = MssqlDialect::new();
        // Reported byte length is twice the character count.
        assert_eq!(dialect.expand_catalog_type("nvarchar", 100, 0, 0), "nvarchar(50)");
        // Both the -1 marker and the 8000-byte ceiling mean max.
        assert_eq!(dialect.expand_catalog_type("nvarchar", -1, 0, 0), "nvarchar(max)");
        assert_eq!(dialect.expand_catalog_type("nvarchar", 8000, 0, 0), "nvarchar(max)");
        assert_eq!(dialect.expand_catalog_type("decimal", 9, 10, 2), "decimal(10, 2)");
        assert_eq!(dialect.expand_catalog_type("int", 4, 10, 0), "int");
    }

    #[test]
    fn live_max_length_equals_unsized_declaration() {
        let dialect = MssqlDialect::new();

        let mut declared = ColumnInfo::named("dbo", "Employee", "Notes");
        declared.data_type = "nvarchar(max)".into();

        let mut live = ColumnInfo::named("dbo", "Employee", "Notes");
        live.data_type = "nvarchar".into();
        live.byte_length = 8000;

        assert!(!declared.is_altered_from(&live, &dialect));

        live.byte_length = 100;
        assert!(declared.is_altered_from(&live, &dialect));
    }

    #[test]
    fn foreign_key_statements() {
        let dialect = MssqlDialect::new();
        let key = ForeignKeyInfo {
            parent: ColumnRef::new("dbo", "Organization", "Id"),
            child: ColumnRef::new("dbo", "Employee", "OrganizationId"),
            constraint_name: "FK_dbo_Employee_OrganizationId".into(),
            cascade_delete: true,
        };
        assert_eq!(
            dialect.add_foreign_key_sql(&key),
            "ALTER TABLE [dbo].[Employee] ADD CONSTRAINT [FK_dbo_Employee_OrganizationId] \
             FOREIGN KEY ([OrganizationId]) REFERENCES [dbo].[Organization] ([Id]) \
             ON DELETE CASCADE"
        );
        assert_eq!(
            dialect.drop_foreign_key_sql(&key),
            "ALTER TABLE [dbo].[Employee] DROP CONSTRAINT [FK_dbo_Employee_OrganizationId]"
        );
    }

    #[test]
    fn excluded_schemas_reach_the_catalog_query() {
        let dialect = MssqlDialect::new();
        let sql = dialect.schema_tables_sql(&["changes".to_string(), "meta".to_string()]);
        assert!(sql.contains("NOT IN ('changes', 'meta')"));

        let sql = dialect.schema_tables_sql(&[]);
        assert!(!sql.contains("NOT IN"));
    }
}
