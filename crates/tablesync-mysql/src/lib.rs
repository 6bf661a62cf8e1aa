//! # tablesync-mysql
//!
//! MySQL dialect: backtick-quoted identifiers, `auto_increment`
//! identity columns, no schema support (the connected database is the
//! namespace), catalog reads against `information_schema`, and identity
//! retrieval via `LAST_INSERT_ID()`.

use tablesync_core::dialect::{Dialect, SqlTypeInfo};
use tablesync_core::metadata::{ColumnInfo, ForeignKeyInfo, KeyLayout, TableInfo};
use tablesync_core::model::HostType;

/// MySQL dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct MysqlDialect;

impl MysqlDialect {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_part(&self, part: &str) -> String {
        format!("`{part}`")
    }

    fn supports_schemas(&self) -> bool {
        false
    }

    fn default_schema(&self) -> &'static str {
        ""
    }

    fn comment_prefix(&self) -> &'static str {
        "# "
    }

    fn identity_column_syntax(&self) -> &'static str {
        "auto_increment"
    }

    fn alter_column_verb(&self) -> &'static str {
        "MODIFY COLUMN"
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
            HostType::TinyInt => SqlTypeInfo::new("tinyint unsigned"),
            HostType::SmallInt => SqlTypeInfo::new("smallint"),
            HostType::Int | HostType::IntEnum => SqlTypeInfo::new("int"),
            HostType::BigInt => SqlTypeInfo::new("bigint"),
            HostType::Float => SqlTypeInfo::new("float"),
            HostType::Double => SqlTypeInfo::new("double"),
            HostType::Decimal => {
                let (p, s) = if precision == 0 { (18, 0) } else { (precision, scale) };
                SqlTypeInfo::sized("decimal", format!("decimal({p}, {s})"))
            }
            // varchar has no max form; unsized strings become text.
            HostType::Text => {
                if length == 0 {
                    SqlTypeInfo::new("text")
                } else {
                    SqlTypeInfo::sized("varchar", format!("varchar({length})"))
                }
            }
            HostType::Char => SqlTypeInfo::sized("char", "char(1)".to_string()),
            HostType::Bytes => {
                if length == 0 {
                    SqlTypeInfo::new("blob")
                } else {
                    SqlTypeInfo::sized("varbinary", format!("varbinary({length})"))
                }
            }
            HostType::Date => SqlTypeInfo::new("date"),
            HostType::DateTime => SqlTypeInfo::new("datetime"),
            HostType::Time => SqlTypeInfo::new("time"),
            HostType::Uuid => SqlTypeInfo::sized("char", "char(36)".to_string()),
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
            "varchar" | "varbinary" => format!("{base}({byte_length})"),
            "char" | "binary" => format!("{base}({byte_length})"),
            "decimal" | "numeric" => format!("decimal({precision}, {scale})"),
            other => other.to_string(),
        }
    }

    fn insert_command(
        &self,
        table: &TableInfo,
        columns: &[ColumnInfo],
        _key: &KeyLayout,
    ) -> String {
        let (column_list, value_list) = self.insert_components(columns);
        format!(
            "INSERT INTO {} ({column_list}) VALUES ({value_list}); SELECT LAST_INSERT_ID()",
            self.apply_delimiter(&table.qualified_name())
        )
    }

    fn drop_foreign_key_sql(&self, key: &ForeignKeyInfo) -> String {
        format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            self.apply_delimiter(&key.child.table_info().qualified_name()),
            self.quote_part(&key.constraint_name)
        )
    }

    fn schema_tables_sql(&self, _exclude_schemas: &[String]) -> String {
        // The connected database is the only namespace; schema
        // exclusion does not apply.
        "SELECT\n\
         \t'' AS `Schema`, `TABLE_NAME` AS `Name`, `TABLE_ROWS` AS `RowCount`\n\
         FROM\n\
         \t`information_schema`.`TABLES`\n\
         WHERE\n\
         \t`TABLE_SCHEMA`=DATABASE() AND `TABLE_TYPE`='BASE TABLE'"
            .to_string()
    }

    fn schema_columns_sql(&self, _exclude_schemas: &[String]) -> String {
        "SELECT\n\
         \t'' AS `Schema`,\n\
         \t`c`.`TABLE_NAME` AS `TableName`, `c`.`COLUMN_NAME` AS `ColumnName`,\n\
         \t`c`.`DATA_TYPE` AS `DataType`,\n\
         \t`c`.`CHARACTER_MAXIMUM_LENGTH` AS `ByteLength`,\n\
         \t(`c`.`IS_NULLABLE`='YES') AS `IsNullable`,\n\
         \t`c`.`NUMERIC_PRECISION` AS `Precision`,\n\
         \t`c`.`NUMERIC_SCALE` AS `Scale`,\n\
         \t`c`.`COLLATION_NAME` AS `Collation`,\n\
         \t(`c`.`GENERATION_EXPRESSION` IS NOT NULL AND `c`.`GENERATION_EXPRESSION`<>'') \
         AS `IsCalculated`,\n\
         \tNULLIF(`c`.`GENERATION_EXPRESSION`, '') AS `Expression`,\n\
         \t'' AS `ReferencedSchema`,\n\
         \t`kcu`.`REFERENCED_TABLE_NAME` AS `ReferencedTable`,\n\
         \t`kcu`.`REFERENCED_COLUMN_NAME` AS `ReferencedColumn`,\n\
         \t`kcu`.`CONSTRAINT_NAME` AS `ForeignKeyConstraint`,\n\
         \t(`rc`.`DELETE_RULE`='CASCADE') AS `CascadeDelete`\n\
         FROM\n\
         \t`information_schema`.`COLUMNS` `c`\n\
         \tLEFT JOIN `information_schema`.`KEY_COLUMN_USAGE` `kcu` ON\n\
         \t\t`kcu`.`TABLE_SCHEMA`=`c`.`TABLE_SCHEMA` AND\n\
         \t\t`kcu`.`TABLE_NAME`=`c`.`TABLE_NAME` AND\n\
         \t\t`kcu`.`COLUMN_NAME`=`c`.`COLUMN_NAME` AND\n\
         \t\t`kcu`.`REFERENCED_TABLE_NAME` IS NOT NULL\n\
         \tLEFT JOIN `information_schema`.`REFERENTIAL_CONSTRAINTS` `rc` ON\n\
         \t\t`rc`.`CONSTRAINT_SCHEMA`=`kcu`.`TABLE_SCHEMA` AND\n\
         \t\t`rc`.`CONSTRAINT_NAME`=`kcu`.`CONSTRAINT_NAME`\n\
         WHERE\n\
         \t`c`.`TABLE_SCHEMA`=DATABASE()"
            .to_string()
    }

    fn dependent_foreign_keys_sql(&self) -> String {
        "SELECT\n\
         \t`kcu`.`CONSTRAINT_NAME` AS `ConstraintName`,\n\
         \t'' AS `ReferencedSchema`,\n\
         \t`kcu`.`REFERENCED_TABLE_NAME` AS `ReferencedTable`,\n\
         \t`kcu`.`REFERENCED_COLUMN_NAME` AS `ReferencedColumn`,\n\
         \t'' AS `ReferencingSchema`,\n\
         \t`kcu`.`TABLE_NAME` AS `ReferencingTable`,\n\
         \t`kcu`.`COLUMN_NAME` AS `ReferencingColumn`,\n\
         \t(`rc`.`DELETE_RULE`='CASCADE') AS `CascadeDelete`\n\
         FROM\n\
         \t`information_schema`.`KEY_COLUMN_USAGE` `kcu`\n\
         \tINNER JOIN `information_schema`.`REFERENTIAL_CONSTRAINTS` `rc` ON\n\
         \t\t`rc`.`CONSTRAINT_SCHEMA`=`kcu`.`TABLE_SCHEMA` AND\n\
         \t\t`rc`.`CONSTRAINT_NAME`=`kcu`.`CONSTRAINT_NAME`\n\
         WHERE\n\
         \t`kcu`.`TABLE_SCHEMA`=DATABASE() AND `kcu`.`REFERENCED_TABLE_NAME`=@table"
            .to_string()
    }

    fn schema_exists_sql(&self) -> String {
        "SELECT 1 FROM `information_schema`.`SCHEMATA` WHERE `SCHEMA_NAME`=@name".to_string()
    }

    fn table_exists_sql(&self) -> String {
        "SELECT 1 FROM `information_schema`.`TABLES` \
         WHERE `TABLE_SCHEMA`=DATABASE() AND `TABLE_NAME`=@name"
            .to_string()
    }
}
