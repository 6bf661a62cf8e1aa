//! Test support: a scriptable in-memory executor and a plain ANSI-ish
//! dialect.
//!
//! Everything that would otherwise need a live database in this
//! workspace's tests runs against [`ScriptedExecutor`], which records
//! every statement and replays queued responses.

use std::collections::VecDeque;

use crate::dialect::{Dialect, SqlTypeInfo};
use crate::executor::Executor;
use crate::metadata::{ColumnInfo, ForeignKeyInfo, KeyLayout, TableInfo};
use crate::model::HostType;
use crate::value::{BoxError, Params, Row, Value};

/// An [`Executor`] that records statements and replays queued
/// responses. Defaults: queries yield no rows, scalars yield `None`,
/// executes affect one row.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scalars: VecDeque<Option<Value>>,
    row_sets: VecDeque<Vec<Row>>,
    affected: VecDeque<Result<u64, String>>,
    /// Every `execute` call, in order.
    pub executed: Vec<(String, Params)>,
    /// Every `query`/`query_scalar` call, in order.
    pub queried: Vec<(String, Params)>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next `query_scalar` response.
    pub fn push_scalar(&mut self, value: Option<Value>) {
        self.scalars.push_back(value);
    }

    /// Queues the next `query` response.
    pub fn push_rows(&mut self, rows: Vec<Row>) {
        self.row_sets.push_back(rows);
    }

    /// Queues the next `execute` affected-row count.
    pub fn push_affected(&mut self, affected: u64) {
        self.affected.push_back(Ok(affected));
    }

    /// Queues a failure for the next `execute` call.
    pub fn push_execute_error(&mut self, message: impl Into<String>) {
        self.affected.push_back(Err(message.into()));
    }

    /// Statements executed against a given table name.
    pub fn executed_against<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a String> {
        self.executed
            .iter()
            .map(|(sql, _)| sql)
            .filter(move |sql| sql.contains(table))
    }
}

impl Executor for ScriptedExecutor {
    async fn execute(&mut self, sql: &str, params: &[(String, Value)]) -> Result<u64, BoxError> {
        self.executed.push((sql.to_string(), params.to_vec()));
        match self.affected.pop_front() {
            Some(Ok(n)) => Ok(n),
            Some(Err(message)) => Err(message.into()),
            None => Ok(1),
        }
    }

    async fn query(&mut self, sql: &str, params: &[(String, Value)]) -> Result<Vec<Row>, BoxError> {
        self.queried.push((sql.to_string(), params.to_vec()));
        Ok(self.row_sets.pop_front().unwrap_or_default())
    }

    async fn query_scalar(
        &mut self,
        sql: &str,
        params: &[(String, Value)],
    ) -> Result<Option<Value>, BoxError> {
        self.queried.push((sql.to_string(), params.to_vec()));
        Ok(self.scalars.pop_front().unwrap_or_default())
    }
}

/// A schema-supporting dialect with double-quoted identifiers and
/// unsurprising type names, for tests that don't care which real
/// backend they run against. `Uuid` is deliberately unsupported so
/// mapping failures can be exercised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TestDialect;

impl Dialect for TestDialect {
    fn name(&self) -> &'static str {
        "test"
    }

    fn quote_part(&self, part: &str) -> String {
        format!("\"{part}\"")
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
        let sized_text = if length == 0 {
            "varchar(max)".to_string()
        } else {
            format!("varchar({length})")
        };
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
            HostType::Text => SqlTypeInfo::sized("varchar", sized_text),
            HostType::Char => SqlTypeInfo::sized("char", "char(1)".to_string()),
            HostType::Bytes => SqlTypeInfo::sized("varbinary", format!("varbinary({length})")),
            HostType::Date => SqlTypeInfo::new("date"),
            HostType::DateTime => SqlTypeInfo::new("datetime"),
            HostType::Time => SqlTypeInfo::new("time"),
            HostType::Uuid => return None,
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
            "varchar" | "varbinary" => {
                if byte_length < 0 || byte_length >= 8000 {
                    format!("{base}(max)")
                } else {
                    format!("{base}({byte_length})")
                }
            }
            "decimal" | "numeric" => format!("decimal({precision}, {scale})"),
            _ => base.to_string(),
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
            "INSERT INTO {} ({column_list}) VALUES ({value_list}) RETURNING {}",
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

    fn schema_tables_sql(&self, _exclude_schemas: &[String]) -> String {
        "SELECT schema_name AS Schema, table_name AS Name, 0 AS RowCount FROM catalog_tables"
            .to_string()
    }

    fn schema_columns_sql(&self, _exclude_schemas: &[String]) -> String {
        "SELECT * FROM catalog_columns".to_string()
    }

    fn dependent_foreign_keys_sql(&self) -> String {
        "SELECT * FROM catalog_foreign_keys WHERE referenced_schema=@schema AND referenced_table=@table"
            .to_string()
    }

    fn schema_exists_sql(&self) -> String {
        "SELECT 1 FROM catalog_schemas WHERE schema_name=@name".to_string()
    }

    fn table_exists_sql(&self) -> String {
        "SELECT 1 FROM catalog_tables WHERE schema_name=@schema AND table_name=@name".to_string()
    }
}
