//! Live catalog reading.
//!
//! The dialect supplies the catalog queries; this module runs them and
//! decodes the rows into the shared metadata types. The merge engine
//! only ever sees structured metadata, never SQL text.

use crate::dialect::Dialect;
use crate::error::MergeError;
use crate::executor::Executor;
use crate::metadata::{ColumnInfo, ColumnRef, ForeignKeyInfo, TableInfo};
use crate::value::{BoxError, Row, Value};

/// Reads tables, columns, and foreign keys from the target database.
pub struct CatalogReader<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> CatalogReader<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Live tables, minus the excluded schemas.
    pub async fn tables<E: Executor>(
        &self,
        executor: &mut E,
        exclude_schemas: &[String],
    ) -> Result<Vec<TableInfo>, MergeError> {
        let sql = self.dialect.schema_tables_sql(exclude_schemas);
        let rows = executor
            .query(&sql, &[])
            .await
            .map_err(|source| MergeError::Catalog { sql, source })?;
        rows.iter().map(decode_table).collect()
    }

    /// Live columns (with inline foreign-key data), minus the excluded
    /// schemas.
    pub async fn columns<E: Executor>(
        &self,
        executor: &mut E,
        exclude_schemas: &[String],
    ) -> Result<Vec<ColumnInfo>, MergeError> {
        let sql = self.dialect.schema_columns_sql(exclude_schemas);
        let rows = executor
            .query(&sql, &[])
            .await
            .map_err(|source| MergeError::Catalog { sql, source })?;
        rows.iter().map(decode_column).collect()
    }

    /// Foreign keys referencing the given table.
    pub async fn dependent_foreign_keys<E: Executor>(
        &self,
        executor: &mut E,
        table: &TableInfo,
    ) -> Result<Vec<ForeignKeyInfo>, MergeError> {
        let sql = self.dialect.dependent_foreign_keys_sql();
        let params = vec![
            ("schema".to_string(), Value::Text(table.schema.clone())),
            ("table".to_string(), Value::Text(table.name.clone())),
        ];
        let rows = executor
            .query(&sql, &params)
            .await
            .map_err(|source| MergeError::Catalog { sql, source })?;
        rows.iter().map(decode_foreign_key).collect()
    }
}

/// Scalar probe: does the schema exist?
pub async fn schema_exists<E: Executor>(
    dialect: &dyn Dialect,
    executor: &mut E,
    schema: &str,
) -> Result<bool, BoxError> {
    let sql = dialect.schema_exists_sql();
    let params = vec![("name".to_string(), Value::Text(schema.to_string()))];
    Ok(executor.query_scalar(&sql, &params).await?.is_some())
}

/// Scalar probe: does the table exist?
pub async fn table_exists<E: Executor>(
    dialect: &dyn Dialect,
    executor: &mut E,
    table: &TableInfo,
) -> Result<bool, BoxError> {
    let sql = dialect.table_exists_sql();
    let params = vec![
        ("schema".to_string(), Value::Text(table.schema.clone())),
        ("name".to_string(), Value::Text(table.name.clone())),
    ];
    Ok(executor.query_scalar(&sql, &params).await?.is_some())
}

fn decode_table(row: &Row) -> Result<TableInfo, MergeError> {
    let name = row
        .string("Name")
        .ok_or(MergeError::MalformedCatalogRow("Name"))?;
    let mut table = TableInfo::new(row.string("Schema").unwrap_or_default(), name);
    table.row_count = row.int("RowCount");
    Ok(table)
}

fn decode_column(row: &Row) -> Result<ColumnInfo, MergeError> {
    let schema = row.string("Schema").unwrap_or_default();
    let table = row
        .string("TableName")
        .ok_or(MergeError::MalformedCatalogRow("TableName"))?;
    let name = row
        .string("ColumnName")
        .ok_or(MergeError::MalformedCatalogRow("ColumnName"))?;

    let mut column = ColumnInfo::named(schema.clone(), table.clone(), name.clone());
    column.data_type = row
        .string("DataType")
        .ok_or(MergeError::MalformedCatalogRow("DataType"))?;
    column.byte_length = row.int("ByteLength").unwrap_or(0) as i32;
    column.nullable = row.boolean("IsNullable").unwrap_or(false);
    column.precision = row.int("Precision").unwrap_or(0) as u8;
    column.scale = row.int("Scale").unwrap_or(0) as u8;
    column.collation = row.string("Collation");
    column.calculated = row.boolean("IsCalculated").unwrap_or(false);
    column.expression = row.string("Expression");

    if let Some(constraint_name) = row.string("ForeignKeyConstraint") {
        column.foreign_key = Some(ForeignKeyInfo {
            parent: ColumnRef::new(
                row.string("ReferencedSchema").unwrap_or_default(),
                row.string("ReferencedTable").unwrap_or_default(),
                row.string("ReferencedColumn").unwrap_or_default(),
            ),
            child: ColumnRef::new(schema, table, name),
            constraint_name,
            cascade_delete: row.boolean("CascadeDelete").unwrap_or(false),
        });
    }

    Ok(column)
}

fn decode_foreign_key(row: &Row) -> Result<ForeignKeyInfo, MergeError> {
    Ok(ForeignKeyInfo {
        constraint_name: row
            .string("ConstraintName")
            .ok_or(MergeError::MalformedCatalogRow("ConstraintName"))?,
        parent: ColumnRef::new(
            row.string("ReferencedSchema").unwrap_or_default(),
            row.string("ReferencedTable").unwrap_or_default(),
            row.string("ReferencedColumn").unwrap_or_default(),
        ),
        child: ColumnRef::new(
            row.string("ReferencingSchema").unwrap_or_default(),
            row.string("ReferencingTable").unwrap_or_default(),
            row.string("ReferencingColumn").unwrap_or_default(),
        ),
        cascade_delete: row.boolean("CascadeDelete").unwrap_or(false),
    })
}
