//! # tablesync-sqlx
//!
//! Binds the core's named-parameter statements onto a sqlx MySQL pool.
//!
//! Generated statements carry `@Name` placeholders; MySQL's wire
//! protocol wants positional `?`. [`MySqlExecutor`] rewrites each
//! statement, binding the named values in reference order (a parameter
//! referenced twice is bound twice, and parameters a statement never
//! references are simply ignored). Multi-statement text such as the
//! MySQL insert form (`INSERT …; SELECT LAST_INSERT_ID()`) is split and
//! run sequentially.

use rust_decimal::Decimal;
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use thiserror::Error;
use tracing::debug;

use tablesync_core::executor::Executor;
use tablesync_core::value::{BoxError, Row, Value};

/// Errors specific to the placeholder rewrite and row decode steps.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// A statement references a parameter that was not bound.
    #[error("statement references @{0} but no such parameter was supplied")]
    MissingParameter(String),

    /// A result column's type has no [`Value`] representation.
    #[error("cannot decode column `{column}` of type {type_name}")]
    Decode { column: String, type_name: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// An [`Executor`] over an open sqlx MySQL pool.
pub struct MySqlExecutor {
    pool: MySqlPool,
}

impl MySqlExecutor {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn run(&self, sql: &str, params: &[(String, Value)]) -> Result<u64, AdapterError> {
        let mut affected = 0;
        for statement in split_statements(sql) {
            let (text, binds) = rewrite_placeholders(statement, params)?;
            debug!(sql = %text, "executing");
            let mut query = sqlx::query(&text);
            for value in binds {
                query = bind_value(query, value);
            }
            affected += query.execute(&self.pool).await?.rows_affected();
        }
        Ok(affected)
    }

    async fn fetch(&self, sql: &str, params: &[(String, Value)])
        -> Result<Vec<Row>, AdapterError> {
        let statements = split_statements(sql);
        let Some((last, preceding)) = statements.split_last() else {
            return Ok(Vec::new());
        };
        for statement in preceding {
            let (text, binds) = rewrite_placeholders(statement, params)?;
            let mut query = sqlx::query(&text);
            for value in binds {
                query = bind_value(query, value);
            }
            query.execute(&self.pool).await?;
        }

        let (text, binds) = rewrite_placeholders(last, params)?;
        debug!(sql = %text, "querying");
        let mut query = sqlx::query(&text);
        for value in binds {
            query = bind_value(query, value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

impl Executor for MySqlExecutor {
    async fn execute(&mut self, sql: &str, params: &[(String, Value)]) -> Result<u64, BoxError> {
        Ok(self.run(sql, params).await?)
    }

    async fn query(&mut self, sql: &str, params: &[(String, Value)]) -> Result<Vec<Row>, BoxError> {
        Ok(self.fetch(sql, params).await?)
    }

    async fn query_scalar(
        &mut self,
        sql: &str,
        params: &[(String, Value)],
    ) -> Result<Option<Value>, BoxError> {
        let rows = self.fetch(sql, params).await?;
        Ok(rows
            .first()
            .and_then(|row| row.iter().next())
            .map(|(_, value)| value.clone()))
    }
}

/// Rewrites `@Name` placeholders to `?`, collecting the referenced
/// values in bind order. Matching is case-insensitive; text inside
/// single-quoted literals is left alone.
fn rewrite_placeholders<'a>(
    sql: &str,
    params: &'a [(String, Value)],
) -> Result<(String, Vec<&'a Value>), AdapterError> {
    let mut text = String::with_capacity(sql.len());
    let mut binds = Vec::new();
    let mut in_literal = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                text.push(c);
            }
            '@' if !in_literal => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    text.push('@');
                    continue;
                }
                let (_, value) = params
                    .iter()
                    .find(|(param, _)| param.eq_ignore_ascii_case(&name))
                    .ok_or(AdapterError::MissingParameter(name))?;
                binds.push(value);
                text.push('?');
            }
            _ => text.push(c),
        }
    }
    Ok((text, binds))
}

/// Splits multi-statement text on `;`, respecting single-quoted
/// literals.
fn split_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut in_literal = false;
    let mut start = 0;
    for (i, c) in sql.char_indices() {
        match c {
            '\'' => in_literal = !in_literal,
            ';' if !in_literal => {
                let piece = sql[start..i].trim();
                if !piece.is_empty() {
                    statements.push(piece);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = sql[start..].trim();
    if !tail.is_empty() {
        statements.push(tail);
    }
    statements
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<i32>),
        Value::Bool(v) => query.bind(*v),
        Value::TinyInt(v) => query.bind(*v),
        Value::SmallInt(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::BigInt(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Double(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.clone()),
        Value::Char(v) => query.bind(v.to_string()),
        Value::Bytes(v) => query.bind(v.clone()),
        Value::Date(v) => query.bind(*v),
        Value::DateTime(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        // MySQL has no native uuid type; the dialect maps it to
        // char(36), so bind the canonical text form.
        Value::Uuid(v) => query.bind(v.to_string()),
    }
}

fn decode_row(row: &MySqlRow) -> Result<Row, AdapterError> {
    let mut cells = Vec::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            cells.push((name, Value::Null));
            continue;
        }
        let type_name = raw.type_info().name().to_string();
        let value = match type_name.as_str() {
            "BOOLEAN" | "BIT" => Value::Bool(row.try_get(i)?),
            "TINYINT UNSIGNED" => Value::TinyInt(row.try_get(i)?),
            "TINYINT" => Value::SmallInt(i16::from(row.try_get::<i8, _>(i)?)),
            "SMALLINT" | "SMALLINT UNSIGNED" | "YEAR" => Value::SmallInt(row.try_get(i)?),
            "INT" | "INT UNSIGNED" | "MEDIUMINT" | "MEDIUMINT UNSIGNED" => {
                Value::Int(row.try_get(i)?)
            }
            "BIGINT" | "BIGINT UNSIGNED" => Value::BigInt(row.try_get(i)?),
            "FLOAT" => Value::Float(row.try_get(i)?),
            "DOUBLE" => Value::Double(row.try_get(i)?),
            "DECIMAL" => Value::Decimal(row.try_get::<Decimal, _>(i)?),
            "DATE" => Value::Date(row.try_get(i)?),
            "DATETIME" | "TIMESTAMP" => Value::DateTime(row.try_get(i)?),
            "TIME" => Value::Time(row.try_get(i)?),
            "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" => {
                Value::Text(row.try_get(i)?)
            }
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                Value::Bytes(row.try_get(i)?)
            }
            _ => {
                return Err(AdapterError::Decode {
                    column: name,
                    type_name,
                })
            }
        };
        cells.push((name, value));
    }
    Ok(Row::new(cells))
}
