//! The execution boundary.
//!
//! The core never opens, owns, or closes a connection. Callers hand
//! every operation an [`Executor`] ("run this statement with these
//! named parameters") and an adapter (see the `tablesync-sqlx` crate)
//! maps that onto a real driver.

use crate::value::{BoxError, Row, Value};

/// Runs generated SQL text against an already-open connection.
///
/// Parameter names arrive without the `@` prefix; statements reference
/// them as `@Name`. Adapters may ignore parameters a statement does not
/// reference.
#[allow(async_fn_in_trait)]
pub trait Executor {
    /// Executes a statement, returning the affected row count.
    async fn execute(&mut self, sql: &str, params: &[(String, Value)]) -> Result<u64, BoxError>;

    /// Runs a query, returning all rows.
    async fn query(&mut self, sql: &str, params: &[(String, Value)]) -> Result<Vec<Row>, BoxError>;

    /// Runs a query expected to produce at most one scalar.
    async fn query_scalar(
        &mut self,
        sql: &str,
        params: &[(String, Value)],
    ) -> Result<Option<Value>, BoxError>;
}
