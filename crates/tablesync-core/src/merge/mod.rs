//! The schema merge engine.
//!
//! Compares the declared model set against the live catalog and emits a
//! minimal, dependency-ordered [`Action`] sequence: schemas before the
//! tables that need them, tables before their foreign keys, dependent
//! foreign keys dropped before their table goes.

pub mod action;

use tracing::{debug, info};

pub use action::{Action, ActionKind, ObjectKind};

use crate::catalog::CatalogReader;
use crate::dialect::Dialect;
use crate::error::{MappingError, MergeError};
use crate::executor::Executor;
use crate::extract::{ModelSet, ModelTable};
use crate::metadata::{ColumnInfo, ForeignKeyInfo, TableInfo};
use crate::tracking::CHANGES_SCHEMA;

/// Diffs declared models against catalog snapshots and runs or scripts
/// the result.
///
/// Merge runs assume they are the only writer touching the target
/// schema; concurrent runs against the same database are not safe and
/// must be serialized by the caller (an advisory lock, or a
/// single-writer deployment step).
pub struct MergeEngine<'a, D: Dialect> {
    dialect: &'a D,
    models: Vec<ModelTable>,
    exclude_schemas: Vec<String>,
}

impl<'a, D: Dialect> MergeEngine<'a, D> {
    /// Extracts every model up front; any mapping problem aborts here,
    /// before a single action exists.
    pub fn new(dialect: &'a D, models: &ModelSet) -> Result<Self, MappingError> {
        Ok(Self {
            dialect,
            models: models.resolve(dialect)?,
            exclude_schemas: vec![CHANGES_SCHEMA.to_string()],
        })
    }

    /// Adds a schema to leave out of comparison, on top of the engine's
    /// own bookkeeping schemas.
    #[must_use]
    pub fn exclude_schema(mut self, schema: impl Into<String>) -> Self {
        self.exclude_schemas.push(schema.into());
        self
    }

    pub fn exclude_schemas(&self) -> &[String] {
        &self.exclude_schemas
    }

    pub fn model_tables(&self) -> &[ModelTable] {
        &self.models
    }

    /// Reads the live catalog and diffs against it.
    pub async fn compare_live<E: Executor>(
        &self,
        executor: &mut E,
    ) -> Result<Vec<Action>, MergeError> {
        let reader = CatalogReader::new(self.dialect);
        let tables = reader.tables(executor, &self.exclude_schemas).await?;
        let columns = reader.columns(executor, &self.exclude_schemas).await?;
        Ok(self.compare(&tables, &columns))
    }

    /// The diff pass. Single deterministic sweep; the returned order
    /// already satisfies the dependency invariants.
    pub fn compare(&self, schema_tables: &[TableInfo], schema_columns: &[ColumnInfo])
        -> Vec<Action> {
        let excluded =
            |schema: &str| self.exclude_schemas.iter().any(|x| x.eq_ignore_ascii_case(schema));
        let live_tables: Vec<&TableInfo> =
            schema_tables.iter().filter(|t| !excluded(&t.schema)).collect();
        let live_columns: Vec<&ColumnInfo> =
            schema_columns.iter().filter(|c| !excluded(&c.table.schema)).collect();
        let is_live = |table: &TableInfo| live_tables.iter().any(|lt| *lt == table);

        let mut actions = Vec::new();

        // 1. Schemas referenced by models but absent from the catalog.
        if self.dialect.supports_schemas() {
            let mut created: Vec<&str> = Vec::new();
            for model in &self.models {
                let schema = model.table.schema.as_str();
                if schema.is_empty()
                    || schema.eq_ignore_ascii_case(self.dialect.default_schema())
                    || created.iter().any(|c| c.eq_ignore_ascii_case(schema))
                    || live_tables.iter().any(|t| t.schema.eq_ignore_ascii_case(schema))
                {
                    continue;
                }
                created.push(schema);
                actions.push(Action::CreateSchema {
                    schema: schema.to_string(),
                });
            }
        }

        // 2. Model tables absent from the catalog.
        let new_tables: Vec<&ModelTable> =
            self.models.iter().filter(|m| !is_live(&m.table)).collect();
        for model in &new_tables {
            actions.push(Action::CreateTable {
                model: (*model).clone(),
            });
        }

        // 3. Column diff, restricted to tables that already existed.
        for model in self.models.iter().filter(|m| is_live(&m.table)) {
            let live_table = live_tables.iter().find(|t| **t == &model.table);
            let table_cols: Vec<&ColumnInfo> =
                live_columns.iter().filter(|c| c.table == model.table).copied().collect();

            let mut table_actions = Vec::new();
            let mut rebuild = false;

            for model_col in &model.columns {
                match table_cols.iter().copied().find(|lc| **lc == *model_col) {
                    None => table_actions.push(Action::AddColumn {
                        column: model_col.clone(),
                    }),
                    Some(live_col) => {
                        if model_col.is_altered_from(live_col, self.dialect) {
                            let empty = live_table.is_some_and(|t| t.is_empty());
                            if alter_in_place(self.dialect, model_col, live_col, empty) {
                                table_actions.push(Action::AlterColumn {
                                    column: model_col.clone(),
                                });
                            } else {
                                rebuild = true;
                            }
                        }
                    }
                }
            }

            for live_col in &table_cols {
                if !model.columns.iter().any(|mc| mc == *live_col) {
                    table_actions.push(Action::DropColumn {
                        column: (*live_col).clone(),
                    });
                }
            }

            if rebuild {
                // One rebuild subsumes every column action for the table.
                actions.push(Action::RebuildTable {
                    model: model.clone(),
                    dependent_keys: dependent_keys_of(&model.table, &live_columns),
                });
            } else {
                actions.extend(table_actions);
            }
        }

        // 4. Live tables no model claims.
        for live in &live_tables {
            if !self.models.iter().any(|m| &m.table == *live) {
                actions.push(Action::DropTable {
                    table: (*live).clone(),
                    dependent_keys: dependent_keys_of(live, &live_columns),
                });
            }
        }

        // 5. Foreign keys for the tables created in step 2.
        for model in &new_tables {
            for key in model.foreign_keys() {
                actions.push(Action::AddForeignKey { key: key.clone() });
            }
        }

        actions
    }

    /// Executes an action list in order, halting on the first failure.
    /// Already-applied actions stay applied; no rollback is attempted.
    pub async fn apply<E: Executor>(
        &self,
        executor: &mut E,
        actions: &[Action],
    ) -> Result<(), MergeError> {
        for action in actions {
            for sql in action.sql_commands(self.dialect) {
                debug!(sql = %sql, "executing merge action");
                executor
                    .execute(&sql, &[])
                    .await
                    .map_err(|source| MergeError::Execution {
                        object_kind: action.object_kind(),
                        action_kind: action.action_kind(),
                        sql,
                        source,
                    })?;
            }
            info!(action = %action.description(), "merge action applied");
        }
        Ok(())
    }

    /// Serializes an action list into a single reviewable script.
    pub fn script(&self, actions: &[Action]) -> String {
        let mut out = String::new();
        for action in actions {
            out.push_str(self.dialect.comment_prefix());
            out.push_str(&action.description());
            out.push('\n');
            for sql in action.sql_commands(self.dialect) {
                out.push_str(&sql);
                out.push_str(";\n");
            }
            out.push('\n');
        }
        out
    }
}

/// Foreign keys in the catalog snapshot whose parent is the given
/// table. These must be dropped before the table can be.
fn dependent_keys_of(table: &TableInfo, live_columns: &[&ColumnInfo]) -> Vec<ForeignKeyInfo> {
    live_columns
        .iter()
        .filter_map(|c| c.foreign_key.as_ref())
        .filter(|fk| fk.parent.table_info() == *table)
        .cloned()
        .collect()
}

/// Whether a column difference is safe to resolve with an in-place
/// ALTER. Loosening changes are; anything that can truncate or reject
/// existing rows routes the table through the rebuild path instead.
fn alter_in_place(
    dialect: &dyn Dialect,
    model_col: &ColumnInfo,
    live_col: &ColumnInfo,
    live_table_empty: bool,
) -> bool {
    if live_table_empty {
        return true;
    }
    if model_col.calculated || live_col.calculated {
        return false;
    }
    if !model_col.nullable && live_col.nullable {
        return false;
    }
    let (model_base, model_sizes) = split_sized_type(&dialect.normalize_type(model_col));
    let (live_base, live_sizes) = split_sized_type(&dialect.normalize_type(live_col));
    if model_base != live_base || model_sizes.len() != live_sizes.len() {
        return false;
    }
    model_sizes
        .iter()
        .zip(live_sizes.iter())
        .all(|(model, live)| model >= live)
}

/// Splits `decimal(18, 2)` into `("decimal", [18, 2])`; the `max`
/// sentinel compares larger than any explicit size.
fn split_sized_type(normalized: &str) -> (String, Vec<i64>) {
    match normalized.split_once('(') {
        None => (normalized.trim().to_string(), Vec::new()),
        Some((base, rest)) => {
            let sizes = rest
                .trim_end_matches(')')
                .split(',')
                .map(|arg| {
                    let arg = arg.trim();
                    if arg.eq_ignore_ascii_case("max") {
                        i64::MAX
                    } else {
                        arg.parse().unwrap_or(0)
                    }
                })
                .collect();
            (base.trim().to_string(), sizes)
        }
    }
}
