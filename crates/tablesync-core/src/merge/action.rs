//! Reconciliation actions.
//!
//! One merge pass produces an ordered list of these; the executor or
//! the script emitter consumes them once. All SQL text generation is
//! deferred to the dialect, so the same action list serves every
//! backend.

use crate::dialect::Dialect;
use crate::extract::ModelTable;
use crate::metadata::{ColumnInfo, ForeignKeyInfo, TableInfo};

/// The kind of database object an action touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Schema,
    Table,
    Column,
    Key,
    Index,
    ForeignKey,
    Metadata,
}

/// What an action does to its object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Create,
    Alter,
    Rename,
    Drop,
    DropAndCreate,
}

/// A single reconciliation step. Actions are transient: produced by one
/// merge pass, consumed once, never persisted.
#[derive(Debug, Clone)]
pub enum Action {
    CreateSchema {
        schema: String,
    },
    CreateTable {
        model: ModelTable,
    },
    AddColumn {
        column: ColumnInfo,
    },
    AlterColumn {
        column: ColumnInfo,
    },
    DropColumn {
        column: ColumnInfo,
    },
    /// Drop and recreate a table whose live shape can't be altered in
    /// place, restoring the foreign keys that depended on it.
    RebuildTable {
        model: ModelTable,
        dependent_keys: Vec<ForeignKeyInfo>,
    },
    /// Drop a live table, its dependent foreign keys first.
    DropTable {
        table: TableInfo,
        dependent_keys: Vec<ForeignKeyInfo>,
    },
    AddForeignKey {
        key: ForeignKeyInfo,
    },
    DropForeignKey {
        key: ForeignKeyInfo,
    },
}

impl Action {
    pub fn object_kind(&self) -> ObjectKind {
        match self {
            Self::CreateSchema { .. } => ObjectKind::Schema,
            Self::CreateTable { .. } | Self::RebuildTable { .. } | Self::DropTable { .. } => {
                ObjectKind::Table
            }
            Self::AddColumn { .. } | Self::AlterColumn { .. } | Self::DropColumn { .. } => {
                ObjectKind::Column
            }
            Self::AddForeignKey { .. } | Self::DropForeignKey { .. } => ObjectKind::ForeignKey,
        }
    }

    pub fn action_kind(&self) -> ActionKind {
        match self {
            Self::CreateSchema { .. }
            | Self::CreateTable { .. }
            | Self::AddColumn { .. }
            | Self::AddForeignKey { .. } => ActionKind::Create,
            Self::AlterColumn { .. } => ActionKind::Alter,
            Self::RebuildTable { .. } => ActionKind::DropAndCreate,
            Self::DropColumn { .. } | Self::DropTable { .. } | Self::DropForeignKey { .. } => {
                ActionKind::Drop
            }
        }
    }

    /// Human-readable one-liner, used for logs and script headers.
    pub fn description(&self) -> String {
        match self {
            Self::CreateSchema { schema } => format!("create schema {schema}"),
            Self::CreateTable { model } => format!("create table {}", model.table),
            Self::AddColumn { column } => format!("add column {column}"),
            Self::AlterColumn { column } => format!("alter column {column}"),
            Self::DropColumn { column } => format!("drop column {column}"),
            Self::RebuildTable { model, .. } => format!("rebuild table {}", model.table),
            Self::DropTable { table, .. } => format!("drop table {table}"),
            Self::AddForeignKey { key } => format!("add foreign key {}", key.constraint_name),
            Self::DropForeignKey { key } => format!("drop foreign key {}", key.constraint_name),
        }
    }

    /// The SQL statements realizing this action, in execution order.
    pub fn sql_commands(&self, dialect: &dyn Dialect) -> Vec<String> {
        match self {
            Self::CreateSchema { schema } => vec![dialect.create_schema_sql(schema)],
            Self::CreateTable { model } => {
                vec![dialect.create_table_sql(&model.table, &model.columns, &model.key)]
            }
            Self::AddColumn { column } => vec![dialect.add_column_sql(column)],
            Self::AlterColumn { column } => vec![dialect.alter_column_sql(column)],
            Self::DropColumn { column } => vec![dialect.drop_column_sql(column)],
            Self::RebuildTable {
                model,
                dependent_keys,
            } => {
                let mut commands: Vec<String> = dependent_keys
                    .iter()
                    .map(|fk| dialect.drop_foreign_key_sql(fk))
                    .collect();
                commands.push(dialect.drop_table_sql(&model.table));
                commands.push(dialect.create_table_sql(&model.table, &model.columns, &model.key));
                commands.extend(dependent_keys.iter().map(|fk| dialect.add_foreign_key_sql(fk)));
                commands
            }
            Self::DropTable {
                table,
                dependent_keys,
            } => {
                let mut commands: Vec<String> = dependent_keys
                    .iter()
                    .map(|fk| dialect.drop_foreign_key_sql(fk))
                    .collect();
                commands.push(dialect.drop_table_sql(table));
                commands
            }
            Self::AddForeignKey { key } => vec![dialect.add_foreign_key_sql(key)],
            Self::DropForeignKey { key } => vec![dialect.drop_foreign_key_sql(key)],
        }
    }
}
