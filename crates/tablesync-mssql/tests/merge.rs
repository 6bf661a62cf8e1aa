//! Merge-engine scenarios against the SQL Server dialect.

mod common;

use common::{Employee, Organization};
use tablesync_core::extract::ModelSet;
use tablesync_core::merge::{Action, MergeEngine};
use tablesync_core::metadata::{ColumnInfo, TableInfo};
use tablesync_core::testing::ScriptedExecutor;
use tablesync_core::{MergeError, SqlProvider};
use tablesync_mssql::MssqlDialect;

fn engine(dialect: &MssqlDialect) -> MergeEngine<'_, MssqlDialect> {
    let models = ModelSet::new().with::<Employee>().with::<Organization>();
    MergeEngine::new(dialect, &models).unwrap()
}

fn snapshot_of(engine: &MergeEngine<'_, MssqlDialect>) -> (Vec<TableInfo>, Vec<ColumnInfo>) {
    let tables = engine.model_tables().iter().map(|m| m.table.clone()).collect();
    let columns = engine
        .model_tables()
        .iter()
        .flat_map(|m| m.columns.iter().cloned())
        .collect();
    (tables, columns)
}

#[test]
fn empty_database_gets_both_tables_and_the_foreign_key() {
    let dialect = MssqlDialect::new();
    let actions = engine(&dialect).compare(&[], &[]);

    assert_eq!(actions.len(), 3);
    assert!(matches!(
        &actions[0],
        Action::CreateTable { model } if model.table == TableInfo::new("dbo", "Employee")
    ));
    assert!(matches!(
        &actions[1],
        Action::CreateTable { model } if model.table == TableInfo::new("dbo", "Organization")
    ));
    match &actions[2] {
        Action::AddForeignKey { key } => {
            assert_eq!(key.parent.table, "Organization");
            assert_eq!(key.parent.column, "Id");
            assert_eq!(key.child.table, "Employee");
            assert_eq!(key.child.column, "OrganizationId");
            assert_eq!(key.constraint_name, "FK_dbo_Employee_OrganizationId");
        }
        other => panic!("expected AddForeignKey, got {other:?}"),
    }
}

#[test]
fn existing_employee_leaves_only_the_organization_create() {
    let dialect = MssqlDialect::new();
    let live = vec![TableInfo::new("dbo", "Employee")];
    let actions = engine(&dialect).compare(&live, &[]);

    assert_eq!(actions.len(), 1);
    assert!(matches!(
        &actions[0],
        Action::CreateTable { model } if model.table == TableInfo::new("dbo", "Organization")
    ));
}

#[test]
fn merged_database_diffs_to_nothing() {
    let dialect = MssqlDialect::new();
    let engine = engine(&dialect);
    let (tables, columns) = snapshot_of(&engine);
    let actions = engine.compare(&tables, &columns);
    assert!(actions.is_empty(), "expected an empty plan, got {actions:?}");
}

#[test]
fn create_table_text_carries_deterministic_constraint_names() {
    let provider = SqlProvider::new(MssqlDialect::new());
    let sql = provider.create_table_command::<Organization>().unwrap();

    assert!(sql.starts_with("CREATE TABLE [dbo].[Organization] ("));
    assert!(sql.contains("[Name] nvarchar(50) NOT NULL"));
    assert!(sql.contains("[EmployeeCount] int NULL"));
    assert!(sql.contains("[Id] int identity(1,1) NOT NULL"));
    assert!(sql.contains("CONSTRAINT [PK_dbo_Organization] PRIMARY KEY ([Name])"));
    assert!(sql.contains("CONSTRAINT [U_dbo_Organization] UNIQUE ([Id])"));
}

#[test]
fn unique_markers_become_named_constraints() {
    let provider = SqlProvider::new(MssqlDialect::new());
    let sql = provider.create_table_command::<Employee>().unwrap();
    assert!(sql.contains("CONSTRAINT [U_dbo_Employee_Email] UNIQUE ([Email])"));
}

#[test]
fn identity_primary_key_needs_no_unique_constraint() {
    let provider = SqlProvider::new(MssqlDialect::new());
    let sql = provider.create_table_command::<common::ItemType>().unwrap();
    // ItemType declares Name as its primary key; Employee-style models
    // without one fall back to the identity, which then needs no
    // second unique constraint.
    assert!(sql.contains("CONSTRAINT [PK_dbo_ItemType] PRIMARY KEY ([Name])"));

    let sql = provider.create_table_command::<ExplicitlyKeyless>().unwrap();
    assert!(sql.contains("CONSTRAINT [PK_dbo_Audit] PRIMARY KEY ([Id])"));
    assert!(!sql.contains("UNIQUE"));
}

#[derive(Default)]
struct ExplicitlyKeyless {
    id: i32,
}

impl tablesync_core::Model for ExplicitlyKeyless {
    type Key = i32;
    const TABLE: tablesync_core::TableSpec = tablesync_core::TableSpec::new("Audit");
    const COLUMNS: &'static [tablesync_core::ColumnSpec] = &[
        tablesync_core::ColumnSpec::new("Id", tablesync_core::HostType::Int),
        tablesync_core::ColumnSpec::new("Note", tablesync_core::HostType::Text).nullable(),
    ];

    fn key(&self) -> i32 {
        self.id
    }

    fn set_key(&mut self, key: i32) {
        self.id = key;
    }

    fn value(&self, _property: &str) -> tablesync_core::Value {
        tablesync_core::Value::Null
    }

    fn from_row(_row: &tablesync_core::Row) -> Result<Self, tablesync_core::BoxError> {
        Ok(Self::default())
    }
}

#[tokio::test]
async fn apply_runs_statements_in_order_and_halts_on_failure() {
    let dialect = MssqlDialect::new();
    let engine = engine(&dialect);
    let actions = engine.compare(&[], &[]);

    let mut executor = ScriptedExecutor::new();
    executor.push_affected(1); // Employee create succeeds
    executor.push_execute_error("permission denied"); // Organization create fails

    let result = engine.apply(&mut executor, &actions).await;
    match result {
        Err(MergeError::Execution { sql, .. }) => {
            assert!(sql.contains("CREATE TABLE [dbo].[Organization]"));
        }
        other => panic!("expected an execution failure, got {other:?}"),
    }
    // The failed run stopped before the foreign key.
    assert_eq!(executor.executed.len(), 2);
}

#[test]
fn script_mode_annotates_every_action() {
    let dialect = MssqlDialect::new();
    let engine = engine(&dialect);
    let actions = engine.compare(&[], &[]);
    let script = engine.script(&actions);

    assert!(script.contains("-- create table dbo.Employee"));
    assert!(script.contains("-- create table dbo.Organization"));
    assert!(script.contains("-- add foreign key FK_dbo_Employee_OrganizationId"));
    let create_pos = script.find("CREATE TABLE [dbo].[Employee]").unwrap();
    let fk_pos = script.find("ADD CONSTRAINT [FK_dbo_Employee_OrganizationId]").unwrap();
    assert!(create_pos < fk_pos);
}

#[test]
fn excluded_schema_tables_are_never_touched() {
    let dialect = MssqlDialect::new();
    let engine = engine(&dialect).exclude_schema("staging");
    let (mut tables, columns) = snapshot_of(&engine);
    tables.push(TableInfo::new("changes", "dbo_Item_History"));
    tables.push(TableInfo::new("staging", "ScratchPad"));

    let actions = engine.compare(&tables, &columns);
    assert!(actions.is_empty(), "expected an empty plan, got {actions:?}");
}
