//! Versioned change tracking.
//!
//! Models opted in via [`TableSpec::track_changes`](crate::model::TableSpec)
//! get column-level before/after history on every update: the prior row
//! is loaded, differing editable columns become [`PropertyChange`]s,
//! and each change is appended to a per-model history table stamped
//! with a monotonically increasing version number from a companion
//! counter table. Both tables live in the fixed `changes` schema and
//! are provisioned on first use with the same create-if-absent check
//! the merge engine relies on.
//!
//! No history is written on insert (there is no prior value), and none
//! is written without an actor context; that gate is deliberate.

use chrono::{Datelike, Timelike, Utc};
use tracing::{debug, info, warn};

use crate::catalog;
use crate::crud::SqlProvider;
use crate::dialect::Dialect;
use crate::error::CrudError;
use crate::executor::Executor;
use crate::extract;
use crate::metadata::{KeyLayout, TableInfo};
use crate::model::{ColumnSpec, HostType, KeyValue, Model, SaveAction, UserContext};
use crate::value::{Params, Value};

/// Schema holding every model's history and version tables.
pub const CHANGES_SCHEMA: &str = "changes";

/// Attempts at the read-increment-write counter sequence before giving
/// up. Each retry re-reads the counter, so a loser of the race simply
/// takes the next number.
const VERSION_RETRY_LIMIT: u32 = 5;

/// One column's before/after pair for a single save.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub property_name: String,
    pub old_value: Value,
    pub new_value: Value,
}

impl PropertyChange {
    /// Changed iff exactly one side is null, or both are non-null and
    /// unequal.
    pub fn is_changed(&self) -> bool {
        match (self.old_value.is_null(), self.new_value.is_null()) {
            (true, true) => false,
            (true, false) | (false, true) => true,
            (false, false) => self.old_value != self.new_value,
        }
    }
}

/// The history and version table identities for a target table.
pub fn tracking_tables(dialect: &dyn Dialect, target: &TableInfo) -> (TableInfo, TableInfo) {
    let schema = if dialect.supports_schemas() {
        CHANGES_SCHEMA
    } else {
        ""
    };
    let stem = target.constraint_stem();
    (
        TableInfo::new(schema, format!("{stem}_History")),
        TableInfo::new(schema, format!("{stem}_Version")),
    )
}

fn history_specs(key: HostType) -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("RecordId", key).primary_key(),
        ColumnSpec::new("Version", HostType::Int).primary_key(),
        ColumnSpec::new("ColumnName", HostType::Text)
            .max_length(100)
            .primary_key(),
        ColumnSpec::new("UserName", HostType::Text).max_length(50),
        ColumnSpec::new("DateTime", HostType::DateTime),
        ColumnSpec::new("OldValue", HostType::Text).nullable(),
        ColumnSpec::new("NewValue", HostType::Text).nullable(),
    ]
}

fn version_specs(key: HostType) -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("RecordId", key).primary_key(),
        ColumnSpec::new("NextVersion", HostType::Int),
    ]
}

fn auxiliary_key(specs: &[ColumnSpec]) -> KeyLayout {
    KeyLayout {
        identity_column: None,
        identity_property: None,
        primary_key_columns: specs
            .iter()
            .filter(|s| s.primary_key)
            .map(|s| s.name().to_string())
            .collect(),
        identity_is_primary_key: false,
    }
}

/// Loads the pre-update row and diffs it against the incoming record.
/// `None` means the model is untracked or has no prior row to diff.
pub(crate) async fn pending_changes<M: Model, E: Executor, D: Dialect>(
    provider: &SqlProvider<D>,
    executor: &mut E,
    record: &M,
) -> Result<Option<Vec<PropertyChange>>, CrudError> {
    let Some(track) = M::TABLE.track_changes else {
        return Ok(None);
    };
    let Some(existing) = provider.find::<M, E>(executor, record.key(), None).await? else {
        return Ok(None);
    };

    let mut changes = Vec::new();
    for spec in extract::editable_specs::<M>(SaveAction::Update)? {
        if track.ignore.contains(&spec.property) {
            continue;
        }
        let change = PropertyChange {
            property_name: spec.property.to_string(),
            old_value: display_value(provider.dialect(), executor, spec, existing.value(spec.property))
                .await?,
            new_value: display_value(provider.dialect(), executor, spec, record.value(spec.property))
                .await?,
        };
        if change.is_changed() {
            changes.push(change);
        }
    }
    Ok(Some(changes))
}

/// Provisions the bookkeeping tables, takes the next version number,
/// and appends one history row per change, or hands the changes to
/// the model's own sink when it opts out of the default table.
pub(crate) async fn save_changes<M: Model, E: Executor, D: Dialect>(
    provider: &SqlProvider<D>,
    executor: &mut E,
    record: &M,
    changes: Option<Vec<PropertyChange>>,
    user: Option<&dyn UserContext>,
) -> Result<(), CrudError> {
    let Some(changes) = changes else {
        return Ok(());
    };
    if changes.is_empty() {
        return Ok(());
    }
    let Some(user) = user else {
        debug!("changed values but no actor context; skipping change history");
        return Ok(());
    };

    let dialect: &dyn Dialect = provider.dialect();
    let use_history = record.tracked().is_none_or(|t| t.use_default_history_table());
    let target = extract::table_info::<M>(dialect);
    let (history, version) = tracking_tables(dialect, &target);

    ensure_tracking_objects(dialect, executor, &history, &version, M::Key::HOST, use_history)
        .await?;

    let stamp =
        next_record_version(dialect, executor, &version, record.key().to_value()).await?;

    if use_history {
        for change in &changes {
            append_history_row(
                dialect,
                executor,
                &history,
                M::Key::HOST,
                record.key().to_value(),
                stamp,
                change,
                user,
            )
            .await?;
        }
    }

    if let Some(tracked) = record.tracked() {
        tracked.track_changes(stamp, &changes, user);
    }
    Ok(())
}

async fn ensure_tracking_objects<E: Executor>(
    dialect: &dyn Dialect,
    executor: &mut E,
    history: &TableInfo,
    version: &TableInfo,
    key: HostType,
    use_history: bool,
) -> Result<(), CrudError> {
    if dialect.supports_schemas() {
        let exists = catalog::schema_exists(dialect, executor, CHANGES_SCHEMA)
            .await
            .map_err(|source| CrudError::Execution {
                operation: "schema exists",
                sql: dialect.schema_exists_sql(),
                params: Params::new(),
                source,
            })?;
        if !exists {
            let sql = dialect.create_schema_sql(CHANGES_SCHEMA);
            info!(schema = CHANGES_SCHEMA, "provisioning change-tracking schema");
            executor
                .execute(&sql, &[])
                .await
                .map_err(|source| CrudError::Execution {
                    operation: "create schema",
                    sql,
                    params: Params::new(),
                    source,
                })?;
        }
    }

    if use_history {
        create_table_if_absent(dialect, executor, history, &history_specs(key)).await?;
    }
    create_table_if_absent(dialect, executor, version, &version_specs(key)).await?;
    Ok(())
}

async fn create_table_if_absent<E: Executor>(
    dialect: &dyn Dialect,
    executor: &mut E,
    table: &TableInfo,
    specs: &[ColumnSpec],
) -> Result<(), CrudError> {
    let exists = catalog::table_exists(dialect, executor, table)
        .await
        .map_err(|source| CrudError::Execution {
            operation: "table exists",
            sql: dialect.table_exists_sql(),
            params: Params::new(),
            source,
        })?;
    if exists {
        return Ok(());
    }

    let columns = extract::columns_from_specs(dialect, table, specs)?;
    let sql = dialect.create_table_sql(table, &columns, &auxiliary_key(specs));
    info!(table = %table, "provisioning change-tracking table");
    executor
        .execute(&sql, &[])
        .await
        .map_err(|source| CrudError::Execution {
            operation: "create table",
            sql,
            params: Params::new(),
            source,
        })?;
    Ok(())
}

/// Read-increment-write on the per-record counter, guarded by a
/// conditional update: `NextVersion` must still hold the value we read,
/// or the write affects no rows and we re-read. Returns the version to
/// stamp on this save's history rows.
async fn next_record_version<E: Executor>(
    dialect: &dyn Dialect,
    executor: &mut E,
    table: &TableInfo,
    id: Value,
) -> Result<i32, CrudError> {
    let name = dialect.apply_delimiter(&table.qualified_name());
    let record_id = dialect.quote_part("RecordId");
    let next_version = dialect.quote_part("NextVersion");

    let select = format!("SELECT {next_version} FROM {name} WHERE {record_id}=@id");
    let seed = format!("INSERT INTO {name} ({record_id}, {next_version}) VALUES (@RecordId, @NextVersion)");
    let advance = format!(
        "UPDATE {name} SET {next_version}=@next WHERE {record_id}=@id AND {next_version}=@expected"
    );

    for attempt in 1..=VERSION_RETRY_LIMIT {
        let params = vec![("id".to_string(), id.clone())];
        let current = executor
            .query_scalar(&select, &params)
            .await
            .map_err(|source| CrudError::Execution {
                operation: "read version",
                sql: select.clone(),
                params,
                source,
            })?
            .and_then(|v| v.as_i64())
            .unwrap_or(0) as i32;

        if current == 0 {
            // First save of this record: seed the counter at 2 and
            // stamp version 1. A concurrent seeder wins the key; we
            // re-read and take the next number.
            let params = vec![
                ("RecordId".to_string(), id.clone()),
                ("NextVersion".to_string(), Value::Int(2)),
            ];
            match executor.execute(&seed, &params).await {
                Ok(_) => return Ok(1),
                Err(error) => {
                    warn!(attempt, error = %error, "version counter seed conflict; retrying");
                    continue;
                }
            }
        }

        let params = vec![
            ("next".to_string(), Value::Int(current + 1)),
            ("id".to_string(), id.clone()),
            ("expected".to_string(), Value::Int(current)),
        ];
        let affected = executor
            .execute(&advance, &params)
            .await
            .map_err(|source| CrudError::Execution {
                operation: "advance version",
                sql: advance.clone(),
                params,
                source,
            })?;
        if affected > 0 {
            return Ok(current);
        }
        warn!(attempt, table = %table, "version counter moved underneath us; retrying");
    }

    Err(CrudError::VersionConflict {
        table: table.to_string(),
        attempts: VERSION_RETRY_LIMIT,
    })
}

#[allow(clippy::too_many_arguments)]
async fn append_history_row<E: Executor>(
    dialect: &dyn Dialect,
    executor: &mut E,
    history: &TableInfo,
    key: HostType,
    id: Value,
    version: i32,
    change: &PropertyChange,
    user: &dyn UserContext,
) -> Result<(), CrudError> {
    let columns = extract::columns_from_specs(dialect, history, &history_specs(key))?;
    let sql = dialect.plain_insert_command(history, &columns, None);

    let timestamp = user
        .local_time()
        .unwrap_or_else(|| Utc::now().naive_utc());
    let params = vec![
        ("RecordId".to_string(), id),
        ("Version".to_string(), Value::Int(version)),
        (
            "ColumnName".to_string(),
            Value::Text(change.property_name.clone()),
        ),
        (
            "UserName".to_string(),
            Value::Text(user.user_name().to_string()),
        ),
        ("DateTime".to_string(), Value::DateTime(timestamp)),
        (
            "OldValue".to_string(),
            Value::Text(stringify(&clean_zero_date(change.old_value.clone()))),
        ),
        (
            "NewValue".to_string(),
            Value::Text(stringify(&clean_zero_date(change.new_value.clone()))),
        ),
    ];
    executor
        .execute(&sql, &params)
        .await
        .map_err(|source| CrudError::Execution {
            operation: "append history",
            sql,
            params,
            source,
        })?;
    Ok(())
}

/// Resolves a foreign-key value to its display label when the parent
/// model declares a lookup query.
async fn display_value<E: Executor>(
    dialect: &dyn Dialect,
    executor: &mut E,
    spec: &ColumnSpec,
    value: Value,
) -> Result<Value, CrudError> {
    if value.is_null() {
        return Ok(value);
    }
    let Some(fk) = spec.references else {
        return Ok(value);
    };
    let parent = (fk.parent)(dialect)?;
    let Some(query) = parent.dereference else {
        return Ok(value);
    };

    let params = vec![("id".to_string(), value.clone())];
    match executor.query_scalar(query, &params).await {
        Ok(Some(label)) if !label.is_null() => Ok(label),
        Ok(_) => Ok(value),
        Err(source) => Err(CrudError::Execution {
            operation: "dereference",
            sql: query.to_string(),
            params,
            source,
        }),
    }
}

/// The zero-date sentinel becomes null so backends with later minimum
/// dates don't reject the parameter.
fn clean_zero_date(value: Value) -> Value {
    match value {
        Value::Date(d) if d.year() == 1 && d.ordinal() == 1 => Value::Null,
        Value::DateTime(dt)
            if dt.year() == 1
                && dt.ordinal() == 1
                && dt.num_seconds_from_midnight() == 0
                && dt.nanosecond() == 0 =>
        {
            Value::Null
        }
        other => other,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => "<null>".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::TinyInt(v) => v.to_string(),
        Value::SmallInt(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::Text(v) => v.clone(),
        Value::Char(v) => v.to_string(),
        Value::Bytes(v) => v.iter().map(|b| format!("{b:02x}")).collect(),
        Value::Date(v) => v.to_string(),
        Value::DateTime(v) => v.to_string(),
        Value::Time(v) => v.to_string(),
        Value::Uuid(v) => v.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedExecutor, TestDialect};
    use chrono::NaiveDate;

    fn change(property: &str, old: Value, new: Value) -> PropertyChange {
        PropertyChange {
            property_name: property.to_string(),
            old_value: old,
            new_value: new,
        }
    }

    #[test]
    fn change_detection_rules() {
        assert!(!change("A", Value::Null, Value::Null).is_changed());
        assert!(change("A", Value::Null, Value::Int(1)).is_changed());
        assert!(change("A", Value::Int(1), Value::Null).is_changed());
        assert!(change("A", Value::Int(1), Value::Int(2)).is_changed());
        assert!(!change("A", Value::Int(2), Value::Int(2)).is_changed());
    }

    #[test]
    fn zero_dates_normalize_to_null() {
        let zero = NaiveDate::from_ymd_opt(1, 1, 1).unwrap();
        assert_eq!(clean_zero_date(Value::Date(zero)), Value::Null);
        assert_eq!(
            clean_zero_date(Value::DateTime(zero.and_hms_opt(0, 0, 0).unwrap())),
            Value::Null
        );

        let real = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        assert_eq!(clean_zero_date(Value::Date(real)), Value::Date(real));
    }

    #[test]
    fn stringify_falls_back_to_null_marker() {
        assert_eq!(stringify(&Value::Null), "<null>");
        assert_eq!(stringify(&Value::Int(12)), "12");
        assert_eq!(stringify(&Value::Text("x".into())), "x");
    }

    #[test]
    fn tracking_table_names_follow_the_target() {
        let dialect = TestDialect::default();
        let (history, version) = tracking_tables(&dialect, &TableInfo::new("dbo", "Item"));
        assert_eq!(history, TableInfo::new(CHANGES_SCHEMA, "dbo_Item_History"));
        assert_eq!(version, TableInfo::new(CHANGES_SCHEMA, "dbo_Item_Version"));
    }

    #[tokio::test]
    async fn version_advances_with_conditional_update() {
        let dialect = TestDialect::default();
        let mut executor = ScriptedExecutor::new();
        executor.push_scalar(Some(Value::Int(3)));

        let table = TableInfo::new(CHANGES_SCHEMA, "dbo_Item_Version");
        let version = next_record_version(&dialect, &mut executor, &table, Value::Int(9))
            .await
            .unwrap();

        assert_eq!(version, 3);
        let (sql, params) = &executor.executed[0];
        assert!(sql.contains("SET \"NextVersion\"=@next"));
        assert!(sql.contains("AND \"NextVersion\"=@expected"));
        assert!(params.contains(&("next".to_string(), Value::Int(4))));
        assert!(params.contains(&("expected".to_string(), Value::Int(3))));
    }

    #[tokio::test]
    async fn missing_counter_row_seeds_version_one() {
        let dialect = TestDialect::default();
        let mut executor = ScriptedExecutor::new();
        // No counter row yet.
        executor.push_scalar(None);

        let table = TableInfo::new(CHANGES_SCHEMA, "dbo_Item_Version");
        let version = next_record_version(&dialect, &mut executor, &table, Value::Int(9))
            .await
            .unwrap();

        assert_eq!(version, 1);
        let (sql, params) = &executor.executed[0];
        assert!(sql.starts_with("INSERT INTO"));
        assert!(params.contains(&("NextVersion".to_string(), Value::Int(2))));
    }

    #[tokio::test]
    async fn losing_the_counter_race_retries_with_the_fresh_value() {
        let dialect = TestDialect::default();
        let mut executor = ScriptedExecutor::new();
        executor.push_scalar(Some(Value::Int(3)));
        executor.push_affected(0); // conditional update loses
        executor.push_scalar(Some(Value::Int(4)));
        executor.push_affected(1);

        let table = TableInfo::new(CHANGES_SCHEMA, "dbo_Item_Version");
        let version = next_record_version(&dialect, &mut executor, &table, Value::Int(9))
            .await
            .unwrap();
        assert_eq!(version, 4);
        assert_eq!(executor.executed.len(), 2);
    }

    #[tokio::test]
    async fn a_counter_that_never_settles_is_a_conflict() {
        let dialect = TestDialect::default();
        let mut executor = ScriptedExecutor::new();
        for v in 0..VERSION_RETRY_LIMIT {
            executor.push_scalar(Some(Value::Int(3 + v as i32)));
            executor.push_affected(0);
        }

        let table = TableInfo::new(CHANGES_SCHEMA, "dbo_Item_Version");
        let result = next_record_version(&dialect, &mut executor, &table, Value::Int(9)).await;
        assert!(matches!(
            result,
            Err(CrudError::VersionConflict { attempts, .. }) if attempts == VERSION_RETRY_LIMIT
        ));
    }
}
