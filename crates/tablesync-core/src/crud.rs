//! CRUD generation and execution.
//!
//! [`SqlProvider`] pairs a dialect with the extraction layer: the
//! `*_command` methods are pure text constructors, and the async
//! operations run them through a caller-supplied [`Executor`], invoking
//! the model's capability hooks at fixed points (validate → permission
//! → before-save → execute → after-save).

use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{CrudError, MappingError};
use crate::executor::Executor;
use crate::extract;
use crate::model::{KeyValue, Model, SaveAction, UserContext};
use crate::tracking;
use crate::value::{BoxError, Params, Value};

/// Generates and runs CRUD statements for mapped models.
pub struct SqlProvider<D> {
    dialect: D,
}

impl<D: Dialect> SqlProvider<D> {
    pub fn new(dialect: D) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    // ---- command text ------------------------------------------

    /// Insert returning the generated identity value.
    pub fn insert_command<M: Model>(&self) -> Result<String, MappingError> {
        let extracted = extract::model_table::<M>(&self.dialect)?;
        let columns = extract::editable_columns::<M>(&self.dialect, SaveAction::Insert)?;
        Ok(self.dialect.insert_command(&extracted.table, &columns, &extracted.key))
    }

    /// Insert without identity retrieval; `table_name` overrides the
    /// target table (used when appending to auxiliary tables).
    pub fn plain_insert_command<M: Model>(
        &self,
        table_name: Option<&str>,
    ) -> Result<String, MappingError> {
        let extracted = extract::model_table::<M>(&self.dialect)?;
        let columns = extract::editable_columns::<M>(&self.dialect, SaveAction::Insert)?;
        Ok(self.dialect.plain_insert_command(&extracted.table, &columns, table_name))
    }

    pub fn update_command<M: Model>(&self) -> Result<String, MappingError> {
        let extracted = extract::model_table::<M>(&self.dialect)?;
        let columns = extract::editable_columns::<M>(&self.dialect, SaveAction::Update)?;
        let identity = extract::identity_spec::<M>()?.name();
        Ok(self.dialect.update_command(&extracted.table, &columns, identity))
    }

    pub fn delete_command<M: Model>(&self) -> Result<String, MappingError> {
        let extracted = extract::model_table::<M>(&self.dialect)?;
        let identity = extract::identity_spec::<M>()?.name();
        Ok(self.dialect.delete_command(&extracted.table, identity))
    }

    /// Select over all mapped columns with a caller-built WHERE
    /// fragment.
    pub fn find_command<M: Model>(&self, where_clause: &str) -> Result<String, MappingError> {
        let extracted = extract::model_table::<M>(&self.dialect)?;
        Ok(self.dialect.find_command(&extracted.table, &extracted.columns, where_clause))
    }

    pub fn create_table_command<M: Model>(&self) -> Result<String, MappingError> {
        let extracted = extract::model_table::<M>(&self.dialect)?;
        Ok(self.dialect.create_table_sql(&extracted.table, &extracted.columns, &extracted.key))
    }

    // ---- operations --------------------------------------------

    /// Whether the record has not been saved yet (identity still at its
    /// sentinel value).
    pub fn is_new<M: Model>(&self, record: &M) -> bool {
        record.key().is_default()
    }

    /// Inserts the record and stamps the generated identity onto it.
    pub async fn insert<M: Model, E: Executor>(
        &self,
        executor: &mut E,
        record: &mut M,
        user: Option<&dyn UserContext>,
    ) -> Result<M::Key, CrudError> {
        self.pre_save(record, SaveAction::Insert, user)?;

        let sql = self.insert_command::<M>()?;
        let params = self.save_params::<M>(record, SaveAction::Insert)?;
        debug!(sql = %sql, "insert");
        let scalar = executor
            .query_scalar(&sql, &params)
            .await
            .map_err(execution("insert", &sql, &params))?;
        let key = scalar
            .as_ref()
            .and_then(M::Key::from_value)
            .ok_or(CrudError::IdentityNotReturned { sql })?;

        set_identity(record, key.clone())?;
        if let Some(hooks) = record.save_hooks() {
            hooks.after_save(SaveAction::Insert);
        }
        Ok(key)
    }

    /// Inserts without identity retrieval.
    pub async fn plain_insert<M: Model, E: Executor>(
        &self,
        executor: &mut E,
        record: &mut M,
        table_name: Option<&str>,
        user: Option<&dyn UserContext>,
    ) -> Result<(), CrudError> {
        self.pre_save(record, SaveAction::Insert, user)?;

        let sql = self.plain_insert_command::<M>(table_name)?;
        let params = self.save_params::<M>(record, SaveAction::Insert)?;
        debug!(sql = %sql, "plain insert");
        executor
            .execute(&sql, &params)
            .await
            .map_err(execution("insert", &sql, &params))?;

        if let Some(hooks) = record.save_hooks() {
            hooks.after_save(SaveAction::Insert);
        }
        Ok(())
    }

    /// Updates the record by identity. For tracked models this loads
    /// the prior row first and appends the per-column change history
    /// after the update commits.
    pub async fn update<M: Model, E: Executor>(
        &self,
        executor: &mut E,
        record: &mut M,
        user: Option<&dyn UserContext>,
    ) -> Result<(), CrudError> {
        self.pre_save(record, SaveAction::Update, user)?;

        let changes = tracking::pending_changes(self, executor, record).await?;

        let sql = self.update_command::<M>()?;
        let mut params = self.save_params::<M>(record, SaveAction::Update)?;
        params.push(("id".to_string(), record.key().to_value()));
        debug!(sql = %sql, "update");
        executor
            .execute(&sql, &params)
            .await
            .map_err(execution("update", &sql, &params))?;

        tracking::save_changes(self, executor, record, changes, user).await?;

        if let Some(hooks) = record.save_hooks() {
            hooks.after_save(SaveAction::Update);
        }
        Ok(())
    }

    /// Insert-or-update on the identity sentinel.
    pub async fn save<M: Model, E: Executor>(
        &self,
        executor: &mut E,
        record: &mut M,
        user: Option<&dyn UserContext>,
    ) -> Result<M::Key, CrudError> {
        if self.is_new(record) {
            self.insert(executor, record, user).await
        } else {
            self.update(executor, record, user).await?;
            Ok(record.key())
        }
    }

    /// Upsert keyed on the declared primary-key columns: adopts the
    /// identity of a matching row when one exists, then saves.
    pub async fn merge<M: Model, E: Executor>(
        &self,
        executor: &mut E,
        record: &mut M,
        user: Option<&dyn UserContext>,
    ) -> Result<M::Key, CrudError> {
        if self.is_new(record) {
            if let Some(existing) = self.find_by_primary_key(executor, record, user).await? {
                set_identity(record, existing.key())?;
            }
        }
        self.save(executor, record, user).await
    }

    /// Single-record lookup by identity.
    pub async fn find<M: Model, E: Executor>(
        &self,
        executor: &mut E,
        key: M::Key,
        user: Option<&dyn UserContext>,
    ) -> Result<Option<M>, CrudError> {
        let identity = extract::identity_spec::<M>()?.name();
        let where_clause = format!("{}=@id", self.dialect.quote_part(identity));
        let params = vec![("id".to_string(), key.to_value())];
        self.find_with(executor, &where_clause, params, user).await
    }

    /// Lookup by whichever of the criteria record's mapped columns
    /// carry a non-absent value (nulls, empty strings, and zero values
    /// don't filter).
    pub async fn find_where<M: Model, E: Executor>(
        &self,
        executor: &mut E,
        criteria: &M,
        user: Option<&dyn UserContext>,
    ) -> Result<Option<M>, CrudError> {
        let (where_clause, params) = self.criteria_clause(criteria, |_| true);
        if where_clause.is_empty() {
            debug!("criteria record carries no values; nothing to match");
            return Ok(None);
        }
        self.find_with(executor, &where_clause, params, user).await
    }

    /// Lookup by the declared primary-key column set.
    pub async fn find_by_primary_key<M: Model, E: Executor>(
        &self,
        executor: &mut E,
        criteria: &M,
        user: Option<&dyn UserContext>,
    ) -> Result<Option<M>, CrudError> {
        let (where_clause, params) = self.primary_key_clause(criteria);
        if where_clause.is_empty() {
            return Err(CrudError::NoPrimaryKey {
                model: extract::short_type_name::<M>(),
            });
        }
        self.find_with(executor, &where_clause, params, user).await
    }

    pub async fn exists<M: Model, E: Executor>(
        &self,
        executor: &mut E,
        key: M::Key,
        user: Option<&dyn UserContext>,
    ) -> Result<bool, CrudError> {
        Ok(self.find::<M, E>(executor, key, user).await?.is_some())
    }

    pub async fn exists_where<M: Model, E: Executor>(
        &self,
        executor: &mut E,
        criteria: &M,
        user: Option<&dyn UserContext>,
    ) -> Result<bool, CrudError> {
        Ok(self.find_where(executor, criteria, user).await?.is_some())
    }

    /// Deletes by identity, honoring the delete-permission hook of the
    /// record being removed.
    pub async fn delete<M: Model, E: Executor>(
        &self,
        executor: &mut E,
        key: M::Key,
        user: Option<&dyn UserContext>,
    ) -> Result<(), CrudError> {
        let found = self.find::<M, E>(executor, key.clone(), user).await?;
        if let (Some(user), Some(record)) = (user, found.as_ref()) {
            if let Some(permissions) = record.permissions() {
                if !permissions.can_delete(user) {
                    return Err(CrudError::Permission {
                        user: user.user_name().to_string(),
                        operation: "delete",
                        model: extract::short_type_name::<M>(),
                    });
                }
            }
        }

        let sql = self.delete_command::<M>()?;
        let params = vec![("id".to_string(), key.to_value())];
        debug!(sql = %sql, "delete");
        executor
            .execute(&sql, &params)
            .await
            .map_err(execution("delete", &sql, &params))?;

        if let Some(mut record) = found {
            if let Some(hooks) = record.save_hooks() {
                hooks.after_delete();
            }
        }
        Ok(())
    }

    /// Creates the model's table.
    pub async fn create_table<M: Model, E: Executor>(
        &self,
        executor: &mut E,
    ) -> Result<(), CrudError> {
        let sql = self.create_table_command::<M>()?;
        debug!(sql = %sql, "create table");
        executor
            .execute(&sql, &[])
            .await
            .map_err(execution("create table", &sql, &[]))?;
        Ok(())
    }

    // ---- internals ---------------------------------------------

    fn pre_save<M: Model>(
        &self,
        record: &mut M,
        action: SaveAction,
        user: Option<&dyn UserContext>,
    ) -> Result<(), CrudError> {
        if let Some(validator) = record.validator() {
            validator.validate().map_err(CrudError::Validation)?;
        }
        if let Some(user) = user {
            if let Some(permissions) = record.permissions() {
                if !permissions.can_save(user) {
                    return Err(CrudError::Permission {
                        user: user.user_name().to_string(),
                        operation: "save",
                        model: extract::short_type_name::<M>(),
                    });
                }
            }
            if let Some(hooks) = record.save_hooks() {
                hooks.before_save(action, user);
            }
        }
        Ok(())
    }

    fn save_params<M: Model>(&self, record: &M, action: SaveAction) -> Result<Params, CrudError> {
        Ok(extract::editable_specs::<M>(action)?
            .iter()
            .map(|spec| (spec.property.to_string(), record.value(spec.property)))
            .collect())
    }

    /// `col=@Prop AND …` over the mapped columns passing `keep` whose
    /// values are present on the criteria record.
    fn criteria_clause<M: Model>(
        &self,
        criteria: &M,
        keep: impl Fn(&crate::model::ColumnSpec) -> bool,
    ) -> (String, Params) {
        let mut fragments = Vec::new();
        let mut params = Params::new();
        for spec in M::COLUMNS.iter().filter(|s| s.mapped).filter(|s| keep(s)) {
            let value = criteria.value(spec.property);
            if value.is_absent() {
                continue;
            }
            fragments.push(format!(
                "{}=@{}",
                self.dialect.quote_part(spec.name()),
                spec.property
            ));
            params.push((spec.property.to_string(), value));
        }
        (fragments.join(" AND "), params)
    }

    fn primary_key_clause<M: Model>(&self, criteria: &M) -> (String, Params) {
        let mut fragments = Vec::new();
        let mut params = Params::new();
        for spec in M::COLUMNS.iter().filter(|s| s.mapped && s.primary_key) {
            fragments.push(format!(
                "{}=@{}",
                self.dialect.quote_part(spec.name()),
                spec.property
            ));
            params.push((spec.property.to_string(), criteria.value(spec.property)));
        }
        (fragments.join(" AND "), params)
    }

    async fn find_with<M: Model, E: Executor>(
        &self,
        executor: &mut E,
        where_clause: &str,
        params: Params,
        user: Option<&dyn UserContext>,
    ) -> Result<Option<M>, CrudError> {
        let sql = self.find_command::<M>(where_clause)?;
        debug!(sql = %sql, "find");
        let rows = executor
            .query(&sql, &params)
            .await
            .map_err(execution("find", &sql, &params))?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let record = M::from_row(row).map_err(CrudError::Materialize)?;

        if let Some(user) = user {
            if let Some(permissions) = record.permissions() {
                if !permissions.can_find(user) {
                    return Err(CrudError::Permission {
                        user: user.user_name().to_string(),
                        operation: "find",
                        model: extract::short_type_name::<M>(),
                    });
                }
            }
        }
        Ok(Some(record))
    }
}

fn set_identity<M: Model>(record: &mut M, key: M::Key) -> Result<(), CrudError> {
    if record.key().is_default() {
        record.set_key(key);
        Ok(())
    } else {
        Err(CrudError::IdentityAlreadySet)
    }
}

/// Builds the error mapper wrapping a driver failure with the command
/// that triggered it.
fn execution(
    operation: &'static str,
    sql: &str,
    params: &[(String, Value)],
) -> impl FnOnce(BoxError) -> CrudError {
    let sql = sql.to_string();
    let params = params.to_vec();
    move |source| CrudError::Execution {
        operation,
        sql,
        params,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ColumnSpec, HostType, PermissionChecker, SaveHooks, TableSpec, Validator,
    };
    use crate::testing::{ScriptedExecutor, TestDialect};
    use crate::value::Row;

    #[derive(Default)]
    struct Person {
        id: i32,
        first_name: String,
        last_name: String,
        email: String,
    }

    impl Model for Person {
        type Key = i32;
        const TABLE: TableSpec = TableSpec::new("Person");
        const COLUMNS: &'static [ColumnSpec] = &[
            ColumnSpec::new("Id", HostType::Int),
            ColumnSpec::new("FirstName", HostType::Text).max_length(50),
            ColumnSpec::new("LastName", HostType::Text).max_length(50),
            ColumnSpec::new("Email", HostType::Text).max_length(100).nullable(),
        ];

        fn key(&self) -> i32 {
            self.id
        }

        fn set_key(&mut self, key: i32) {
            self.id = key;
        }

        fn value(&self, property: &str) -> Value {
            match property {
                "Id" => Value::Int(self.id),
                "FirstName" => Value::Text(self.first_name.clone()),
                "LastName" => Value::Text(self.last_name.clone()),
                "Email" => Value::Text(self.email.clone()),
                _ => Value::Null,
            }
        }

        fn from_row(row: &crate::value::Row) -> Result<Self, BoxError> {
            Ok(Self {
                id: row.int("Id").unwrap_or_default() as i32,
                first_name: row.string("FirstName").unwrap_or_default(),
                last_name: row.string("LastName").unwrap_or_default(),
                email: row.string("Email").unwrap_or_default(),
            })
        }

        fn validator(&self) -> Option<&dyn Validator> {
            Some(self)
        }

        fn permissions(&self) -> Option<&dyn PermissionChecker> {
            Some(self)
        }

        fn save_hooks(&mut self) -> Option<&mut dyn SaveHooks> {
            Some(self)
        }
    }

    impl Validator for Person {
        fn validate(&self) -> Result<(), String> {
            if self.last_name.is_empty() {
                Err("LastName is required".to_string())
            } else {
                Ok(())
            }
        }
    }

    impl PermissionChecker for Person {
        fn can_save(&self, user: &dyn UserContext) -> bool {
            user.user_name() != "intruder"
        }
    }

    impl SaveHooks for Person {
        fn before_save(&mut self, _action: SaveAction, user: &dyn UserContext) {
            self.email = format!("{}@example.com", user.user_name());
        }
    }

    struct TestUser(&'static str);

    impl UserContext for TestUser {
        fn user_name(&self) -> &str {
            self.0
        }
    }

    fn provider() -> SqlProvider<TestDialect> {
        SqlProvider::new(TestDialect)
    }

    fn person() -> Person {
        Person {
            id: 0,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: String::new(),
        }
    }

    #[test]
    fn insert_command_text() {
        let sql = provider().insert_command::<Person>().unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"dbo\".\"Person\" (\"FirstName\", \"LastName\", \"Email\") \
             VALUES (@FirstName, @LastName, @Email) RETURNING \"Id\""
        );
    }

    #[test]
    fn update_command_text() {
        let sql = provider().update_command::<Person>().unwrap();
        assert_eq!(
            sql,
            "UPDATE \"dbo\".\"Person\" SET \"FirstName\"=@FirstName, \"LastName\"=@LastName, \
             \"Email\"=@Email WHERE \"Id\"=@id"
        );
    }

    #[tokio::test]
    async fn insert_stamps_the_generated_identity() {
        let provider = provider();
        let mut executor = ScriptedExecutor::new();
        executor.push_scalar(Some(Value::Int(7)));

        let mut record = person();
        let key = provider.insert(&mut executor, &mut record, None).await.unwrap();

        assert_eq!(key, 7);
        assert_eq!(record.id, 7);
        let (_, params) = &executor.queried[0];
        assert!(params.contains(&("LastName".to_string(), Value::Text("Lovelace".into()))));
    }

    #[tokio::test]
    async fn before_save_runs_before_parameters_are_read() {
        let provider = provider();
        let mut executor = ScriptedExecutor::new();
        executor.push_scalar(Some(Value::Int(1)));

        let mut record = person();
        provider
            .insert(&mut executor, &mut record, Some(&TestUser("ada")))
            .await
            .unwrap();

        let (_, params) = &executor.queried[0];
        assert!(params.contains(&("Email".to_string(), Value::Text("ada@example.com".into()))));
    }

    #[tokio::test]
    async fn validation_failure_stops_before_any_sql() {
        let provider = provider();
        let mut executor = ScriptedExecutor::new();

        let mut record = person();
        record.last_name.clear();
        let result = provider.insert(&mut executor, &mut record, None).await;

        assert!(matches!(result, Err(CrudError::Validation(_))));
        assert!(executor.queried.is_empty());
        assert!(executor.executed.is_empty());
    }

    #[tokio::test]
    async fn denied_save_permission_stops_before_any_sql() {
        let provider = provider();
        let mut executor = ScriptedExecutor::new();

        let mut record = person();
        let result = provider
            .insert(&mut executor, &mut record, Some(&TestUser("intruder")))
            .await;

        assert!(matches!(
            result,
            Err(CrudError::Permission { operation: "save", .. })
        ));
        assert!(executor.queried.is_empty());
    }

    #[tokio::test]
    async fn find_materializes_the_first_row() {
        let provider = provider();
        let mut executor = ScriptedExecutor::new();
        executor.push_rows(vec![Row::new(vec![
            ("Id".into(), Value::Int(4)),
            ("FirstName".into(), Value::Text("Grace".into())),
            ("LastName".into(), Value::Text("Hopper".into())),
            ("Email".into(), Value::Null),
        ])]);

        let found: Option<Person> = provider.find(&mut executor, 4, None).await.unwrap();
        let record = found.unwrap();
        assert_eq!(record.last_name, "Hopper");

        let (sql, params) = &executor.queried[0];
        assert!(sql.ends_with("WHERE \"Id\"=@id"));
        assert_eq!(params[0], ("id".to_string(), Value::Int(4)));
    }

    #[tokio::test]
    async fn find_where_uses_only_present_values() {
        let provider = provider();
        let mut executor = ScriptedExecutor::new();
        executor.push_rows(vec![]);

        let mut criteria = Person::default();
        criteria.last_name = "Hopper".into();
        let found = provider.find_where(&mut executor, &criteria, None).await.unwrap();
        assert!(found.is_none());

        let (sql, params) = &executor.queried[0];
        assert!(sql.contains("WHERE \"LastName\"=@LastName"));
        assert!(!sql.contains("FirstName=@"));
        assert_eq!(params.len(), 1);
    }

    #[tokio::test]
    async fn blank_criteria_match_nothing_without_a_query() {
        let provider = provider();
        let mut executor = ScriptedExecutor::new();

        let found = provider
            .find_where(&mut executor, &Person::default(), None)
            .await
            .unwrap();
        assert!(found.is_none());
        assert!(executor.queried.is_empty());
    }

    #[tokio::test]
    async fn delete_issues_the_keyed_delete() {
        let provider = provider();
        let mut executor = ScriptedExecutor::new();
        executor.push_rows(vec![Row::new(vec![
            ("Id".into(), Value::Int(4)),
            ("LastName".into(), Value::Text("Hopper".into())),
        ])]);

        provider.delete::<Person, _>(&mut executor, 4, None).await.unwrap();

        let (sql, params) = &executor.executed[0];
        assert_eq!(sql, "DELETE FROM \"dbo\".\"Person\" WHERE \"Id\"=@id");
        assert_eq!(params[0], ("id".to_string(), Value::Int(4)));
    }

    #[tokio::test]
    async fn save_routes_on_the_identity_sentinel() {
        let provider = provider();
        let mut executor = ScriptedExecutor::new();
        executor.push_scalar(Some(Value::Int(9)));

        let mut record = person();
        provider.save(&mut executor, &mut record, None).await.unwrap();
        assert_eq!(record.id, 9);

        // Second save goes through update.
        provider.save(&mut executor, &mut record, None).await.unwrap();
        let (sql, _) = executor.executed.last().unwrap();
        assert!(sql.starts_with("UPDATE"));
    }
}
