//! Metadata extraction.
//!
//! Turns a model's static descriptors into the [`TableInfo`] /
//! [`ColumnInfo`] values everything downstream consumes. Extraction is
//! a pure function of the declaration and the dialect; it never touches
//! a connection, and it fails fast: an unresolvable identity or an
//! unsupported host type aborts before any SQL text is built.

use crate::dialect::Dialect;
use crate::error::MappingError;
use crate::metadata::{ColumnInfo, ColumnRef, ForeignKeyInfo, KeyLayout, ParentTable, TableInfo};
use crate::model::{ColumnSpec, IdentityPosition, Model, SaveAction};

/// Conventional identity property name used when a model does not name
/// one explicitly.
pub const DEFAULT_IDENTITY_PROPERTY: &str = "Id";

/// A fully extracted model table: everything CREATE TABLE and the diff
/// engine need, detached from the model type.
#[derive(Debug, Clone)]
pub struct ModelTable {
    pub table: TableInfo,
    pub columns: Vec<ColumnInfo>,
    pub key: KeyLayout,
}

impl ModelTable {
    /// The foreign keys declared by this table's columns.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKeyInfo> {
        self.columns.iter().filter_map(|c| c.foreign_key.as_ref())
    }
}

pub(crate) fn short_type_name<M>() -> String {
    std::any::type_name::<M>()
        .rsplit("::")
        .next()
        .unwrap_or_default()
        .to_string()
}

/// The table identity of a model under the given dialect. Dialects
/// without schema support always yield an empty schema.
pub fn table_info<M: Model>(dialect: &dyn Dialect) -> TableInfo {
    let schema = if dialect.supports_schemas() {
        M::TABLE.schema.unwrap_or_else(|| dialect.default_schema())
    } else {
        ""
    };
    TableInfo {
        schema: schema.to_string(),
        name: M::TABLE.name.to_string(),
        model: short_type_name::<M>(),
        row_count: None,
    }
}

/// Resolves the identity column spec: the explicitly named property,
/// else the conventional `Id` fallback.
pub fn identity_spec<M: Model>() -> Result<&'static ColumnSpec, MappingError> {
    let mapped = |spec: &&ColumnSpec| spec.mapped;
    match M::TABLE.identity {
        Some(property) => M::COLUMNS
            .iter()
            .filter(mapped)
            .find(|spec| spec.property == property)
            .ok_or_else(|| MappingError::UnknownIdentity {
                model: short_type_name::<M>(),
                property: property.to_string(),
            }),
        None => M::COLUMNS
            .iter()
            .filter(mapped)
            .find(|spec| spec.property == DEFAULT_IDENTITY_PROPERTY)
            .ok_or_else(|| MappingError::NoIdentity {
                model: short_type_name::<M>(),
            }),
    }
}

/// The referenced side of a foreign key into `M`'s table. Monomorphize
/// this as the `parent` fn pointer of a
/// [`ForeignKeySpec`](crate::model::ForeignKeySpec).
pub fn parent_of<M: Model>(dialect: &dyn Dialect) -> Result<ParentTable, MappingError> {
    let identity = identity_spec::<M>()?;
    Ok(ParentTable {
        table: table_info::<M>(dialect),
        identity_column: identity.name().to_string(),
        dereference: M::TABLE.dereference,
    })
}

/// Resolves one spec against the dialect's type table.
fn resolve_column(
    dialect: &dyn Dialect,
    table: &TableInfo,
    model: &str,
    spec: &ColumnSpec,
) -> Result<ColumnInfo, MappingError> {
    let mut column = ColumnInfo::named(table.schema.clone(), table.name.clone(), spec.name());
    column.table.model = model.to_string();
    column.property_name = spec.property.to_string();
    column.nullable = spec.nullable;
    column.precision = spec.precision;
    column.scale = spec.scale;
    column.save = spec.save;
    column.unique = spec.unique;

    if let Some(calc) = spec.calculated {
        column.calculated = true;
        column.expression = Some(calc.expression.to_string());
        column.persisted = calc.persisted;
        return Ok(column);
    }

    column.data_type = match spec.data_type {
        Some(explicit) => explicit.to_string(),
        None => dialect
            .sql_type(spec.host_type, spec.length, spec.precision, spec.scale)
            .ok_or_else(|| MappingError::UnsupportedType {
                model: model.to_string(),
                property: spec.property.to_string(),
                host_type: spec.host_type,
                dialect: dialect.name().to_string(),
            })?
            .formatted_name,
    };

    if let Some(fk) = spec.references {
        let parent = (fk.parent)(dialect)?;
        column.foreign_key = Some(ForeignKeyInfo {
            parent: ColumnRef::new(
                parent.table.schema.clone(),
                parent.table.name.clone(),
                parent.identity_column,
            ),
            child: ColumnRef::new(table.schema.clone(), table.name.clone(), spec.name()),
            constraint_name: format!("FK_{}_{}", table.constraint_stem(), spec.name()),
            cascade_delete: fk.cascade_delete,
        });
    }

    Ok(column)
}

/// Resolves a bare spec list against a dialect, for tables that exist
/// outside the model registry (the change-tracking bookkeeping tables).
pub(crate) fn columns_from_specs(
    dialect: &dyn Dialect,
    table: &TableInfo,
    specs: &[ColumnSpec],
) -> Result<Vec<ColumnInfo>, MappingError> {
    specs
        .iter()
        .map(|spec| resolve_column(dialect, table, &table.model, spec))
        .collect()
}

/// Mapped specs in their effective order, honoring the identity
/// placement hint.
fn ordered_specs<M: Model>() -> Result<Vec<&'static ColumnSpec>, MappingError> {
    let identity = identity_spec::<M>()?;
    let mapped: Vec<&ColumnSpec> = M::COLUMNS.iter().filter(|spec| spec.mapped).collect();

    Ok(match M::TABLE.identity_position {
        IdentityPosition::Declared => mapped,
        IdentityPosition::First => {
            let mut out = vec![identity];
            out.extend(mapped.into_iter().filter(|s| s.property != identity.property));
            out
        }
        IdentityPosition::Last => {
            let mut out: Vec<&ColumnSpec> = mapped
                .into_iter()
                .filter(|s| s.property != identity.property)
                .collect();
            out.push(identity);
            out
        }
    })
}

/// Extracts the full table metadata for a model.
pub fn model_table<M: Model>(dialect: &dyn Dialect) -> Result<ModelTable, MappingError> {
    let table = table_info::<M>(dialect);
    let model = short_type_name::<M>();
    let identity = identity_spec::<M>()?;

    let columns = ordered_specs::<M>()?
        .into_iter()
        .map(|spec| resolve_column(dialect, &table, &model, spec))
        .collect::<Result<Vec<_>, _>>()?;

    let explicit_pk: Vec<String> = M::COLUMNS
        .iter()
        .filter(|spec| spec.mapped && spec.primary_key)
        .map(|spec| spec.name().to_string())
        .collect();
    let identity_is_primary_key = explicit_pk.is_empty();
    let primary_key_columns = if identity_is_primary_key {
        vec![identity.name().to_string()]
    } else {
        explicit_pk
    };

    Ok(ModelTable {
        table,
        columns,
        key: KeyLayout {
            identity_column: Some(identity.name().to_string()),
            identity_property: Some(identity.property.to_string()),
            primary_key_columns,
            identity_is_primary_key,
        },
    })
}

/// Mapped columns eligible for the given save action: everything except
/// the identity column, calculated columns, and columns whose
/// save-action mask excludes the action.
pub fn editable_columns<M: Model>(
    dialect: &dyn Dialect,
    action: SaveAction,
) -> Result<Vec<ColumnInfo>, MappingError> {
    let identity = identity_spec::<M>()?.name();
    let extracted = model_table::<M>(dialect)?;
    Ok(extracted
        .columns
        .into_iter()
        .filter(|col| !col.column_name.eq_ignore_ascii_case(identity))
        .filter(|col| !col.calculated)
        .filter(|col| col.save.includes(action))
        .collect())
}

/// Spec-level view of [`editable_columns`], used where property values
/// must be read back off a model instance.
pub fn editable_specs<M: Model>(
    action: SaveAction,
) -> Result<Vec<&'static ColumnSpec>, MappingError> {
    let identity = identity_spec::<M>()?.property;
    Ok(M::COLUMNS
        .iter()
        .filter(|spec| spec.mapped)
        .filter(|spec| spec.property != identity)
        .filter(|spec| spec.calculated.is_none())
        .filter(|spec| spec.save.includes(action))
        .collect())
}

type ExtractFn = fn(&dyn Dialect) -> Result<ModelTable, MappingError>;

/// The declared model set: a registry of extraction entry points,
/// populated once at startup and resolved against a dialect when a
/// merge run begins.
#[derive(Debug, Clone, Default)]
pub struct ModelSet {
    entries: Vec<ExtractFn>,
}

impl ModelSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with<M: Model>(mut self) -> Self {
        self.entries.push(model_table::<M>);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Extracts every registered model, failing fast on the first
    /// mapping problem.
    pub fn resolve(&self, dialect: &dyn Dialect) -> Result<Vec<ModelTable>, MappingError> {
        self.entries.iter().map(|extract| extract(dialect)).collect()
    }
}
