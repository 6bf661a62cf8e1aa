//! Error types.

use thiserror::Error;

use crate::merge::action::{ActionKind, ObjectKind};
use crate::model::HostType;
use crate::value::{BoxError, Params};

/// Raised while turning a model declaration into column metadata.
/// Always fails fast, before any SQL text is built.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The model declares no identity property and has no mapped
    /// property named `Id` to fall back on.
    #[error("no resolvable identity column on model `{model}`")]
    NoIdentity { model: String },

    /// The identity property named by the model is not among its
    /// mapped columns.
    #[error("identity property `{property}` of model `{model}` is not a mapped column")]
    UnknownIdentity { model: String, property: String },

    /// The active dialect has no SQL type for the property's host type.
    #[error("host type {host_type:?} of `{model}.{property}` is not supported by the {dialect} dialect")]
    UnsupportedType {
        model: String,
        property: String,
        host_type: HostType,
        dialect: String,
    },
}

/// Raised by the CRUD operations.
#[derive(Debug, Error)]
pub enum CrudError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// The underlying driver failed; carries the generated command and
    /// the bound parameters so the failure is diagnosable without
    /// re-deriving the SQL.
    #[error("{operation} failed: {source} (command: {sql})")]
    Execution {
        operation: &'static str,
        sql: String,
        params: Params,
        #[source]
        source: BoxError,
    },

    /// A model's validation hook rejected the record.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A model's permission hook denied the operation for this user.
    #[error("user {user} does not have {operation} permission on {model}")]
    Permission {
        user: String,
        operation: &'static str,
        model: String,
    },

    /// A primary-key lookup was requested on a model that declares no
    /// primary-key columns.
    #[error("no primary key properties on model {model}")]
    NoPrimaryKey { model: String },

    /// The insert statement did not return a usable identity value.
    #[error("insert returned no identity value (command: {sql})")]
    IdentityNotReturned { sql: String },

    /// A record's identity may only be assigned once.
    #[error("can't set a record's identity more than once")]
    IdentityAlreadySet,

    /// Decoding a result row into a model instance failed.
    #[error("row materialization failed: {0}")]
    Materialize(#[source] BoxError),

    /// The change-tracking version counter kept moving under us.
    #[error("version counter conflict on {table} after {attempts} attempts")]
    VersionConflict { table: String, attempts: u32 },
}

/// Raised by the merge engine, the catalog reader, and the action
/// executor.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// A catalog query failed. Propagated unchanged from the driver;
    /// retry policy belongs to the caller.
    #[error("catalog read failed: {source} (query: {sql})")]
    Catalog {
        sql: String,
        #[source]
        source: BoxError,
    },

    /// A catalog row was missing a required column.
    #[error("catalog row is missing column `{0}`")]
    MalformedCatalogRow(&'static str),

    /// Applying an action failed. Execution halts here; earlier actions
    /// stay applied.
    #[error("{action_kind:?} {object_kind:?} failed: {source} (command: {sql})")]
    Execution {
        object_kind: ObjectKind,
        action_kind: ActionKind,
        sql: String,
        #[source]
        source: BoxError,
    },
}
