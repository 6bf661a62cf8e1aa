//! # tablesync-core
//!
//! A model-driven schema synchronization and CRUD-generation core.
//!
//! Application code declares plain model types with static mapping
//! descriptors (table and column names, identity column, keys,
//! foreign-key references, calculated columns, change-tracking
//! opt-in). This crate turns those declarations into:
//!
//! - **Parameterized CRUD statements**: insert/update/delete/find text
//!   with named `@Property` parameters, built per backend through the
//!   [`dialect::Dialect`] contract and executed through a
//!   caller-supplied [`executor::Executor`].
//! - **A schema merge plan**: [`merge::MergeEngine`] compares the
//!   declared model set against the live catalog (read by
//!   [`catalog::CatalogReader`]) and emits a dependency-ordered
//!   [`merge::Action`] list: schemas before tables, tables before their
//!   foreign keys, dependent keys dropped before their table. The same
//!   list either executes directly or serializes into a review script.
//! - **Versioned change history**: models opted into tracking get
//!   column-level before/after rows in a per-model history table, with
//!   a per-record version counter advanced under an optimistic
//!   conditional update.
//!
//! Backend dialects (SQL-Server-style, MySQL-style) live in sibling
//! crates; this crate is driver-agnostic and never opens a connection.

pub mod catalog;
pub mod crud;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod extract;
pub mod merge;
pub mod metadata;
pub mod model;
pub mod testing;
pub mod tracking;
pub mod value;

pub use crud::SqlProvider;
pub use dialect::{Dialect, SqlTypeInfo};
pub use error::{CrudError, MappingError, MergeError};
pub use executor::Executor;
pub use extract::{ModelSet, ModelTable};
pub use merge::{Action, ActionKind, MergeEngine, ObjectKind};
pub use metadata::{ColumnInfo, ColumnRef, ForeignKeyInfo, KeyLayout, TableInfo};
pub use model::{
    ColumnSpec, HostType, IdentityPosition, KeyValue, Model, PermissionChecker, SaveAction,
    SaveActions, SaveHooks, TableSpec, TrackedRecord, UserContext, Validator,
};
pub use tracking::{PropertyChange, CHANGES_SCHEMA};
pub use value::{BoxError, Params, Row, Value};
