//! Static model descriptors.
//!
//! A model type describes its own mapping with two associated
//! constants: a [`TableSpec`] for table-level settings and a
//! [`ColumnSpec`] slice for its properties. Extraction
//! ([`crate::extract`]) turns these into the metadata value types the
//! generators and the merge engine consume; there is no runtime
//! introspection anywhere.
//!
//! ```
//! use tablesync_core::model::{ColumnSpec, HostType, Model, TableSpec};
//! use tablesync_core::value::{BoxError, Row, Value};
//!
//! struct Widget {
//!     id: i32,
//!     name: String,
//! }
//!
//! impl Model for Widget {
//!     type Key = i32;
//!     const TABLE: TableSpec = TableSpec::new("Widget");
//!     const COLUMNS: &'static [ColumnSpec] = &[
//!         ColumnSpec::new("Id", HostType::Int),
//!         ColumnSpec::new("Name", HostType::Text).max_length(50),
//!     ];
//!
//!     fn key(&self) -> i32 { self.id }
//!     fn set_key(&mut self, key: i32) { self.id = key; }
//!     fn value(&self, property: &str) -> Value {
//!         match property {
//!             "Id" => Value::Int(self.id),
//!             "Name" => Value::Text(self.name.clone()),
//!             _ => Value::Null,
//!         }
//!     }
//!     fn from_row(row: &Row) -> Result<Self, BoxError> {
//!         Ok(Self {
//!             id: row.int("Id").unwrap_or_default() as i32,
//!             name: row.string("Name").unwrap_or_default(),
//!         })
//!     }
//! }
//! ```

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::error::MappingError;
use crate::metadata::ParentTable;
use crate::tracking::PropertyChange;
use crate::value::{BoxError, Row, Value};

/// Host-side types that can map to a database column. A dialect with no
/// SQL type for one of these rejects the model with a
/// [`MappingError`](crate::error::MappingError).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostType {
    Bool,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal,
    Text,
    Char,
    Bytes,
    Date,
    DateTime,
    Time,
    Uuid,
    /// An integer-backed enumeration; maps like [`HostType::Int`].
    IntEnum,
}

/// Which statement a save is part of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAction {
    Insert,
    Update,
}

/// Bitmask restricting which save actions a column participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveActions(u8);

impl SaveActions {
    pub const INSERT: Self = Self(0b01);
    pub const UPDATE: Self = Self(0b10);
    pub const BOTH: Self = Self(0b11);

    pub const fn includes(self, action: SaveAction) -> bool {
        let bit = match action {
            SaveAction::Insert => Self::INSERT.0,
            SaveAction::Update => Self::UPDATE.0,
        };
        self.0 & bit == bit
    }
}

impl Default for SaveActions {
    fn default() -> Self {
        Self::BOTH
    }
}

/// A calculated column: rendered as `<name> AS <expression>` and never
/// written by insert or update statements.
#[derive(Debug, Clone, Copy)]
pub struct Calculated {
    pub expression: &'static str,
    pub persisted: bool,
}

/// Resolves the referenced (parent) side of a foreign key. Stored as a
/// function pointer so descriptors stay `const`; use
/// [`crate::extract::parent_of`] monomorphized over the parent model.
pub type ParentFn = fn(&dyn crate::dialect::Dialect) -> Result<ParentTable, MappingError>;

/// A foreign-key declaration on a column. The parent column is always
/// the referenced model's identity column.
#[derive(Debug, Clone, Copy)]
pub struct ForeignKeySpec {
    pub parent: ParentFn,
    pub cascade_delete: bool,
}

/// One property-to-column mapping.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    /// Property name; also the parameter name (`@<property>`).
    pub property: &'static str,
    /// Column-name override; defaults to the property name.
    pub column: Option<&'static str>,
    pub host_type: HostType,
    pub nullable: bool,
    /// Declared length for variable-size types; 0 means unsized, which
    /// renders as the dialect's "max" sentinel.
    pub length: u16,
    pub precision: u8,
    pub scale: u8,
    /// Explicit SQL type override; always wins over the inferred name.
    pub data_type: Option<&'static str>,
    pub save: SaveActions,
    pub calculated: Option<Calculated>,
    pub primary_key: bool,
    pub unique: bool,
    pub references: Option<ForeignKeySpec>,
    /// `false` excludes the property from mapping entirely.
    pub mapped: bool,
}

impl ColumnSpec {
    pub const fn new(property: &'static str, host_type: HostType) -> Self {
        Self {
            property,
            column: None,
            host_type,
            nullable: false,
            length: 0,
            precision: 0,
            scale: 0,
            data_type: None,
            save: SaveActions::BOTH,
            calculated: None,
            primary_key: false,
            unique: false,
            references: None,
            mapped: true,
        }
    }

    pub const fn column_name(mut self, name: &'static str) -> Self {
        self.column = Some(name);
        self
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn max_length(mut self, length: u16) -> Self {
        self.length = length;
        self
    }

    pub const fn decimal_size(mut self, precision: u8, scale: u8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub const fn data_type(mut self, name: &'static str) -> Self {
        self.data_type = Some(name);
        self
    }

    pub const fn insert_only(mut self) -> Self {
        self.save = SaveActions::INSERT;
        self
    }

    pub const fn update_only(mut self) -> Self {
        self.save = SaveActions::UPDATE;
        self
    }

    pub const fn calculated(mut self, expression: &'static str) -> Self {
        self.calculated = Some(Calculated {
            expression,
            persisted: false,
        });
        self
    }

    pub const fn calculated_persisted(mut self, expression: &'static str) -> Self {
        self.calculated = Some(Calculated {
            expression,
            persisted: true,
        });
        self
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn references(mut self, parent: ParentFn) -> Self {
        self.references = Some(ForeignKeySpec {
            parent,
            cascade_delete: false,
        });
        self
    }

    pub const fn references_cascade(mut self, parent: ParentFn) -> Self {
        self.references = Some(ForeignKeySpec {
            parent,
            cascade_delete: true,
        });
        self
    }

    pub const fn not_mapped(mut self) -> Self {
        self.mapped = false;
        self
    }

    /// The effective column name.
    pub fn name(&self) -> &'static str {
        self.column.unwrap_or(self.property)
    }
}

/// Where the identity column lands in the mapped-column ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityPosition {
    /// Declaration order (the default).
    Declared,
    First,
    Last,
}

/// Change-tracking opt-in, with properties to leave out of diffing.
#[derive(Debug, Clone, Copy)]
pub struct TrackChanges {
    pub ignore: &'static [&'static str],
}

/// Table-level mapping settings.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub schema: Option<&'static str>,
    /// Identity property name; when absent, a mapped property named
    /// `Id` is the conventional fallback.
    pub identity: Option<&'static str>,
    pub identity_position: IdentityPosition,
    pub track_changes: Option<TrackChanges>,
    /// Lookup query resolving this model's identity value to a display
    /// label (`@id` parameter, single scalar result). Used when other
    /// models' change history dereferences foreign keys into this table.
    pub dereference: Option<&'static str>,
}

impl TableSpec {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            schema: None,
            identity: None,
            identity_position: IdentityPosition::Declared,
            track_changes: None,
            dereference: None,
        }
    }

    pub const fn schema(mut self, schema: &'static str) -> Self {
        self.schema = Some(schema);
        self
    }

    pub const fn identity(mut self, property: &'static str) -> Self {
        self.identity = Some(property);
        self
    }

    pub const fn identity_first(mut self) -> Self {
        self.identity_position = IdentityPosition::First;
        self
    }

    pub const fn identity_last(mut self) -> Self {
        self.identity_position = IdentityPosition::Last;
        self
    }

    pub const fn track_changes(mut self) -> Self {
        self.track_changes = Some(TrackChanges { ignore: &[] });
        self
    }

    pub const fn track_changes_ignoring(mut self, ignore: &'static [&'static str]) -> Self {
        self.track_changes = Some(TrackChanges { ignore });
        self
    }

    pub const fn dereference(mut self, query: &'static str) -> Self {
        self.dereference = Some(query);
        self
    }
}

/// An identity (surrogate key) value.
pub trait KeyValue: Clone + PartialEq + Sized {
    const HOST: HostType;

    /// The "not saved yet" sentinel check.
    fn is_default(&self) -> bool;

    fn to_value(&self) -> Value;

    /// Coerces a returned scalar back into the key type.
    fn from_value(value: &Value) -> Option<Self>;
}

impl KeyValue for i32 {
    const HOST: HostType = HostType::Int;

    fn is_default(&self) -> bool {
        *self == 0
    }

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|v| Self::try_from(v).ok())
    }
}

impl KeyValue for i64 {
    const HOST: HostType = HostType::BigInt;

    fn is_default(&self) -> bool {
        *self == 0
    }

    fn to_value(&self) -> Value {
        Value::BigInt(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl KeyValue for Uuid {
    const HOST: HostType = HostType::Uuid;

    fn is_default(&self) -> bool {
        self.is_nil()
    }

    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Uuid(u) => Some(*u),
            Value::Text(s) => Self::parse_str(s).ok(),
            _ => None,
        }
    }
}

/// A mapped model type.
pub trait Model: Sized {
    type Key: KeyValue;

    const TABLE: TableSpec;
    const COLUMNS: &'static [ColumnSpec];

    fn key(&self) -> Self::Key;
    fn set_key(&mut self, key: Self::Key);

    /// Pure per-property value lookup, used for parameter binding,
    /// criteria building, and change diffing. Unknown property names
    /// return [`Value::Null`].
    fn value(&self, property: &str) -> Value;

    fn from_row(row: &Row) -> Result<Self, BoxError>;

    /// Capability accessors. A model opting into a hook overrides the
    /// accessor to return `Some(self)`; the generators check presence
    /// instead of assuming inherited defaults.
    fn validator(&self) -> Option<&dyn Validator> {
        None
    }

    fn permissions(&self) -> Option<&dyn PermissionChecker> {
        None
    }

    fn save_hooks(&mut self) -> Option<&mut dyn SaveHooks> {
        None
    }

    fn tracked(&self) -> Option<&dyn TrackedRecord> {
        None
    }
}

/// Pre-save validation.
pub trait Validator {
    fn validate(&self) -> Result<(), String>;
}

/// Row-level permission checks, consulted only when an actor context is
/// supplied.
pub trait PermissionChecker {
    fn can_save(&self, user: &dyn UserContext) -> bool {
        let _ = user;
        true
    }

    fn can_find(&self, user: &dyn UserContext) -> bool {
        let _ = user;
        true
    }

    fn can_delete(&self, user: &dyn UserContext) -> bool {
        let _ = user;
        true
    }
}

/// Mutating lifecycle hooks around save and delete.
pub trait SaveHooks {
    fn before_save(&mut self, action: SaveAction, user: &dyn UserContext) {
        let _ = (action, user);
    }

    fn after_save(&mut self, action: SaveAction) {
        let _ = action;
    }

    fn after_delete(&mut self) {}
}

/// Custom change-history handling for tracked models.
pub trait TrackedRecord {
    /// `false` routes changes to [`TrackedRecord::track_changes`]
    /// instead of the default history table.
    fn use_default_history_table(&self) -> bool {
        true
    }

    fn track_changes(&self, version: i32, changes: &[PropertyChange], user: &dyn UserContext) {
        let _ = (version, changes, user);
    }
}

/// The acting user, gating permission checks and change tracking.
pub trait UserContext {
    fn user_name(&self) -> &str;

    /// The actor's local timestamp for history rows; `None` falls back
    /// to UTC now.
    fn local_time(&self) -> Option<NaiveDateTime> {
        None
    }
}
