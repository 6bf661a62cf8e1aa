#![allow(dead_code)]

// Shared test models, mirroring a small HR/inventory domain.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tablesync_core::extract;
use tablesync_core::model::{ColumnSpec, HostType, Model, TableSpec, UserContext};
use tablesync_core::value::{BoxError, Row, Value};

#[derive(Debug, Default, Clone)]
pub struct Organization {
    pub id: i32,
    pub name: String,
    pub employee_count: Option<i32>,
}

impl Model for Organization {
    type Key = i32;
    const TABLE: TableSpec = TableSpec::new("Organization");
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec::new("Name", HostType::Text).max_length(50).primary_key(),
        ColumnSpec::new("EmployeeCount", HostType::Int).nullable(),
        ColumnSpec::new("Id", HostType::Int),
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
            "Name" => Value::Text(self.name.clone()),
            "EmployeeCount" => self.employee_count.map_or(Value::Null, Value::Int),
            _ => Value::Null,
        }
    }

    fn from_row(row: &Row) -> Result<Self, BoxError> {
        Ok(Self {
            id: row.int("Id").unwrap_or_default() as i32,
            name: row.string("Name").unwrap_or_default(),
            employee_count: row.int("EmployeeCount").map(|v| v as i32),
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct Employee {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub hire_date: Option<NaiveDate>,
    pub is_active: bool,
    pub organization_id: i32,
}

impl Model for Employee {
    type Key = i32;
    const TABLE: TableSpec = TableSpec::new("Employee");
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec::new("FirstName", HostType::Text).max_length(50),
        ColumnSpec::new("LastName", HostType::Text).max_length(50),
        ColumnSpec::new("Email", HostType::Text).max_length(50).nullable().unique(),
        ColumnSpec::new("HireDate", HostType::Date).data_type("date").nullable(),
        ColumnSpec::new("IsActive", HostType::Bool),
        ColumnSpec::new("OrganizationId", HostType::Int)
            .references(extract::parent_of::<Organization>),
        ColumnSpec::new("Id", HostType::Int),
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
            "HireDate" => self.hire_date.map_or(Value::Null, Value::Date),
            "IsActive" => Value::Bool(self.is_active),
            "OrganizationId" => Value::Int(self.organization_id),
            _ => Value::Null,
        }
    }

    fn from_row(row: &Row) -> Result<Self, BoxError> {
        Ok(Self {
            id: row.int("Id").unwrap_or_default() as i32,
            first_name: row.string("FirstName").unwrap_or_default(),
            last_name: row.string("LastName").unwrap_or_default(),
            email: row.string("Email").unwrap_or_default(),
            hire_date: match row.value("HireDate") {
                Some(Value::Date(d)) => Some(*d),
                _ => None,
            },
            is_active: row.boolean("IsActive").unwrap_or_default(),
            organization_id: row.int("OrganizationId").unwrap_or_default() as i32,
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct ItemType {
    pub id: i32,
    pub name: String,
}

impl Model for ItemType {
    type Key = i32;
    const TABLE: TableSpec = TableSpec::new("ItemType")
        .dereference("SELECT [Name] FROM [dbo].[ItemType] WHERE [Id]=@id");
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec::new("Id", HostType::Int),
        ColumnSpec::new("Name", HostType::Text).max_length(50).primary_key(),
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
            "Name" => Value::Text(self.name.clone()),
            _ => Value::Null,
        }
    }

    fn from_row(row: &Row) -> Result<Self, BoxError> {
        Ok(Self {
            id: row.int("Id").unwrap_or_default() as i32,
            name: row.string("Name").unwrap_or_default(),
        })
    }
}

/// Change-tracked model mirroring a typical inventory row.
#[derive(Debug, Default, Clone)]
pub struct Item {
    pub id: i32,
    pub name: String,
    pub type_id: i32,
    pub description: String,
    pub is_made: bool,
    pub cost: Decimal,
    pub effective_date: Option<NaiveDate>,
}

impl Model for Item {
    type Key = i32;
    const TABLE: TableSpec = TableSpec::new("Item").track_changes();
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec::new("Id", HostType::Int),
        ColumnSpec::new("Name", HostType::Text).max_length(100).primary_key(),
        ColumnSpec::new("TypeId", HostType::Int).references(extract::parent_of::<ItemType>),
        ColumnSpec::new("Description", HostType::Text).max_length(255).nullable(),
        ColumnSpec::new("IsMade", HostType::Bool),
        ColumnSpec::new("Cost", HostType::Decimal).data_type("money"),
        ColumnSpec::new("EffectiveDate", HostType::Date).nullable(),
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
            "Name" => Value::Text(self.name.clone()),
            "TypeId" => Value::Int(self.type_id),
            "Description" => Value::Text(self.description.clone()),
            "IsMade" => Value::Bool(self.is_made),
            "Cost" => Value::Decimal(self.cost),
            "EffectiveDate" => self.effective_date.map_or(Value::Null, Value::Date),
            _ => Value::Null,
        }
    }

    fn from_row(row: &Row) -> Result<Self, BoxError> {
        Ok(Self {
            id: row.int("Id").unwrap_or_default() as i32,
            name: row.string("Name").unwrap_or_default(),
            type_id: row.int("TypeId").unwrap_or_default() as i32,
            description: row.string("Description").unwrap_or_default(),
            is_made: row.boolean("IsMade").unwrap_or_default(),
            cost: match row.value("Cost") {
                Some(Value::Decimal(d)) => *d,
                _ => Decimal::ZERO,
            },
            effective_date: match row.value("EffectiveDate") {
                Some(Value::Date(d)) => Some(*d),
                _ => None,
            },
        })
    }
}

pub struct TestUser {
    pub name: &'static str,
    pub time: Option<NaiveDateTime>,
}

impl UserContext for TestUser {
    fn user_name(&self) -> &str {
        self.name
    }

    fn local_time(&self) -> Option<NaiveDateTime> {
        self.time
    }
}
