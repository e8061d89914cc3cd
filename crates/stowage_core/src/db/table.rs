//! Static relational table descriptions.
//!
//! # Responsibility
//! - Map entity fields onto SQLite columns and storage classes.
//! - Create missing tables from that mapping.
//!
//! # Invariants
//! - Every table has exactly one non-nullable primary key column.
//! - Identifiers match `[A-Za-z_][A-Za-z0-9_]*` and are always emitted
//!   double-quoted.

use super::{DbError, DbResult};
use crate::model::schema::FieldType;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use std::collections::HashSet;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// One column of a relational table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: FieldType,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnDef {
    pub const fn primary_key(name: &'static str, column_type: FieldType) -> Self {
        Self {
            name,
            column_type,
            nullable: false,
            primary_key: true,
        }
    }

    pub const fn required(name: &'static str, column_type: FieldType) -> Self {
        Self {
            name,
            column_type,
            nullable: false,
            primary_key: false,
        }
    }

    pub const fn nullable(name: &'static str, column_type: FieldType) -> Self {
        Self {
            name,
            column_type,
            nullable: true,
            primary_key: false,
        }
    }

    /// SQLite storage class used for this column.
    ///
    /// Uuids and timestamps are stored as text, booleans as 0/1 integers.
    pub fn sql_type(&self) -> &'static str {
        match self.column_type {
            FieldType::Uuid | FieldType::Text | FieldType::Timestamp => "TEXT",
            FieldType::Integer | FieldType::Boolean => "INTEGER",
        }
    }

    fn definition(&self) -> String {
        let mut definition = format!("{} {}", quote_identifier(self.name), self.sql_type());
        if !self.nullable {
            definition.push_str(" NOT NULL");
        }
        if self.primary_key {
            definition.push_str(" PRIMARY KEY");
        }
        definition
    }
}

/// Relational table an entity type maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.primary_key)
    }

    /// Checks identifiers, duplicate columns and the primary key.
    pub fn validate(&self) -> DbResult<()> {
        if !IDENTIFIER_RE.is_match(self.name) {
            return Err(DbError::invalid_table(self.name, "table name is not a plain identifier"));
        }
        if self.columns.is_empty() {
            return Err(DbError::invalid_table(self.name, "no columns"));
        }

        let mut seen = HashSet::new();
        for column in self.columns {
            if !IDENTIFIER_RE.is_match(column.name) {
                return Err(DbError::invalid_table(
                    self.name,
                    format!("column `{}` is not a plain identifier", column.name),
                ));
            }
            if !seen.insert(column.name) {
                return Err(DbError::invalid_table(
                    self.name,
                    format!("duplicate column `{}`", column.name),
                ));
            }
        }

        let keys: Vec<_> = self.columns.iter().filter(|c| c.primary_key).collect();
        match keys.as_slice() {
            [key] if !key.nullable => Ok(()),
            [key] => Err(DbError::invalid_table(
                self.name,
                format!("primary key `{}` must not be nullable", key.name),
            )),
            [] => Err(DbError::invalid_table(self.name, "missing primary key")),
            _ => Err(DbError::invalid_table(self.name, "composite primary keys are not supported")),
        }
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table.
    pub fn create_sql(&self) -> DbResult<String> {
        self.validate()?;
        let columns = self
            .columns
            .iter()
            .map(ColumnDef::definition)
            .collect::<Vec<_>>()
            .join(",\n    ");
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            quote_identifier(self.name),
            columns
        ))
    }
}

/// Creates `schema`'s table when it does not exist yet.
///
/// Existing tables are left untouched, even if their columns differ.
pub fn ensure_table(conn: &Connection, schema: &TableSchema) -> DbResult<()> {
    let sql = schema.create_sql()?;
    conn.execute_batch(&sql)?;
    info!(
        "event=table_ensure module=db status=ok table={} columns={}",
        schema.name,
        schema.columns.len()
    );
    Ok(())
}

/// Double-quotes an identifier for SQL text.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
