// Relational table backed by a SQLite database

use crate::error::RemoteError;
use crate::filter::Filter;
use crate::record::{BuyerFields, BuyerRecord, IndexValue};
use crate::remote::{RemoteTable, validate_name};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const COLUMNS: &str = "id, username, name, first_purchase, last_purchase, interests, notes";

/// Buyer tables stored in a SQLite file
///
/// Each table is created on first use with `username` UNIQUE and an
/// autoincrementing integer id, mirroring the hosted schema.
pub struct SqliteTable {
    db: Connection,
    prepared: RefCell<HashSet<String>>,
}

impl SqliteTable {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RemoteError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Opening SQLite buyer table");
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// Database that lives only as long as this value
    pub fn open_in_memory() -> Result<Self, RemoteError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(db: Connection) -> Self {
        Self {
            db,
            prepared: RefCell::new(HashSet::new()),
        }
    }

    fn ensure_table(&self, table: &str) -> Result<(), RemoteError> {
        validate_name(table)?;
        if self.prepared.borrow().contains(table) {
            return Ok(());
        }

        debug!(table, "Creating table if missing");
        self.db.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL DEFAULT '',
                first_purchase TEXT NOT NULL DEFAULT '',
                last_purchase TEXT NOT NULL DEFAULT '',
                interests TEXT NOT NULL DEFAULT '',
                notes TEXT NOT NULL DEFAULT ''
            );
            "#
        ))?;

        self.prepared.borrow_mut().insert(table.to_string());
        Ok(())
    }

    fn get(&self, table: &str, id: i64) -> Result<Option<BuyerRecord>, RemoteError> {
        let record = self
            .db
            .query_row(
                &format!("SELECT {COLUMNS} FROM \"{table}\" WHERE id = ?1"),
                [id],
                Self::read_row,
            )
            .optional()?;
        Ok(record)
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<BuyerRecord> {
        let fields = BuyerFields {
            username: row.get(1)?,
            name: row.get(2)?,
            first_purchase: row.get(3)?,
            last_purchase: row.get(4)?,
            interests: row.get(5)?,
            notes: row.get(6)?,
        };
        Ok(fields.into_record(row.get(0)?))
    }

    fn map_write_error(err: rusqlite::Error) -> RemoteError {
        match &err {
            rusqlite::Error::SqliteFailure(code, message) if code.code == ErrorCode::ConstraintViolation => {
                RemoteError::Conflict(message.clone().unwrap_or_else(|| code.to_string()))
            }
            _ => RemoteError::Sqlite(err),
        }
    }

    /// Map the camelCase wire field names to SQLite columns
    fn column_for(field: &str) -> Result<&'static str, RemoteError> {
        match field {
            "id" => Ok("id"),
            "username" => Ok("username"),
            "name" => Ok("name"),
            "firstPurchase" | "first_purchase" => Ok("first_purchase"),
            "lastPurchase" | "last_purchase" => Ok("last_purchase"),
            "interests" => Ok("interests"),
            "notes" => Ok("notes"),
            other => Err(RemoteError::InvalidName(other.to_string())),
        }
    }
}

impl RemoteTable for SqliteTable {
    fn select_all(&self, table: &str) -> Result<Vec<BuyerRecord>, RemoteError> {
        self.ensure_table(table)?;

        let mut stmt = self.db.prepare(&format!("SELECT {COLUMNS} FROM \"{table}\""))?;
        let rows = stmt.query_map([], Self::read_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        debug!(table, count = results.len(), "select_all: loaded rows");
        Ok(results)
    }

    fn find_by_field(&self, table: &str, filter: &Filter) -> Result<Option<BuyerRecord>, RemoteError> {
        self.ensure_table(table)?;
        let column = Self::column_for(&filter.field)?;
        let predicate = Filter::eq(column, filter.value.clone()).to_sql();
        let sql = format!("SELECT {COLUMNS} FROM \"{table}\" WHERE {predicate} LIMIT 1");

        let record = match &filter.value {
            IndexValue::String(s) => self.db.query_row(&sql, [s], Self::read_row),
            IndexValue::Int(i) => self.db.query_row(&sql, [i], Self::read_row),
        }
        .optional()?;

        debug!(table, %filter, found = record.is_some(), "find_by_field");
        Ok(record)
    }

    fn insert(&self, table: &str, row: &BuyerFields) -> Result<BuyerRecord, RemoteError> {
        self.ensure_table(table)?;

        self.db
            .execute(
                &format!(
                    "INSERT INTO \"{table}\" (username, name, first_purchase, last_purchase, interests, notes)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                rusqlite::params![
                    row.username,
                    row.name,
                    row.first_purchase,
                    row.last_purchase,
                    row.interests,
                    row.notes
                ],
            )
            .map_err(Self::map_write_error)?;

        let id = self.db.last_insert_rowid();
        debug!(table, id, username = %row.username, "insert: row created");
        Ok(row.clone().into_record(id))
    }

    fn update(&self, table: &str, id: i64, patch: &BuyerFields) -> Result<BuyerRecord, RemoteError> {
        self.ensure_table(table)?;

        let changed = self
            .db
            .execute(
                &format!(
                    "UPDATE \"{table}\" SET username = ?1, name = ?2, first_purchase = ?3,
                     last_purchase = ?4, interests = ?5, notes = ?6 WHERE id = ?7"
                ),
                rusqlite::params![
                    patch.username,
                    patch.name,
                    patch.first_purchase,
                    patch.last_purchase,
                    patch.interests,
                    patch.notes,
                    id
                ],
            )
            .map_err(Self::map_write_error)?;

        if changed == 0 {
            return Err(RemoteError::NotFound);
        }

        debug!(table, id, "update: row replaced");
        self.get(table, id)?.ok_or(RemoteError::NotFound)
    }

    fn delete(&self, table: &str, id: i64) -> Result<(), RemoteError> {
        self.ensure_table(table)?;

        let changed = self
            .db
            .execute(&format!("DELETE FROM \"{table}\" WHERE id = ?1"), [id])?;
        if changed == 0 {
            return Err(RemoteError::NotFound);
        }

        debug!(table, id, "delete: row removed");
        Ok(())
    }
}
