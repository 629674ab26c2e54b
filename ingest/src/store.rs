//! SQLite-backed ownership registry, search index and identity lookup.
//!
//! The three tables live in one database file shared with the rest of the
//! archive. The pipeline only goes through the traits defined here, so tests
//! can swap the on-disk file for [`Database::in_memory`].

use crate::error::{IngestError, Result};
use camino::Utf8Path;
use log::{debug, warn};
use modarchive_common::Identity;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS fileowner (
        filename TEXT PRIMARY KEY,
        owner TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS search (
        module TEXT PRIMARY KEY,
        author TEXT NOT NULL,
        title TEXT NOT NULL,
        "desc" TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS users (
        username TEXT PRIMARY KEY,
        name TEXT,
        email TEXT,
        admin TEXT NOT NULL DEFAULT 'false'
    );
"#;

/// Claim that `owner` published the module at `module_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRecord {
    /// Repository-relative module path, e.g. `ccan/alloc`.
    pub module_path: String,
    /// Publisher of record.
    pub owner: Identity,
}

/// One search-index row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIndexEntry {
    /// Published module name.
    pub module: String,
    /// Identity that first published the module.
    pub author: String,
    /// First line of the module description.
    pub title: String,
    /// Remaining description lines joined with `\n`.
    pub description: String,
}

/// Durable module-path to owner mapping.
pub trait OwnershipRegistry {
    /// Returns the owner recorded for `module_path`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Database`] when the query fails.
    fn owner_of(&self, module_path: &str) -> Result<Option<String>>;

    /// Inserts `record`. An existing row for the same path is left as is.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Database`] when the insert fails.
    fn record(&self, record: &OwnershipRecord) -> Result<()>;
}

/// Searchable module metadata.
pub trait SearchIndex {
    /// Inserts `entry`, or updates title and description of the existing row
    /// for the same module. The stored author never changes.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Database`] when the statement fails.
    fn upsert(&self, entry: &SearchIndexEntry) -> Result<()>;

    /// Fetches the row for `module`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Database`] when the query fails.
    fn lookup(&self, module: &str) -> Result<Option<SearchIndexEntry>>;
}

/// Read-only view of the user table.
pub trait IdentityDirectory {
    /// Returns the e-mail addresses of every administrator.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Database`] when the query fails.
    fn administrator_addresses(&self) -> Result<Vec<String>>;
}

/// The archive database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (creating if necessary) the database at `path` and ensures the
    /// tables exist.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Database`] if the file cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: &Utf8Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        debug!("opening database {path}");
        Self::with_connection(Connection::open(path.as_std_path())?)
    }

    /// Creates an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Database`] if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| IngestError::LockPoisoned(format!("conn lock: {e}")))
    }

    /// Adds a row to the user table.
    ///
    /// Accounts are managed by the web front end; this exists so tests can
    /// populate the administrator list.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Database`] when the insert fails.
    #[cfg(any(test, feature = "test-support"))]
    pub fn insert_user(&self, username: &str, email: &str, admin: bool) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO users (username, name, email, admin) VALUES (?1, ?1, ?2, ?3)",
            params![username, email, if admin { "true" } else { "false" }],
        )?;
        Ok(())
    }
}

impl OwnershipRegistry for Database {
    fn owner_of(&self, module_path: &str) -> Result<Option<String>> {
        let owner = self
            .conn()?
            .query_row(
                "SELECT owner FROM fileowner WHERE filename = ?1",
                [module_path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    fn record(&self, record: &OwnershipRecord) -> Result<()> {
        let inserted = self.conn()?.execute(
            "INSERT INTO fileowner (filename, owner) VALUES (?1, ?2)
             ON CONFLICT(filename) DO NOTHING",
            params![record.module_path, record.owner.as_str()],
        )?;
        if inserted == 0 {
            warn!(
                "{} already has an owner; not recording {}",
                record.module_path, record.owner
            );
        }
        Ok(())
    }
}

impl SearchIndex for Database {
    fn upsert(&self, entry: &SearchIndexEntry) -> Result<()> {
        self.conn()?.execute(
            r#"INSERT INTO search (module, author, title, "desc") VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(module) DO UPDATE SET title = excluded.title, "desc" = excluded."desc""#,
            params![entry.module, entry.author, entry.title, entry.description],
        )?;
        Ok(())
    }

    fn lookup(&self, module: &str) -> Result<Option<SearchIndexEntry>> {
        let entry = self
            .conn()?
            .query_row(
                r#"SELECT module, author, title, "desc" FROM search WHERE module = ?1"#,
                [module],
                |row| {
                    Ok(SearchIndexEntry {
                        module: row.get(0)?,
                        author: row.get(1)?,
                        title: row.get(2)?,
                        description: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }
}

impl IdentityDirectory for Database {
    fn administrator_addresses(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT email FROM users
             WHERE admin = 'true' AND email IS NOT NULL AND email <> ''
             ORDER BY username",
        )?;
        let addresses = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(addresses)
    }
}
