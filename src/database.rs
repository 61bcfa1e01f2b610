use std::io;
use std::path::{Path, PathBuf};

use log::info;
use rusqlite::{Connection, OpenFlags};

use crate::error::MigrateError;

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    /// Opens an existing database file read-write.
    ///
    /// The file is never created: a mistyped path must fail instead of
    /// migrating a fresh, empty database.
    pub fn open(db_path: &Path) -> Result<Self, MigrateError> {
        if !db_path.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "Database file '{}' does not exist or is not a file",
                    db_path.display()
                ),
            )
            .into());
        }

        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        info!("Database opened at: {}", db_path.display());

        Ok(Self {
            conn,
            path: db_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn set_foreign_keys(conn: &Connection, enabled: bool) -> Result<(), MigrateError> {
        conn.pragma_update(None, "foreign_keys", enabled)?;
        Ok(())
    }
}

#[cfg(test)]
impl Database {
    pub fn foreign_keys_enabled(conn: &Connection) -> Result<bool, MigrateError> {
        let enabled: bool = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        Ok(enabled)
    }

    pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, MigrateError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
