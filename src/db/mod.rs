// Database module

pub mod catalog;
pub mod columns;
pub mod consistency;
pub mod membership;
pub mod migrations;
pub mod schema;
pub mod seed;
pub mod wavetables;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use rusqlite::{Connection, OpenFlags};

use crate::constants::{BUSY_TIMEOUT_MS, CONFIG_FILENAME, DB_FILENAME, DEFAULT_LIBRARY_DIR, SOUNDVAULT_FOLDER};
use crate::error::{LibraryError, Result};

pub use migrations::{open_library, SchemaReport};

/// Per-connection settings. Must run before any other statement.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    // Enable foreign keys (must be done per connection)
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    // WAL lets the backup reader run next to the foreground connection
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;

    conn.busy_timeout(Duration::from_millis(u64::from(BUSY_TIMEOUT_MS)))?;
    Ok(())
}

/// Read-only side connection, used as the backup source.
pub fn open_read_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(LibraryError::from_open_failure)?;
    conn.busy_timeout(Duration::from_millis(u64::from(BUSY_TIMEOUT_MS)))?;
    Ok(conn)
}

/// Get the database path for a library root
pub fn get_db_path(library_root: &Path) -> PathBuf {
    library_root.join(SOUNDVAULT_FOLDER).join(DB_FILENAME)
}

/// Get the .soundvault folder path for a library root
pub fn get_soundvault_path(library_root: &Path) -> PathBuf {
    library_root.join(SOUNDVAULT_FOLDER)
}

pub fn get_config_path(library_root: &Path) -> PathBuf {
    library_root.join(SOUNDVAULT_FOLDER).join(CONFIG_FILENAME)
}

/// `~/.soundvault-library`, or None when no home directory is known.
pub fn default_library_root() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(DEFAULT_LIBRARY_DIR))
}
