// crates/lcl-store-sqlite/src/connection.rs
// ============================================================================
// Module: SQLite Connection Helpers
// Description: Shared configuration, pragmas, and schema versioning.
// Purpose: Open durable connections with consistent settings across stores.
// Dependencies: rusqlite, thiserror
// ============================================================================

//! ## Overview
//! Every store opens its own database file (or `:memory:`) with the same
//! posture: WAL journal mode, FULL synchronous, foreign keys on, and a busy
//! timeout, all applied as one pragma batch. Store paths are validated
//! against the configuration before anything touches the filesystem. Each
//! database carries a `store_meta(version)` row; an unknown version fails
//! closed rather than migrating blindly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default upper bound for store path length in bytes.
const DEFAULT_MAX_PATH_LENGTH: usize = 4096;
/// Path value that selects an in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration shared by every `SQLite`-backed store.
///
/// # Invariants
/// - `path` resolves to a file path or the literal `:memory:`.
/// - `busy_timeout_ms` and `max_path_length` are greater than zero.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the database file, or `:memory:`.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    pub sync_mode: SqliteSyncMode,
    /// Upper bound for the store path length in bytes.
    pub max_path_length: usize,
}

impl SqliteStoreConfig {
    /// Creates a configuration with default pragmas for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
        }
    }

    /// Returns whether the configuration selects an in-memory database.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }

    /// Validates the configured limits and store path.
    ///
    /// `:memory:` skips the filesystem checks entirely.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for zero limits, empty or
    /// overlong paths, and paths that name an existing directory.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        if self.busy_timeout_ms == 0 {
            return Err(SqliteStoreError::Invalid(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_path_length == 0 {
            return Err(SqliteStoreError::Invalid(
                "max_path_length must be greater than zero".to_string(),
            ));
        }
        if self.is_memory() {
            return Ok(());
        }
        if self.path.as_os_str().is_empty() {
            return Err(SqliteStoreError::Invalid("store path is empty".to_string()));
        }
        if self.path.as_os_str().len() > self.max_path_length {
            return Err(SqliteStoreError::Invalid(format!(
                "store path is longer than {} bytes",
                self.max_path_length
            )));
        }
        if self.path.is_dir() {
            return Err(SqliteStoreError::Invalid(
                "store path names a directory, expected a file".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders the pragma batch applied to every new connection.
    fn pragma_script(&self) -> String {
        format!(
            "PRAGMA foreign_keys = ON;\n\
             PRAGMA journal_mode = {};\n\
             PRAGMA synchronous = {};\n\
             PRAGMA busy_timeout = {};",
            self.journal_mode.pragma_value(),
            self.sync_mode.pragma_value(),
            self.busy_timeout_ms
        )
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Shared `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
}

// ============================================================================
// SECTION: Opening
// ============================================================================

/// Opens a connection with the configured pragmas applied.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when the configuration is invalid or the
/// database cannot be opened.
pub fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    config.validate()?;
    if !config.is_memory()
        && let Some(parent) = config.path.parent().filter(|dir| !dir.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&config.pragma_script())
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}

/// Initializes or validates a database's schema version, then runs the DDL.
///
/// # Errors
///
/// Returns [`SqliteStoreError::VersionMismatch`] when a foreign schema
/// version is found.
pub fn initialize_schema(
    connection: &mut Connection,
    expected_version: i64,
    ddl: &str,
) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![expected_version])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(ddl).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(found) if found == expected_version => {}
        Some(found) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {found}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
