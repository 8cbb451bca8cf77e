// crates/faas-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Function Store
// Description: Durable FunctionStore backed by SQLite.
// Purpose: Persist function records and container usage rows.
// Dependencies: faas-core, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! This module implements [`FunctionStore`] on `SQLite`. Function ids come from
//! an `AUTOINCREMENT` key so they are never reused, and usage rows reference
//! their function through a foreign key. Rows read back are validated and a
//! malformed row fails the read instead of being coerced.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use faas_core::ContainerId;
use faas_core::FunctionId;
use faas_core::FunctionRecord;
use faas_core::FunctionStore;
use faas_core::NewFunction;
use faas_core::StoreError;
use faas_core::Timestamp;
use faas_core::UsageRecord;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default number of open attempts.
const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;
/// Default delay between open attempts.
const DEFAULT_CONNECT_DELAY: Duration = Duration::from_secs(3);

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
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
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
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

/// Configuration for the `SQLite` function store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config for `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Retry policy for opening the store at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRetry {
    /// Total open attempts (at least one is always made).
    pub attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_CONNECT_ATTEMPTS,
            delay: DEFAULT_CONNECT_DELAY,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Constraint violation.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl SqliteStoreError {
    /// Returns true when retrying the open can plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Db(_))
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        if error.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
            Self::Conflict(error.to_string())
        } else {
            Self::Db(error.to_string())
        }
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::VersionMismatch(message) => {
                Self::Invalid(format!("schema version mismatch: {message}"))
            }
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed function store.
#[derive(Clone)]
pub struct SqliteFunctionStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteFunctionStore {
    /// Opens an `SQLite`-backed function store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Opens the store, retrying transient failures.
    ///
    /// Invalid paths and schema mismatches fail immediately. This blocks the
    /// calling thread between attempts.
    ///
    /// # Errors
    ///
    /// Returns the last [`SqliteStoreError`] once attempts are exhausted.
    pub fn open_with_retry(
        config: &SqliteStoreConfig,
        retry: ConnectRetry,
    ) -> Result<Self, SqliteStoreError> {
        let attempts = retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match Self::new(config.clone()) {
                Ok(store) => {
                    info!(path = %config.path.display(), attempt, "function store opened");
                    return Ok(store);
                }
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(
                        path = %config.path.display(),
                        attempt,
                        attempts,
                        error = %err,
                        "function store open failed; retrying"
                    );
                    std::thread::sleep(retry.delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Inserts a function row.
    fn insert_row(&self, function: &NewFunction) -> Result<FunctionRecord, SqliteStoreError> {
        let guard = self.lock()?;
        guard.execute(
            "INSERT INTO functions (function_name, function_language, function_code) VALUES (?1, \
             ?2, ?3)",
            params![function.name, function.language, function.code],
        )?;
        let id = function_id_from_row(guard.last_insert_rowid())?;
        drop(guard);
        Ok(FunctionRecord {
            id,
            name: function.name.clone(),
            language: function.language.clone(),
            code: function.code.clone(),
            container_id: None,
        })
    }

    /// Sets the container id of a function row.
    fn attach_row(
        &self,
        function_id: FunctionId,
        container_id: &ContainerId,
    ) -> Result<(), SqliteStoreError> {
        let changed = self.lock()?.execute(
            "UPDATE functions SET container_id = ?1 WHERE id = ?2",
            params![container_id.as_str(), function_id_to_row(function_id)?],
        )?;
        if changed == 0 {
            return Err(SqliteStoreError::Invalid(format!("function {function_id} not found")));
        }
        Ok(())
    }

    /// Loads a function row.
    fn load_function(
        &self,
        function_id: FunctionId,
    ) -> Result<Option<FunctionRecord>, SqliteStoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT id, function_name, function_language, function_code, container_id FROM \
                 functions WHERE id = ?1",
                params![function_id_to_row(function_id)?],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;
        drop(guard);
        let Some((id, name, language, code, container_id)) = row else {
            return Ok(None);
        };
        Ok(Some(FunctionRecord {
            id: function_id_from_row(id)?,
            name,
            language,
            code,
            container_id: container_id.map(ContainerId::new),
        }))
    }

    /// Deletes a function row.
    fn delete_row(&self, function_id: FunctionId) -> Result<(), SqliteStoreError> {
        self.lock()?.execute(
            "DELETE FROM functions WHERE id = ?1",
            params![function_id_to_row(function_id)?],
        )?;
        Ok(())
    }

    /// Inserts or refreshes a usage row.
    fn upsert_usage(
        &self,
        container_id: &ContainerId,
        function_id: FunctionId,
        used_at: Timestamp,
    ) -> Result<(), SqliteStoreError> {
        self.lock()?.execute(
            "INSERT INTO running_containers (container_id, function_id, last_used) VALUES (?1, \
             ?2, ?3) ON CONFLICT(container_id) DO UPDATE SET function_id = \
             excluded.function_id, last_used = excluded.last_used",
            params![container_id.as_str(), function_id_to_row(function_id)?, used_at.as_unix_millis()],
        )?;
        Ok(())
    }

    /// Loads one usage row.
    fn load_usage(
        &self,
        container_id: &ContainerId,
    ) -> Result<Option<UsageRecord>, SqliteStoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT container_id, function_id, last_used FROM running_containers WHERE \
                 container_id = ?1",
                params![container_id.as_str()],
                usage_columns,
            )
            .optional()?;
        drop(guard);
        row.map(usage_from_columns).transpose()
    }

    /// Loads usage rows last used strictly before `cutoff`, oldest first.
    fn load_idle(&self, cutoff: Timestamp) -> Result<Vec<UsageRecord>, SqliteStoreError> {
        let guard = self.lock()?;
        let mut statement = guard.prepare(
            "SELECT container_id, function_id, last_used FROM running_containers WHERE last_used \
             < ?1 ORDER BY last_used ASC, container_id ASC",
        )?;
        let rows = statement
            .query_map(params![cutoff.as_unix_millis()], usage_columns)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(statement);
        drop(guard);
        rows.into_iter().map(usage_from_columns).collect()
    }

    /// Deletes one usage row.
    fn delete_usage_row(&self, container_id: &ContainerId) -> Result<(), SqliteStoreError> {
        self.lock()?.execute(
            "DELETE FROM running_containers WHERE container_id = ?1",
            params![container_id.as_str()],
        )?;
        Ok(())
    }
}

impl FunctionStore for SqliteFunctionStore {
    fn insert_function(&self, function: NewFunction) -> Result<FunctionRecord, StoreError> {
        self.insert_row(&function).map_err(StoreError::from)
    }

    fn attach_container(
        &self,
        function_id: FunctionId,
        container_id: &ContainerId,
    ) -> Result<(), StoreError> {
        self.attach_row(function_id, container_id).map_err(StoreError::from)
    }

    fn get_function(&self, function_id: FunctionId) -> Result<Option<FunctionRecord>, StoreError> {
        self.load_function(function_id).map_err(StoreError::from)
    }

    fn delete_function(&self, function_id: FunctionId) -> Result<(), StoreError> {
        self.delete_row(function_id).map_err(StoreError::from)
    }

    fn touch_usage(
        &self,
        container_id: &ContainerId,
        function_id: FunctionId,
        used_at: Timestamp,
    ) -> Result<(), StoreError> {
        self.upsert_usage(container_id, function_id, used_at).map_err(StoreError::from)
    }

    fn get_usage(&self, container_id: &ContainerId) -> Result<Option<UsageRecord>, StoreError> {
        self.load_usage(container_id).map_err(StoreError::from)
    }

    fn idle_usage(&self, cutoff: Timestamp) -> Result<Vec<UsageRecord>, StoreError> {
        self.load_idle(cutoff).map_err(StoreError::from)
    }

    fn delete_usage(&self, container_id: &ContainerId) -> Result<(), StoreError> {
        self.delete_usage_row(container_id).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Raw usage columns.
type UsageColumns = (String, i64, i64);

/// Reads usage columns from a row.
fn usage_columns(row: &Row<'_>) -> rusqlite::Result<UsageColumns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

/// Validates raw usage columns.
fn usage_from_columns(
    (container_id, function_id, last_used): UsageColumns,
) -> Result<UsageRecord, SqliteStoreError> {
    Ok(UsageRecord {
        container_id: ContainerId::new(container_id),
        function_id: function_id_from_row(function_id)?,
        last_used_at: Timestamp::from_unix_millis(last_used),
    })
}

/// Converts a stored id into a [`FunctionId`].
fn function_id_from_row(raw: i64) -> Result<FunctionId, SqliteStoreError> {
    u64::try_from(raw)
        .ok()
        .and_then(FunctionId::from_raw)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("invalid function id in store: {raw}")))
}

/// Converts a [`FunctionId`] into its stored form.
fn function_id_to_row(id: FunctionId) -> Result<i64, SqliteStoreError> {
    i64::try_from(id.get())
        .map_err(|_| SqliteStoreError::Invalid(format!("function id out of range: {id}")))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS functions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    function_name TEXT NOT NULL,
                    function_language TEXT NOT NULL,
                    function_code TEXT NOT NULL,
                    container_id TEXT
                );
                CREATE TABLE IF NOT EXISTS running_containers (
                    container_id TEXT PRIMARY KEY,
                    function_id INTEGER NOT NULL,
                    last_used INTEGER NOT NULL,
                    FOREIGN KEY (function_id) REFERENCES functions(id)
                );
                CREATE INDEX IF NOT EXISTS idx_running_containers_last_used
                    ON running_containers (last_used);",
            )?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}
