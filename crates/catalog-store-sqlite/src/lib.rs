//! SQLite persistence for the collection catalog.
//!
//! [`SqliteStore`] owns the connection and schema. Custom field declarations and
//! values live in [`custom_fields`], the generic per-kind repository in
//! [`EntityStore`], and snapshot export/import in [`import`].

use std::path::Path;

use catalog_core::{format_timestamp, CatalogError};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub mod custom_fields;
mod entity_store;
pub mod import;
mod tables;

pub use entity_store::EntityStore;
pub use tables::{
    BoardGameBoxTable, BoardGameTable, EntityTable, SystemTable, ToyTable, VideoGameBoxTable,
    VideoGameTable,
};

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS custom_field (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  type TEXT NOT NULL CHECK (type IN ('text','number','boolean')),
  entity_key TEXT NOT NULL CHECK (entity_key IN ('system','toy','videoGame','videoGameBox','boardGame','boardGameBox')),
  created_at TEXT NOT NULL,
  UNIQUE(entity_key, name)
);

CREATE TABLE IF NOT EXISTS custom_field_value (
  entity_id INTEGER NOT NULL,
  entity_key TEXT NOT NULL,
  custom_field_id INTEGER NOT NULL,
  custom_field_name TEXT NOT NULL,
  custom_field_type TEXT NOT NULL CHECK (custom_field_type IN ('text','number','boolean')),
  value TEXT NOT NULL,
  PRIMARY KEY (entity_id, entity_key, custom_field_id),
  FOREIGN KEY (custom_field_id) REFERENCES custom_field(id)
);

CREATE TABLE IF NOT EXISTS system (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  generation INTEGER NOT NULL DEFAULT 0,
  handheld INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS toy (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  toy_set TEXT NOT NULL DEFAULT '',
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS video_game (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title TEXT NOT NULL,
  system_id INTEGER NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  deleted_at TEXT,
  FOREIGN KEY (system_id) REFERENCES system(id)
);

CREATE TABLE IF NOT EXISTS video_game_box (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title TEXT NOT NULL,
  system_id INTEGER NOT NULL,
  is_physical INTEGER NOT NULL DEFAULT 0,
  is_collection INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  deleted_at TEXT,
  FOREIGN KEY (system_id) REFERENCES system(id)
);

CREATE TABLE IF NOT EXISTS board_game (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS board_game_box (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title TEXT NOT NULL,
  board_game_id INTEGER NOT NULL,
  is_expansion INTEGER NOT NULL DEFAULT 0,
  is_stand_alone INTEGER NOT NULL DEFAULT 0,
  base_set_id INTEGER,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  deleted_at TEXT,
  FOREIGN KEY (board_game_id) REFERENCES board_game(id),
  FOREIGN KEY (base_set_id) REFERENCES board_game_box(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS ux_system_natural_key ON system(name) WHERE deleted_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS ux_toy_natural_key ON toy(name, toy_set) WHERE deleted_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS ux_video_game_natural_key ON video_game(title, system_id) WHERE deleted_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS ux_video_game_box_natural_key ON video_game_box(title, system_id) WHERE deleted_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS ux_board_game_natural_key ON board_game(title) WHERE deleted_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS ux_board_game_box_natural_key ON board_game_box(title, board_game_id) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_custom_field_value_field ON custom_field_value(custom_field_id);
";

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

impl SqliteStore {
    /// Open a SQLite-backed catalog and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path).storage_context(&format!(
            "failed to open sqlite database at {}",
            path.display()
        ))?;
        Self::configure(conn)
    }

    /// Open a private in-memory catalog.
    ///
    /// # Errors
    /// Returns an error when `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()
            .storage_context("failed to open in-memory sqlite database")?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self, CatalogError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .storage_context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus, CatalogError> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .storage_context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step fails.
    pub fn migrate(&mut self) -> Result<(), CatalogError> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .storage_context("failed to apply schema_migrations table")?;

        let version = current_schema_version(&self.conn)?;
        if version < 1 {
            let tx = self
                .conn
                .transaction()
                .storage_context("failed to start migration v1 transaction")?;
            tx.execute_batch(MIGRATION_001_SQL).storage_context("failed to apply migration v1")?;
            record_schema_version(&tx, 1)?;
            tx.commit().storage_context("failed to commit migration v1")?;
            tracing::info!(version = 1, "applied catalog schema migration");
        }

        let version = current_schema_version(&self.conn)?;
        if version != LATEST_SCHEMA_VERSION {
            return Err(CatalogError::Storage(format!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            )));
        }

        Ok(())
    }

    /// Repository for one entity kind.
    pub fn entities<K: EntityTable>(&mut self) -> EntityStore<'_, K> {
        EntityStore::new(&mut self.conn)
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Attach a message to `rusqlite` failures while mapping them into [`CatalogError`].
///
/// UNIQUE violations become [`CatalogError::FailedDbValidation`] so that the
/// storage-level natural-key indexes surface like the pre-write checks.
pub(crate) trait StorageContext<T> {
    fn storage_context(self, message: &str) -> Result<T, CatalogError>;
}

impl<T> StorageContext<T> for Result<T, rusqlite::Error> {
    fn storage_context(self, message: &str) -> Result<T, CatalogError> {
        self.map_err(|err| storage_error(message, &err))
    }
}

pub(crate) fn storage_error(message: &str, err: &rusqlite::Error) -> CatalogError {
    if let rusqlite::Error::SqliteFailure(failure, _) = err {
        if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        {
            return CatalogError::FailedDbValidation(vec![format!(
                "{message}: a record with the same natural key already exists"
            )]);
        }
    }
    CatalogError::Storage(format!("{message}: {err}"))
}

fn current_schema_version(conn: &Connection) -> Result<i64, CatalogError> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
        row.get::<_, i64>(0)
    })
    .storage_context("failed to read current schema version")
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<(), CatalogError> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .storage_context(&format!("failed to record migration version {version}"))?;
    Ok(())
}

pub(crate) fn now_rfc3339() -> Result<String, CatalogError> {
    rfc3339(OffsetDateTime::now_utc())
}

pub(crate) fn rfc3339(value: OffsetDateTime) -> Result<String, CatalogError> {
    format_timestamp(value)
        .map_err(|err| CatalogError::Storage(format!("failed to format RFC3339 timestamp: {err}")))
}

pub(crate) fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|err| format!("invalid RFC3339 timestamp {value}: {err}"))
}
