use std::path::PathBuf;

use anyhow::{Context, Result};
use catalog_core::{
    BackupSnapshot, CustomField, CustomFieldRequest, Entity, EntityKind, FilterRequest,
    ImportResult,
};
use catalog_store_sqlite::{EntityTable, SchemaStatus, SqliteStore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

/// An exported snapshot with a digest of its canonical JSON encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotExport {
    pub digest: String,
    pub snapshot: BackupSnapshot,
}

/// Catalog facade that opens the database per call.
#[derive(Debug, Clone)]
pub struct CatalogApi {
    db_path: PathBuf,
}

impl CatalogApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.db_path)
            .with_context(|| format!("failed to open catalog at {}", self.db_path.display()))
    }

    fn open_migrated(&self) -> Result<SqliteStore> {
        let mut store = self.open_store()?;
        store.migrate()?;
        Ok(store)
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let store = self.open_store()?;
        Ok(store.schema_status()?)
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                after_version: None,
                up_to_date: None,
            });
        }

        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: before.pending_versions,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// # Errors
    /// Returns an error when the declaration is invalid or already exists.
    pub fn declare_custom_field(&self, request: &CustomFieldRequest) -> Result<CustomField> {
        let mut store = self.open_migrated()?;
        Ok(store.declare_custom_field(request)?)
    }

    /// # Errors
    /// Returns an error when the catalog cannot be read.
    pub fn list_custom_fields(&self, kind: Option<EntityKind>) -> Result<Vec<CustomField>> {
        let store = self.open_migrated()?;
        Ok(store.list_custom_fields(kind)?)
    }

    /// # Errors
    /// Returns an error when the field is not declared for `kind`.
    pub fn lookup_custom_field(&self, kind: EntityKind, name: &str) -> Result<CustomField> {
        let store = self.open_migrated()?;
        Ok(store.lookup_custom_field(kind, name)?)
    }

    /// # Errors
    /// Returns an error when validation or persistence fails.
    pub fn create<K: EntityTable>(&self, entity: &Entity<K::Data>) -> Result<Entity<K::Data>> {
        let mut store = self.open_migrated()?;
        let created = store.entities::<K>().insert(entity)?;
        Ok(created)
    }

    /// # Errors
    /// Returns an error when no live entity has `id`.
    pub fn get<K: EntityTable>(&self, id: i64) -> Result<Entity<K::Data>> {
        let mut store = self.open_migrated()?;
        let entity = store.entities::<K>().get_by_id(id)?;
        Ok(entity)
    }

    /// # Errors
    /// Returns an error when no entity has `id`, deleted or not.
    pub fn get_include_deleted<K: EntityTable>(&self, id: i64) -> Result<Entity<K::Data>> {
        let mut store = self.open_migrated()?;
        let entity = store.entities::<K>().get_by_id_include_deleted(id)?;
        Ok(entity)
    }

    /// # Errors
    /// Returns an error unless `id` names a soft-deleted entity.
    pub fn get_deleted<K: EntityTable>(&self, id: i64) -> Result<Entity<K::Data>> {
        let mut store = self.open_migrated()?;
        let entity = store.entities::<K>().get_deleted_by_id(id)?;
        Ok(entity)
    }

    /// # Errors
    /// Returns an error when any filter is invalid or the query fails.
    pub fn search<K: EntityTable>(
        &self,
        filters: &[FilterRequest],
    ) -> Result<Vec<Entity<K::Data>>> {
        let mut store = self.open_migrated()?;
        let found = store.entities::<K>().get_with_filters(filters)?;
        Ok(found)
    }

    /// # Errors
    /// Returns an error when the entity is missing, invalid, or cannot be written.
    pub fn update<K: EntityTable>(&self, entity: &Entity<K::Data>) -> Result<Entity<K::Data>> {
        let mut store = self.open_migrated()?;
        let updated = store.entities::<K>().update(entity)?;
        Ok(updated)
    }

    /// Soft-delete `id` and return the entity as it now stands.
    ///
    /// # Errors
    /// Returns an error when no live entity has `id`.
    pub fn delete<K: EntityTable>(&self, id: i64) -> Result<Entity<K::Data>> {
        let mut store = self.open_migrated()?;
        let mut entities = store.entities::<K>();
        entities.soft_delete(id)?;
        let deleted = entities.get_deleted_by_id(id)?;
        Ok(deleted)
    }

    /// # Errors
    /// Returns an error when the catalog cannot be read or encoded.
    pub fn export_snapshot(&self) -> Result<SnapshotExport> {
        let mut store = self.open_migrated()?;
        let snapshot = store.export_snapshot()?;
        let digest = snapshot_digest(&snapshot)?;
        Ok(SnapshotExport { digest, snapshot })
    }

    /// Import a snapshot; in strict mode any recorded error fails the call.
    ///
    /// # Errors
    /// Returns an error when storage fails, or in strict mode when the import
    /// recorded errors.
    pub fn import_snapshot(&self, snapshot: &BackupSnapshot, strict: bool) -> Result<ImportResult> {
        let mut store = self.open_migrated()?;
        let result = store.import_snapshot(snapshot)?;
        if strict {
            return Ok(result.into_strict()?);
        }
        Ok(result)
    }
}

/// Hex SHA-256 of the snapshot's JSON encoding.
///
/// # Errors
/// Returns an error when the snapshot cannot be serialized.
pub fn snapshot_digest(snapshot: &BackupSnapshot) -> Result<String> {
    let bytes = serde_json::to_vec(snapshot).context("failed to serialize backup snapshot")?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("sha256:{digest:x}"))
}
