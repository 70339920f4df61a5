//! Snapshot export and the two-phase import reconciler.
//!
//! Phase 1 reconciles custom field declarations and aborts the whole import on
//! any error. Phase 2 walks every entity kind in dependency order; a record
//! that cannot be written is skipped with an error while its siblings proceed.

use std::collections::HashMap;

use catalog_core::{
    BackupSnapshot, CatalogError, CustomField, CustomFieldValue, Entity, EntityData, EntityKind,
    ImportResult,
};

use crate::custom_fields;
use crate::tables::{
    BoardGameBoxTable, BoardGameTable, EntityTable, SystemTable, ToyTable, VideoGameBoxTable,
    VideoGameTable,
};
use crate::SqliteStore;

/// Fields declared by the snapshot, keyed by `(entity kind, field name)`.
type FieldMap = HashMap<(EntityKind, String), CustomField>;

/// Snapshot ids mapped to the ids the same records have locally.
type IdMap = HashMap<(EntityKind, i64), i64>;

impl SqliteStore {
    /// Every custom field declaration plus every live entity, hydrated.
    ///
    /// # Errors
    /// Returns an error when any table cannot be read.
    pub fn export_snapshot(&mut self) -> Result<BackupSnapshot, CatalogError> {
        let custom_fields = custom_fields::list(self.connection(), None)?
            .iter()
            .map(CustomField::to_request)
            .collect();

        Ok(BackupSnapshot {
            custom_fields,
            systems: self.entities::<SystemTable>().list()?,
            toys: self.entities::<ToyTable>().list()?,
            video_games: self.entities::<VideoGameTable>().list()?,
            video_game_boxes: self.entities::<VideoGameBoxTable>().list()?,
            board_games: self.entities::<BoardGameTable>().list()?,
            board_game_boxes: self.entities::<BoardGameBoxTable>().list()?,
        })
    }

    /// Reconcile `snapshot` into this catalog.
    ///
    /// Recoverable problems are reported in [`ImportResult::errors`].
    ///
    /// # Errors
    /// Returns an error only when storage fails; the records written before the
    /// failure stay committed.
    pub fn import_snapshot(
        &mut self,
        snapshot: &BackupSnapshot,
    ) -> Result<ImportResult, CatalogError> {
        let mut result = ImportResult::default();
        let fields = self.import_custom_fields(snapshot, &mut result)?;
        if !result.errors.is_empty() {
            tracing::warn!(
                errors = result.errors.len(),
                "custom field reconciliation failed; no entity records were imported"
            );
            return Ok(result);
        }

        let mut ids = IdMap::new();
        self.import_kind::<SystemTable>(&snapshot.systems, &fields, &mut ids, &mut result)?;
        self.import_kind::<ToyTable>(&snapshot.toys, &fields, &mut ids, &mut result)?;
        self.import_kind::<BoardGameTable>(&snapshot.board_games, &fields, &mut ids, &mut result)?;

        let (base_sets, expansions): (Vec<_>, Vec<_>) = snapshot
            .board_game_boxes
            .iter()
            .cloned()
            .partition(|record| record.data.base_set_id.is_none());
        self.import_kind::<BoardGameBoxTable>(&base_sets, &fields, &mut ids, &mut result)?;
        self.import_kind::<BoardGameBoxTable>(&expansions, &fields, &mut ids, &mut result)?;

        self.import_kind::<VideoGameTable>(&snapshot.video_games, &fields, &mut ids, &mut result)?;
        self.import_kind::<VideoGameBoxTable>(
            &snapshot.video_game_boxes,
            &fields,
            &mut ids,
            &mut result,
        )?;

        tracing::info!(
            created = result.total_created(),
            errors = result.errors.len(),
            "imported backup snapshot"
        );
        Ok(result)
    }

    fn import_custom_fields(
        &mut self,
        snapshot: &BackupSnapshot,
        result: &mut ImportResult,
    ) -> Result<FieldMap, CatalogError> {
        let mut fields = FieldMap::new();
        for request in &snapshot.custom_fields {
            let existing = match EntityKind::parse(&request.entity_key) {
                Some(kind) => match custom_fields::lookup(self.connection(), kind, &request.name) {
                    Ok(field) => Some(field),
                    Err(CatalogError::ResourceNotFound(_)) => None,
                    Err(err) => return Err(err),
                },
                None => None,
            };

            match existing {
                Some(field) if field.field_type.as_str() == request.field_type => {
                    result.custom_fields.existing_count += 1;
                    fields.insert((field.entity_key, field.name.clone()), field);
                }
                Some(field) => result.errors.push(format!(
                    "custom field '{}' for {} is declared as {} but the backup declares {}",
                    field.name, field.entity_key, field.field_type, request.field_type
                )),
                None => match self.declare_custom_field(request) {
                    Ok(field) => {
                        result.custom_fields.created_count += 1;
                        fields.insert((field.entity_key, field.name.clone()), field);
                    }
                    Err(err) if err.is_recoverable() => result.errors.extend(err.messages()),
                    Err(err) => return Err(err),
                },
            }
        }
        Ok(fields)
    }

    fn import_kind<K: EntityTable>(
        &mut self,
        records: &[Entity<K::Data>],
        fields: &FieldMap,
        ids: &mut IdMap,
        result: &mut ImportResult,
    ) -> Result<(), CatalogError> {
        let kind = K::kind();
        for record in records {
            let label = record.data.label();
            let values = match resolve_values(kind, &record.custom_field_values, fields) {
                Ok(values) => values,
                Err(messages) => {
                    tracing::warn!(
                        entity_key = kind.as_str(),
                        record = %label,
                        "skipped backup record"
                    );
                    result.errors.extend(
                        messages.into_iter().map(|message| format!("{kind} '{label}': {message}")),
                    );
                    continue;
                }
            };

            let mut data = record.data.clone();
            data.rewire(&|target, id| ids.get(&(target, id)).copied());

            let mut store = self.entities::<K>();
            let existing = store.find_by_natural_key(&data)?;
            let mut entity = Entity::new(data).with_values(values);
            entity.id = existing.as_ref().and_then(|found| found.id);
            let written = if existing.is_some() {
                store.update(&entity)
            } else {
                store.insert(&entity)
            };

            match written {
                Ok(stored) => {
                    let count = result.count_mut(kind);
                    if existing.is_some() {
                        count.existing_count += 1;
                    } else {
                        count.created_count += 1;
                    }
                    if let (Some(source), Some(local)) = (record.id, stored.id) {
                        ids.insert((kind, source), local);
                    }
                }
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(
                        entity_key = kind.as_str(),
                        record = %label,
                        error = %err,
                        "skipped backup record"
                    );
                    result.errors.extend(
                        err.messages()
                            .into_iter()
                            .map(|message| format!("{kind} '{label}': {message}")),
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

/// Rebind snapshot values to local field ids by name.
fn resolve_values(
    kind: EntityKind,
    values: &[CustomFieldValue],
    fields: &FieldMap,
) -> Result<Vec<CustomFieldValue>, Vec<String>> {
    let mut missing = Vec::new();
    let mut resolved = Vec::with_capacity(values.len());
    for value in values {
        match fields.get(&(kind, value.custom_field_name.trim().to_string())) {
            Some(field) => resolved.push(CustomFieldValue::new(field, value.value.clone())),
            None => missing.push(format!(
                "custom field '{}' is not declared for {kind}",
                value.custom_field_name
            )),
        }
    }
    if missing.is_empty() {
        Ok(resolved)
    } else {
        Err(missing)
    }
}
