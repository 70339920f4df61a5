//! Custom field catalog and attribute value store.
//!
//! Functions take a plain `&Connection` so they run unchanged inside the
//! entity store's write transactions.

use catalog_core::{
    collect_violations, CatalogError, CustomField, CustomFieldRequest, CustomFieldType,
    CustomFieldValue, EntityKind,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{now_rfc3339, SqliteStore, StorageContext};

const SELECT_FIELD: &str = "SELECT id, name, type, entity_key FROM custom_field";

/// Declare a new custom field for an entity kind.
///
/// # Errors
/// Returns [`CatalogError::FailedDbValidation`] when the type or entity key is
/// unknown, the name is blank, or `(entity_key, name)` is already declared.
pub fn declare(
    conn: &Connection,
    request: &CustomFieldRequest,
) -> Result<CustomField, CatalogError> {
    let mut violations = Vec::new();
    let name = request.name.trim();
    if name.is_empty() {
        violations.push("custom field name MUST be provided".to_string());
    }
    let field_type = CustomFieldType::parse(&request.field_type);
    if field_type.is_none() {
        violations.push(format!(
            "custom field '{}' has unknown type '{}'; expected text, number, or boolean",
            request.name, request.field_type
        ));
    }
    let kind = EntityKind::parse(&request.entity_key);
    if kind.is_none() {
        violations.push(format!(
            "custom field '{}' targets unknown entity key '{}'",
            request.name, request.entity_key
        ));
    }
    let (Some(field_type), Some(kind)) = (field_type, kind) else {
        return Err(CatalogError::FailedDbValidation(violations));
    };
    if find(conn, kind, name)?.is_some() {
        violations.push(format!("custom field '{name}' already exists for {kind}"));
    }
    collect_violations(violations, CatalogError::FailedDbValidation)?;

    conn.execute(
        "INSERT INTO custom_field(name, type, entity_key, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![name, field_type.as_str(), kind.as_str(), now_rfc3339()?],
    )
    .storage_context(&format!("failed to declare custom field '{name}' for {kind}"))?;

    let id = conn.last_insert_rowid();
    tracing::debug!(id, name, entity_key = kind.as_str(), "declared custom field");
    Ok(CustomField { id, name: name.to_string(), field_type, entity_key: kind })
}

/// # Errors
/// Returns [`CatalogError::ResourceNotFound`] when no such field is declared.
pub fn lookup(
    conn: &Connection,
    kind: EntityKind,
    name: &str,
) -> Result<CustomField, CatalogError> {
    find(conn, kind, name)?.ok_or_else(|| {
        CatalogError::ResourceNotFound(format!("custom field '{name}' for {kind}"))
    })
}

/// Names are stored trimmed, so every lookup trims too.
fn find(
    conn: &Connection,
    kind: EntityKind,
    name: &str,
) -> Result<Option<CustomField>, CatalogError> {
    conn.query_row(
        &format!("{SELECT_FIELD} WHERE entity_key = ?1 AND name = ?2"),
        params![kind.as_str(), name.trim()],
        decode_field,
    )
    .optional()
    .storage_context("failed to look up custom field")
}

fn find_by_id(conn: &Connection, id: i64) -> Result<Option<CustomField>, CatalogError> {
    conn.query_row(&format!("{SELECT_FIELD} WHERE id = ?1"), params![id], decode_field)
        .optional()
        .storage_context("failed to look up custom field by id")
}

/// Declared fields ordered by id, optionally restricted to one kind.
///
/// # Errors
/// Returns an error when rows cannot be read.
pub fn list(conn: &Connection, kind: Option<EntityKind>) -> Result<Vec<CustomField>, CatalogError> {
    let mut stmt = conn
        .prepare(&format!(
            "{SELECT_FIELD} WHERE (?1 IS NULL OR entity_key = ?1) ORDER BY id ASC"
        ))
        .storage_context("failed to prepare custom field listing")?;
    let rows = stmt
        .query_map(params![kind.map(EntityKind::as_str)], decode_field)
        .storage_context("failed to list custom fields")?;

    let mut fields = Vec::new();
    for row in rows {
        fields.push(row.storage_context("failed to decode custom field")?);
    }
    Ok(fields)
}

fn decode_field(row: &Row<'_>) -> rusqlite::Result<CustomField> {
    let type_raw: String = row.get(2)?;
    let key_raw: String = row.get(3)?;
    Ok(CustomField {
        id: row.get(0)?,
        name: row.get(1)?,
        field_type: parse_column(2, &type_raw, CustomFieldType::parse)?,
        entity_key: parse_column(3, &key_raw, EntityKind::parse)?,
    })
}

pub(crate) fn parse_column<T>(
    index: usize,
    raw: &str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unexpected stored value: {raw}"),
            )),
        )
    })
}

/// Bind attribute values to their declared fields before a write.
///
/// A positive `custom_field_id` is resolved by id, otherwise by name. Every
/// value must belong to a field declared for `kind`; the returned values carry
/// the catalog's current id, name, and type.
///
/// # Errors
/// Returns [`CatalogError::FailedDbValidation`] listing every unresolvable value.
pub fn resolve(
    conn: &Connection,
    kind: EntityKind,
    values: &[CustomFieldValue],
) -> Result<Vec<CustomFieldValue>, CatalogError> {
    let mut violations = Vec::new();
    let mut resolved = Vec::with_capacity(values.len());

    for value in values {
        let field = if value.custom_field_id > 0 {
            find_by_id(conn, value.custom_field_id)?
        } else {
            find(conn, kind, &value.custom_field_name)?
        };
        match field {
            Some(field) if field.entity_key == kind => {
                resolved.push(CustomFieldValue::new(&field, value.value.clone()));
            }
            Some(field) => violations.push(format!(
                "custom field '{}' belongs to {}, not {kind}",
                field.name, field.entity_key
            )),
            None => violations.push(format!(
                "custom field '{}' is not declared for {kind}",
                value.custom_field_name
            )),
        }
    }

    collect_violations(violations, CatalogError::FailedDbValidation)?;
    Ok(resolved)
}

/// Values attached to one entity instance, in write order.
///
/// # Errors
/// Returns an error when rows cannot be read.
pub fn values_for(
    conn: &Connection,
    entity_id: i64,
    kind: EntityKind,
) -> Result<Vec<CustomFieldValue>, CatalogError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT custom_field_id, custom_field_name, custom_field_type, value
             FROM custom_field_value
             WHERE entity_id = ?1 AND entity_key = ?2
             ORDER BY rowid ASC",
        )
        .storage_context("failed to prepare custom field value lookup")?;
    let rows = stmt
        .query_map(params![entity_id, kind.as_str()], decode_value)
        .storage_context("failed to read custom field values")?;

    let mut values = Vec::new();
    for row in rows {
        values.push(row.storage_context("failed to decode custom field value")?);
    }
    Ok(values)
}

fn decode_value(row: &Row<'_>) -> rusqlite::Result<CustomFieldValue> {
    let type_raw: String = row.get(2)?;
    Ok(CustomFieldValue {
        custom_field_id: row.get(0)?,
        custom_field_name: row.get(1)?,
        custom_field_type: parse_column(2, &type_raw, CustomFieldType::parse)?,
        value: row.get(3)?,
    })
}

/// Insert or update attribute values for one entity instance.
///
/// Values must already be bound to fields declared for `kind` (see [`resolve`]).
/// Existing rows for the same field have their raw value replaced in place.
/// Returns the persisted values in input order.
///
/// # Errors
/// Returns [`CatalogError::FailedDbValidation`] when a value references a field
/// of another kind, or a storage error when a write fails.
pub fn upsert(
    conn: &Connection,
    values: &[CustomFieldValue],
    entity_id: i64,
    kind: EntityKind,
) -> Result<Vec<CustomFieldValue>, CatalogError> {
    let mut persisted = Vec::with_capacity(values.len());
    for value in values {
        let field = find_by_id(conn, value.custom_field_id)?
            .filter(|field| field.entity_key == kind)
            .ok_or_else(|| {
                CatalogError::FailedDbValidation(vec![format!(
                    "custom field id {} is not declared for {kind}",
                    value.custom_field_id
                )])
            })?;

        conn.execute(
            "INSERT INTO custom_field_value(
                entity_id, entity_key, custom_field_id, custom_field_name, custom_field_type, value
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(entity_id, entity_key, custom_field_id) DO UPDATE SET
                custom_field_name = excluded.custom_field_name,
                custom_field_type = excluded.custom_field_type,
                value = excluded.value",
            params![
                entity_id,
                kind.as_str(),
                field.id,
                field.name,
                field.field_type.as_str(),
                value.value
            ],
        )
        .storage_context("failed to upsert custom field value")?;

        let stored = conn
            .query_row(
                "SELECT custom_field_id, custom_field_name, custom_field_type, value
                 FROM custom_field_value
                 WHERE entity_id = ?1 AND entity_key = ?2 AND custom_field_id = ?3",
                params![entity_id, kind.as_str(), field.id],
                decode_value,
            )
            .storage_context("failed to re-read custom field value")?;
        persisted.push(stored);
    }
    Ok(persisted)
}

impl SqliteStore {
    /// # Errors
    /// See [`declare`].
    pub fn declare_custom_field(
        &mut self,
        request: &CustomFieldRequest,
    ) -> Result<CustomField, CatalogError> {
        declare(self.connection(), request)
    }

    /// # Errors
    /// See [`lookup`].
    pub fn lookup_custom_field(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<CustomField, CatalogError> {
        lookup(self.connection(), kind, name)
    }

    /// # Errors
    /// See [`list`].
    pub fn list_custom_fields(
        &self,
        kind: Option<EntityKind>,
    ) -> Result<Vec<CustomField>, CatalogError> {
        list(self.connection(), kind)
    }
}
