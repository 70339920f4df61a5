use std::marker::PhantomData;

use catalog_core::{
    collect_violations, compile, CatalogError, CustomFieldValue, Entity, EntityData, FieldCatalog,
    FilterRequest, SqlOperand,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use time::OffsetDateTime;

use crate::tables::{table_for, EntityTable};
use crate::{custom_fields, now_rfc3339, parse_rfc3339, StorageContext};

/// Generic repository for one entity kind.
///
/// Every write runs validation, the write itself, the re-read, and the
/// attribute upsert inside one transaction. Every read hydrates custom field
/// values.
pub struct EntityStore<'conn, K> {
    conn: &'conn mut Connection,
    table: PhantomData<K>,
}

#[derive(Clone, Copy)]
enum Visibility {
    Live,
    Deleted,
    Any,
}

impl Visibility {
    fn predicate(self) -> &'static str {
        match self {
            Self::Live => " AND t.deleted_at IS NULL",
            Self::Deleted => " AND t.deleted_at IS NOT NULL",
            Self::Any => "",
        }
    }
}

impl<'conn, K: EntityTable> EntityStore<'conn, K> {
    pub(crate) fn new(conn: &'conn mut Connection) -> Self {
        Self { conn, table: PhantomData }
    }

    /// Persist a transient entity and its attribute values.
    ///
    /// # Errors
    /// Returns [`CatalogError::MalformedEntity`] for payload violations,
    /// [`CatalogError::FailedDbValidation`] for natural-key, reference, or custom
    /// field violations, and [`CatalogError::InternalCatastrophe`] when the new
    /// row cannot be read back.
    pub fn insert(&mut self, entity: &Entity<K::Data>) -> Result<Entity<K::Data>, CatalogError> {
        entity.validate()?;
        let kind = K::kind();

        let tx = self.conn.transaction().storage_context("failed to start insert transaction")?;
        let values = check_write::<K>(&tx, &entity.data, None, &entity.custom_field_values)?;

        let now = now_rfc3339()?;
        let mut bound = K::bind(&entity.data);
        bound.push(Value::Text(now.clone()));
        bound.push(Value::Text(now));
        tx.execute(&K::insert_sql(), params_from_iter(bound))
            .storage_context(&format!("failed to insert {kind} '{}'", entity.data.label()))?;
        let id = tx.last_insert_rowid();

        let mut stored = reread::<K>(&tx, id)?;
        custom_fields::upsert(&tx, &values, id, kind)?;
        stored.custom_field_values = custom_fields::values_for(&tx, id, kind)?;
        tx.commit().storage_context("failed to commit insert")?;

        tracing::debug!(entity_key = kind.as_str(), id, "inserted entity");
        Ok(stored)
    }

    /// Rewrite a persisted entity and upsert its attribute values.
    ///
    /// Values not mentioned in `entity` stay attached unchanged.
    ///
    /// # Errors
    /// Returns [`CatalogError::InputValidation`] when the entity has no id,
    /// [`CatalogError::ResourceNotFound`] when it is missing or deleted, and the
    /// same validation and catastrophe errors as [`EntityStore::insert`].
    pub fn update(&mut self, entity: &Entity<K::Data>) -> Result<Entity<K::Data>, CatalogError> {
        let kind = K::kind();
        let id = entity.id.ok_or_else(|| {
            CatalogError::InputValidation(format!("updating a {kind} requires an id"))
        })?;
        entity.validate()?;

        let tx = self.conn.transaction().storage_context("failed to start update transaction")?;
        let values = check_write::<K>(&tx, &entity.data, Some(id), &entity.custom_field_values)?;

        let mut bound = K::bind(&entity.data);
        bound.push(Value::Text(now_rfc3339()?));
        bound.push(Value::Integer(id));
        let changed = tx
            .execute(&K::update_sql(), params_from_iter(bound))
            .storage_context(&format!("failed to update {kind} {id}"))?;
        if changed == 0 {
            return Err(CatalogError::ResourceNotFound(format!("{kind} {id}")));
        }

        let mut stored = reread::<K>(&tx, id)?;
        custom_fields::upsert(&tx, &values, id, kind)?;
        stored.custom_field_values = custom_fields::values_for(&tx, id, kind)?;
        tx.commit().storage_context("failed to commit update")?;

        tracing::debug!(entity_key = kind.as_str(), id, "updated entity");
        Ok(stored)
    }

    /// # Errors
    /// Returns [`CatalogError::ResourceNotFound`] when no live row has `id`.
    pub fn get_by_id(&self, id: i64) -> Result<Entity<K::Data>, CatalogError> {
        self.fetch(id, Visibility::Live)
    }

    /// # Errors
    /// Returns [`CatalogError::ResourceNotFound`] unless `id` is soft-deleted.
    pub fn get_deleted_by_id(&self, id: i64) -> Result<Entity<K::Data>, CatalogError> {
        self.fetch(id, Visibility::Deleted)
    }

    /// # Errors
    /// Returns [`CatalogError::ResourceNotFound`] when no row has `id`.
    pub fn get_by_id_include_deleted(&self, id: i64) -> Result<Entity<K::Data>, CatalogError> {
        self.fetch(id, Visibility::Any)
    }

    fn fetch(&self, id: i64, visibility: Visibility) -> Result<Entity<K::Data>, CatalogError> {
        let sql = format!("{} WHERE t.id = ?1{}", K::base_query(), visibility.predicate());
        query::<K>(&*self.conn, &sql, vec![Value::Integer(id)])?
            .pop()
            .ok_or_else(|| CatalogError::ResourceNotFound(format!("{} {id}", K::kind())))
    }

    /// Live entities matching every filter, hydrated.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidFilter`] with every rejected filter, or a
    /// storage error.
    pub fn get_with_filters(
        &self,
        requests: &[FilterRequest],
    ) -> Result<Vec<Entity<K::Data>>, CatalogError> {
        let kind = K::kind();
        let declared = custom_fields::list(&*self.conn, Some(kind))?;
        let catalog = FieldCatalog::new(kind, K::Data::fields(), declared);
        let compiled = compile(&catalog, requests)?;

        let base = if compiled.uses_custom_fields { K::joined_query() } else { K::base_query() };
        let mut sql = format!("{base} WHERE t.deleted_at IS NULL");
        if let Some(predicates) = compiled.where_clause() {
            sql.push_str(" AND ");
            sql.push_str(&predicates);
        }
        sql.push_str(&compiled.pagination.to_sql());

        tracing::debug!(
            entity_key = kind.as_str(),
            joined = compiled.uses_custom_fields,
            sql = %sql,
            operands = ?compiled.operands,
            "compiled filter plan"
        );

        let operands = compiled.operands.into_iter().map(operand_value).collect();
        query::<K>(&*self.conn, &sql, operands)
    }

    /// All live entities in id order.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list(&self) -> Result<Vec<Entity<K::Data>>, CatalogError> {
        self.get_with_filters(&[])
    }

    /// Mark a live entity as deleted.
    ///
    /// # Errors
    /// Returns [`CatalogError::ResourceNotFound`] when `id` is missing or already deleted.
    pub fn soft_delete(&mut self, id: i64) -> Result<(), CatalogError> {
        let kind = K::kind();
        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE {} SET deleted_at = ?1, updated_at = ?1 \
                     WHERE id = ?2 AND deleted_at IS NULL",
                    K::TABLE
                ),
                params![now_rfc3339()?, id],
            )
            .storage_context(&format!("failed to soft-delete {kind} {id}"))?;
        if changed == 0 {
            return Err(CatalogError::ResourceNotFound(format!("{kind} {id}")));
        }
        tracing::debug!(entity_key = kind.as_str(), id, "soft-deleted entity");
        Ok(())
    }

    /// The live entity sharing `data`'s natural key, if any.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn find_by_natural_key(
        &self,
        data: &K::Data,
    ) -> Result<Option<Entity<K::Data>>, CatalogError> {
        match natural_key_id::<K>(&*self.conn, data)? {
            Some(id) => self.get_by_id(id).map(Some),
            None => Ok(None),
        }
    }
}

fn natural_key_id<K: EntityTable>(
    conn: &Connection,
    data: &K::Data,
) -> Result<Option<i64>, CatalogError> {
    conn.query_row(&K::natural_key_sql(), params_from_iter(K::natural_key(data)), |row| row.get(0))
        .optional()
        .storage_context(&format!("failed to look up {} by natural key", K::kind()))
}

/// Write-time checks against stored state; returns the attribute values bound
/// to their declared fields.
fn check_write<K: EntityTable>(
    conn: &Connection,
    data: &K::Data,
    own_id: Option<i64>,
    values: &[CustomFieldValue],
) -> Result<Vec<CustomFieldValue>, CatalogError> {
    let kind = K::kind();
    let mut violations = Vec::new();

    if let Some(existing) = natural_key_id::<K>(conn, data)? {
        if Some(existing) != own_id {
            violations.push(format!("{kind} '{}' already exists with id {existing}", data.label()));
        }
    }

    for reference in data.references() {
        if reference.target == kind && Some(reference.id) == own_id {
            violations.push(format!("{} MUST NOT reference the {kind} itself", reference.field));
            continue;
        }
        let exists: Option<i64> = conn
            .query_row(
                &format!(
                    "SELECT id FROM {} WHERE id = ?1 AND deleted_at IS NULL",
                    table_for(reference.target)
                ),
                params![reference.id],
                |row| row.get(0),
            )
            .optional()
            .storage_context("failed to check entity reference")?;
        if exists.is_none() {
            violations.push(format!(
                "{} {} does not reference an existing {}",
                reference.field, reference.id, reference.target
            ));
        }
    }

    let resolved = match custom_fields::resolve(conn, kind, values) {
        Ok(resolved) => resolved,
        Err(CatalogError::FailedDbValidation(mut messages)) => {
            violations.append(&mut messages);
            Vec::new()
        }
        Err(err) => return Err(err),
    };
    collect_violations(violations, CatalogError::FailedDbValidation)?;

    // The caller's declared type may differ from the catalog's.
    let malformed = resolved.iter().filter_map(|value| value.typed().err()).collect();
    collect_violations(malformed, CatalogError::MalformedEntity)?;
    Ok(resolved)
}

fn reread<K: EntityTable>(conn: &Connection, id: i64) -> Result<Entity<K::Data>, CatalogError> {
    let kind = K::kind();
    let sql = format!("{} WHERE t.id = ?1 AND t.deleted_at IS NULL", K::base_query());
    let row = conn
        .query_row(&sql, params![id], decode_entity::<K>)
        .optional()
        .storage_context(&format!("failed to re-read {kind} {id}"))?;
    row.ok_or_else(|| {
        tracing::error!(entity_key = kind.as_str(), id, "written entity vanished before re-read");
        CatalogError::InternalCatastrophe(format!(
            "{kind} {id} was written but could not be read back"
        ))
    })
}

fn query<K: EntityTable>(
    conn: &Connection,
    sql: &str,
    bound: Vec<Value>,
) -> Result<Vec<Entity<K::Data>>, CatalogError> {
    let kind = K::kind();
    let mut stmt = conn.prepare(sql).storage_context(&format!("failed to prepare {kind} query"))?;
    let rows = stmt
        .query_map(params_from_iter(bound), decode_entity::<K>)
        .storage_context(&format!("failed to query {kind}"))?;

    let mut entities = Vec::new();
    for row in rows {
        let mut entity = row.storage_context(&format!("failed to decode {kind} row"))?;
        if let Some(id) = entity.id {
            entity.custom_field_values = custom_fields::values_for(conn, id, kind)?;
        }
        entities.push(entity);
    }
    Ok(entities)
}

fn decode_entity<K: EntityTable>(row: &Row<'_>) -> rusqlite::Result<Entity<K::Data>> {
    Ok(Entity {
        id: Some(row.get("id")?),
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
        deleted_at: timestamp(row, "deleted_at")?,
        custom_field_values: Vec::new(),
        data: K::decode(row)?,
    })
}

fn timestamp(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<OffsetDateTime>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|value| {
        parse_rfc3339(&value).map_err(|message| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
            )
        })
    })
    .transpose()
}

fn operand_value(operand: SqlOperand) -> Value {
    match operand {
        SqlOperand::Text(value) => Value::Text(value),
        SqlOperand::Integer(value) => Value::Integer(value),
        SqlOperand::Real(value) => Value::Real(value),
    }
}

#[cfg(test)]
mod tests {
    use catalog_core::{
        BoardGame, BoardGameBox, CustomField, CustomFieldRequest, CustomFieldType, FilterOperator,
        System, Toy, VideoGame,
    };

    use super::*;
    use crate::test_support::migrated_store;
    use crate::{
        BoardGameBoxTable, BoardGameTable, SqliteStore, SystemTable, ToyTable, VideoGameTable,
    };

    fn system(name: &str, generation: i64, handheld: bool) -> Entity<System> {
        Entity::new(System { name: name.to_string(), generation, handheld })
    }

    fn declare(
        store: &mut SqliteStore,
        name: &str,
        field_type: &str,
        entity_key: &str,
    ) -> Result<CustomField, CatalogError> {
        store.declare_custom_field(&CustomFieldRequest {
            name: name.to_string(),
            field_type: field_type.to_string(),
            entity_key: entity_key.to_string(),
        })
    }

    #[test]
    fn insert_then_read_back_preserves_attribute_values() -> Result<(), CatalogError> {
        let mut store = migrated_store()?;
        let region = declare(&mut store, "Region", "text", "toy")?;
        let price = declare(&mut store, "Price", "number", "toy")?;
        let boxed = declare(&mut store, "Boxed", "boolean", "toy")?;

        let toy = Entity::new(Toy { name: "Optimus Prime".to_string(), set: "G1".to_string() })
            .with_values(vec![
                CustomFieldValue::new(&price, "59.99"),
                CustomFieldValue::new(&region, "PAL"),
                CustomFieldValue::new(&boxed, "true"),
            ]);
        let inserted = store.entities::<ToyTable>().insert(&toy)?;
        let id = inserted.id.unwrap_or_else(|| panic!("inserted toy has no id"));
        assert!(inserted.created_at.is_some());

        let read = store.entities::<ToyTable>().get_by_id(id)?;
        assert_eq!(read.custom_field_values, toy.custom_field_values);
        assert_eq!(read.data, toy.data);
        Ok(())
    }

    #[test]
    fn builtin_filter_returns_matching_systems() -> Result<(), CatalogError> {
        let mut store = migrated_store()?;
        let mut systems = store.entities::<SystemTable>();
        systems.insert(&system("NES", 3, false))?;
        systems.insert(&system("Game Boy", 4, true))?;
        systems.insert(&system("SNES", 4, false))?;

        let found = systems.get_with_filters(&[FilterRequest::new(
            System::KIND,
            "name",
            FilterOperator::Equals,
            "NES",
        )])?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data.name, "NES");

        let fourth = systems.get_with_filters(&[
            FilterRequest::new(System::KIND, "generation", FilterOperator::Equals, "4"),
            FilterRequest::new(System::KIND, "handheld", FilterOperator::Equals, "false"),
        ])?;
        assert_eq!(fourth.len(), 1);
        assert_eq!(fourth[0].data.name, "SNES");
        Ok(())
    }

    #[test]
    fn custom_filters_combine_with_and() -> Result<(), CatalogError> {
        let mut store = migrated_store()?;
        let region = declare(&mut store, "Region", "text", "system")?;
        let price = declare(&mut store, "Price", "number", "system")?;
        let mut systems = store.entities::<SystemTable>();
        systems.insert(&system("NES", 3, false).with_values(vec![
            CustomFieldValue::new(&region, "PAL"),
            CustomFieldValue::new(&price, "120"),
        ]))?;
        systems.insert(&system("Mega Drive", 4, false).with_values(vec![
            CustomFieldValue::new(&region, "PAL"),
            CustomFieldValue::new(&price, "80"),
        ]))?;
        systems.insert(&system("PC Engine", 4, false))?;

        let found = systems.get_with_filters(&[
            FilterRequest::new(System::KIND, "Region", FilterOperator::Equals, "PAL"),
            FilterRequest::new(System::KIND, "Price", FilterOperator::GreaterThan, "99.5"),
        ])?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data.name, "NES");
        assert_eq!(found[0].custom_field_values.len(), 2);
        Ok(())
    }

    #[test]
    fn pagination_orders_and_limits_rows() -> Result<(), CatalogError> {
        let mut store = migrated_store()?;
        let mut systems = store.entities::<SystemTable>();
        for name in ["Atari 2600", "Vectrex", "ColecoVision", "Intellivision"] {
            systems.insert(&system(name, 2, false))?;
        }
        let page = systems.get_with_filters(&[
            FilterRequest::new(System::KIND, "pagination", FilterOperator::OrderBy, "-name"),
            FilterRequest::new(System::KIND, "pagination", FilterOperator::Limit, "2"),
            FilterRequest::new(System::KIND, "pagination", FilterOperator::Offset, "1"),
        ])?;
        let names: Vec<&str> = page.iter().map(|entity| entity.data.name.as_str()).collect();
        assert_eq!(names, vec!["Intellivision", "ColecoVision"]);
        Ok(())
    }

    #[test]
    fn invalid_filters_are_rejected_before_querying() -> Result<(), CatalogError> {
        let mut store = migrated_store()?;
        let systems = store.entities::<SystemTable>();
        let result = systems.get_with_filters(&[
            FilterRequest::new(System::KIND, "name", FilterOperator::Equals, "1=1"),
            FilterRequest::new(System::KIND, "handheld", FilterOperator::Contains, "t"),
        ]);
        let Err(CatalogError::InvalidFilter(messages)) = result else {
            panic!("expected invalid filter");
        };
        assert_eq!(messages.len(), 2);
        Ok(())
    }

    #[test]
    fn soft_deleted_rows_leave_default_reads() -> Result<(), CatalogError> {
        let mut store = migrated_store()?;
        let mut systems = store.entities::<SystemTable>();
        let id = systems.insert(&system("Virtual Boy", 5, false))?.id.unwrap_or_default();

        systems.soft_delete(id)?;
        assert!(matches!(systems.get_by_id(id), Err(CatalogError::ResourceNotFound(_))));
        assert!(systems.get_by_id_include_deleted(id)?.is_deleted());
        assert_eq!(systems.get_deleted_by_id(id)?.id, Some(id));
        assert!(systems.list()?.is_empty());
        assert!(matches!(systems.soft_delete(id), Err(CatalogError::ResourceNotFound(_))));

        // The natural key is free again once the row is deleted.
        systems.insert(&system("Virtual Boy", 5, false))?;
        Ok(())
    }

    #[test]
    fn duplicate_natural_key_fails_db_validation() -> Result<(), CatalogError> {
        let mut store = migrated_store()?;
        let mut toys = store.entities::<ToyTable>();
        let toy = Entity::new(Toy { name: "Bumblebee".to_string(), set: "G1".to_string() });
        toys.insert(&toy)?;
        assert!(matches!(toys.insert(&toy), Err(CatalogError::FailedDbValidation(_))));

        let other_set =
            Entity::new(Toy { name: "Bumblebee".to_string(), set: "Movie".to_string() });
        toys.insert(&other_set)?;
        Ok(())
    }

    #[test]
    fn dangling_references_fail_db_validation() -> Result<(), CatalogError> {
        let mut store = migrated_store()?;
        let game = Entity::new(VideoGame { title: "Tetris".to_string(), system_id: 42 });
        let Err(CatalogError::FailedDbValidation(messages)) =
            store.entities::<VideoGameTable>().insert(&game)
        else {
            panic!("expected db validation failure");
        };
        assert!(messages[0].contains("systemId 42"));

        let board_game_id = store
            .entities::<BoardGameTable>()
            .insert(&Entity::new(BoardGame { title: "Catan".to_string() }))?
            .id
            .unwrap_or_default();
        let expansion = Entity::new(BoardGameBox {
            title: "Seafarers".to_string(),
            board_game_id,
            is_expansion: true,
            is_stand_alone: false,
            base_set_id: Some(99),
        });
        assert!(matches!(
            store.entities::<BoardGameBoxTable>().insert(&expansion),
            Err(CatalogError::FailedDbValidation(_))
        ));
        Ok(())
    }

    #[test]
    fn update_upserts_values_and_keeps_untouched_ones() -> Result<(), CatalogError> {
        let mut store = migrated_store()?;
        let region = declare(&mut store, "Region", "text", "system")?;
        let price = declare(&mut store, "Price", "number", "system")?;
        let mut systems = store.entities::<SystemTable>();
        let mut stored = systems.insert(&system("Saturn", 5, false).with_values(vec![
            CustomFieldValue::new(&region, "JP"),
            CustomFieldValue::new(&price, "150"),
        ]))?;

        stored.data.generation = 6;
        stored.custom_field_values = vec![CustomFieldValue::new(&price, "175")];
        let updated = systems.update(&stored)?;
        assert_eq!(updated.data.generation, 6);
        let values: Vec<(&str, &str)> = updated
            .custom_field_values
            .iter()
            .map(|value| (value.custom_field_name.as_str(), value.value.as_str()))
            .collect();
        assert_eq!(values, vec![("Region", "JP"), ("Price", "175")]);
        Ok(())
    }

    #[test]
    fn values_are_checked_against_the_declared_type() -> Result<(), CatalogError> {
        let mut store = migrated_store()?;
        let price = declare(&mut store, "Price", "number", "system")?;
        let mut mislabeled = CustomFieldValue::new(&price, "cheap");
        mislabeled.custom_field_type = CustomFieldType::Text;

        let result = store
            .entities::<SystemTable>()
            .insert(&system("3DO", 5, false).with_values(vec![mislabeled]));
        assert!(matches!(result, Err(CatalogError::MalformedEntity(_))));
        assert!(store.entities::<SystemTable>().list()?.is_empty());
        Ok(())
    }

    #[test]
    fn update_requires_a_live_id() -> Result<(), CatalogError> {
        let mut store = migrated_store()?;
        let mut systems = store.entities::<SystemTable>();
        assert!(matches!(
            systems.update(&system("Jaguar", 5, false)),
            Err(CatalogError::InputValidation(_))
        ));
        let mut ghost = system("Jaguar", 5, false);
        ghost.id = Some(404);
        assert!(matches!(systems.update(&ghost), Err(CatalogError::ResourceNotFound(_))));
        Ok(())
    }

    fn stamp_created_at(store: &SqliteStore, id: i64, raw: &str) -> Result<(), CatalogError> {
        let instant = parse_rfc3339(raw).unwrap_or_else(|message| panic!("{message}"));
        store
            .connection()
            .execute(
                "UPDATE system SET created_at = ?1 WHERE id = ?2",
                params![crate::rfc3339(instant)?, id],
            )
            .storage_context("failed to stamp created_at")?;
        Ok(())
    }

    fn names(found: &[Entity<System>]) -> Vec<&str> {
        found.iter().map(|entity| entity.data.name.as_str()).collect()
    }

    #[test]
    fn timestamp_filters_split_rows_inside_one_second() -> Result<(), CatalogError> {
        let mut store = migrated_store()?;
        let early = store.entities::<SystemTable>().insert(&system("NES", 3, false))?;
        let late = store.entities::<SystemTable>().insert(&system("SNES", 4, false))?;
        let early_id = early.id.unwrap_or_else(|| panic!("NES has no id"));
        let late_id = late.id.unwrap_or_else(|| panic!("SNES has no id"));
        stamp_created_at(&store, early_id, "2024-01-01T00:00:00.05Z")?;
        stamp_created_at(&store, late_id, "2024-01-01T00:00:00.5Z")?;

        let systems = store.entities::<SystemTable>();
        let since = |operand: &str| {
            FilterRequest::new(System::KIND, "createdAt", FilterOperator::Since, operand)
        };
        let before = |operand: &str| {
            FilterRequest::new(System::KIND, "createdAt", FilterOperator::Before, operand)
        };

        let from_start = systems.get_with_filters(&[since("2024-01-01T00:00:00Z")])?;
        assert_eq!(names(&from_start), vec!["NES", "SNES"]);
        let after_tenth = systems.get_with_filters(&[since("2024-01-01T00:00:00.1Z")])?;
        assert_eq!(names(&after_tenth), vec!["SNES"]);
        let before_tenth = systems.get_with_filters(&[before("2024-01-01T00:00:00.1Z")])?;
        assert_eq!(names(&before_tenth), vec!["NES"]);
        assert!(systems.get_with_filters(&[before("2024-01-01T00:00:00Z")])?.is_empty());

        let newest_first = systems.get_with_filters(&[FilterRequest::new(
            System::KIND,
            "pagination",
            FilterOperator::OrderBy,
            "-createdAt",
        )])?;
        assert_eq!(names(&newest_first), vec!["SNES", "NES"]);
        Ok(())
    }

    #[test]
    fn reread_of_a_missing_row_is_a_catastrophe() -> Result<(), CatalogError> {
        let mut store = migrated_store()?;
        assert!(matches!(
            reread::<SystemTable>(store.connection(), 404),
            Err(CatalogError::InternalCatastrophe(_))
        ));

        let mut systems = store.entities::<SystemTable>();
        let stored = systems.insert(&system("Virtual Boy", 5, false))?;
        let id = stored.id.unwrap_or_else(|| panic!("Virtual Boy has no id"));
        systems.soft_delete(id)?;
        assert!(matches!(
            reread::<SystemTable>(store.connection(), id),
            Err(CatalogError::InternalCatastrophe(_))
        ));
        Ok(())
    }
}
