//! Per-kind storage strategies for [`crate::EntityStore`].

use catalog_core::{
    BoardGame, BoardGameBox, EntityData, EntityKind, System, Toy, VideoGame, VideoGameBox,
};
use rusqlite::types::Value;
use rusqlite::Row;

/// Columns every entity table carries besides its kind columns.
const SHARED_COLUMNS: [&str; 4] = ["id", "created_at", "updated_at", "deleted_at"];

/// Storage specifics of one entity kind.
///
/// Implementors only describe their table; the insert, read, update,
/// soft-delete, and hydrate algorithms live once in [`crate::EntityStore`].
pub trait EntityTable: 'static {
    type Data: EntityData;

    const TABLE: &'static str;

    /// Kind columns, in the order [`EntityTable::bind`] produces values.
    const COLUMNS: &'static [&'static str];

    /// Columns identifying a live row independently of its id.
    const NATURAL_KEY: &'static [&'static str];

    /// Decode the kind columns of a row selected through [`EntityTable::base_query`].
    ///
    /// # Errors
    /// Returns an error when a column is missing or has an unexpected type.
    fn decode(row: &Row<'_>) -> rusqlite::Result<Self::Data>;

    fn bind(data: &Self::Data) -> Vec<Value>;

    /// Values for [`EntityTable::NATURAL_KEY`], in the same order.
    fn natural_key(data: &Self::Data) -> Vec<Value>;

    #[must_use]
    fn kind() -> EntityKind {
        Self::Data::KIND
    }

    #[must_use]
    fn select_list() -> String {
        SHARED_COLUMNS
            .iter()
            .chain(Self::COLUMNS)
            .map(|column| format!("t.{column} AS {column}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    #[must_use]
    fn base_query() -> String {
        format!("SELECT {} FROM {} t", Self::select_list(), Self::TABLE)
    }

    /// Base query restricted to rows carrying at least one attribute value.
    #[must_use]
    fn joined_query() -> String {
        format!(
            "SELECT DISTINCT {} FROM {} t \
             INNER JOIN custom_field_value cfv_join \
             ON cfv_join.entity_id = t.id AND cfv_join.entity_key = '{}'",
            Self::select_list(),
            Self::TABLE,
            Self::kind().as_str()
        )
    }

    /// Binds kind columns, then `created_at` and `updated_at`.
    #[must_use]
    fn insert_sql() -> String {
        let columns = Self::COLUMNS.len() + 2;
        let placeholders = (1..=columns).map(|index| format!("?{index}")).collect::<Vec<_>>();
        format!(
            "INSERT INTO {}({}, created_at, updated_at) VALUES ({})",
            Self::TABLE,
            Self::COLUMNS.join(", "),
            placeholders.join(", ")
        )
    }

    /// Binds kind columns, then `updated_at`, then the id.
    #[must_use]
    fn update_sql() -> String {
        let assignments = Self::COLUMNS
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{column} = ?{}", index + 1))
            .collect::<Vec<_>>();
        let updated_at = Self::COLUMNS.len() + 1;
        format!(
            "UPDATE {} SET {}, updated_at = ?{updated_at} WHERE id = ?{} AND deleted_at IS NULL",
            Self::TABLE,
            assignments.join(", "),
            updated_at + 1
        )
    }

    #[must_use]
    fn natural_key_sql() -> String {
        let predicates = Self::NATURAL_KEY
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{column} = ?{}", index + 1))
            .collect::<Vec<_>>();
        format!(
            "SELECT id FROM {} WHERE {} AND deleted_at IS NULL ORDER BY id ASC LIMIT 1",
            Self::TABLE,
            predicates.join(" AND ")
        )
    }
}

/// Table holding entities of `kind`, used to check references.
#[must_use]
pub(crate) fn table_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::System => SystemTable::TABLE,
        EntityKind::Toy => ToyTable::TABLE,
        EntityKind::VideoGame => VideoGameTable::TABLE,
        EntityKind::VideoGameBox => VideoGameBoxTable::TABLE,
        EntityKind::BoardGame => BoardGameTable::TABLE,
        EntityKind::BoardGameBox => BoardGameBoxTable::TABLE,
    }
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn flag(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

pub struct SystemTable;

impl EntityTable for SystemTable {
    type Data = System;

    const TABLE: &'static str = "system";
    const COLUMNS: &'static [&'static str] = &["name", "generation", "handheld"];
    const NATURAL_KEY: &'static [&'static str] = &["name"];

    fn decode(row: &Row<'_>) -> rusqlite::Result<System> {
        Ok(System {
            name: row.get("name")?,
            generation: row.get("generation")?,
            handheld: row.get("handheld")?,
        })
    }

    fn bind(data: &System) -> Vec<Value> {
        vec![text(&data.name), Value::Integer(data.generation), flag(data.handheld)]
    }

    fn natural_key(data: &System) -> Vec<Value> {
        vec![text(&data.name)]
    }
}

pub struct ToyTable;

impl EntityTable for ToyTable {
    type Data = Toy;

    const TABLE: &'static str = "toy";
    const COLUMNS: &'static [&'static str] = &["name", "toy_set"];
    const NATURAL_KEY: &'static [&'static str] = &["name", "toy_set"];

    fn decode(row: &Row<'_>) -> rusqlite::Result<Toy> {
        Ok(Toy { name: row.get("name")?, set: row.get("toy_set")? })
    }

    fn bind(data: &Toy) -> Vec<Value> {
        vec![text(&data.name), text(&data.set)]
    }

    fn natural_key(data: &Toy) -> Vec<Value> {
        Self::bind(data)
    }
}

pub struct VideoGameTable;

impl EntityTable for VideoGameTable {
    type Data = VideoGame;

    const TABLE: &'static str = "video_game";
    const COLUMNS: &'static [&'static str] = &["title", "system_id"];
    const NATURAL_KEY: &'static [&'static str] = &["title", "system_id"];

    fn decode(row: &Row<'_>) -> rusqlite::Result<VideoGame> {
        Ok(VideoGame { title: row.get("title")?, system_id: row.get("system_id")? })
    }

    fn bind(data: &VideoGame) -> Vec<Value> {
        vec![text(&data.title), Value::Integer(data.system_id)]
    }

    fn natural_key(data: &VideoGame) -> Vec<Value> {
        Self::bind(data)
    }
}

pub struct VideoGameBoxTable;

impl EntityTable for VideoGameBoxTable {
    type Data = VideoGameBox;

    const TABLE: &'static str = "video_game_box";
    const COLUMNS: &'static [&'static str] =
        &["title", "system_id", "is_physical", "is_collection"];
    const NATURAL_KEY: &'static [&'static str] = &["title", "system_id"];

    fn decode(row: &Row<'_>) -> rusqlite::Result<VideoGameBox> {
        Ok(VideoGameBox {
            title: row.get("title")?,
            system_id: row.get("system_id")?,
            is_physical: row.get("is_physical")?,
            is_collection: row.get("is_collection")?,
        })
    }

    fn bind(data: &VideoGameBox) -> Vec<Value> {
        vec![
            text(&data.title),
            Value::Integer(data.system_id),
            flag(data.is_physical),
            flag(data.is_collection),
        ]
    }

    fn natural_key(data: &VideoGameBox) -> Vec<Value> {
        vec![text(&data.title), Value::Integer(data.system_id)]
    }
}

pub struct BoardGameTable;

impl EntityTable for BoardGameTable {
    type Data = BoardGame;

    const TABLE: &'static str = "board_game";
    const COLUMNS: &'static [&'static str] = &["title"];
    const NATURAL_KEY: &'static [&'static str] = &["title"];

    fn decode(row: &Row<'_>) -> rusqlite::Result<BoardGame> {
        Ok(BoardGame { title: row.get("title")? })
    }

    fn bind(data: &BoardGame) -> Vec<Value> {
        vec![text(&data.title)]
    }

    fn natural_key(data: &BoardGame) -> Vec<Value> {
        Self::bind(data)
    }
}

pub struct BoardGameBoxTable;

impl EntityTable for BoardGameBoxTable {
    type Data = BoardGameBox;

    const TABLE: &'static str = "board_game_box";
    const COLUMNS: &'static [&'static str] =
        &["title", "board_game_id", "is_expansion", "is_stand_alone", "base_set_id"];
    const NATURAL_KEY: &'static [&'static str] = &["title", "board_game_id"];

    fn decode(row: &Row<'_>) -> rusqlite::Result<BoardGameBox> {
        Ok(BoardGameBox {
            title: row.get("title")?,
            board_game_id: row.get("board_game_id")?,
            is_expansion: row.get("is_expansion")?,
            is_stand_alone: row.get("is_stand_alone")?,
            base_set_id: row.get("base_set_id")?,
        })
    }

    fn bind(data: &BoardGameBox) -> Vec<Value> {
        vec![
            text(&data.title),
            Value::Integer(data.board_game_id),
            flag(data.is_expansion),
            flag(data.is_stand_alone),
            data.base_set_id.map_or(Value::Null, Value::Integer),
        ]
    }

    fn natural_key(data: &BoardGameBox) -> Vec<Value> {
        vec![text(&data.title), Value::Integer(data.board_game_id)]
    }
}
