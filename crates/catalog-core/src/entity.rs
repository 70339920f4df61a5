use std::fmt::{Debug, Display, Formatter};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::filter::{FieldDescriptor, FieldType};
use crate::{collect_violations, CatalogError, CustomFieldValue};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    System,
    Toy,
    VideoGame,
    VideoGameBox,
    BoardGame,
    BoardGameBox,
}

impl EntityKind {
    pub const ALL: [Self; 6] = [
        Self::System,
        Self::Toy,
        Self::VideoGame,
        Self::VideoGameBox,
        Self::BoardGame,
        Self::BoardGameBox,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Toy => "toy",
            Self::VideoGame => "videoGame",
            Self::VideoGameBox => "videoGameBox",
            Self::BoardGame => "boardGame",
            Self::BoardGameBox => "boardGameBox",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "toy" => Some(Self::Toy),
            "videoGame" => Some(Self::VideoGame),
            "videoGameBox" => Some(Self::VideoGameBox),
            "boardGame" => Some(Self::BoardGame),
            "boardGameBox" => Some(Self::BoardGameBox),
            _ => None,
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference from one entity to another by local id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub field: &'static str,
    pub target: EntityKind,
    pub id: i64,
}

/// Kind-specific payload carried inside an [`Entity`].
pub trait EntityData: Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Built-in filterable fields beyond the shared `id`/`createdAt`/`updatedAt`.
    fn fields() -> &'static [FieldDescriptor];

    /// Collect every invariant violation of this payload.
    fn validate(&self) -> Vec<String>;

    /// Human-readable natural key, used in error messages.
    fn label(&self) -> String;

    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    /// Rewrite references through `lookup`, leaving unmapped ids untouched.
    fn rewire(&mut self, _lookup: &dyn Fn(EntityKind, i64) -> Option<i64>) {}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity<T> {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub custom_field_values: Vec<CustomFieldValue>,
    #[serde(flatten)]
    pub data: T,
}

impl<T: EntityData> Entity<T> {
    /// A transient entity that has not been persisted yet.
    #[must_use]
    pub fn new(data: T) -> Self {
        Self {
            id: None,
            created_at: None,
            updated_at: None,
            deleted_at: None,
            custom_field_values: Vec::new(),
            data,
        }
    }

    #[must_use]
    pub fn with_values(mut self, values: Vec<CustomFieldValue>) -> Self {
        self.custom_field_values = values;
        self
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Check payload invariants and that every attribute value parses as its type.
    ///
    /// # Errors
    /// Returns [`CatalogError::MalformedEntity`] carrying every violation found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut violations = self.data.validate();
        for value in &self.custom_field_values {
            if let Err(message) = value.typed() {
                violations.push(message);
            }
        }
        collect_violations(violations, CatalogError::MalformedEntity)
    }
}

/// Identity-based equality; never equal until both sides are persisted.
impl<T> PartialEq for Entity<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id.is_some() && self.id == other.id
    }
}

const fn field(name: &'static str, column: &'static str, field_type: FieldType) -> FieldDescriptor {
    FieldDescriptor { name, column, field_type }
}

fn require_text(violations: &mut Vec<String>, name: &str, value: &str) {
    if value.trim().is_empty() {
        violations.push(format!("{name} MUST be provided"));
    }
}

fn require_id(violations: &mut Vec<String>, name: &str, value: i64) {
    if value <= 0 {
        violations.push(format!("{name} MUST be a positive id"));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct System {
    pub name: String,
    #[serde(default)]
    pub generation: i64,
    #[serde(default)]
    pub handheld: bool,
}

impl EntityData for System {
    const KIND: EntityKind = EntityKind::System;

    fn fields() -> &'static [FieldDescriptor] {
        const FIELDS: &[FieldDescriptor] = &[
            field("name", "name", FieldType::Text),
            field("generation", "generation", FieldType::Number),
            field("handheld", "handheld", FieldType::Boolean),
        ];
        FIELDS
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        require_text(&mut violations, "name", &self.name);
        if self.generation < 0 {
            violations.push("generation MUST NOT be negative".to_string());
        }
        violations
    }

    fn label(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Toy {
    pub name: String,
    #[serde(default)]
    pub set: String,
}

impl EntityData for Toy {
    const KIND: EntityKind = EntityKind::Toy;

    fn fields() -> &'static [FieldDescriptor] {
        const FIELDS: &[FieldDescriptor] =
            &[field("name", "name", FieldType::Text), field("set", "toy_set", FieldType::Text)];
        FIELDS
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        require_text(&mut violations, "name", &self.name);
        violations
    }

    fn label(&self) -> String {
        if self.set.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.set)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoGame {
    pub title: String,
    pub system_id: i64,
}

impl EntityData for VideoGame {
    const KIND: EntityKind = EntityKind::VideoGame;

    fn fields() -> &'static [FieldDescriptor] {
        const FIELDS: &[FieldDescriptor] = &[
            field("title", "title", FieldType::Text),
            field("systemId", "system_id", FieldType::Number),
        ];
        FIELDS
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        require_text(&mut violations, "title", &self.title);
        require_id(&mut violations, "systemId", self.system_id);
        violations
    }

    fn label(&self) -> String {
        format!("{} (system {})", self.title, self.system_id)
    }

    fn references(&self) -> Vec<Reference> {
        vec![Reference { field: "systemId", target: EntityKind::System, id: self.system_id }]
    }

    fn rewire(&mut self, lookup: &dyn Fn(EntityKind, i64) -> Option<i64>) {
        if let Some(id) = lookup(EntityKind::System, self.system_id) {
            self.system_id = id;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoGameBox {
    pub title: String,
    pub system_id: i64,
    #[serde(default)]
    pub is_physical: bool,
    #[serde(default)]
    pub is_collection: bool,
}

impl EntityData for VideoGameBox {
    const KIND: EntityKind = EntityKind::VideoGameBox;

    fn fields() -> &'static [FieldDescriptor] {
        const FIELDS: &[FieldDescriptor] = &[
            field("title", "title", FieldType::Text),
            field("systemId", "system_id", FieldType::Number),
            field("isPhysical", "is_physical", FieldType::Boolean),
            field("isCollection", "is_collection", FieldType::Boolean),
        ];
        FIELDS
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        require_text(&mut violations, "title", &self.title);
        require_id(&mut violations, "systemId", self.system_id);
        violations
    }

    fn label(&self) -> String {
        format!("{} (system {})", self.title, self.system_id)
    }

    fn references(&self) -> Vec<Reference> {
        vec![Reference { field: "systemId", target: EntityKind::System, id: self.system_id }]
    }

    fn rewire(&mut self, lookup: &dyn Fn(EntityKind, i64) -> Option<i64>) {
        if let Some(id) = lookup(EntityKind::System, self.system_id) {
            self.system_id = id;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BoardGame {
    pub title: String,
}

impl EntityData for BoardGame {
    const KIND: EntityKind = EntityKind::BoardGame;

    fn fields() -> &'static [FieldDescriptor] {
        const FIELDS: &[FieldDescriptor] = &[field("title", "title", FieldType::Text)];
        FIELDS
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        require_text(&mut violations, "title", &self.title);
        violations
    }

    fn label(&self) -> String {
        self.title.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BoardGameBox {
    pub title: String,
    pub board_game_id: i64,
    #[serde(default)]
    pub is_expansion: bool,
    #[serde(default)]
    pub is_stand_alone: bool,
    #[serde(default)]
    pub base_set_id: Option<i64>,
}

impl EntityData for BoardGameBox {
    const KIND: EntityKind = EntityKind::BoardGameBox;

    fn fields() -> &'static [FieldDescriptor] {
        const FIELDS: &[FieldDescriptor] = &[
            field("title", "title", FieldType::Text),
            field("boardGameId", "board_game_id", FieldType::Number),
            field("isExpansion", "is_expansion", FieldType::Boolean),
            field("isStandAlone", "is_stand_alone", FieldType::Boolean),
            field("baseSetId", "base_set_id", FieldType::Number),
        ];
        FIELDS
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        require_text(&mut violations, "title", &self.title);
        require_id(&mut violations, "boardGameId", self.board_game_id);
        if let Some(base_set_id) = self.base_set_id {
            require_id(&mut violations, "baseSetId", base_set_id);
            if !self.is_expansion {
                violations.push("baseSetId is only allowed on expansions".to_string());
            }
        }
        violations
    }

    fn label(&self) -> String {
        format!("{} (board game {})", self.title, self.board_game_id)
    }

    fn references(&self) -> Vec<Reference> {
        let mut references = vec![Reference {
            field: "boardGameId",
            target: EntityKind::BoardGame,
            id: self.board_game_id,
        }];
        if let Some(base_set_id) = self.base_set_id {
            references.push(Reference {
                field: "baseSetId",
                target: EntityKind::BoardGameBox,
                id: base_set_id,
            });
        }
        references
    }

    fn rewire(&mut self, lookup: &dyn Fn(EntityKind, i64) -> Option<i64>) {
        if let Some(id) = lookup(EntityKind::BoardGame, self.board_game_id) {
            self.board_game_id = id;
        }
        if let Some(base_set_id) = self.base_set_id {
            if let Some(id) = lookup(EntityKind::BoardGameBox, base_set_id) {
                self.base_set_id = Some(id);
            }
        }
    }
}
