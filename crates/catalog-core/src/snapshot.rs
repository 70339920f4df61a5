use serde::{Deserialize, Serialize};

use crate::{
    BoardGame, BoardGameBox, CatalogError, CustomFieldRequest, Entity, EntityKind, System, Toy,
    VideoGame, VideoGameBox,
};

/// Portable backup of the whole catalog.
///
/// Attribute values reference their custom field by name; ids are only
/// meaningful inside the database that produced the snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldRequest>,
    #[serde(default)]
    pub systems: Vec<Entity<System>>,
    #[serde(default)]
    pub toys: Vec<Entity<Toy>>,
    #[serde(default)]
    pub video_games: Vec<Entity<VideoGame>>,
    #[serde(default)]
    pub video_game_boxes: Vec<Entity<VideoGameBox>>,
    #[serde(default)]
    pub board_games: Vec<Entity<BoardGame>>,
    #[serde(default)]
    pub board_game_boxes: Vec<Entity<BoardGameBox>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportCount {
    pub existing_count: usize,
    pub created_count: usize,
}

/// Per-kind tallies plus every non-fatal error met during an import.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub custom_fields: ImportCount,
    pub systems: ImportCount,
    pub toys: ImportCount,
    pub video_games: ImportCount,
    pub video_game_boxes: ImportCount,
    pub board_games: ImportCount,
    pub board_game_boxes: ImportCount,
    pub errors: Vec<String>,
}

impl ImportResult {
    #[must_use]
    pub fn count(&self, kind: EntityKind) -> ImportCount {
        match kind {
            EntityKind::System => self.systems,
            EntityKind::Toy => self.toys,
            EntityKind::VideoGame => self.video_games,
            EntityKind::VideoGameBox => self.video_game_boxes,
            EntityKind::BoardGame => self.board_games,
            EntityKind::BoardGameBox => self.board_game_boxes,
        }
    }

    pub fn count_mut(&mut self, kind: EntityKind) -> &mut ImportCount {
        match kind {
            EntityKind::System => &mut self.systems,
            EntityKind::Toy => &mut self.toys,
            EntityKind::VideoGame => &mut self.video_games,
            EntityKind::VideoGameBox => &mut self.video_game_boxes,
            EntityKind::BoardGame => &mut self.board_games,
            EntityKind::BoardGameBox => &mut self.board_game_boxes,
        }
    }

    #[must_use]
    pub fn total_created(&self) -> usize {
        self.custom_fields.created_count
            + EntityKind::ALL.iter().map(|kind| self.count(*kind).created_count).sum::<usize>()
    }

    /// Treat any recorded error as a failed import.
    ///
    /// # Errors
    /// Returns [`CatalogError::BackupImport`] carrying every recorded error.
    pub fn into_strict(self) -> Result<Self, CatalogError> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(CatalogError::BackupImport(self.errors))
        }
    }
}
