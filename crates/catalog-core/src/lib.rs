//! Domain model for the collection catalog: entity kinds, user-declared custom
//! fields, the typed filter language, and backup snapshot shapes.
//!
//! Nothing in this crate touches storage; the SQLite store builds on these types.

mod custom_field;
mod entity;
mod error;
pub mod filter;
mod snapshot;
mod timestamp;

pub use custom_field::{
    AttributeValue, CustomField, CustomFieldRequest, CustomFieldType, CustomFieldValue,
};
pub use entity::{
    BoardGame, BoardGameBox, Entity, EntityData, EntityKind, Reference, System, Toy, VideoGame,
    VideoGameBox,
};
pub use error::{collect_violations, CatalogError};
pub use filter::{
    compile, CompiledFilters, FieldCatalog, FieldDescriptor, FieldType, Filter, FilterOperator,
    FilterRequest, Pagination, SqlOperand,
};
pub use snapshot::{BackupSnapshot, ImportCount, ImportResult};
pub use timestamp::format_timestamp;
