use serde::{Deserialize, Serialize};

/// Every failure the catalog core can report.
///
/// Aggregating variants carry the full list of violations that were collected
/// before the operation gave up, never only the first one.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "messages", rename_all = "snake_case")]
pub enum CatalogError {
    #[error("input validation error: {0}")]
    InputValidation(String),
    #[error("malformed entity: {}", .0.join("; "))]
    MalformedEntity(Vec<String>),
    #[error("failed db validation: {}", .0.join("; "))]
    FailedDbValidation(Vec<String>),
    #[error("invalid filter: {}", .0.join("; "))]
    InvalidFilter(Vec<String>),
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    #[error("internal catastrophe: {0}")]
    InternalCatastrophe(String),
    #[error("backup import error: {}", .0.join("; "))]
    BackupImport(Vec<String>),
    #[error("storage error: {0}")]
    Storage(String),
}

impl CatalogError {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InputValidation(_) => "input_validation",
            Self::MalformedEntity(_) => "malformed_entity",
            Self::FailedDbValidation(_) => "failed_db_validation",
            Self::InvalidFilter(_) => "invalid_filter",
            Self::ResourceNotFound(_) => "resource_not_found",
            Self::InternalCatastrophe(_) => "internal_catastrophe",
            Self::BackupImport(_) => "backup_import",
            Self::Storage(_) => "storage",
        }
    }

    /// All messages carried by this error, in collection order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::InputValidation(message)
            | Self::ResourceNotFound(message)
            | Self::InternalCatastrophe(message)
            | Self::Storage(message) => vec![message.clone()],
            Self::MalformedEntity(messages)
            | Self::FailedDbValidation(messages)
            | Self::InvalidFilter(messages)
            | Self::BackupImport(messages) => messages.clone(),
        }
    }

    /// User-caused failures that a caller can correct and retry.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InputValidation(_)
                | Self::MalformedEntity(_)
                | Self::FailedDbValidation(_)
                | Self::InvalidFilter(_)
                | Self::ResourceNotFound(_)
        )
    }
}

/// Turn a list of collected violations into a result.
///
/// # Errors
/// Returns the error built by `wrap` when `violations` is non-empty.
pub fn collect_violations(
    violations: Vec<String>,
    wrap: fn(Vec<String>) -> CatalogError,
) -> Result<(), CatalogError> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(wrap(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregated_messages_are_preserved_in_order() {
        let err = CatalogError::InvalidFilter(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(err.messages(), vec!["first".to_string(), "second".to_string()]);
        assert_eq!(err.to_string(), "invalid filter: first; second");
        assert!(err.is_recoverable());
    }

    #[test]
    fn catastrophe_is_not_recoverable() {
        let err = CatalogError::InternalCatastrophe("row vanished".to_string());
        assert!(!err.is_recoverable());
        assert_eq!(err.kind(), "internal_catastrophe");
    }

    #[test]
    fn empty_violation_list_is_ok() {
        assert_eq!(collect_violations(Vec::new(), CatalogError::MalformedEntity), Ok(()));
        assert_eq!(
            collect_violations(vec!["bad".to_string()], CatalogError::MalformedEntity),
            Err(CatalogError::MalformedEntity(vec!["bad".to_string()]))
        );
    }
}
