use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::EntityKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CustomFieldType {
    Text,
    Number,
    Boolean,
}

impl CustomFieldType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }
}

impl Display for CustomFieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-declared attribute usable by exactly one entity kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomField {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: CustomFieldType,
    pub entity_key: EntityKind,
}

impl CustomField {
    #[must_use]
    pub fn to_request(&self) -> CustomFieldRequest {
        CustomFieldRequest {
            name: self.name.clone(),
            field_type: self.field_type.as_str().to_string(),
            entity_key: self.entity_key.as_str().to_string(),
        }
    }
}

/// Declaration shape as received from callers and backup snapshots.
///
/// Type and entity key stay raw strings here so that unknown values reach the
/// catalog and are reported as validation failures instead of decode errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub entity_key: String,
}

/// One attribute value attached to an entity instance.
///
/// Name and type are copies taken at write time so historical values stay
/// displayable after the catalog changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldValue {
    #[serde(default)]
    pub custom_field_id: i64,
    pub custom_field_name: String,
    pub custom_field_type: CustomFieldType,
    pub value: String,
}

impl CustomFieldValue {
    #[must_use]
    pub fn new(field: &CustomField, value: impl Into<String>) -> Self {
        Self {
            custom_field_id: field.id,
            custom_field_name: field.name.clone(),
            custom_field_type: field.field_type,
            value: value.into(),
        }
    }

    /// Decode the stored text into its typed form.
    ///
    /// # Errors
    /// Returns a message when the raw text does not parse as the declared type.
    pub fn typed(&self) -> Result<AttributeValue, String> {
        AttributeValue::from_stored(self.custom_field_type, &self.value).map_err(|reason| {
            format!("custom field '{}' {reason}", self.custom_field_name)
        })
    }
}

/// Typed view over a stored attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Boolean(bool),
}

impl AttributeValue {
    /// Parse stored text according to a declared field type.
    ///
    /// # Errors
    /// Returns a reason when `raw` is not a valid value of `field_type`.
    pub fn from_stored(field_type: CustomFieldType, raw: &str) -> Result<Self, String> {
        match field_type {
            CustomFieldType::Text => Ok(Self::Text(raw.to_string())),
            CustomFieldType::Number => match raw.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(Self::Number(value)),
                _ => Err(format!("expects a number, got '{raw}'")),
            },
            CustomFieldType::Boolean => match raw.trim() {
                "true" => Ok(Self::Boolean(true)),
                "false" => Ok(Self::Boolean(false)),
                _ => Err(format!("expects true or false, got '{raw}'")),
            },
        }
    }
}
