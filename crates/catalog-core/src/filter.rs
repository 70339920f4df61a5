//! Typed filter language and its compiler into parameterized SQL predicates.
//!
//! Column names and field ids in the emitted fragments always come from the
//! [`FieldCatalog`]; caller-supplied text only ever reaches the database as a
//! bound operand.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::{format_timestamp, CatalogError, CustomField, CustomFieldType, EntityKind};

/// Reserved pseudo-field that carries `order_by`, `limit`, and `offset`.
pub const PAGINATION_FIELD: &str = "pagination";

/// Case-sensitive literals an operand may never contain.
pub const OPERAND_BLACKLIST: [&str; 7] =
    [";", "=", "or", "sleep(", " union ", " delete ", " select "];

/// Alias of the entity table inside every base query.
pub const ENTITY_ALIAS: &str = "t";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    Timestamp,
    Pagination,
}

impl FieldType {
    #[must_use]
    pub fn operators(self) -> &'static [FilterOperator] {
        use FilterOperator as Op;
        match self {
            Self::Text => &[Op::Equals, Op::NotEquals, Op::Contains, Op::StartsWith, Op::EndsWith],
            Self::Number => &[
                Op::Equals,
                Op::NotEquals,
                Op::GreaterThan,
                Op::LessThan,
                Op::GreaterThanEqualTo,
                Op::LessThanEqualTo,
            ],
            Self::Boolean => &[Op::Equals, Op::NotEquals],
            Self::Timestamp => &[Op::Since, Op::Before],
            Self::Pagination => &[Op::OrderBy, Op::Limit, Op::Offset],
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Pagination => "pagination",
        }
    }
}

impl From<CustomFieldType> for FieldType {
    fn from(value: CustomFieldType) -> Self {
        match value {
            CustomFieldType::Text => Self::Text,
            CustomFieldType::Number => Self::Number,
            CustomFieldType::Boolean => Self::Boolean,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterThanEqualTo,
    LessThanEqualTo,
    Since,
    Before,
    OrderBy,
    Limit,
    Offset,
}

impl FilterOperator {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::GreaterThanEqualTo => "greater_than_equal_to",
            Self::LessThanEqualTo => "less_than_equal_to",
            Self::Since => "since",
            Self::Before => "before",
            Self::OrderBy => "order_by",
            Self::Limit => "limit",
            Self::Offset => "offset",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "equals" => Some(Self::Equals),
            "not_equals" => Some(Self::NotEquals),
            "contains" => Some(Self::Contains),
            "starts_with" => Some(Self::StartsWith),
            "ends_with" => Some(Self::EndsWith),
            "greater_than" => Some(Self::GreaterThan),
            "less_than" => Some(Self::LessThan),
            "greater_than_equal_to" => Some(Self::GreaterThanEqualTo),
            "less_than_equal_to" => Some(Self::LessThanEqualTo),
            "since" => Some(Self::Since),
            "before" => Some(Self::Before),
            "order_by" => Some(Self::OrderBy),
            "limit" => Some(Self::Limit),
            "offset" => Some(Self::Offset),
            _ => None,
        }
    }

    fn sql_operator(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "<>",
            Self::Contains | Self::StartsWith | Self::EndsWith => "LIKE",
            Self::GreaterThan | Self::Since => ">",
            Self::LessThan | Self::Before => "<",
            Self::GreaterThanEqualTo => ">=",
            Self::LessThanEqualTo => "<=",
            Self::OrderBy | Self::Limit | Self::Offset => "",
        }
    }

    fn is_like(self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }
}

impl Display for FilterOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A built-in column a kind exposes to filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub column: &'static str,
    pub field_type: FieldType,
}

const SHARED_FIELDS: [FieldDescriptor; 3] = [
    FieldDescriptor { name: "id", column: "id", field_type: FieldType::Number },
    FieldDescriptor { name: "createdAt", column: "created_at", field_type: FieldType::Timestamp },
    FieldDescriptor { name: "updatedAt", column: "updated_at", field_type: FieldType::Timestamp },
];

/// Filter request as received at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilterRequest {
    #[serde(default)]
    pub key: String,
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub operand: String,
}

impl FilterRequest {
    #[must_use]
    pub fn new(
        key: EntityKind,
        field: impl Into<String>,
        operator: FilterOperator,
        operand: impl Into<String>,
    ) -> Self {
        Self {
            key: key.as_str().to_string(),
            field: field.into(),
            operator: operator.as_str().to_string(),
            operand: operand.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTarget {
    Column(&'static str),
    CustomField(i64),
    Pagination,
}

/// A filter that passed catalog, operator, and blacklist validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub entity_key: EntityKind,
    pub field: String,
    pub field_type: FieldType,
    pub operator: FilterOperator,
    pub operand: String,
    pub is_custom: bool,
    pub target: FieldTarget,
}

/// Fields filterable on one entity kind: built-in columns plus declared custom fields.
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    kind: EntityKind,
    builtin: Vec<FieldDescriptor>,
    custom: Vec<CustomField>,
}

enum CatalogEntry<'a> {
    Builtin(&'a FieldDescriptor),
    Custom(&'a CustomField),
    Pagination,
}

impl FieldCatalog {
    /// Custom fields declared for another kind are ignored.
    #[must_use]
    pub fn new(kind: EntityKind, fields: &[FieldDescriptor], custom: Vec<CustomField>) -> Self {
        let mut builtin = SHARED_FIELDS.to_vec();
        builtin.extend_from_slice(fields);
        let custom = custom.into_iter().filter(|field| field.entity_key == kind).collect();
        Self { kind, builtin, custom }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[must_use]
    pub fn builtin_fields(&self) -> &[FieldDescriptor] {
        &self.builtin
    }

    #[must_use]
    pub fn custom_fields(&self) -> &[CustomField] {
        &self.custom
    }

    fn lookup(&self, name: &str) -> Option<CatalogEntry<'_>> {
        if name == PAGINATION_FIELD {
            return Some(CatalogEntry::Pagination);
        }
        if let Some(descriptor) = self.builtin.iter().find(|field| field.name == name) {
            return Some(CatalogEntry::Builtin(descriptor));
        }
        self.custom.iter().find(|field| field.name == name).map(CatalogEntry::Custom)
    }

    fn column(&self, name: &str) -> Option<&'static str> {
        self.builtin.iter().find(|field| field.name == name).map(|field| field.column)
    }
}

/// Operand value as bound to a statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlOperand {
    Text(String),
    Integer(i64),
    Real(f64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub order_by: Option<&'static str>,
    pub descending: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    /// `ORDER BY`/`LIMIT`/`OFFSET` tail; defaults to id order.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let column = self.order_by.unwrap_or("id");
        let direction = if self.descending { "DESC" } else { "ASC" };
        let mut sql = format!(" ORDER BY {ENTITY_ALIAS}.{column} {direction}");
        if column != "id" {
            sql.push_str(&format!(", {ENTITY_ALIAS}.id ASC"));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        sql
    }
}

/// Output of [`compile`]: fragments and operands line up positionally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilters {
    pub filters: Vec<Filter>,
    pub predicates: Vec<String>,
    pub operands: Vec<SqlOperand>,
    pub pagination: Pagination,
    pub uses_custom_fields: bool,
}

impl CompiledFilters {
    /// Predicates joined with `AND`, or `None` when nothing filters rows.
    #[must_use]
    pub fn where_clause(&self) -> Option<String> {
        if self.predicates.is_empty() {
            None
        } else {
            Some(self.predicates.join(" AND "))
        }
    }
}

/// Validate `requests` against `catalog` and compile them into SQL fragments.
///
/// Every request is checked; no partial filter list is ever produced.
///
/// # Errors
/// Returns [`CatalogError::InvalidFilter`] with one message per violation.
pub fn compile(
    catalog: &FieldCatalog,
    requests: &[FilterRequest],
) -> Result<CompiledFilters, CatalogError> {
    let mut violations = Vec::new();
    let mut filters = Vec::with_capacity(requests.len());

    for request in requests {
        match validate_request(catalog, request) {
            Ok(filter) => filters.push(filter),
            Err(mut messages) => violations.append(&mut messages),
        }
    }

    let mut pagination = Pagination::default();
    let mut seen_pagination = Vec::new();
    for filter in filters.iter().filter(|filter| filter.target == FieldTarget::Pagination) {
        if seen_pagination.contains(&filter.operator) {
            violations.push(format!("{} may only be given once", filter.operator));
            continue;
        }
        seen_pagination.push(filter.operator);
        if let Err(message) = apply_pagination(catalog, filter, &mut pagination) {
            violations.push(message);
        }
    }

    if !violations.is_empty() {
        return Err(CatalogError::InvalidFilter(violations));
    }

    filters.retain(|filter| filter.target != FieldTarget::Pagination);
    // Stable: built-in columns first, then custom fields, each in request order.
    filters.sort_by_key(|filter| filter.is_custom);

    let mut compiled = CompiledFilters {
        uses_custom_fields: filters.iter().any(|filter| filter.is_custom),
        pagination,
        ..CompiledFilters::default()
    };
    for filter in &filters {
        let (predicate, operand) = fragment(catalog.kind(), filter);
        compiled.predicates.push(predicate);
        compiled.operands.push(operand);
    }
    compiled.filters = filters;
    Ok(compiled)
}

fn validate_request(
    catalog: &FieldCatalog,
    request: &FilterRequest,
) -> Result<Filter, Vec<String>> {
    let kind = catalog.kind();
    let mut violations = Vec::new();

    if !request.key.is_empty() && EntityKind::parse(&request.key) != Some(kind) {
        violations.push(format!(
            "filter key '{}' does not match entity '{kind}'",
            request.key
        ));
    }

    let entry = catalog.lookup(&request.field);
    if entry.is_none() {
        violations.push(format!("unknown field '{}' for {kind}", request.field));
    }

    let operator = FilterOperator::parse(&request.operator);
    if operator.is_none() {
        violations.push(format!("unknown operator '{}'", request.operator));
    }

    let blocked = blacklisted_tokens(&request.operand);
    if !blocked.is_empty() {
        violations.push(format!(
            "operand for field '{}' contains forbidden token(s) {}",
            request.field,
            blocked.iter().map(|token| format!("'{token}'")).collect::<Vec<_>>().join(", ")
        ));
    }

    let (Some(entry), Some(operator)) = (entry, operator) else {
        return Err(violations);
    };

    let (field_type, target, is_custom) = match entry {
        CatalogEntry::Builtin(descriptor) => {
            (descriptor.field_type, FieldTarget::Column(descriptor.column), false)
        }
        CatalogEntry::Custom(field) => {
            (FieldType::from(field.field_type), FieldTarget::CustomField(field.id), true)
        }
        CatalogEntry::Pagination => (FieldType::Pagination, FieldTarget::Pagination, false),
    };

    if !field_type.operators().contains(&operator) {
        violations.push(format!(
            "operator '{operator}' is not allowed on {} field '{}'",
            field_type.as_str(),
            request.field
        ));
    } else if blocked.is_empty() {
        if let Err(message) = check_operand(field_type, operator, &request.field, &request.operand)
        {
            violations.push(message);
        }
    }

    if !violations.is_empty() {
        return Err(violations);
    }

    let operand = if field_type == FieldType::Timestamp {
        normalize_timestamp(&request.operand).unwrap_or_else(|| request.operand.clone())
    } else {
        request.operand.clone()
    };

    Ok(Filter {
        entity_key: kind,
        field: request.field.clone(),
        field_type,
        operator,
        operand,
        is_custom,
        target,
    })
}

/// Blacklisted literals found in `operand`, in blacklist order.
#[must_use]
pub fn blacklisted_tokens(operand: &str) -> Vec<&'static str> {
    OPERAND_BLACKLIST.iter().copied().filter(|token| operand.contains(token)).collect()
}

fn check_operand(
    field_type: FieldType,
    operator: FilterOperator,
    field: &str,
    operand: &str,
) -> Result<(), String> {
    match field_type {
        FieldType::Text => Ok(()),
        FieldType::Number => parse_number(operand)
            .map(|_| ())
            .ok_or_else(|| format!("operand '{operand}' for field '{field}' is not a number")),
        FieldType::Boolean => parse_bool(operand)
            .map(|_| ())
            .ok_or_else(|| format!("operand '{operand}' for field '{field}' is not true or false")),
        FieldType::Timestamp => normalize_timestamp(operand).map(|_| ()).ok_or_else(|| {
            format!("operand '{operand}' for field '{field}' is not an RFC3339 timestamp")
        }),
        FieldType::Pagination => match operator {
            FilterOperator::Limit | FilterOperator::Offset => match operand.trim().parse::<i64>() {
                Ok(value) if value >= 0 => Ok(()),
                _ => Err(format!("{operator} expects a non-negative integer, got '{operand}'")),
            },
            _ => Ok(()),
        },
    }
}

fn apply_pagination(
    catalog: &FieldCatalog,
    filter: &Filter,
    pagination: &mut Pagination,
) -> Result<(), String> {
    match filter.operator {
        FilterOperator::OrderBy => {
            let (descending, name) = match filter.operand.strip_prefix('-') {
                Some(name) => (true, name),
                None => (false, filter.operand.as_str()),
            };
            let column = catalog
                .column(name)
                .ok_or_else(|| format!("cannot order by unknown field '{name}'"))?;
            pagination.order_by = Some(column);
            pagination.descending = descending;
        }
        FilterOperator::Limit => pagination.limit = filter.operand.trim().parse().ok(),
        FilterOperator::Offset => pagination.offset = filter.operand.trim().parse().ok(),
        _ => {}
    }
    Ok(())
}

fn fragment(kind: EntityKind, filter: &Filter) -> (String, SqlOperand) {
    let operator = filter.operator.sql_operator();
    let escape = if filter.operator.is_like() { " ESCAPE '\\'" } else { "" };
    let operand = bind_operand(filter);

    let predicate = match &filter.target {
        FieldTarget::Column(column) => {
            format!("{ENTITY_ALIAS}.{column} {operator} ?{escape}")
        }
        FieldTarget::CustomField(field_id) => {
            let value = if filter.field_type == FieldType::Number {
                "CAST(cfv.value AS REAL)"
            } else {
                "cfv.value"
            };
            format!(
                "EXISTS (SELECT 1 FROM custom_field_value cfv \
                 WHERE cfv.entity_id = {ENTITY_ALIAS}.id AND cfv.entity_key = '{}' \
                 AND cfv.custom_field_id = {field_id} AND {value} {operator} ?{escape})",
                kind.as_str()
            )
        }
        FieldTarget::Pagination => String::new(),
    };
    (predicate, operand)
}

fn bind_operand(filter: &Filter) -> SqlOperand {
    let raw = filter.operand.as_str();
    match filter.operator {
        FilterOperator::Contains => return SqlOperand::Text(format!("%{}%", escape_like(raw))),
        FilterOperator::StartsWith => return SqlOperand::Text(format!("{}%", escape_like(raw))),
        FilterOperator::EndsWith => return SqlOperand::Text(format!("%{}", escape_like(raw))),
        _ => {}
    }
    match filter.field_type {
        FieldType::Number => {
            parse_number(raw).map_or_else(|| SqlOperand::Text(raw.to_string()), SqlOperand::Real)
        }
        FieldType::Boolean => match (parse_bool(raw), filter.is_custom) {
            (Some(value), true) => SqlOperand::Text(value.to_string()),
            (Some(value), false) => SqlOperand::Integer(i64::from(value)),
            (None, _) => SqlOperand::Text(raw.to_string()),
        },
        FieldType::Text | FieldType::Timestamp | FieldType::Pagination => {
            SqlOperand::Text(raw.to_string())
        }
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn normalize_timestamp(raw: &str) -> Option<String> {
    let parsed = OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()?;
    format_timestamp(parsed).ok()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{EntityData, System, Toy};

    fn system_catalog() -> FieldCatalog {
        FieldCatalog::new(
            EntityKind::System,
            System::fields(),
            vec![
                CustomField {
                    id: 11,
                    name: "Region".to_string(),
                    field_type: CustomFieldType::Text,
                    entity_key: EntityKind::System,
                },
                CustomField {
                    id: 12,
                    name: "Boxed".to_string(),
                    field_type: CustomFieldType::Boolean,
                    entity_key: EntityKind::System,
                },
                CustomField {
                    id: 13,
                    name: "Price".to_string(),
                    field_type: CustomFieldType::Number,
                    entity_key: EntityKind::System,
                },
                CustomField {
                    id: 14,
                    name: "Scale".to_string(),
                    field_type: CustomFieldType::Text,
                    entity_key: EntityKind::Toy,
                },
            ],
        )
    }

    fn request(field: &str, operator: &str, operand: &str) -> FilterRequest {
        FilterRequest {
            key: "system".to_string(),
            field: field.to_string(),
            operator: operator.to_string(),
            operand: operand.to_string(),
        }
    }

    fn invalid_messages(result: Result<CompiledFilters, CatalogError>) -> Vec<String> {
        match result {
            Err(CatalogError::InvalidFilter(messages)) => messages,
            other => panic!("expected InvalidFilter, got {other:?}"),
        }
    }

    #[test]
    fn builtin_equality_uses_plain_query() -> Result<(), CatalogError> {
        let compiled = compile(&system_catalog(), &[request("name", "equals", "NES")])?;
        assert!(!compiled.uses_custom_fields);
        assert_eq!(compiled.predicates, vec!["t.name = ?".to_string()]);
        assert_eq!(compiled.operands, vec![SqlOperand::Text("NES".to_string())]);
        Ok(())
    }

    #[test]
    fn operand_with_blacklisted_token_is_rejected() {
        let messages =
            invalid_messages(compile(&system_catalog(), &[request("name", "equals", "1=1")]));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("'='"));
    }

    #[test]
    fn blacklist_match_is_case_sensitive() -> Result<(), CatalogError> {
        let compiled = compile(&system_catalog(), &[request("name", "equals", "SEGA OR NEC")])?;
        assert_eq!(compiled.predicates.len(), 1);
        assert!(
            compile(&system_catalog(), &[request("name", "equals", "Amstrad or BBC")]).is_err()
        );
        Ok(())
    }

    #[test]
    fn boolean_field_rejects_contains() {
        let builtin =
            invalid_messages(compile(&system_catalog(), &[request("handheld", "contains", "t")]));
        assert!(builtin[0].contains("not allowed on boolean"));
        let custom =
            invalid_messages(compile(&system_catalog(), &[request("Boxed", "contains", "t")]));
        assert!(custom[0].contains("not allowed on boolean"));
    }

    #[test]
    fn every_violation_is_reported_together() {
        let messages = invalid_messages(compile(
            &system_catalog(),
            &[
                request("name", "equals", "NES"),
                request("colour", "equals", "grey"),
                request("generation", "contains", "3"),
                request("name", "equals", "x; DROP TABLE system"),
                request("name", "resembles", "NES"),
            ],
        ));
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn custom_fields_of_other_kinds_are_unknown() {
        let messages =
            invalid_messages(compile(&system_catalog(), &[request("Scale", "equals", "1:6")]));
        assert!(messages[0].contains("unknown field 'Scale'"));
    }

    #[test]
    fn mismatched_filter_key_is_rejected() {
        let mut filter = request("name", "equals", "NES");
        filter.key = "toy".to_string();
        let messages = invalid_messages(compile(&system_catalog(), &[filter]));
        assert!(messages[0].contains("does not match"));
    }

    #[test]
    fn custom_filters_follow_builtin_filters_and_request_join() -> Result<(), CatalogError> {
        let compiled = compile(
            &system_catalog(),
            &[
                request("Region", "equals", "PAL"),
                request("generation", "greater_than", "3"),
                request("Price", "less_than_equal_to", "99.5"),
                request("name", "starts_with", "Super"),
            ],
        )?;
        assert!(compiled.uses_custom_fields);
        let fields: Vec<&str> =
            compiled.filters.iter().map(|filter| filter.field.as_str()).collect();
        assert_eq!(fields, vec!["generation", "name", "Region", "Price"]);
        assert_eq!(compiled.predicates[0], "t.generation > ?");
        assert_eq!(compiled.predicates[1], "t.name LIKE ? ESCAPE '\\'");
        assert!(compiled.predicates[2].contains("cfv.custom_field_id = 11"));
        assert!(compiled.predicates[2].contains("cfv.entity_key = 'system'"));
        assert!(compiled.predicates[3].contains("CAST(cfv.value AS REAL) <= ?"));
        assert_eq!(
            compiled.operands,
            vec![
                SqlOperand::Real(3.0),
                SqlOperand::Text("Super%".to_string()),
                SqlOperand::Text("PAL".to_string()),
                SqlOperand::Real(99.5),
            ]
        );
        Ok(())
    }

    #[test]
    fn like_operands_are_wrapped_and_escaped() -> Result<(), CatalogError> {
        let compiled = compile(
            &system_catalog(),
            &[request("name", "contains", "50%"), request("name", "ends_with", "Boy")],
        )?;
        assert_eq!(
            compiled.operands,
            vec![SqlOperand::Text("%50\\%%".to_string()), SqlOperand::Text("%Boy".to_string())]
        );
        Ok(())
    }

    #[test]
    fn booleans_bind_per_storage() -> Result<(), CatalogError> {
        let compiled = compile(
            &system_catalog(),
            &[request("handheld", "equals", "true"), request("Boxed", "not_equals", "false")],
        )?;
        assert_eq!(
            compiled.operands,
            vec![SqlOperand::Integer(1), SqlOperand::Text("false".to_string())]
        );
        Ok(())
    }

    #[test]
    fn operand_types_are_checked() {
        let messages = invalid_messages(compile(
            &system_catalog(),
            &[
                request("generation", "equals", "third"),
                request("handheld", "equals", "yes"),
                request("createdAt", "since", "yesterday"),
            ],
        ));
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn timestamps_are_normalized_to_utc() -> Result<(), CatalogError> {
        let compiled = compile(
            &system_catalog(),
            &[request("createdAt", "since", "2024-01-01T02:00:00+02:00")],
        )?;
        assert_eq!(compiled.predicates, vec!["t.created_at > ?".to_string()]);
        assert_eq!(
            compiled.operands,
            vec![SqlOperand::Text("2024-01-01T00:00:00.000000000Z".to_string())]
        );
        Ok(())
    }

    #[test]
    fn pagination_compiles_outside_predicates() -> Result<(), CatalogError> {
        let compiled = compile(
            &system_catalog(),
            &[
                request(PAGINATION_FIELD, "order_by", "-name"),
                request(PAGINATION_FIELD, "limit", "10"),
                request(PAGINATION_FIELD, "offset", "20"),
            ],
        )?;
        assert!(compiled.predicates.is_empty());
        assert_eq!(compiled.where_clause(), None);
        assert_eq!(
            compiled.pagination.to_sql(),
            " ORDER BY t.name DESC, t.id ASC LIMIT 10 OFFSET 20"
        );
        Ok(())
    }

    #[test]
    fn pagination_operators_are_reserved() {
        let messages = invalid_messages(compile(
            &system_catalog(),
            &[
                request("name", "limit", "10"),
                request(PAGINATION_FIELD, "equals", "10"),
                request(PAGINATION_FIELD, "limit", "-1"),
                request(PAGINATION_FIELD, "order_by", "Region"),
            ],
        ));
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn toy_set_maps_to_its_column() -> Result<(), CatalogError> {
        let catalog = FieldCatalog::new(EntityKind::Toy, Toy::fields(), Vec::new());
        let compiled = compile(
            &catalog,
            &[FilterRequest::new(EntityKind::Toy, "set", FilterOperator::Equals, "Series 1")],
        )?;
        assert_eq!(compiled.predicates, vec!["t.toy_set = ?".to_string()]);
        Ok(())
    }

    proptest! {
        #[test]
        fn operands_carrying_a_semicolon_never_compile(
            prefix in "[a-zA-Z0-9 ]{0,12}",
            suffix in "[a-zA-Z0-9 ]{0,12}",
        ) {
            let operand = format!("{prefix};{suffix}");
            let result = compile(&system_catalog(), &[request("name", "equals", &operand)]);
            prop_assert!(matches!(result, Err(CatalogError::InvalidFilter(_))));
        }

        #[test]
        fn compile_is_deterministic(operands in proptest::collection::vec("[A-Z0-9]{1,8}", 1..6)) {
            let requests: Vec<FilterRequest> = operands
                .iter()
                .enumerate()
                .map(|(index, operand)| {
                    if index % 2 == 0 {
                        request("Region", "equals", operand)
                    } else {
                        request("name", "equals", operand)
                    }
                })
                .collect();
            let first = compile(&system_catalog(), &requests);
            let second = compile(&system_catalog(), &requests);
            prop_assert_eq!(first, second);
        }
    }
}
