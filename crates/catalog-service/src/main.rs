use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use catalog_api::{CatalogApi, MigrateResult, SnapshotExport, API_CONTRACT_VERSION};
use catalog_core::{
    BackupSnapshot, CatalogError, CustomField, CustomFieldRequest, Entity, EntityKind,
    FilterRequest, ImportResult,
};
use catalog_store_sqlite::{
    BoardGameBoxTable, BoardGameTable, EntityTable, SchemaStatus, SystemTable, ToyTable,
    VideoGameBoxTable, VideoGameTable,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const LOG_ENV: &str = "CATALOG_LOG";

#[derive(Debug, Clone)]
struct ServiceState {
    api: CatalogApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

/// Error body; `kind` and `messages` mirror the catalog error that caused it.
#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
    kind: &'static str,
    messages: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MigrateRequest {
    dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CustomFieldQuery {
    #[serde(rename = "entityKey")]
    entity_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct GetQuery {
    #[serde(default)]
    include_deleted: bool,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ImportRequest {
    snapshot: BackupSnapshot,
    #[serde(default)]
    strict: bool,
}

#[derive(Debug, Parser)]
#[command(name = "catalog-service")]
#[command(about = "Local HTTP service for the collection catalog")]
struct Args {
    #[arg(long, env = "CATALOG_DB", default_value = "./catalog.sqlite3")]
    db: PathBuf,
    #[arg(long, env = "CATALOG_BIND", default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        let Some(catalog) = err.downcast_ref::<CatalogError>() else {
            tracing::error!(error = ?err, "request failed outside the catalog");
            return Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                service_contract_version: SERVICE_CONTRACT_VERSION,
                error: format!("{err:#}"),
                kind: "internal",
                messages: Vec::new(),
            };
        };

        let status = match catalog {
            CatalogError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::InternalCatastrophe(_) | CatalogError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CatalogError::InputValidation(_)
            | CatalogError::MalformedEntity(_)
            | CatalogError::FailedDbValidation(_)
            | CatalogError::InvalidFilter(_)
            | CatalogError::BackupImport(_) => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            tracing::error!(kind = catalog.kind(), error = %catalog, "catalog request failed");
        }
        Self {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: catalog.to_string(),
            kind: catalog.kind(),
            messages: catalog.messages(),
        }
    }
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        Self::from(anyhow::Error::new(err))
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

/// Mount the create, search, read, update and delete routes of one kind.
fn entity_routes<K: EntityTable>(
    router: Router<ServiceState>,
    collection: &str,
) -> Router<ServiceState> {
    router
        .route(&format!("/v1/{collection}"), post(create_entity::<K>))
        .route(&format!("/v1/{collection}/search"), post(search_entities::<K>))
        .route(
            &format!("/v1/{collection}/:id"),
            get(get_entity::<K>).put(update_entity::<K>).delete(delete_entity::<K>),
        )
}

fn app(state: ServiceState) -> Router {
    let router = Router::new()
        .route("/v1/health", get(health))
        .route("/v1/db/schema-version", post(db_schema_version))
        .route("/v1/db/migrate", post(db_migrate))
        .route("/v1/custom-fields", get(custom_fields_list).post(custom_field_declare))
        .route("/v1/custom-fields/:entity_key/:name", get(custom_field_show))
        .route("/v1/backup/export", post(backup_export))
        .route("/v1/backup/import", post(backup_import));

    let router = entity_routes::<SystemTable>(router, "systems");
    let router = entity_routes::<ToyTable>(router, "toys");
    let router = entity_routes::<VideoGameTable>(router, "video-games");
    let router = entity_routes::<VideoGameBoxTable>(router, "video-game-boxes");
    let router = entity_routes::<BoardGameTable>(router, "board-games");
    let router = entity_routes::<BoardGameBoxTable>(router, "board-game-boxes");
    router.with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let state = ServiceState { api: CatalogApi::new(args.db.clone()) };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(bind = %args.bind, db = %args.db.display(), "catalog service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok" }))
}

async fn db_schema_version(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<SchemaStatus>>, ServiceError> {
    let status = state.api.schema_status()?;
    Ok(Json(envelope(status)))
}

async fn db_migrate(
    State(state): State<ServiceState>,
    Json(request): Json<MigrateRequest>,
) -> Result<Json<ServiceEnvelope<MigrateResult>>, ServiceError> {
    let result = state.api.migrate(request.dry_run)?;
    Ok(Json(envelope(result)))
}

fn parse_kind(raw: &str) -> Result<EntityKind, ServiceError> {
    EntityKind::parse(raw).ok_or_else(|| {
        ServiceError::from(CatalogError::InputValidation(format!("unknown entity key '{raw}'")))
    })
}

async fn custom_fields_list(
    State(state): State<ServiceState>,
    Query(query): Query<CustomFieldQuery>,
) -> Result<Json<ServiceEnvelope<Vec<CustomField>>>, ServiceError> {
    let kind = query.entity_key.as_deref().map(parse_kind).transpose()?;
    let fields = state.api.list_custom_fields(kind)?;
    Ok(Json(envelope(fields)))
}

async fn custom_field_declare(
    State(state): State<ServiceState>,
    Json(request): Json<CustomFieldRequest>,
) -> Result<Json<ServiceEnvelope<CustomField>>, ServiceError> {
    let field = state.api.declare_custom_field(&request)?;
    Ok(Json(envelope(field)))
}

async fn custom_field_show(
    State(state): State<ServiceState>,
    Path((entity_key, name)): Path<(String, String)>,
) -> Result<Json<ServiceEnvelope<CustomField>>, ServiceError> {
    let field = state.api.lookup_custom_field(parse_kind(&entity_key)?, &name)?;
    Ok(Json(envelope(field)))
}

async fn create_entity<K: EntityTable>(
    State(state): State<ServiceState>,
    Json(entity): Json<Entity<K::Data>>,
) -> Result<Json<ServiceEnvelope<Entity<K::Data>>>, ServiceError> {
    let created = state.api.create::<K>(&entity)?;
    Ok(Json(envelope(created)))
}

async fn search_entities<K: EntityTable>(
    State(state): State<ServiceState>,
    Json(filters): Json<Vec<FilterRequest>>,
) -> Result<Json<ServiceEnvelope<Vec<Entity<K::Data>>>>, ServiceError> {
    let found = state.api.search::<K>(&filters)?;
    Ok(Json(envelope(found)))
}

async fn get_entity<K: EntityTable>(
    State(state): State<ServiceState>,
    Path(id): Path<i64>,
    Query(query): Query<GetQuery>,
) -> Result<Json<ServiceEnvelope<Entity<K::Data>>>, ServiceError> {
    let entity = if query.deleted {
        state.api.get_deleted::<K>(id)?
    } else if query.include_deleted {
        state.api.get_include_deleted::<K>(id)?
    } else {
        state.api.get::<K>(id)?
    };
    Ok(Json(envelope(entity)))
}

async fn update_entity<K: EntityTable>(
    State(state): State<ServiceState>,
    Path(id): Path<i64>,
    Json(mut entity): Json<Entity<K::Data>>,
) -> Result<Json<ServiceEnvelope<Entity<K::Data>>>, ServiceError> {
    entity.id = Some(id);
    let updated = state.api.update::<K>(&entity)?;
    Ok(Json(envelope(updated)))
}

async fn delete_entity<K: EntityTable>(
    State(state): State<ServiceState>,
    Path(id): Path<i64>,
) -> Result<Json<ServiceEnvelope<Entity<K::Data>>>, ServiceError> {
    let deleted = state.api.delete::<K>(id)?;
    Ok(Json(envelope(deleted)))
}

async fn backup_export(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<SnapshotExport>>, ServiceError> {
    let export = state.api.export_snapshot()?;
    Ok(Json(envelope(export)))
}

async fn backup_import(
    State(state): State<ServiceState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ServiceEnvelope<ImportResult>>, ServiceError> {
    let result = state.api.import_snapshot(&request.snapshot, request.strict)?;
    Ok(Json(envelope(result)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn unique_temp_db_path() -> PathBuf {
        std::env::temp_dir().join(format!("catalog-service-{}.sqlite3", ulid::Ulid::new()))
    }

    async fn response_json(response: Response) -> Value {
        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        let body = match String::from_utf8(bytes.to_vec()) {
            Ok(body) => body,
            Err(err) => panic!("response body is not UTF-8: {err}"),
        };
        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => panic!("response body is not JSON: {err}; body={body}"),
        }
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().uri(uri).method(method);
        let request = match body {
            Some(payload) => builder
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap_or_else(|err| panic!("failed to build {method} {uri}: {err}"));

        match router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(err) => panic!("{method} {uri} failed: {err}"),
        }
    }

    fn data_i64(value: &Value, pointer: &str) -> i64 {
        value
            .pointer(pointer)
            .and_then(Value::as_i64)
            .unwrap_or_else(|| panic!("missing integer at `{pointer}` in response: {value}"))
    }

    // Test IDs: TSVC-001
    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let router = app(ServiceState { api: CatalogApi::new(unique_temp_db_path()) });

        let response = call(&router, "GET", "/v1/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let value = response_json(response).await;
        assert_eq!(
            value.get("service_contract_version").and_then(Value::as_str),
            Some(SERVICE_CONTRACT_VERSION)
        );
        assert_eq!(value.pointer("/data/status").and_then(Value::as_str), Some("ok"));
    }

    // Test IDs: TSVC-002
    #[tokio::test]
    async fn service_entity_flow_round_trip() {
        let db_path = unique_temp_db_path();
        let router = app(ServiceState { api: CatalogApi::new(db_path.clone()) });

        let migrated =
            call(&router, "POST", "/v1/db/migrate", Some(json!({"dry_run": false}))).await;
        assert_eq!(migrated.status(), StatusCode::OK);

        let declared = call(
            &router,
            "POST",
            "/v1/custom-fields",
            Some(json!({"name": "Region", "type": "text", "entityKey": "system"})),
        )
        .await;
        assert_eq!(declared.status(), StatusCode::OK);
        let field_id = data_i64(&response_json(declared).await, "/data/id");

        let created = call(
            &router,
            "POST",
            "/v1/systems",
            Some(json!({
                "name": "Mega Drive",
                "generation": 4,
                "customFieldValues": [
                    {
                        "customFieldId": field_id,
                        "customFieldName": "Region",
                        "customFieldType": "text",
                        "value": "PAL"
                    }
                ]
            })),
        )
        .await;
        assert_eq!(created.status(), StatusCode::OK);
        let id = data_i64(&response_json(created).await, "/data/id");

        let found = call(
            &router,
            "POST",
            "/v1/systems/search",
            Some(json!([{"field": "Region", "operator": "equals", "operand": "PAL"}])),
        )
        .await;
        assert_eq!(found.status(), StatusCode::OK);
        let found = response_json(found).await;
        assert_eq!(found.pointer("/data").and_then(Value::as_array).map(Vec::len), Some(1));
        assert_eq!(data_i64(&found, "/data/0/id"), id);

        let updated = call(
            &router,
            "PUT",
            &format!("/v1/systems/{id}"),
            Some(json!({"name": "Genesis", "generation": 4, "handheld": false})),
        )
        .await;
        assert_eq!(updated.status(), StatusCode::OK);
        let updated = response_json(updated).await;
        assert_eq!(updated.pointer("/data/name").and_then(Value::as_str), Some("Genesis"));
        assert_eq!(
            updated.pointer("/data/customFieldValues/0/value").and_then(Value::as_str),
            Some("PAL")
        );

        let deleted = call(&router, "DELETE", &format!("/v1/systems/{id}"), None).await;
        assert_eq!(deleted.status(), StatusCode::OK);
        let deleted = response_json(deleted).await;
        assert!(deleted.pointer("/data/deletedAt").and_then(Value::as_str).is_some());

        let missing = call(&router, "GET", &format!("/v1/systems/{id}"), None).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let missing = response_json(missing).await;
        assert_eq!(missing.get("kind").and_then(Value::as_str), Some("resource_not_found"));

        let kept =
            call(&router, "GET", &format!("/v1/systems/{id}?include_deleted=true"), None).await;
        assert_eq!(kept.status(), StatusCode::OK);
        let tombstone = call(&router, "GET", &format!("/v1/systems/{id}?deleted=true"), None).await;
        assert_eq!(tombstone.status(), StatusCode::OK);

        let _ = std::fs::remove_file(&db_path);
    }

    // Test IDs: TSVC-003
    #[tokio::test]
    async fn invalid_filters_are_rejected_with_every_message() {
        let db_path = unique_temp_db_path();
        let router = app(ServiceState { api: CatalogApi::new(db_path.clone()) });

        let response = call(
            &router,
            "POST",
            "/v1/toys/search",
            Some(json!([
                {"field": "name", "operator": "equals", "operand": "x; DROP TABLE toy"},
                {"field": "colour", "operator": "equals", "operand": "red"}
            ])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let value = response_json(response).await;
        assert_eq!(value.get("kind").and_then(Value::as_str), Some("invalid_filter"));
        assert_eq!(value.get("messages").and_then(Value::as_array).map(Vec::len), Some(2));

        let _ = std::fs::remove_file(&db_path);
    }

    // Test IDs: TSVC-004
    #[tokio::test]
    async fn backup_export_imports_into_another_catalog() {
        let source_path = unique_temp_db_path();
        let target_path = unique_temp_db_path();
        let source = app(ServiceState { api: CatalogApi::new(source_path.clone()) });
        let target = app(ServiceState { api: CatalogApi::new(target_path.clone()) });

        let created = call(
            &source,
            "POST",
            "/v1/board-games",
            Some(json!({"title": "Carcassonne"})),
        )
        .await;
        assert_eq!(created.status(), StatusCode::OK);

        let exported = call(&source, "POST", "/v1/backup/export", None).await;
        assert_eq!(exported.status(), StatusCode::OK);
        let exported = response_json(exported).await;
        let snapshot = exported
            .pointer("/data/snapshot")
            .cloned()
            .unwrap_or_else(|| panic!("missing data.snapshot in response: {exported}"));

        let imported = call(
            &target,
            "POST",
            "/v1/backup/import",
            Some(json!({"snapshot": snapshot, "strict": true})),
        )
        .await;
        assert_eq!(imported.status(), StatusCode::OK);
        let imported = response_json(imported).await;
        assert_eq!(data_i64(&imported, "/data/boardGames/createdCount"), 1);

        let found = call(
            &target,
            "POST",
            "/v1/board-games/search",
            Some(json!([{"field": "title", "operator": "equals", "operand": "Carcassonne"}])),
        )
        .await;
        let found = response_json(found).await;
        assert_eq!(found.pointer("/data").and_then(Value::as_array).map(Vec::len), Some(1));

        let _ = std::fs::remove_file(&source_path);
        let _ = std::fs::remove_file(&target_path);
    }

    // Test IDs: TSVC-005
    #[tokio::test]
    async fn unknown_entity_keys_are_bad_requests() {
        let db_path = unique_temp_db_path();
        let router = app(ServiceState { api: CatalogApi::new(db_path.clone()) });

        let listed = call(&router, "GET", "/v1/custom-fields?entityKey=spaceship", None).await;
        assert_eq!(listed.status(), StatusCode::BAD_REQUEST);
        let value = response_json(listed).await;
        assert_eq!(value.get("kind").and_then(Value::as_str), Some("input_validation"));

        let missing = call(&router, "GET", "/v1/custom-fields/toy/Colour", None).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let _ = std::fs::remove_file(&db_path);
    }
}
