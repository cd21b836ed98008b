//! REST API handlers.
//!
//! Each handler calls the `Emulator` and wraps the outcome in the
//! `{success, data, error}` envelope. Error codes pick the HTTP status.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use spanemu_core::{DatabaseName, ErrorCode, ErrorDetail, InstanceName};
use spanemu_service::{InstanceInfo, ServiceError};
use spanemu_storage::{Mutation, ReadRequest, StorageResult, Value};
use tracing::debug;

use crate::ApiState;
use crate::body::*;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorDetail>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::AlreadyExists => StatusCode::CONFLICT,
        ErrorCode::InvalidArgument | ErrorCode::FailedPrecondition => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: impl Into<ServiceError>) -> Response {
    let detail = error.into().detail();
    debug!(code = %detail.code, error = %detail.message, "request failed");
    (
        status_for(detail.code),
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(detail),
        }),
    )
        .into_response()
}

fn respond<T: Serialize>(result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(data) => ApiResponse::ok(data).into_response(),
        Err(e) => error_response(e),
    }
}

/// Run storage work on the blocking pool; redb transactions block.
async fn blocking<T, F>(work: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .unwrap_or_else(|e| Err(ServiceError::Internal(format!("storage task failed: {e}"))))
}

// ── Instance configs ───────────────────────────────────────────

/// GET /v1/projects/{project}/instanceConfigs
pub async fn list_instance_configs(
    State(state): State<ApiState>,
    Path(project): Path<String>,
) -> impl IntoResponse {
    let configs: Vec<InstanceConfigView> = state
        .emulator
        .list_instance_configs(&project)
        .iter()
        .map(|c| InstanceConfigView::new(&project, c))
        .collect();
    ApiResponse::ok(configs)
}

/// GET /v1/projects/{project}/instanceConfigs/{config}
pub async fn get_instance_config(
    State(state): State<ApiState>,
    Path((project, config)): Path<(String, String)>,
) -> impl IntoResponse {
    respond(
        state
            .emulator
            .get_instance_config(&project, &config)
            .map(|c| InstanceConfigView::new(&project, &c)),
    )
}

// ── Instances ──────────────────────────────────────────────────

/// GET /v1/projects/{project}/instances
pub async fn list_instances(
    State(state): State<ApiState>,
    Path(project): Path<String>,
) -> impl IntoResponse {
    ApiResponse::ok(state.emulator.list_instances(&project))
}

/// POST /v1/projects/{project}/instances
pub async fn create_instance(
    State(state): State<ApiState>,
    Path(project): Path<String>,
    Json(req): Json<CreateInstanceRequest>,
) -> impl IntoResponse {
    let mut info = InstanceInfo::new(InstanceName::new(project, req.instance_id), req.config);
    if let Some(display_name) = req.display_name {
        info.display_name = display_name;
    }
    if let Some(node_count) = req.node_count {
        info.node_count = node_count;
    }
    info.labels = req.labels;

    match state.emulator.create_instance(info) {
        Ok(op) => (StatusCode::CREATED, ApiResponse::ok(OperationView::from(&op))).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/projects/{project}/instances/{instance}
pub async fn get_instance(
    State(state): State<ApiState>,
    Path((project, instance)): Path<(String, String)>,
) -> impl IntoResponse {
    respond(state.emulator.get_instance(&InstanceName::new(project, instance)))
}

/// PATCH /v1/projects/{project}/instances/{instance}
pub async fn update_instance(
    State(state): State<ApiState>,
    Path((project, instance)): Path<(String, String)>,
    Json(req): Json<UpdateInstanceRequest>,
) -> impl IntoResponse {
    let id = InstanceName::new(project, instance);
    let current = match state.emulator.get_instance(&id) {
        Ok(current) => current,
        Err(e) => return error_response(e),
    };
    let mask = req.mask();
    let info = InstanceInfo {
        id,
        config: req.config.unwrap_or(current.config),
        display_name: req.display_name.unwrap_or(current.display_name),
        node_count: req.node_count.unwrap_or(current.node_count),
        labels: req.labels.unwrap_or(current.labels),
    };
    respond(
        state
            .emulator
            .update_instance(info, &mask)
            .map(|op| OperationView::from(&op)),
    )
}

/// DELETE /v1/projects/{project}/instances/{instance}
pub async fn delete_instance(
    State(state): State<ApiState>,
    Path((project, instance)): Path<(String, String)>,
) -> impl IntoResponse {
    respond(
        state
            .emulator
            .delete_instance(&InstanceName::new(project, instance))
            .map(|()| "deleted"),
    )
}

// ── Operations ─────────────────────────────────────────────────

/// GET /v1/projects/{project}/instances/{instance}/operations
pub async fn list_instance_operations(
    State(state): State<ApiState>,
    Path((project, instance)): Path<(String, String)>,
) -> impl IntoResponse {
    let parent = InstanceName::new(project, instance).to_string();
    ApiResponse::ok(state.emulator.list_operations(&parent))
}

/// GET /v1/projects/{project}/instances/{instance}/operations/{operation}
pub async fn get_instance_operation(
    State(state): State<ApiState>,
    Path((project, instance, operation)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let name = format!("{}/operations/{operation}", InstanceName::new(project, instance));
    respond(state.emulator.get_operation(&name))
}

/// GET /v1/projects/{project}/instances/{instance}/databases/{database}/operations/{operation}
pub async fn get_database_operation(
    State(state): State<ApiState>,
    Path((project, instance, database, operation)): Path<(String, String, String, String)>,
) -> impl IntoResponse {
    let name = format!(
        "{}/operations/{operation}",
        DatabaseName::new(project, instance, database)
    );
    respond(state.emulator.get_operation(&name))
}

// ── Databases ──────────────────────────────────────────────────

/// GET /v1/projects/{project}/instances/{instance}/databases
pub async fn list_databases(
    State(state): State<ApiState>,
    Path((project, instance)): Path<(String, String)>,
) -> impl IntoResponse {
    respond(state.emulator.list_databases(&InstanceName::new(project, instance)))
}

/// POST /v1/projects/{project}/instances/{instance}/databases
pub async fn create_database(
    State(state): State<ApiState>,
    Path((project, instance)): Path<(String, String)>,
    Json(req): Json<CreateDatabaseRequest>,
) -> impl IntoResponse {
    let id = DatabaseName::new(project, instance, req.database_id);
    match state.emulator.create_database(id, &req.extra_statements) {
        Ok(op) => (StatusCode::CREATED, ApiResponse::ok(OperationView::from(&op))).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/projects/{project}/instances/{instance}/databases/{database}
pub async fn get_database(
    State(state): State<ApiState>,
    Path((project, instance, database)): Path<(String, String, String)>,
) -> impl IntoResponse {
    respond(
        state
            .emulator
            .get_database(&DatabaseName::new(project, instance, database)),
    )
}

/// DELETE /v1/projects/{project}/instances/{instance}/databases/{database}
pub async fn drop_database(
    State(state): State<ApiState>,
    Path((project, instance, database)): Path<(String, String, String)>,
) -> impl IntoResponse {
    respond(
        state
            .emulator
            .drop_database(&DatabaseName::new(project, instance, database))
            .map(|()| "dropped"),
    )
}

/// GET /v1/projects/{project}/instances/{instance}/databases/{database}/ddl
pub async fn get_database_ddl(
    State(state): State<ApiState>,
    Path((project, instance, database)): Path<(String, String, String)>,
) -> impl IntoResponse {
    respond(
        state
            .emulator
            .get_database_ddl(&DatabaseName::new(project, instance, database))
            .map(|statements| DdlResponse { statements }),
    )
}

/// PATCH /v1/projects/{project}/instances/{instance}/databases/{database}/ddl
pub async fn update_database_ddl(
    State(state): State<ApiState>,
    Path((project, instance, database)): Path<(String, String, String)>,
    Json(req): Json<UpdateDdlRequest>,
) -> impl IntoResponse {
    respond(
        state
            .emulator
            .update_database_ddl(&DatabaseName::new(project, instance, database), &req.statements)
            .map(|op| OperationView::from(&op)),
    )
}

// ── Data ───────────────────────────────────────────────────────

/// POST /v1/projects/{project}/instances/{instance}/databases/{database}/read
pub async fn read(
    State(state): State<ApiState>,
    Path((project, instance, database)): Path<(String, String, String)>,
    Json(req): Json<ReadBody>,
) -> impl IntoResponse {
    let client = match state
        .emulator
        .database_client(&DatabaseName::new(project, instance, database))
    {
        Ok(client) => client,
        Err(e) => return error_response(e),
    };
    let key_set = match req.key_set.to_key_set() {
        Ok(key_set) => key_set,
        Err(e) => return error_response(e),
    };
    let mut request = ReadRequest::new(req.table, key_set, req.columns);
    if let Some(index) = req.index {
        request = request.using_index(index);
    }
    if let Some(limit) = req.limit {
        request = request.with_limit(limit);
    }

    respond(
        blocking(move || {
            let stream = client.execute(&request)?;
            let columns = stream.columns().to_vec();
            let rows = stream
                .map(|row| row.map(|row| row.values().iter().map(Value::to_json).collect()))
                .collect::<StorageResult<Vec<Vec<serde_json::Value>>>>()?;
            Ok(ReadResponse { columns, rows })
        })
        .await,
    )
}

/// POST /v1/projects/{project}/instances/{instance}/databases/{database}/commit
pub async fn commit(
    State(state): State<ApiState>,
    Path((project, instance, database)): Path<(String, String, String)>,
    Json(req): Json<CommitBody>,
) -> impl IntoResponse {
    let client = match state
        .emulator
        .database_client(&DatabaseName::new(project, instance, database))
    {
        Ok(client) => client,
        Err(e) => return error_response(e),
    };
    let mutations = match req
        .mutations
        .iter()
        .map(MutationBody::to_mutation)
        .collect::<StorageResult<Vec<Mutation>>>()
    {
        Ok(mutations) => mutations,
        Err(e) => return error_response(e),
    };
    respond(
        blocking(move || {
            client.write(&mutations)?;
            Ok(serde_json::json!({ "mutations": mutations.len() }))
        })
        .await,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use spanemu_core::SequentialNames;
    use spanemu_core::config::OperationMode;
    use spanemu_service::Emulator;
    use std::sync::Arc;

    fn test_state() -> ApiState {
        ApiState {
            emulator: Emulator::with_names(OperationMode::Inline, Arc::new(SequentialNames::new())),
        }
    }

    fn create_request(id: &str) -> CreateInstanceRequest {
        CreateInstanceRequest {
            instance_id: id.to_string(),
            config: "regional-europe-west1".to_string(),
            display_name: Some("Test Instance".to_string()),
            node_count: Some(1),
            labels: Default::default(),
        }
    }

    #[test]
    fn error_codes_map_to_statuses() {
        assert_eq!(status_for(ErrorCode::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorCode::AlreadyExists), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorCode::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorCode::FailedPrecondition), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorCode::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn list_instance_configs_returns_catalog() {
        let resp = list_instance_configs(State(test_state()), Path("test-project".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_config_is_404() {
        let resp = get_instance_config(
            State(test_state()),
            Path(("test-project".to_string(), "norway".to_string())),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_then_duplicate_instance() {
        let state = test_state();
        let resp = create_instance(
            State(state.clone()),
            Path("test-project".to_string()),
            Json(create_request("test-instance")),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = create_instance(
            State(state),
            Path("test-project".to_string()),
            Json(create_request("test-instance")),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn missing_instance_is_404() {
        let resp = get_instance(
            State(test_state()),
            Path(("test-project".to_string(), "nope".to_string())),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_without_fields_is_400() {
        let state = test_state();
        create_instance(
            State(state.clone()),
            Path("test-project".to_string()),
            Json(create_request("test-instance")),
        )
        .await;
        let resp = update_instance(
            State(state),
            Path(("test-project".to_string(), "test-instance".to_string())),
            Json(UpdateInstanceRequest::default()),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
