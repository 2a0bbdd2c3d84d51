use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use fidx_index::{FilterParams, IndexManager, MaintenanceKind, MaintenanceQueue, QueryResult};
use fidx_types::{FileRecord, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::ServerResult;

/// Shared handler state, built once at startup.
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub manager: IndexManager,
    pub queue: MaintenanceQueue,
}

/// Query string of `/api/manage/list`.
#[derive(Debug, Default, Deserialize)]
pub struct ListRequest {
    pub action: Option<String>,
    #[serde(flatten)]
    pub filter: FilterParams,
}

/// One listed record with sensitive metadata removed.
#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub metadata: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub files: Vec<FileEntry>,
    pub directories: Vec<String>,
    pub total_count: usize,
    pub returned_count: usize,
    pub index_last_updated: Option<Timestamp>,
    pub is_indexed_response: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SumResponse {
    pub sum: usize,
    pub index_last_updated: Option<Timestamp>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /api/manage/list`: dispatch on `action`, defaulting to a listing.
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(request): Query<ListRequest>,
) -> ServerResult<Response> {
    let action = request.action.as_deref().unwrap_or("list");

    if let Some(kind) = MaintenanceKind::from_action(action) {
        let handle = state.queue.try_submit(kind)?;
        let body = json!({
            "status": "started",
            "task": kind,
            "taskId": handle.id,
        });
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    match action {
        "index-storage-stats" => Ok(Json(state.manager.storage_stats().await?).into_response()),
        "info" => Ok(Json(state.manager.index_info().await?).into_response()),
        _ => list(&state, &request.filter).await,
    }
}

async fn list(state: &AppState, params: &FilterParams) -> ServerResult<Response> {
    let validated = params.validate(state.manager.config().default_count);
    for sub in &validated.substitutions {
        debug!(
            field = sub.field,
            raw = %sub.raw,
            substituted = %sub.substituted,
            "malformed filter parameter replaced"
        );
    }
    let filter = validated.value;

    let result = state.manager.list(&filter).await?;
    if filter.count_only {
        return Ok(Json(SumResponse {
            sum: result.total_count,
            index_last_updated: result.index_last_updated,
        })
        .into_response());
    }

    let response = shape(result, &state.config.sensitive_metadata_keys)?;
    Ok(Json(response).into_response())
}

fn shape(result: QueryResult, sensitive: &[String]) -> ServerResult<ListResponse> {
    let files = result
        .files
        .into_iter()
        .map(|record| redact(record, sensitive))
        .collect::<ServerResult<Vec<_>>>()?;
    Ok(ListResponse {
        files,
        directories: result.directories,
        total_count: result.total_count,
        returned_count: result.returned_count,
        index_last_updated: result.index_last_updated,
        is_indexed_response: result.is_indexed,
    })
}

/// Serialize `record`'s metadata and drop every sensitive key from it.
pub fn redact(record: FileRecord, sensitive: &[String]) -> ServerResult<FileEntry> {
    let mut metadata = serde_json::to_value(&record.metadata)?;
    if let Value::Object(map) = &mut metadata {
        for key in sensitive {
            map.remove(key);
        }
    }
    Ok(FileEntry {
        name: record.id,
        metadata,
    })
}
