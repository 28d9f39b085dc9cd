use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{info, warn};

use super::context::{check_label, negotiate_for, FormatQuery};
use super::fields::{build_record, build_update};
use super::guard::{authorize_create_or_write, authorize_read, authorize_write};
use crate::api::format::RecordView;
use crate::api::media::Resource;
use crate::api::response::{status_only, Representation};
use crate::app::AppState;
use crate::auth::Caller;
use crate::database::models::StoredRecord;
use crate::error::ApiError;

const DUPLICATE: &str = "Conflict/Duplicate";

/// The single row stored under (project, label)
async fn find_one(state: &AppState, project: &str, label: &str) -> Result<Option<StoredRecord>, ApiError> {
    let mut rows = state.store.find_records(project, label).await?;
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.pop()),
        n => {
            warn!("{} rows stored for record {}/{}", n, project, label);
            Err(ApiError::conflict(DUPLICATE))
        }
    }
}

fn not_found(project: &str, label: &str) -> ApiError {
    ApiError::not_found(format!("Record '{}' not found in project '{}'", label, project))
}

pub(crate) fn parse_json(body: &Bytes) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::invalid_json(format!("Invalid JSON body: {}", e)))
}

/// GET /:project/:label/
pub async fn get(
    State(state): State<AppState>,
    Path((project, label)): Path<(String, String)>,
    Query(query): Query<FormatQuery>,
    headers: HeaderMap,
    caller: Caller,
) -> Result<Representation, ApiError> {
    check_label(&label)?;
    authorize_read(&state, &caller, &project).await?;

    let stored = find_one(&state, &project, &label)
        .await?
        .ok_or_else(|| not_found(&project, &label))?;

    let media = negotiate_for(Resource::Record, query.format.as_deref(), &headers, &state.config)?;
    let view = RecordView::new(&stored, media.version());
    Representation::negotiated(media, &state.config.api.product, &view, || state.renderer.record(&view))
}

/// PUT /:project/:label/
///
/// Creates the record (and its project, when unknown) or updates the
/// reason, outcome and tags of an existing one.
pub async fn put(
    State(state): State<AppState>,
    Path((project, label)): Path<(String, String)>,
    caller: Caller,
    body: Bytes,
) -> Result<Response, ApiError> {
    check_label(&label)?;
    let gate = authorize_create_or_write(&state, &caller, &project).await?;
    let payload = parse_json(&body)?;

    if gate.is_some() && find_one(&state, &project, &label).await?.is_some() {
        let update = build_update(&payload)?;
        state.store.update_record(&project, &label, &update).await?;
        info!("Updated record {}/{}", project, label);
        return Ok(status_only(StatusCode::OK, ""));
    }

    let record = build_record(&payload, &label)?;
    let creator = caller.identity(&state).await?.username().to_string();
    let (_, created) = state.store.create_record(&project, &creator, &record).await?;
    info!(
        "Created record {}/{} for '{}'{}",
        project,
        label,
        creator,
        if created.is_new() { " in a new project" } else { "" }
    );
    Ok(status_only(StatusCode::CREATED, "Created"))
}

/// DELETE /:project/:label/
pub async fn delete(
    State(state): State<AppState>,
    Path((project, label)): Path<(String, String)>,
    caller: Caller,
) -> Result<impl IntoResponse, ApiError> {
    check_label(&label)?;
    authorize_write(&state, &caller, &project).await?;

    if find_one(&state, &project, &label).await?.is_none() {
        return Err(not_found(&project, &label));
    }
    state.store.delete_record(&project, &label).await?;
    info!("Deleted record {}/{}", project, label);
    Ok(StatusCode::NO_CONTENT)
}
