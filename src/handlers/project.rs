use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use serde_json::Value;
use tracing::info;

use super::context::{base_uri, negotiate_for, ProjectQuery};
use super::guard::{authorize_create_or_write, authorize_read, authorize_write};
use super::record::parse_json;
use crate::api::format::{record_uri, ProjectView};
use crate::api::media::Resource;
use crate::api::response::{status_only, Representation};
use crate::app::AppState;
use crate::auth::Caller;
use crate::error::ApiError;

/// GET /:project/
pub async fn get(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<ProjectQuery>,
    headers: HeaderMap,
    caller: Caller,
) -> Result<Representation, ApiError> {
    let gate = authorize_read(&state, &caller, &project_id).await?;
    let media = negotiate_for(Resource::Project, query.format.as_deref(), &headers, &state.config)?;

    let tag_filter = query.tags.filter(|t| !t.is_empty());
    let base = base_uri(&headers, &state.config);
    let records = state
        .store
        .record_labels(&project_id, tag_filter.as_deref())
        .await?
        .iter()
        .map(|label| record_uri(&base, &project_id, label))
        .collect();

    let identity = caller.identity(&state).await?;
    let view = ProjectView {
        id: gate.project.id.clone(),
        name: gate.project.display_name().to_string(),
        description: gate.project.description.clone(),
        records,
        tags: tag_filter,
        user: identity.username().to_string(),
        access: (!identity.is_anonymous()).then(|| gate.access.clone()),
    };
    Representation::negotiated(media, &state.config.api.product, &view, || state.renderer.project(&view))
}

fn optional_text(payload: &Value, key: &str) -> Result<Option<String>, ApiError> {
    match payload.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ApiError::field_error(key, "must be a string")),
    }
}

/// PUT /:project/
pub async fn put(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    caller: Caller,
    body: Bytes,
) -> Result<Response, ApiError> {
    let existing = authorize_create_or_write(&state, &caller, &project_id).await?;

    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        parse_json(&body)?
    };
    if !payload.is_object() {
        return Err(ApiError::bad_request("request body must be a JSON object"));
    }
    let name = optional_text(&payload, "name")?;
    let description = optional_text(&payload, "description")?;

    let created = match existing {
        Some(_) => false,
        None => {
            let creator = caller.identity(&state).await?.username().to_string();
            let (_, created) = state.store.get_or_create_project(&project_id, &creator).await?;
            if !created.is_new() {
                // another caller created it after the first check
                authorize_write(&state, &caller, &project_id).await?;
            }
            created.is_new()
        }
    };
    if name.is_some() || description.is_some() {
        state.store.update_project(&project_id, name, description).await?;
        info!("Updated project '{}'", project_id);
    }

    if created {
        Ok(status_only(StatusCode::CREATED, ""))
    } else {
        Ok(status_only(StatusCode::OK, ""))
    }
}
