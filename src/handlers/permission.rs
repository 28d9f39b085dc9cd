use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use super::context::{base_uri, negotiate_for, FormatQuery};
use super::guard::authorize_member;
use crate::api::format::{project_uri, PermissionListView};
use crate::api::media::Resource;
use crate::api::response::Representation;
use crate::app::AppState;
use crate::auth::Caller;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    #[serde(default)]
    pub user: String,
}

/// JSON when the request says so, form-encoded otherwise
fn parse_grant(headers: &HeaderMap, body: &Bytes) -> Result<GrantRequest, ApiError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"));
    if is_json {
        serde_json::from_slice(body).map_err(|e| ApiError::invalid_json(format!("Invalid JSON body: {}", e)))
    } else {
        let user = url::form_urlencoded::parse(body)
            .find(|(key, _)| key == "user")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        Ok(GrantRequest { user })
    }
}

/// GET /:project/permissions/
pub async fn get(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<FormatQuery>,
    headers: HeaderMap,
    caller: Caller,
) -> Result<Representation, ApiError> {
    let gate = authorize_member(&state, &caller, &project_id).await?;
    let media = negotiate_for(Resource::PermissionList, query.format.as_deref(), &headers, &state.config)?;

    let view = PermissionListView {
        id: gate.project.id.clone(),
        name: gate.project.display_name().to_string(),
        access: gate.access,
    };
    Representation::negotiated(media, &state.config.api.product, &view, || {
        state.renderer.permission_list(&view)
    })
}

/// POST /:project/permissions/ - grant a user access, then redirect to the project
pub async fn post(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    caller: Caller,
    body: Bytes,
) -> Result<Response, ApiError> {
    authorize_member(&state, &caller, &project_id).await?;

    let grant = parse_grant(&headers, &body)?;
    let user = grant.user.trim();
    if user.is_empty() {
        return Err(ApiError::field_error("user", "This field is required."));
    }
    state.store.grant_permission(&project_id, user).await?;
    info!("Granted '{}' access to project '{}'", user, project_id);

    let location = project_uri(&base_uri(&headers, &state.config), &project_id);
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn grant_accepts_form_and_json() {
        let mut headers = HeaderMap::new();
        let grant = parse_grant(&headers, &Bytes::from_static(b"user=alice&x=1")).unwrap();
        assert_eq!(grant.user, "alice");

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let grant = parse_grant(&headers, &Bytes::from_static(br#"{"user": "bob"}"#)).unwrap();
        assert_eq!(grant.user, "bob");
        assert!(parse_grant(&headers, &Bytes::from_static(b"user=bob")).is_err());
    }
}
