use axum::{
    extract::{Query, State},
    http::HeaderMap,
};

use super::context::{base_uri, negotiate_for, FormatQuery};
use super::guard::may_read;
use crate::api::format::{project_uri, sort_by_last_updated, ProjectListItem};
use crate::api::media::Resource;
use crate::api::response::Representation;
use crate::app::AppState;
use crate::auth::Caller;
use crate::error::ApiError;

/// GET / - every project the caller may read, most recently updated first
pub async fn get(
    State(state): State<AppState>,
    Query(query): Query<FormatQuery>,
    headers: HeaderMap,
    caller: Caller,
) -> Result<Representation, ApiError> {
    let media = negotiate_for(Resource::ProjectList, query.format.as_deref(), &headers, &state.config)?;
    let identity = caller.identity(&state).await?;

    let mut visible: Vec<_> = state
        .store
        .list_projects()
        .await?
        .into_iter()
        .filter(|summary| may_read(&summary.access, identity))
        .collect();
    sort_by_last_updated(&mut visible);

    let base = base_uri(&headers, &state.config);
    let items: Vec<ProjectListItem> = visible
        .iter()
        .map(|summary| ProjectListItem::new(summary, project_uri(&base, &summary.project.id)))
        .collect();

    Representation::negotiated(media, &state.config.api.product, &items, || {
        state.renderer.project_list(&items)
    })
}
