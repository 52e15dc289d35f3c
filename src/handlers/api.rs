use crate::{extract, hierarchy, models::ExtractedLink, models::PageDocument, AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct LinksQuery {
    #[serde(default)]
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinksResponse {
    report_id: Option<String>,
    links: Vec<ExtractedLink>,
}

#[derive(Serialize)]
pub struct PageEntry {
    id: String,
    #[serde(flatten)]
    page: PageDocument,
}

/// GET /api/links?url=
pub async fn links(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LinksQuery>,
) -> Json<LinksResponse> {
    let links = state.extractor.extract_cached(&query.url).await;
    Json(LinksResponse {
        report_id: extract::report_id(&query.url),
        links,
    })
}

/// GET /api/dashboards
pub async fn dashboards(State(state): State<Arc<AppState>>) -> Response {
    match hierarchy::list_dashboards(state.store.as_ref()).await {
        Ok(ids) => Json(ids).into_response(),
        Err(e) => {
            tracing::error!("Failed to list dashboards: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list dashboards").into_response()
        }
    }
}

/// GET /api/dashboards/:uid/pages
pub async fn pages(State(state): State<Arc<AppState>>, Path(uid): Path<String>) -> Response {
    match hierarchy::list_pages(state.store.as_ref(), &uid).await {
        Ok(pages) => Json(
            pages
                .into_iter()
                .map(|(id, page)| PageEntry { id, page })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => {
            tracing::error!("Failed to list pages of '{}': {:?}", uid, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list pages").into_response()
        }
    }
}
