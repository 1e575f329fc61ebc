//! Email ingestion, search and reprocessing endpoints.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    email::{Category, RawEmail},
    error::{AppJsonResult, AppResult},
    reprocess,
    search::{SearchHit, SearchParams},
    ServerState,
};

/// # GET /api/init-sync
///
/// Idempotent creation of the search index schema. Safe to call repeatedly
/// and concurrently.
pub async fn init_sync(State(state): State<ServerState>) -> AppJsonResult<Value> {
    state.store.ensure_schema().await?;
    Ok(Json(json!({ "status": "Search index initialized successfully" })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEmailResponse {
    pub ok: bool,
    pub category: Category,
    pub suggested_reply: String,
}

/// # POST /api/emails
///
/// Runs one raw email through the full pipeline and returns the computed
/// enrichment. Unlike the sync path, a persistence failure surfaces here as
/// a 5xx so the caller knows the document was not stored.
pub async fn add_email(
    State(state): State<ServerState>,
    Json(raw): Json<RawEmail>,
) -> AppResult<(StatusCode, Json<AddEmailResponse>)> {
    let outcome = state.pipeline.process(raw).await;
    outcome.index?;

    Ok((
        StatusCode::CREATED,
        Json(AddEmailResponse {
            ok: true,
            category: outcome.doc.category,
            suggested_reply: outcome.doc.suggested_reply,
        }),
    ))
}

/// # GET /api/emails/search
///
/// Structured + full-text search. All filters are optional; none at all
/// returns every indexed document. Hits carry highlight fragments for
/// subject/body where the text query matched.
pub async fn search(
    State(state): State<ServerState>,
    Query(params): Query<SearchParams>,
) -> AppJsonResult<Vec<SearchHit>> {
    let hits = state.store.search(&params).await?;
    Ok(Json(hits))
}

/// # POST /api/emails/reprocess-ai
///
/// Scans the whole index and recomputes enrichment for documents still
/// carrying default category/reply values.
pub async fn reprocess_ai(State(state): State<ServerState>) -> AppJsonResult<Value> {
    let report = reprocess::run(&state.store, &state.enricher).await?;
    Ok(Json(json!({
        "message": format!("Reprocessed {} emails with AI suggestions", report.processed),
        "total": report.total,
        "processed": report.processed,
    })))
}
