//! Stateless AI endpoints: enrichment without indexing.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    email::{Category, Email, RawEmail},
    error::{AppError, AppJsonResult},
    ServerState,
};

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub ok: bool,
    pub category: Category,
    pub suggested_reply: String,
}

/// # POST /api/ai/analyze-email
///
/// Enriches a bare block of text without touching the index.
pub async fn analyze_email(
    State(state): State<ServerState>,
    Json(req): Json<AnalyzeRequest>,
) -> AppJsonResult<AnalyzeResponse> {
    let content = req
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing email content".to_string()))?;

    let email = Email::normalize(RawEmail {
        subject: Some("AI Analysis".to_string()),
        body: Some(content),
        ..Default::default()
    });

    let category = state.enricher.categorize(&email).await;
    let suggested_reply = state.enricher.suggest_reply(&email).await;

    Ok(Json(AnalyzeResponse {
        ok: true,
        category,
        suggested_reply,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiProcessResponse {
    pub category: Category,
    pub suggested_reply: String,
}

/// # POST /api/emails/ai-process
///
/// Enriches a full raw email object without indexing it.
pub async fn ai_process(
    State(state): State<ServerState>,
    Json(raw): Json<RawEmail>,
) -> AppJsonResult<AiProcessResponse> {
    let email = Email::normalize(raw);
    let category = state.enricher.categorize(&email).await;
    let suggested_reply = state.enricher.suggest_reply(&email).await;

    Ok(Json(AiProcessResponse {
        category,
        suggested_reply,
    }))
}
