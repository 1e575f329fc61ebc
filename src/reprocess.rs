//! Backfill-repair job: scans every indexed document and recomputes the
//! enrichment for those still carrying default values.

use serde::Serialize;
use serde_json::json;

use crate::{error::AppResult, prompt::enrich::EnrichmentClient, search::SearchStore};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReprocessReport {
    pub total: usize,
    pub processed: usize,
}

/// Walks the whole index (scroll cursor, not a single bounded page) and
/// patches category/suggestedReply on documents lacking valid enrichment.
/// Safe to repeat: documents already holding a non-default category and a
/// real reply are left untouched. A failed update is logged and skipped so
/// one bad document never aborts the run.
pub async fn run(store: &SearchStore, enricher: &EnrichmentClient) -> AppResult<ReprocessReport> {
    let hits = store.scan_all().await?;
    let total = hits.len();
    let mut processed = 0;

    for hit in hits {
        if !hit.doc.needs_enrichment() {
            continue;
        }

        let category = enricher.categorize(&hit.doc.email).await;
        let suggested_reply = enricher.suggest_reply(&hit.doc.email).await;

        match store
            .update(
                &hit.id,
                json!({
                    "category": category,
                    "suggestedReply": suggested_reply
                }),
            )
            .await
        {
            Ok(()) => processed += 1,
            Err(e) => {
                tracing::warn!(doc_id = %hit.id, error = %e, "Reprocess update failed, skipping");
            }
        }
    }

    tracing::info!(total, processed, "Reprocess run finished");
    Ok(ReprocessReport { total, processed })
}
