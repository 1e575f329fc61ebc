//! The single choke point every email passes through, regardless of origin
//! (mailbox backfill, live mailbox event, or direct API submission):
//! normalize, enrich category, enrich reply, persist, conditionally notify.

use crate::{
    email::{Email, EmailDocument, RawEmail},
    error::AppError,
    notify::Notifier,
    prompt::enrich::EnrichmentClient,
    search::SearchStore,
};

/// Result of one full pipeline pass. The enriched document is always
/// available; the index outcome is kept separate so API callers can surface
/// a persistence failure while the sync path only logs it.
pub struct ProcessOutcome {
    pub doc: EmailDocument,
    pub index: Result<String, AppError>,
    pub notified_sinks: usize,
}

impl ProcessOutcome {
    pub fn doc_id(&self) -> Option<&str> {
        self.index.as_deref().ok()
    }
}

#[derive(Clone)]
pub struct EmailPipeline {
    enricher: EnrichmentClient,
    store: SearchStore,
    notifier: Notifier,
}

impl EmailPipeline {
    pub fn new(enricher: EnrichmentClient, store: SearchStore, notifier: Notifier) -> Self {
        EmailPipeline {
            enricher,
            store,
            notifier,
        }
    }

    /// Runs the full sequence for one email. Never returns an error: the
    /// enrichment stages carry their own fallbacks and an index failure is
    /// captured in the outcome. Sinks are only notified about documents that
    /// were actually stored. Stage results are aggregated into a single log
    /// entry per email.
    pub async fn process(&self, raw: RawEmail) -> ProcessOutcome {
        let email = Email::normalize(raw);

        let category = self.enricher.categorize(&email).await;
        let suggested_reply = self.enricher.suggest_reply(&email).await;

        let doc = EmailDocument {
            email,
            category,
            suggested_reply,
        };

        let index = self.store.index(&doc).await;
        let notified_sinks = match &index {
            Ok(_) => self.notifier.notify_if_interesting(&doc).await,
            Err(_) => 0,
        };

        match &index {
            Ok(id) => {
                tracing::info!(
                    from = %doc.email.from,
                    subject = %doc.email.subject,
                    account = %doc.email.account,
                    category = %doc.category,
                    doc_id = %id,
                    notified_sinks,
                    "Processed email"
                );
            }
            Err(e) => {
                // Sync-path callers drop the email here; there is no retry
                // queue, so the message is lost once this line is emitted.
                tracing::error!(
                    from = %doc.email.from,
                    subject = %doc.email.subject,
                    account = %doc.email.account,
                    category = %doc.category,
                    error = %e,
                    "Email enriched but not indexed"
                );
            }
        }

        ProcessOutcome {
            doc,
            index,
            notified_sinks,
        }
    }
}
