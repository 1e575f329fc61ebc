//! Best-effort fan-out of interesting emails to webhook sinks. Delivery is
//! at-most-once: each sink is attempted independently, failures are logged
//! and never reach the pipeline.

use serde_json::{json, Value};

use crate::{
    email::{Category, EmailDocument},
    server_config::NotifyConfig,
    HttpClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkKind {
    /// Chat-style webhook expecting a `{"text": ...}` summary.
    Slack,
    /// Generic webhook receiving the whole document as `{"email": ...}`.
    Generic,
}

#[derive(Debug, Clone)]
struct Sink {
    name: &'static str,
    url: String,
    kind: SinkKind,
}

impl Sink {
    fn payload(&self, doc: &EmailDocument) -> Value {
        match self.kind {
            SinkKind::Slack => json!({
                "text": format!(
                    "New Interested Email:\nFrom: {}\nSubject: {}\nBody: {}",
                    doc.email.from, doc.email.subject, doc.email.body
                )
            }),
            SinkKind::Generic => json!({ "email": doc }),
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    http_client: HttpClient,
    sinks: Vec<Sink>,
}

impl Notifier {
    pub fn new(http_client: HttpClient, config: &NotifyConfig) -> Self {
        let mut sinks = Vec::new();
        if let Some(url) = config.slack_webhook_url.clone().filter(|u| !u.is_empty()) {
            sinks.push(Sink {
                name: "slack",
                url,
                kind: SinkKind::Slack,
            });
        }
        if let Some(url) = config.webhook_url.clone().filter(|u| !u.is_empty()) {
            sinks.push(Sink {
                name: "webhook",
                url,
                kind: SinkKind::Generic,
            });
        }
        if sinks.is_empty() {
            tracing::info!("No notification sinks configured");
        }
        Notifier { http_client, sinks }
    }

    /// Fires only for `Interested` emails. Returns how many sinks accepted
    /// the notification.
    pub async fn notify_if_interesting(&self, doc: &EmailDocument) -> usize {
        if doc.category != Category::Interested {
            return 0;
        }

        let mut delivered = 0;
        for sink in &self.sinks {
            match self.dispatch(sink, doc).await {
                Ok(()) => {
                    tracing::info!(sink = sink.name, from = %doc.email.from, "Notification sent");
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(sink = sink.name, error = %e, "Notification failed");
                }
            }
        }
        delivered
    }

    async fn dispatch(&self, sink: &Sink, doc: &EmailDocument) -> anyhow::Result<()> {
        self.http_client
            .post(&sink.url)
            .json(&sink.payload(doc))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering::Relaxed},
        Arc,
    };

    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

    use super::*;
    use crate::email::{Email, RawEmail};

    use crate::testing::common::spawn_stub;

    fn doc_with_category(category: Category) -> EmailDocument {
        EmailDocument {
            email: Email::normalize(RawEmail {
                from: Some("a@x.com".to_string()),
                subject: Some("Opportunity".to_string()),
                ..Default::default()
            }),
            category,
            suggested_reply: "Thanks!".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_block_other_sinks() {
        let generic_hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/slack",
                post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route(
                "/generic",
                post(
                    |State(hits): State<Arc<AtomicUsize>>, Json(body): Json<Value>| async move {
                        assert_eq!(body["email"]["from"], "a@x.com");
                        hits.fetch_add(1, Relaxed);
                        StatusCode::OK
                    },
                ),
            )
            .with_state(generic_hits.clone());
        let (base_url, _shutdown) = spawn_stub(router).await;

        let notifier = Notifier::new(
            reqwest::Client::new(),
            &NotifyConfig {
                slack_webhook_url: Some(format!("{base_url}/slack")),
                webhook_url: Some(format!("{base_url}/generic")),
            },
        );

        let delivered = notifier
            .notify_if_interesting(&doc_with_category(Category::Interested))
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(generic_hits.load(Relaxed), 1);
    }

    #[tokio::test]
    async fn test_non_interested_email_is_not_dispatched() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/generic",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Relaxed);
                    StatusCode::OK
                }),
            )
            .with_state(hits.clone());
        let (base_url, _shutdown) = spawn_stub(router).await;

        let notifier = Notifier::new(
            reqwest::Client::new(),
            &NotifyConfig {
                slack_webhook_url: None,
                webhook_url: Some(format!("{base_url}/generic")),
            },
        );

        let delivered = notifier
            .notify_if_interesting(&doc_with_category(Category::Spam))
            .await;

        assert_eq!(delivered, 0);
        assert_eq!(hits.load(Relaxed), 0);
    }

    #[tokio::test]
    async fn test_unreachable_sink_never_raises() {
        // Nothing listens on this port; dispatch must swallow the error.
        let notifier = Notifier::new(
            reqwest::Client::new(),
            &NotifyConfig {
                slack_webhook_url: Some("http://127.0.0.1:1/slack".to_string()),
                webhook_url: None,
            },
        );

        let delivered = notifier
            .notify_if_interesting(&doc_with_category(Category::Interested))
            .await;
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_slack_payload_is_text_summary() {
        let sink = Sink {
            name: "slack",
            url: "http://example".to_string(),
            kind: SinkKind::Slack,
        };
        let payload = sink.payload(&doc_with_category(Category::Interested));
        let text = payload["text"].as_str().unwrap();
        assert!(text.contains("From: a@x.com"));
        assert!(text.contains("Subject: Opportunity"));
    }
}
