//! Account sync orchestration: one independent tokio task per configured
//! account. A crash or connection loss in one account's task never delays or
//! aborts another; all tasks share a single cancellation token for shutdown.
//!
//! Each task splits into a [`MailSource`] subscription producing raw messages
//! and an emit loop consuming them through the pipeline, connected by a
//! capacity-1 channel so enrichment backpressure reaches the mailbox fetch.

pub mod imap;

use std::future::Future;

use chrono::{Duration, Utc};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    email::RawEmail, error::SyncError, pipeline::EmailPipeline, server_config::AccountConfig,
};

/// One account's mailbox subscription: emits messages into `tx` until the
/// mailbox feed ends or the token fires. Implemented by the IMAP engine.
pub trait MailSource: Send + Sized + 'static {
    /// Account identifier used in log entries.
    fn name(&self) -> String;

    fn subscribe(
        self,
        tx: mpsc::Sender<RawEmail>,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;
}

pub struct SyncManager {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl SyncManager {
    /// Spawns a sync task per account: backfill since `now - lookback_days`,
    /// then live IDLE subscription until cancelled.
    pub fn start(
        accounts: Vec<AccountConfig>,
        pipeline: EmailPipeline,
        lookback_days: i64,
    ) -> Self {
        let since = Utc::now() - Duration::days(lookback_days);
        let sources = accounts
            .into_iter()
            .map(|account| imap::ImapMailSource::new(account, since))
            .collect();
        Self::start_sources(sources, pipeline)
    }

    fn start_sources<S: MailSource>(sources: Vec<S>, pipeline: EmailPipeline) -> Self {
        let cancel = CancellationToken::new();

        let handles = sources
            .into_iter()
            .map(|source| {
                let pipeline = pipeline.clone();
                let cancel = cancel.clone();
                let name = source.name();
                tokio::spawn(async move {
                    match drive_account(source, pipeline, cancel).await {
                        Ok(()) => {
                            tracing::info!(account = %name, "Account sync stopped");
                        }
                        Err(e) => {
                            tracing::error!(account = %name, error = %e, "Account sync aborted");
                        }
                    }
                })
            })
            .collect();

        SyncManager { cancel, handles }
    }

    pub fn account_count(&self) -> usize {
        self.handles.len()
    }

    /// Signals every account task to close its connection and waits for all
    /// of them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Emit loop for one account: runs each message from the source through a
/// full pipeline pass, one at a time. Drains messages still in flight after
/// the subscription ends, then reports the subscription's outcome.
async fn drive_account<S: MailSource>(
    source: S,
    pipeline: EmailPipeline,
    cancel: CancellationToken,
) -> Result<(), SyncError> {
    let (tx, mut rx) = mpsc::channel::<RawEmail>(1);
    let subscription = source.subscribe(tx, cancel);
    tokio::pin!(subscription);

    let mut outcome = None;
    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(raw) => {
                    pipeline.process(raw).await;
                }
                None => break,
            },
            result = &mut subscription, if outcome.is_none() => {
                outcome = Some(result);
            }
        }
    }
    outcome.unwrap_or(Ok(()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;
    use axum::{extract::State, routing::post, Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::notify::Notifier;
    use crate::prompt::enrich::EnrichmentClient;
    use crate::search::SearchStore;
    use crate::server_config::{AiConfig, NotifyConfig, SearchConfig};
    use crate::testing::common::spawn_stub;

    fn pipeline_for(store_url: &str) -> EmailPipeline {
        let http_client = reqwest::Client::new();
        EmailPipeline::new(
            EnrichmentClient::new(
                http_client.clone(),
                &AiConfig {
                    // Nothing listens here; enrichment falls back to defaults.
                    api_url: "http://127.0.0.1:1".to_string(),
                    api_key: String::new(),
                    model: "gpt-3.5-turbo".to_string(),
                    timeout_secs: 1,
                },
            ),
            SearchStore::new(
                http_client.clone(),
                &SearchConfig {
                    node: store_url.to_string(),
                    index: "emails".to_string(),
                },
            ),
            Notifier::new(http_client, &NotifyConfig::default()),
        )
    }

    fn offline_pipeline() -> EmailPipeline {
        pipeline_for("http://127.0.0.1:1")
    }

    fn store_stub(indexed: Arc<tokio::sync::Mutex<Vec<Value>>>) -> Router {
        Router::new()
            .route(
                "/emails/_doc",
                post(
                    |State(indexed): State<Arc<tokio::sync::Mutex<Vec<Value>>>>,
                     Json(doc): Json<Value>| async move {
                        indexed.lock().await.push(doc);
                        Json(json!({ "_id": "doc-1" }))
                    },
                ),
            )
            .with_state(indexed)
    }

    fn unreachable_account(user: &str) -> AccountConfig {
        AccountConfig {
            host: "127.0.0.1".to_string(),
            // Nothing listens here, so connect fails immediately.
            port: 1,
            user: user.to_string(),
            password: "secret".to_string(),
        }
    }

    enum FakeSource {
        FailsAtConnect,
        Scripted(Vec<RawEmail>),
    }

    impl MailSource for FakeSource {
        fn name(&self) -> String {
            match self {
                FakeSource::FailsAtConnect => "a@x.com".to_string(),
                FakeSource::Scripted(_) => "b@y.com".to_string(),
            }
        }

        async fn subscribe(
            self,
            tx: mpsc::Sender<RawEmail>,
            _cancel: CancellationToken,
        ) -> Result<(), SyncError> {
            match self {
                FakeSource::FailsAtConnect => {
                    Err(SyncError::Connect(anyhow!("connection refused")))
                }
                FakeSource::Scripted(messages) => {
                    for raw in messages {
                        if tx.send(raw).await.is_err() {
                            break;
                        }
                    }
                    Ok(())
                }
            }
        }
    }

    fn raw_from_b(subject: &str) -> RawEmail {
        RawEmail {
            from: Some("someone@x.com".to_string()),
            subject: Some(subject.to_string()),
            body: Some("hello".to_string()),
            account: Some("b@y.com".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_one_account_failing_does_not_stop_anothers_messages() {
        let indexed: Arc<tokio::sync::Mutex<Vec<Value>>> = Arc::default();
        let (store_url, _store) = spawn_stub(store_stub(indexed.clone())).await;

        let manager = SyncManager::start_sources(
            vec![
                FakeSource::FailsAtConnect,
                FakeSource::Scripted(vec![raw_from_b("first"), raw_from_b("second")]),
            ],
            pipeline_for(&store_url),
        );
        assert_eq!(manager.account_count(), 2);

        // B's messages must land in the store even though A aborted.
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            if indexed.lock().await.len() == 2 {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "messages never reached the store"
            );
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let docs = indexed.lock().await;
        let subjects: Vec<&str> = docs.iter().filter_map(|d| d["subject"].as_str()).collect();
        assert_eq!(subjects, vec!["first", "second"]);
        assert_eq!(docs[0]["account"], "b@y.com");
        drop(docs);

        tokio::time::timeout(std::time::Duration::from_secs(5), manager.shutdown())
            .await
            .expect("shutdown hung");
    }

    #[tokio::test]
    async fn test_failed_accounts_abort_independently_and_shutdown_joins() {
        let manager = SyncManager::start(
            vec![unreachable_account("a@x.com"), unreachable_account("b@y.com")],
            offline_pipeline(),
            30,
        );
        assert_eq!(manager.account_count(), 2);

        // Both tasks fail at connect on their own; shutdown must still join
        // them without hanging.
        tokio::time::timeout(std::time::Duration::from_secs(5), manager.shutdown())
            .await
            .expect("shutdown hung");
    }

    #[tokio::test]
    async fn test_no_accounts_is_a_noop() {
        let manager = SyncManager::start(Vec::new(), offline_pipeline(), 30);
        assert_eq!(manager.account_count(), 0);
        manager.shutdown().await;
    }
}
