//! Stub collaborator servers for tests. Each stub binds an ephemeral port on
//! localhost and shuts down when the returned guard is dropped.

use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub struct StubGuard {
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl Drop for StubGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Serves `router` on 127.0.0.1:0 and returns its base URL.
pub async fn spawn_stub(router: Router) -> (String, StubGuard) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind stub listener");
    let addr = listener.local_addr().expect("stub has no local addr");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    (
        format!("http://{}", addr),
        StubGuard {
            shutdown_tx: Some(shutdown_tx),
        },
    )
}

/// A minimal chat-completions response body with the given answer content.
pub fn chat_completion_body(content: &str) -> Value {
    json!({
        "choices": [
            {
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }
        ],
        "usage": { "prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2 }
    })
}
