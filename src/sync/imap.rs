//! Per-account IMAP connection lifecycle: TLS connect, historical backfill,
//! and the IDLE live subscription. Each message is handed to the emit loop
//! over a bounded channel and the next fetch waits for the send, which keeps
//! enrichment concurrency per account at one and gives implicit backpressure.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use mail_parser::MessageParser;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::{rustls, TlsConnector};
use tokio_util::sync::CancellationToken;

use crate::{email::RawEmail, error::SyncError, server_config::AccountConfig};

use super::MailSource;

pub type ImapSession = async_imap::Session<tokio_rustls::client::TlsStream<TcpStream>>;

const MAILBOX: &str = "INBOX";
// Servers may drop IDLE connections after 29 minutes (RFC 2177); refresh
// comfortably before that.
const IDLE_REFRESH: Duration = Duration::from_secs(25 * 60);

/// Live IMAP mailbox feed for one account: connect, backfill since the
/// cutoff, then hold the connection in IDLE until cancelled.
pub struct ImapMailSource {
    account: AccountConfig,
    since: DateTime<Utc>,
}

impl ImapMailSource {
    pub fn new(account: AccountConfig, since: DateTime<Utc>) -> Self {
        ImapMailSource { account, since }
    }
}

impl MailSource for ImapMailSource {
    fn name(&self) -> String {
        self.account.user.clone()
    }

    async fn subscribe(
        self,
        tx: mpsc::Sender<RawEmail>,
        cancel: CancellationToken,
    ) -> Result<(), SyncError> {
        let ImapMailSource { account, since } = self;

        let mut session = connect(&account).await?;
        session
            .select(MAILBOX)
            .await
            .map_err(|e| SyncError::Select(e.into()))?;
        tracing::info!(account = %account.user, "IMAP connected, starting backfill");

        backfill(&mut session, &account, &tx, since, &cancel).await?;
        tracing::info!(account = %account.user, "Backfill done, listening for new mail");

        listen(session, &account, &tx, &cancel).await
    }
}

async fn connect(account: &AccountConfig) -> Result<ImapSession, SyncError> {
    let tcp = TcpStream::connect((account.host.as_str(), account.port))
        .await
        .map_err(|e| SyncError::Connect(e.into()))?;

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name =
        ServerName::try_from(account.host.clone()).map_err(|e| SyncError::Connect(e.into()))?;
    let tls_stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| SyncError::Connect(e.into()))?;

    let client = async_imap::Client::new(tls_stream);
    client
        .login(&account.user, &account.password)
        .await
        .map_err(|(e, _)| SyncError::Connect(e.into()))
}

/// IMAP SEARCH SINCE takes a day-granularity `dd-Mon-yyyy` date.
pub fn since_query(since: DateTime<Utc>) -> String {
    format!("SINCE {}", since.format("%d-%b-%Y"))
}

/// Fetches every message received since the cutoff, oldest first, and emits
/// each before the next fetch starts. A failed fetch skips that message and
/// continues with the next.
async fn backfill(
    session: &mut ImapSession,
    account: &AccountConfig,
    tx: &mpsc::Sender<RawEmail>,
    since: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<(), SyncError> {
    let uids = session
        .uid_search(&since_query(since))
        .await
        .map_err(|e| SyncError::Search(e.into()))?;
    let uids = ascending(uids.into_iter().collect());
    tracing::info!(account = %account.user, count = uids.len(), "Backfill messages found");

    emit_uids(session, account, tx, &uids, cancel).await
}

/// Fetches and emits each uid in turn.
async fn emit_uids(
    session: &mut ImapSession,
    account: &AccountConfig,
    tx: &mpsc::Sender<RawEmail>,
    uids: &[u32],
    cancel: &CancellationToken,
) -> Result<(), SyncError> {
    for &uid in uids {
        if cancel.is_cancelled() {
            return Ok(());
        }
        match fetch_raw_email(session, account, uid).await {
            Ok(Some(raw)) => {
                // A closed receiver means the emit loop is gone; stop quietly.
                if tx.send(raw).await.is_err() {
                    return Ok(());
                }
            }
            Ok(None) => {
                tracing::warn!(account = %account.user, uid, "Message fetch returned no body");
            }
            Err(e) => {
                tracing::warn!(account = %account.user, uid, error = %e, "Skipping message");
            }
        }
    }
    Ok(())
}

async fn fetch_raw_email(
    session: &mut ImapSession,
    account: &AccountConfig,
    uid: u32,
) -> Result<Option<RawEmail>, SyncError> {
    let mut raw = None;
    {
        let mut fetches = session
            .uid_fetch(uid.to_string(), "(UID INTERNALDATE RFC822)")
            .await
            .map_err(|e| SyncError::Fetch(e.into()))?;
        while let Some(item) = fetches.next().await {
            let fetch = item.map_err(|e| SyncError::Fetch(e.into()))?;
            if let Some(body) = fetch.body() {
                let internal_date = fetch.internal_date().map(|d| d.with_timezone(&Utc));
                raw = Some(normalize_message(body, internal_date, &account.user));
            }
        }
    }
    Ok(raw)
}

/// Maps a raw RFC822 message onto the pipeline's input shape. A message that
/// fails MIME parsing still goes through with the body as lossy text; the
/// normalizer fills the remaining defaults.
pub fn normalize_message(
    raw_body: &[u8],
    internal_date: Option<DateTime<Utc>>,
    account_user: &str,
) -> RawEmail {
    let parsed = MessageParser::default().parse(raw_body);

    let (from, to, subject, body, header_date) = match &parsed {
        Some(msg) => (
            msg.from()
                .and_then(|f| f.first().and_then(|a| a.address().map(|s| s.to_string()))),
            msg.to()
                .and_then(|t| t.first().and_then(|a| a.address().map(|s| s.to_string()))),
            msg.subject().map(|s| s.to_string()),
            msg.body_text(0).map(|b| b.to_string()),
            msg.date()
                .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0)),
        ),
        None => (None, None, None, None, None),
    };

    RawEmail {
        from,
        to,
        subject,
        // No decodable text part: index the raw source as-is rather than
        // dropping the message.
        body: body.or_else(|| Some(String::from_utf8_lossy(raw_body).to_string())),
        folder: Some(MAILBOX.to_string()),
        account: Some(account_user.to_string()),
        date: internal_date.or(header_date),
    }
}

/// Long-lived live subscription: suspends in IDLE, and on a mailbox change
/// fetches everything flagged unseen and emits it, then resumes waiting.
/// Holds no locks while suspended; stops when the cancel token fires.
async fn listen(
    mut session: ImapSession,
    account: &AccountConfig,
    tx: &mpsc::Sender<RawEmail>,
    cancel: &CancellationToken,
) -> Result<(), SyncError> {
    // Uids whose fetch was already tried since the last IDLE wake-up. A
    // message whose fetch keeps failing stays UNSEEN; without this guard the
    // drain pass would re-search and re-fetch it in a tight loop.
    let mut attempted: HashSet<u32> = HashSet::new();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        // Drain anything that arrived while the previous batch was being
        // processed before suspending again.
        let unseen = session
            .uid_search("UNSEEN")
            .await
            .map_err(|e| SyncError::Search(e.into()))?;
        let unseen = ascending(unseen.into_iter().collect());
        let fresh = not_yet_attempted(&unseen, &attempted);
        if !fresh.is_empty() {
            tracing::info!(account = %account.user, count = fresh.len(), "New messages");
            attempted.extend(fresh.iter().copied());
            emit_uids(&mut session, account, tx, &fresh, cancel).await?;
            continue;
        }

        let mut idle = session.idle();
        idle.init().await.map_err(|e| SyncError::Connect(e.into()))?;
        let (idle_wait, interrupt) = idle.wait_with_timeout(IDLE_REFRESH);

        let cancelled = tokio::select! {
            _ = cancel.cancelled() => true,
            result = idle_wait => {
                result.map_err(|e| SyncError::Connect(e.into()))?;
                false
            }
        };

        drop(interrupt);
        session = idle.done().await.map_err(|e| SyncError::Connect(e.into()))?;
        if cancelled {
            break;
        }
        // Any still-unseen message gets one more try per wake-up.
        attempted.clear();
    }

    let _ = session.logout().await;
    tracing::info!(account = %account.user, "IMAP connection closed");
    Ok(())
}

fn not_yet_attempted(unseen: &[u32], attempted: &HashSet<u32>) -> Vec<u32> {
    unseen
        .iter()
        .copied()
        .filter(|uid| !attempted.contains(uid))
        .collect()
}

fn ascending(mut uids: Vec<u32>) -> Vec<u32> {
    uids.sort_unstable();
    uids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_query_uses_imap_date_format() {
        let since = "2024-03-05T10:30:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(since_query(since), "SINCE 05-Mar-2024");
    }

    #[test]
    fn test_uids_are_processed_oldest_first() {
        assert_eq!(ascending(vec![42, 7, 19]), vec![7, 19, 42]);
    }

    #[test]
    fn test_drain_retries_a_uid_at_most_once_per_wakeup() {
        let mut attempted = HashSet::new();

        // First drain pass: both messages are fresh.
        let fresh = not_yet_attempted(&[7, 9], &attempted);
        assert_eq!(fresh, vec![7, 9]);
        attempted.extend(fresh);

        // Message 7 failed its fetch and is still unseen; the next pass must
        // not pick it up again, so the loop falls through to IDLE.
        assert!(not_yet_attempted(&[7], &attempted).is_empty());

        // A genuinely new arrival still gets through.
        assert_eq!(not_yet_attempted(&[7, 12], &attempted), vec![12]);

        // After an IDLE wake-up the slate is clean and 7 gets one more try.
        attempted.clear();
        assert_eq!(not_yet_attempted(&[7], &attempted), vec![7]);
    }

    #[test]
    fn test_normalize_message_extracts_envelope_and_text() {
        let raw = concat!(
            "From: Alice <a@x.com>\r\n",
            "To: Me <me@inbox.dev>\r\n",
            "Subject: Can we meet?\r\n",
            "Date: Tue, 05 Mar 2024 10:30:00 +0000\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "Are you free Tuesday?\r\n"
        );

        let raw = normalize_message(raw.as_bytes(), None, "me@inbox.dev");

        assert_eq!(raw.from.as_deref(), Some("a@x.com"));
        assert_eq!(raw.to.as_deref(), Some("me@inbox.dev"));
        assert_eq!(raw.subject.as_deref(), Some("Can we meet?"));
        assert_eq!(raw.body.as_deref().map(str::trim), Some("Are you free Tuesday?"));
        assert_eq!(raw.folder.as_deref(), Some("INBOX"));
        assert_eq!(raw.account.as_deref(), Some("me@inbox.dev"));
        assert!(raw.date.is_some());
    }

    #[test]
    fn test_normalize_message_prefers_server_receive_time() {
        let internal = "2024-03-06T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let raw = concat!(
            "From: a@x.com\r\n",
            "Date: Tue, 05 Mar 2024 10:30:00 +0000\r\n",
            "\r\n",
            "hello\r\n"
        );

        let raw = normalize_message(raw.as_bytes(), Some(internal), "me@inbox.dev");
        assert_eq!(raw.date, Some(internal));
    }

    #[test]
    fn test_unparseable_message_falls_back_to_lossy_body() {
        let raw = normalize_message(&[0xff, 0xfe, 0x00], None, "me@inbox.dev");
        assert!(raw.subject.is_none());
        assert!(raw.body.is_some());
        assert_eq!(raw.account.as_deref(), Some("me@inbox.dev"));
    }
}
