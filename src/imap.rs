//! IMAP capability and its `async-imap` backend
//!
//! The pipeline talks to the mail server only through [`Connector`] and
//! [`MailSession`], so provider quirks stay behind this boundary. The
//! production implementation wraps `async-imap` over either a rustls TLS
//! stream (implicit TLS or STARTTLS) or plain TCP. Every network call is
//! bounded by a timeout from [`Timeouts`].

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_imap::types::{Fetch, NameAttribute};
use async_imap::{Client, Session};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use futures::TryStreamExt;
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::config::Timeouts;
use crate::errors::{AppError, AppResult, ConnectFailure, ConnectionError};
use crate::mime;
use crate::models::{ConnectionSpec, FolderHandle, MessageSummary, TransportMode};

/// Establishes authenticated sessions for one concrete transport mode
#[async_trait]
pub trait Connector: Sync {
    type Session: MailSession;

    /// Connect to `host:port` using `mode` and log in
    ///
    /// `mode` is never [`TransportMode::Auto`]; the provisioner resolves it.
    async fn connect(
        &self,
        spec: &ConnectionSpec,
        mode: TransportMode,
        port: u16,
    ) -> Result<Self::Session, ConnectionError>;
}

/// Operations the pipeline needs from an authenticated session
#[async_trait]
pub trait MailSession: Send {
    /// List every folder the server reports, in server order
    async fn list_folders(&mut self) -> AppResult<Vec<FolderHandle>>;

    /// Select a folder read-only
    async fn select_folder(&mut self, name: &str) -> AppResult<()>;

    /// UIDs in the selected folder, optionally narrowed to a date window
    ///
    /// Bounds are inclusive calendar dates. The result is in ascending UID
    /// order, which is the server's native message order.
    async fn search_message_ids(
        &mut self,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> AppResult<Vec<u32>>;

    /// Fetch and parse one message without marking it as read
    async fn fetch_summary(&mut self, uid: u32) -> AppResult<MessageSummary>;

    async fn logout(&mut self) -> AppResult<()>;
}

/// Any byte stream an IMAP client can run over
pub trait ImapStream: AsyncRead + AsyncWrite + Unpin + Send + Debug {}

impl<T> ImapStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + Debug {}

/// Authenticated session over TLS or plain TCP
pub type ImapSession = Session<Box<dyn ImapStream>>;

/// Production connector backed by `async-imap`
#[derive(Debug, Clone)]
pub struct AsyncImapConnector {
    timeouts: Timeouts,
}

impl AsyncImapConnector {
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }
}

#[async_trait]
impl Connector for AsyncImapConnector {
    type Session = AsyncImapSession;

    /// Performs the full connection sequence with timeouts:
    /// 1. DNS resolution and TCP connect
    /// 2. TLS handshake (implicit TLS) or greeting + STARTTLS + handshake
    /// 3. IMAP greeting
    /// 4. LOGIN
    async fn connect(
        &self,
        spec: &ConnectionSpec,
        mode: TransportMode,
        port: u16,
    ) -> Result<Self::Session, ConnectionError> {
        let greeting_duration = self.timeouts.greeting;
        let tcp = tcp_connect(&spec.host, port, self.timeouts.connect).await?;

        let client: Client<Box<dyn ImapStream>> = match mode {
            TransportMode::Ssl => {
                let tls = tls_handshake(&spec.host, tcp, greeting_duration).await?;
                let mut client = Client::new(Box::new(tls) as Box<dyn ImapStream>);
                read_greeting(&mut client, greeting_duration).await?;
                client
            }
            TransportMode::StartTls => {
                let mut plain = Client::new(tcp);
                read_greeting(&mut plain, greeting_duration).await?;
                timeout(
                    greeting_duration,
                    plain.run_command_and_check_ok("STARTTLS", None),
                )
                .await
                .map_err(|_| ConnectionError::new(ConnectFailure::Timeout, "STARTTLS timeout"))
                .and_then(|r| {
                    r.map_err(|e| {
                        ConnectionError::new(ConnectFailure::Tls, format!("STARTTLS rejected: {e}"))
                    })
                })?;
                let tcp = plain.into_inner();
                let tls = tls_handshake(&spec.host, tcp, greeting_duration).await?;
                Client::new(Box::new(tls) as Box<dyn ImapStream>)
            }
            TransportMode::Plain | TransportMode::Auto => {
                let mut client = Client::new(Box::new(tcp) as Box<dyn ImapStream>);
                read_greeting(&mut client, greeting_duration).await?;
                client
            }
        };

        if mode == TransportMode::Plain {
            tracing::warn!(host = %spec.host, port, "logging in over an unencrypted connection");
        }

        let pass = spec.secret.expose_secret();
        let session = timeout(greeting_duration, client.login(spec.username.as_str(), pass))
            .await
            .map_err(|_| ConnectionError::new(ConnectFailure::Timeout, "IMAP login timeout"))
            .and_then(|r| r.map_err(|(e, _)| login_error(e)))?;

        Ok(AsyncImapSession {
            session,
            socket_timeout: self.timeouts.socket,
        })
    }
}

/// Classify a LOGIN failure; tagged NO/BAD replies are credential rejections
fn login_error(err: async_imap::error::Error) -> ConnectionError {
    match err {
        async_imap::error::Error::No(msg) | async_imap::error::Error::Bad(msg) => {
            ConnectionError::new(ConnectFailure::AuthRejected, msg)
        }
        other => ConnectionError::new(ConnectFailure::Protocol, format!("LOGIN failed: {other}")),
    }
}

/// Resolve the host and open a TCP connection to the first reachable address
async fn tcp_connect(host: &str, port: u16, bound: Duration) -> Result<TcpStream, ConnectionError> {
    let addrs: Vec<_> = timeout(bound, lookup_host((host, port)))
        .await
        .map_err(|_| ConnectionError::new(ConnectFailure::Timeout, "dns lookup timeout"))
        .and_then(|r| {
            r.map_err(|e| {
                ConnectionError::new(ConnectFailure::Dns, format!("cannot resolve {host}: {e}"))
            })
        })?
        .collect();
    if addrs.is_empty() {
        return Err(ConnectionError::new(
            ConnectFailure::Dns,
            format!("{host} resolved to no addresses"),
        ));
    }

    timeout(bound, TcpStream::connect(addrs.as_slice()))
        .await
        .map_err(|_| ConnectionError::new(ConnectFailure::Timeout, "tcp connect timeout"))
        .and_then(|r| {
            r.map_err(|e| {
                ConnectionError::new(
                    ConnectFailure::Refused,
                    format!("tcp connect to {host}:{port} failed: {e}"),
                )
            })
        })
}

/// Wrap a TCP stream in TLS validated against the webpki root store
async fn tls_handshake(
    host: &str,
    tcp: TcpStream,
    bound: Duration,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, ConnectionError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));

    let server_name = ServerName::try_from(host.to_owned()).map_err(|_| {
        ConnectionError::new(ConnectFailure::Tls, "invalid IMAP host for TLS SNI")
    })?;
    timeout(bound, connector.connect(server_name, tcp))
        .await
        .map_err(|_| ConnectionError::new(ConnectFailure::Timeout, "TLS handshake timeout"))
        .and_then(|r| {
            r.map_err(|e| {
                ConnectionError::new(ConnectFailure::Tls, format!("TLS handshake failed: {e}"))
            })
        })
}

async fn read_greeting<T>(client: &mut Client<T>, bound: Duration) -> Result<(), ConnectionError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Debug,
{
    let greeting = timeout(bound, client.read_response())
        .await
        .map_err(|_| ConnectionError::new(ConnectFailure::Timeout, "IMAP greeting timeout"))
        .and_then(|r| {
            r.map_err(|e| {
                ConnectionError::new(ConnectFailure::Protocol, format!("IMAP greeting failed: {e}"))
            })
        })?;

    if greeting.is_none() {
        return Err(ConnectionError::new(
            ConnectFailure::Protocol,
            "IMAP server closed connection before greeting",
        ));
    }
    Ok(())
}

/// Session backed by a live `async-imap` connection
pub struct AsyncImapSession {
    session: ImapSession,
    socket_timeout: Duration,
}

#[async_trait]
impl MailSession for AsyncImapSession {
    async fn list_folders(&mut self) -> AppResult<Vec<FolderHandle>> {
        let bound = self.socket_timeout;
        let stream = timeout(bound, self.session.list(Some(""), Some("*")))
            .await
            .map_err(|_| AppError::FolderList("LIST timed out".to_owned()))
            .and_then(|r| r.map_err(|e| AppError::FolderList(format!("LIST failed: {e}"))))?;

        let names: Vec<_> = timeout(bound, stream.try_collect::<Vec<_>>())
            .await
            .map_err(|_| AppError::FolderList("LIST stream timed out".to_owned()))
            .and_then(|r| r.map_err(|e| AppError::FolderList(format!("LIST stream failed: {e}"))))?;

        Ok(names
            .iter()
            .map(|name| {
                let selectable = !name
                    .attributes()
                    .iter()
                    .any(|attr| matches!(attr, NameAttribute::NoSelect));
                crate::folders::folder_handle(name.name(), selectable)
            })
            .collect())
    }

    async fn select_folder(&mut self, name: &str) -> AppResult<()> {
        timeout(self.socket_timeout, self.session.examine(name))
            .await
            .map_err(|_| AppError::Search {
                folder: name.to_owned(),
                reason: "EXAMINE timed out".to_owned(),
            })
            .and_then(|r| {
                r.map_err(|e| AppError::Search {
                    folder: name.to_owned(),
                    reason: format!("cannot examine folder: {e}"),
                })
            })?;
        Ok(())
    }

    async fn search_message_ids(
        &mut self,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> AppResult<Vec<u32>> {
        let query = build_search_query(since, until);
        let set = timeout(self.socket_timeout, self.session.uid_search(&query))
            .await
            .map_err(|_| AppError::Internal("UID SEARCH timed out".to_owned()))
            .and_then(|r| r.map_err(|e| AppError::Internal(format!("uid search failed: {e}"))))?;
        let mut uids: Vec<u32> = set.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch_summary(&mut self, uid: u32) -> AppResult<MessageSummary> {
        let fetch = self.fetch_one(uid, "(UID INTERNALDATE BODY.PEEK[])").await?;
        let raw = fetch.body().ok_or_else(|| AppError::Fetch {
            uid,
            reason: "message has no body".to_owned(),
        })?;
        mime::parse_summary(uid, raw, fetch.internal_date())
    }

    async fn logout(&mut self) -> AppResult<()> {
        timeout(self.socket_timeout, self.session.logout())
            .await
            .map_err(|_| AppError::Internal("LOGOUT timed out".to_owned()))
            .and_then(|r| r.map_err(|e| AppError::Internal(format!("LOGOUT failed: {e}"))))
    }
}

impl AsyncImapSession {
    /// Run a `UID FETCH` for a single UID and return the first result
    async fn fetch_one(&mut self, uid: u32, query: &str) -> AppResult<Fetch> {
        let bound = self.socket_timeout;
        let stream = timeout(bound, self.session.uid_fetch(uid.to_string(), query))
            .await
            .map_err(|_| AppError::Fetch {
                uid,
                reason: "UID FETCH timed out".to_owned(),
            })
            .and_then(|r| {
                r.map_err(|e| AppError::Fetch {
                    uid,
                    reason: format!("uid fetch failed: {e}"),
                })
            })?;
        let fetches: Vec<Fetch> = timeout(bound, stream.try_collect())
            .await
            .map_err(|_| AppError::Fetch {
                uid,
                reason: "UID FETCH stream timed out".to_owned(),
            })
            .and_then(|r| {
                r.map_err(|e| AppError::Fetch {
                    uid,
                    reason: format!("uid fetch stream failed: {e}"),
                })
            })?;

        fetches.into_iter().next().ok_or_else(|| AppError::Fetch {
            uid,
            reason: "message not found".to_owned(),
        })
    }
}

/// Build the server-side UID SEARCH query for a date window
///
/// IMAP `BEFORE` is exclusive, so the inclusive end date is shifted by a day.
fn build_search_query(since: Option<NaiveDate>, until: Option<NaiveDate>) -> String {
    let mut parts = Vec::new();
    if let Some(start) = since {
        parts.push(format!("SINCE {}", imap_date(start)));
    }
    if let Some(end) = until {
        let end_exclusive = end + ChronoDuration::days(1);
        parts.push(format!("BEFORE {}", imap_date(end_exclusive)));
    }

    if parts.is_empty() {
        "ALL".to_owned()
    } else {
        parts.join(" ")
    }
}

/// Format date as IMAP SEARCH date (e.g., "1-Jan-2025")
fn imap_date(date: NaiveDate) -> String {
    date.format("%-d-%b-%Y").to_string()
}
