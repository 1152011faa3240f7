//! In-memory IMAP fakes for unit tests

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::{AppError, AppResult, ConnectFailure, ConnectionError};
use crate::imap::{Connector, MailSession};
use crate::mime;
use crate::models::{ConnectionSpec, FolderHandle, MessageSummary, TransportMode};

/// Build a parsed message from a minimal RFC822 source
///
/// `date` is `YYYY-MM-DD`; the Date header is set to 10:00 UTC that day.
pub fn message(uid: u32, from: &str, to: &str, subject: &str, date: &str) -> MessageSummary {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("test date");
    let raw = format!(
        "From: {from}\r\nTo: {to}\r\nSubject: {subject}\r\nDate: {} 10:00:00 +0000\r\nMessage-ID: <msg-{uid}@example.test>\r\n\r\nHello,\r\nThis is message {uid}.\r\n",
        day.format("%a, %-d %b %Y"),
    );
    mime::parse_summary(uid, raw.as_bytes(), None).expect("test message parses")
}

/// Scripted mailbox contents shared by fake sessions
#[derive(Debug, Clone, Default)]
pub struct FakeMailbox {
    folders: Vec<(String, bool)>,
    /// `None` marks a message that fails to fetch
    messages: HashMap<String, BTreeMap<u32, Option<MessageSummary>>>,
    failing_select: HashSet<String>,
    fail_listing: bool,
}

impl FakeMailbox {
    pub fn folder(mut self, name: &str, selectable: bool) -> Self {
        self.folders.push((name.to_owned(), selectable));
        self
    }

    pub fn message(mut self, folder: &str, summary: MessageSummary) -> Self {
        self.messages
            .entry(folder.to_owned())
            .or_default()
            .insert(summary.uid, Some(summary));
        self
    }

    pub fn broken_message(mut self, folder: &str, uid: u32) -> Self {
        self.messages
            .entry(folder.to_owned())
            .or_default()
            .insert(uid, None);
        self
    }

    pub fn failing_select(mut self, folder: &str) -> Self {
        self.failing_select.insert(folder.to_owned());
        self
    }

    pub fn fail_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }
}

/// Session over a [`FakeMailbox`]
#[derive(Debug)]
pub struct FakeSession {
    mailbox: FakeMailbox,
    selected: Option<String>,
    list_calls: usize,
}

impl FakeSession {
    pub fn new(mailbox: FakeMailbox) -> Self {
        Self {
            mailbox,
            selected: None,
            list_calls: 0,
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls
    }

    fn selected_messages(&self) -> AppResult<&BTreeMap<u32, Option<MessageSummary>>> {
        static EMPTY: BTreeMap<u32, Option<MessageSummary>> = BTreeMap::new();
        let folder = self
            .selected
            .as_deref()
            .ok_or_else(|| AppError::Internal("no folder selected".to_owned()))?;
        Ok(self.mailbox.messages.get(folder).unwrap_or(&EMPTY))
    }
}

#[async_trait]
impl MailSession for FakeSession {
    async fn list_folders(&mut self) -> AppResult<Vec<FolderHandle>> {
        self.list_calls += 1;
        if self.mailbox.fail_listing {
            return Err(AppError::FolderList("LIST rejected".to_owned()));
        }
        Ok(self
            .mailbox
            .folders
            .iter()
            .map(|(name, selectable)| crate::folders::folder_handle(name, *selectable))
            .collect())
    }

    async fn select_folder(&mut self, name: &str) -> AppResult<()> {
        if self.mailbox.failing_select.contains(name) {
            return Err(AppError::Search {
                folder: name.to_owned(),
                reason: "EXAMINE rejected".to_owned(),
            });
        }
        self.selected = Some(name.to_owned());
        Ok(())
    }

    async fn search_message_ids(
        &mut self,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> AppResult<Vec<u32>> {
        let messages = self.selected_messages()?;
        Ok(messages
            .iter()
            .filter(|(_, summary)| {
                let Some(date) = summary.as_ref().and_then(|s| s.date) else {
                    return true;
                };
                let day = date.date_naive();
                since.is_none_or(|s| day >= s) && until.is_none_or(|u| day <= u)
            })
            .map(|(uid, _)| *uid)
            .collect())
    }

    async fn fetch_summary(&mut self, uid: u32) -> AppResult<MessageSummary> {
        match self.selected_messages()?.get(&uid) {
            Some(Some(summary)) => Ok(summary.clone()),
            _ => Err(AppError::Fetch {
                uid,
                reason: "FETCH returned no body".to_owned(),
            }),
        }
    }

    async fn logout(&mut self) -> AppResult<()> {
        Ok(())
    }
}

/// Connector that fails scripted modes and otherwise opens a [`FakeSession`]
#[derive(Debug, Clone)]
pub struct FakeConnector {
    mailbox: FakeMailbox,
    failures: HashMap<TransportMode, ConnectFailure>,
}

impl FakeConnector {
    pub fn new(mailbox: FakeMailbox) -> Self {
        Self {
            mailbox,
            failures: HashMap::new(),
        }
    }

    pub fn failing(mut self, mode: TransportMode, cause: ConnectFailure) -> Self {
        self.failures.insert(mode, cause);
        self
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(
        &self,
        _spec: &ConnectionSpec,
        mode: TransportMode,
        port: u16,
    ) -> Result<Self::Session, ConnectionError> {
        match self.failures.get(&mode) {
            Some(cause) => Err(ConnectionError::new(
                *cause,
                format!("scripted {mode} failure on port {port}"),
            )),
            None => Ok(FakeSession::new(self.mailbox.clone())),
        }
    }
}
