//! Core data types shared across the search and export pipeline
//!
//! Connection parameters, search criteria, folder handles, fetched message
//! summaries and export targets. Everything here is owned by a single run and
//! never persisted except through the files the export writer produces.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDate};
use secrecy::SecretString;

use crate::errors::{AppError, AppResult};

/// Transport security mode for the IMAP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMode {
    /// Implicit TLS from the first byte (IMAPS)
    Ssl,
    /// Plain TCP upgraded with the STARTTLS command
    StartTls,
    /// Unencrypted connection
    Plain,
    /// Try `Ssl`, then `StartTls`, then `Plain`
    Auto,
}

impl TransportMode {
    /// Parse a `CRYPT` value (`ssl`, `starttls`, `none`, `auto`)
    ///
    /// `plain` and `plaintext` are accepted as aliases of `none`.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ssl" | "tls" => Ok(Self::Ssl),
            "starttls" => Ok(Self::StartTls),
            "none" | "plain" | "plaintext" => Ok(Self::Plain),
            "auto" | "" => Ok(Self::Auto),
            other => Err(AppError::invalid(format!(
                "invalid transport mode '{other}', expected ssl, starttls, none or auto"
            ))),
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ssl => "ssl",
            Self::StartTls => "starttls",
            Self::Plain => "none",
            Self::Auto => "auto",
        })
    }
}

/// Connection parameters for one mailbox
///
/// `port` is `None` unless explicitly configured; the provisioner then picks
/// the conventional port for each attempted mode.
#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    pub host: String,
    pub port: Option<u16>,
    pub mode: TransportMode,
    pub username: String,
    pub secret: SecretString,
}

/// Multi-criteria message filter
///
/// Every field is optional; an empty criteria set matches every message in
/// scope.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    /// Substring of the From header
    pub sender: Option<String>,
    /// Substring of any of To, Cc or Bcc
    pub recipient: Option<String>,
    /// Tokens that must all appear in subject or body
    pub keywords: Vec<String>,
    /// Inclusive lower bound on the received date
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on the received date
    pub end_date: Option<NaiveDate>,
    pub case_sensitive: bool,
    pub all_folders: bool,
}

impl SearchCriteria {
    pub fn has_date_range(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }
}

/// A mailbox folder discovered during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderHandle {
    /// Name as reported by the server (modified UTF-7), used for SELECT
    pub name: String,
    /// Human-readable name for logs and reports
    pub display_name: String,
    pub selectable: bool,
}

impl FolderHandle {
    pub fn inbox() -> Self {
        Self {
            name: "INBOX".to_owned(),
            display_name: "INBOX".to_owned(),
            selectable: true,
        }
    }
}

/// Parsed message fetched from a folder
///
/// Immutable once fetched. `raw` holds the RFC 822 source exactly as the
/// server returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSummary {
    /// UID scoped to the folder it was fetched from
    pub uid: u32,
    /// Decoded From header
    pub sender: String,
    /// Decoded To, Cc and Bcc addresses, in that order
    pub recipients: Vec<String>,
    pub subject: String,
    /// Received date: INTERNALDATE, falling back to the Date header
    pub date: Option<DateTime<FixedOffset>>,
    /// Date header as written by the sender
    pub date_header: Option<String>,
    /// Message-ID header, used for cross-folder de-duplication
    pub message_id: Option<String>,
    /// All headers as decoded key/value pairs
    pub headers: Vec<(String, String)>,
    /// Readable body: plain text, or HTML converted to text
    pub body_text: String,
    pub body_html: Option<String>,
    pub raw: Vec<u8>,
}

/// Which criteria category a message satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    Sender,
    Recipient,
    Keywords,
    DateRange,
}

/// A message that passed all active predicates
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub folder: String,
    pub summary: MessageSummary,
    pub matched: Vec<Criterion>,
}

/// Page size handed to the document renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    A4,
    Letter,
}

impl PageSize {
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "a4" => Ok(Self::A4),
            "letter" => Ok(Self::Letter),
            other => Err(AppError::invalid(format!(
                "invalid page size '{other}', expected a4 or letter"
            ))),
        }
    }

    /// Width and height in millimetres
    pub fn dimensions_mm(self) -> (f32, f32) {
        match self {
            Self::A4 => (210.0, 297.0),
            Self::Letter => (215.9, 279.4),
        }
    }
}

/// Where the artifacts of one message are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    pub directory: PathBuf,
    pub base_name: String,
    pub redacted: bool,
}

impl ExportTarget {
    /// Suffix appended before the extension in privacy mode
    pub const REDACTED_SUFFIX: &'static str = "-redacted";

    /// File name for an artifact with the given extension
    pub fn file_name(&self, extension: &str) -> String {
        let suffix = if self.redacted {
            Self::REDACTED_SUFFIX
        } else {
            ""
        };
        format!("{}{suffix}.{extension}", self.base_name)
    }

    pub fn path_for(&self, extension: &str) -> PathBuf {
        self.directory.join(self.file_name(extension))
    }
}

/// Paths of the artifacts written for one message
///
/// A `None` entry means that artifact failed; the failure is reported
/// separately.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportArtifactSet {
    pub raw_message: Option<PathBuf>,
    pub text: Option<PathBuf>,
    pub document: Option<PathBuf>,
}

impl ExportArtifactSet {
    pub fn written(&self) -> usize {
        [&self.raw_message, &self.text, &self.document]
            .iter()
            .filter(|p| p.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{ExportTarget, PageSize, TransportMode};

    #[test]
    fn parses_crypt_values() {
        assert_eq!(TransportMode::parse("SSL").unwrap(), TransportMode::Ssl);
        assert_eq!(
            TransportMode::parse("starttls").unwrap(),
            TransportMode::StartTls
        );
        assert_eq!(TransportMode::parse("none").unwrap(), TransportMode::Plain);
        assert_eq!(TransportMode::parse("auto").unwrap(), TransportMode::Auto);
        assert!(TransportMode::parse("ssh").is_err());
    }

    #[test]
    fn redacted_target_suffixes_every_extension() {
        let target = ExportTarget {
            directory: PathBuf::from("export/2024-05-01"),
            base_name: "2023-03-01_boss_me_Hello".to_owned(),
            redacted: true,
        };
        assert_eq!(target.file_name("eml"), "2023-03-01_boss_me_Hello-redacted.eml");
        assert_eq!(
            target.path_for("pdf"),
            PathBuf::from("export/2024-05-01/2023-03-01_boss_me_Hello-redacted.pdf")
        );
    }

    #[test]
    fn page_size_parse_is_case_insensitive() {
        assert_eq!(PageSize::parse("Letter").unwrap(), PageSize::Letter);
        assert!(PageSize::parse("a5").is_err());
    }
}
