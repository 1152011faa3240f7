//! Run configuration
//!
//! Merges command-line options with environment variables into a single
//! [`RunConfig`]. Command-line values take precedence; the environment is
//! consulted for anything left unset (typically populated from a `.env`
//! file by `main`). The core pipeline only ever sees the resolved struct.
//!
//! # Environment
//!
//! ```text
//! MAILHOST=imap.example.com
//! MAILPORT=993
//! CRYPT=ssl
//! USERNAME=user@example.com
//! PASSWORD=app-password
//! SENDER=boss@company.com
//! RECIPIENT=client@company.com
//! KEYWORDS=urgent project
//! START_DATE=2023-01-01
//! END_DATE=2023-12-31
//! CASE_SENSITIVE=false
//! ALL_FOLDERS=false
//! PRIVACY_MODE=false
//! VERBOSE=false
//! EXPORT_DIR=./export
//! IMAP_CONNECT_TIMEOUT_MS=30000
//! IMAP_GREETING_TIMEOUT_MS=15000
//! IMAP_SOCKET_TIMEOUT_MS=300000
//! ```

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use secrecy::SecretString;

use crate::cli::Cli;
use crate::errors::{AppError, AppResult};
use crate::models::{ConnectionSpec, PageSize, SearchCriteria, TransportMode};

/// Default export root when neither `--export-dir` nor `EXPORT_DIR` is set
pub const DEFAULT_EXPORT_DIR: &str = "./export";

/// Time bounds applied to every network operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP connect (including DNS resolution)
    pub connect: Duration,
    /// TLS handshake, greeting, STARTTLS and LOGIN
    pub greeting: Duration,
    /// Any later command round trip
    pub socket: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(30_000),
            greeting: Duration::from_millis(15_000),
            socket: Duration::from_millis(300_000),
        }
    }
}

/// Mode flags and export settings
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub export_root: PathBuf,
    pub privacy: bool,
    pub verbose: bool,
    pub keep_html: bool,
    pub page_size: PageSize,
    pub max_results: Option<usize>,
    /// Date of this invocation, used in the export directory name
    pub invocation_date: NaiveDate,
}

/// Fully resolved configuration for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub connection: ConnectionSpec,
    pub criteria: SearchCriteria,
    pub options: ExportOptions,
    pub timeouts: Timeouts,
}

impl RunConfig {
    /// Resolve configuration from CLI options and the process environment
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a required value is missing or any value
    /// is malformed.
    pub fn resolve(cli: &Cli, invocation_date: NaiveDate) -> AppResult<Self> {
        Self::resolve_with(cli, invocation_date, |key| std::env::var(key).ok())
    }

    /// Resolve configuration using `lookup` for environment values
    pub fn resolve_with<F>(cli: &Cli, invocation_date: NaiveDate, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource { lookup };

        let host = cli.mailhost.clone().or_else(|| env.string("MAILHOST"));
        let username = cli.username.clone().or_else(|| env.string("USERNAME"));
        let password = cli.password.clone().or_else(|| env.string("PASSWORD"));

        let missing: Vec<&str> = [
            ("mailhost", host.is_none()),
            ("username", username.is_none()),
            ("password", password.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        if !missing.is_empty() {
            return Err(AppError::invalid(format!(
                "missing required parameters: {}",
                missing.join(", ")
            )));
        }

        let port = match cli.mailport {
            Some(p) => Some(p),
            None => env.u16("MAILPORT")?,
        };
        let mode = match cli.crypt.clone().or_else(|| env.string("CRYPT")) {
            Some(v) => TransportMode::parse(&v)?,
            None => TransportMode::Auto,
        };

        let start_date = cli
            .start_date
            .clone()
            .or_else(|| env.string("START_DATE"))
            .map(|v| parse_ymd(&v))
            .transpose()?;
        let end_date = cli
            .end_date
            .clone()
            .or_else(|| env.string("END_DATE"))
            .map(|v| parse_ymd(&v))
            .transpose()?;
        if let (Some(start), Some(end)) = (start_date, end_date)
            && start > end
        {
            return Err(AppError::invalid("start date must be <= end date"));
        }

        let keywords = cli
            .keywords
            .clone()
            .or_else(|| env.string("KEYWORDS"))
            .map(|v| split_keywords(&v))
            .unwrap_or_default();

        let criteria = SearchCriteria {
            sender: cli.sender.clone().or_else(|| env.string("SENDER")),
            recipient: cli.recipient.clone().or_else(|| env.string("RECIPIENT")),
            keywords,
            start_date,
            end_date,
            case_sensitive: cli.case_sensitive || env.bool("CASE_SENSITIVE", false)?,
            all_folders: cli.all_folders || env.bool("ALL_FOLDERS", false)?,
        };

        let options = ExportOptions {
            export_root: cli
                .export_dir
                .clone()
                .or_else(|| env.string("EXPORT_DIR").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR)),
            privacy: cli.privacy || env.bool("PRIVACY_MODE", false)?,
            verbose: cli.verbose || env.bool("VERBOSE", false)?,
            keep_html: cli.keep_html,
            page_size: PageSize::parse(&cli.page_size)?,
            max_results: cli.max_results,
            invocation_date,
        };
        if options.max_results == Some(0) {
            return Err(AppError::invalid("max-results must be at least 1"));
        }

        let timeouts = Timeouts {
            connect: Duration::from_millis(env.u64("IMAP_CONNECT_TIMEOUT_MS", 30_000)?),
            greeting: Duration::from_millis(env.u64("IMAP_GREETING_TIMEOUT_MS", 15_000)?),
            socket: Duration::from_millis(env.u64("IMAP_SOCKET_TIMEOUT_MS", 300_000)?),
        };

        Ok(Self {
            connection: ConnectionSpec {
                host: host.unwrap_or_default(),
                port,
                mode,
                username: username.unwrap_or_default(),
                secret: SecretString::new(password.unwrap_or_default().into()),
            },
            criteria,
            options,
            timeouts,
        })
    }
}

/// Environment lookup with typed accessors
struct EnvSource<F> {
    lookup: F,
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty string value
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    /// Parse a boolean with flexible values, `default` when unset
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the variable is set to an unrecognized value.
    fn bool(&self, key: &str, default: bool) -> AppResult<bool> {
        match self.string(key) {
            Some(v) => parse_bool_value(&v).ok_or_else(|| {
                AppError::InvalidInput(format!("invalid boolean environment variable {key}: '{v}'"))
            }),
            None => Ok(default),
        }
    }

    fn u16(&self, key: &str) -> AppResult<Option<u16>> {
        self.string(key)
            .map(|v| {
                v.trim().parse::<u16>().map_err(|_| {
                    AppError::InvalidInput(format!("invalid u16 environment variable {key}: '{v}'"))
                })
            })
            .transpose()
    }

    fn u64(&self, key: &str, default: u64) -> AppResult<u64> {
        match self.string(key) {
            Some(v) => v.trim().parse::<u64>().map_err(|_| {
                AppError::InvalidInput(format!("invalid u64 environment variable {key}: '{v}'"))
            }),
            None => Ok(default),
        }
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse YYYY-MM-DD date string
pub fn parse_ymd(input: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("invalid date '{input}', expected YYYY-MM-DD")))
}

/// Split a keyword list on whitespace and commas, preserving order
pub fn split_keywords(input: &str) -> Vec<String> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}
