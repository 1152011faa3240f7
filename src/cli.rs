//! Command-line surface
//!
//! Every option is optional here: values missing on the command line are
//! looked up in the environment (after `.env` loading) by
//! [`crate::config::RunConfig::resolve`].

use std::path::PathBuf;

use clap::Parser;

/// Search an IMAP mailbox and export matching messages as .eml, text and PDF
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "imap-export",
    version,
    after_help = "Examples:\n  \
        imap-export --mailhost imap.gmail.com --username user@gmail.com --password pass --sender boss@company.com\n  \
        imap-export --env config.env --keywords \"urgent project\" --start-date 2023-01-01\n  \
        imap-export --mailhost mail.company.com --crypt starttls --recipient client@company.com --privacy"
)]
pub struct Cli {
    /// IMAP server hostname [env: MAILHOST]
    #[arg(long)]
    pub mailhost: Option<String>,
    /// IMAP server port [env: MAILPORT]
    #[arg(long)]
    pub mailport: Option<u16>,
    /// Connection security: ssl, starttls, none or auto [env: CRYPT]
    #[arg(long)]
    pub crypt: Option<String>,
    /// IMAP username [env: USERNAME]
    #[arg(long)]
    pub username: Option<String>,
    /// IMAP password [env: PASSWORD]
    #[arg(long)]
    pub password: Option<String>,

    /// Filter by sender (substring match) [env: SENDER]
    #[arg(long)]
    pub sender: Option<String>,
    /// Filter by To/Cc/Bcc recipient (substring match) [env: RECIPIENT]
    #[arg(long)]
    pub recipient: Option<String>,
    /// Space-separated keywords that must all appear in subject or body [env: KEYWORDS]
    #[arg(long)]
    pub keywords: Option<String>,
    /// Start date, inclusive (YYYY-MM-DD) [env: START_DATE]
    #[arg(long)]
    pub start_date: Option<String>,
    /// End date, inclusive (YYYY-MM-DD) [env: END_DATE]
    #[arg(long)]
    pub end_date: Option<String>,

    /// Enable case-sensitive matching
    #[arg(long)]
    pub case_sensitive: bool,
    /// Search every selectable folder instead of INBOX only
    #[arg(long)]
    pub all_folders: bool,
    /// Mask email addresses in every exported artifact
    #[arg(long)]
    pub privacy: bool,
    /// Report per-message artifact paths and debug logging
    #[arg(short, long)]
    pub verbose: bool,
    /// Write sanitized HTML instead of plain text when a message has an HTML body
    #[arg(long)]
    pub keep_html: bool,

    /// Path to the .env file
    #[arg(long, default_value = ".env")]
    pub env: PathBuf,
    /// Export root directory [env: EXPORT_DIR, default: ./export]
    #[arg(long)]
    pub export_dir: Option<PathBuf>,
    /// Document page size: a4 or letter
    #[arg(long, default_value = "a4")]
    pub page_size: String,
    /// Export at most this many matching messages
    #[arg(long)]
    pub max_results: Option<usize>,
    /// Write the run summary as JSON to this path
    #[arg(long)]
    pub summary_json: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::Cli;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_flags_and_defaults() {
        let cli = Cli::parse_from([
            "imap-export",
            "--mailhost",
            "imap.example.com",
            "--sender",
            "boss@company.com",
            "--all-folders",
            "--privacy",
        ]);
        assert_eq!(cli.mailhost.as_deref(), Some("imap.example.com"));
        assert_eq!(cli.sender.as_deref(), Some("boss@company.com"));
        assert!(cli.all_folders);
        assert!(cli.privacy);
        assert!(!cli.case_sensitive);
        assert_eq!(cli.env.to_str(), Some(".env"));
        assert_eq!(cli.page_size, "a4");
    }
}
