//! Message parsing and MIME handling
//!
//! Parses RFC822 messages using `mailparse` into a [`MessageSummary`]:
//! decoded headers, sender and recipients, received date and a readable body.
//! HTML-only messages are converted to text with `html2text`; HTML kept for
//! export is sanitized with `ammonia`.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use mailparse::{DispositionType, MailAddr, MailHeader, ParsedMail};

use crate::errors::{AppError, AppResult};
use crate::models::MessageSummary;

/// Body used when a message has neither a text nor an HTML part
pub const NO_CONTENT: &str = "No readable content found";

/// Line width for HTML-to-text conversion
const TEXT_WIDTH: usize = 100;

/// Parse RFC822 source into a summary
///
/// `internal_date` is the server's INTERNALDATE and becomes the received
/// date; the Date header is used when the server did not supply one.
///
/// # Errors
///
/// - `Fetch` if `mailparse` cannot parse the message
pub fn parse_summary(
    uid: u32,
    raw: &[u8],
    internal_date: Option<DateTime<FixedOffset>>,
) -> AppResult<MessageSummary> {
    let parsed = mailparse::parse_mail(raw).map_err(|e| AppError::Fetch {
        uid,
        reason: format!("failed to parse RFC822 message: {e}"),
    })?;

    let headers = to_tuples(&parsed.headers);
    let header_map = to_header_map(&headers);

    let mut body_text = None;
    let mut body_html = None;
    walk_parts(&parsed, &mut body_text, &mut body_html);

    let date_header = header_map.get("date").cloned();
    let date = internal_date.or_else(|| date_header.as_deref().and_then(parse_date));

    let mut recipients = Vec::new();
    for key in ["to", "cc", "bcc"] {
        if let Some(value) = header_map.get(key) {
            recipients.extend(split_addresses(value));
        }
    }

    Ok(MessageSummary {
        uid,
        sender: header_map.get("from").cloned().unwrap_or_default(),
        recipients,
        subject: header_map.get("subject").cloned().unwrap_or_default(),
        date,
        date_header,
        message_id: header_map
            .get("message-id")
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty()),
        body_text: readable_body(body_text.as_deref(), body_html.as_deref()),
        body_html,
        headers,
        raw: raw.to_vec(),
    })
}

/// Walk MIME part tree recursively
///
/// Keeps the first non-attachment text/plain and text/html bodies.
fn walk_parts(
    part: &ParsedMail<'_>,
    body_text: &mut Option<String>,
    body_html: &mut Option<String>,
) {
    if part.subparts.is_empty() {
        let ctype = part.ctype.mimetype.to_ascii_lowercase();
        let disp = part.get_content_disposition();
        let is_attachment = disp.disposition == DispositionType::Attachment
            || disp.params.contains_key("filename");
        if is_attachment {
            return;
        }

        if ctype == "text/plain"
            && body_text.is_none()
            && let Ok(text) = part.get_body()
        {
            *body_text = Some(text);
        }

        if ctype == "text/html"
            && body_html.is_none()
            && let Ok(html) = part.get_body()
        {
            *body_html = Some(html);
        }
        return;
    }

    for sub in &part.subparts {
        walk_parts(sub, body_text, body_html);
    }
}

/// Plain text if present, else HTML converted to text
pub fn readable_body(text: Option<&str>, html: Option<&str>) -> String {
    if let Some(text) = text
        && !text.trim().is_empty()
    {
        return text.trim().to_owned();
    }
    if let Some(html) = html
        && !html.trim().is_empty()
    {
        return html_to_text(html);
    }
    NO_CONTENT.to_owned()
}

/// Convert HTML to readable text, stripping all markup on converter failure
pub fn html_to_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), TEXT_WIDTH) {
        Ok(text) => text.trim().to_owned(),
        Err(e) => {
            tracing::debug!(error = %e, "html2text failed; stripping tags instead");
            ammonia::Builder::empty().clean(html).to_string().trim().to_owned()
        }
    }
}

/// Sanitize HTML for standalone export
pub fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

/// Parse an RFC 2822 date, tolerating common malformations
fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(value.trim()).ok().or_else(|| {
        mailparse::dateparse(value)
            .ok()
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.fixed_offset())
    })
}

/// Split an address header into individual addresses
///
/// Falls back to the whole value when the header does not parse as an
/// address list.
fn split_addresses(value: &str) -> Vec<String> {
    match mailparse::addrparse(value) {
        Ok(list) if !list.is_empty() => list
            .iter()
            .flat_map(|addr| match addr {
                MailAddr::Single(info) => vec![info.to_string()],
                MailAddr::Group(group) => group.addrs.iter().map(ToString::to_string).collect(),
            })
            .collect(),
        _ if value.trim().is_empty() => Vec::new(),
        _ => vec![value.trim().to_owned()],
    }
}

/// Convert mailparse headers to decoded tuples
fn to_tuples(headers: &[MailHeader<'_>]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|h| (h.get_key(), h.get_value()))
        .collect()
}

/// Convert header tuples to case-insensitive map
///
/// Returns first value for each header key (case-insensitive).
fn to_header_map(headers: &[(String, String)]) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for (k, v) in headers {
        let key = k.to_ascii_lowercase();
        map.entry(key).or_insert_with(|| v.clone());
    }
    map
}

/// Truncate string to maximum characters (Unicode-aware)
///
/// Preserves complete characters, never splitting multi-byte sequences.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    input.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Datelike};

    use super::{NO_CONTENT, parse_summary, readable_body, truncate_chars};

    #[test]
    fn truncates_unicode_by_character() {
        let out = truncate_chars("a😀b😀c", 4);
        assert_eq!(out, "a😀b😀");
    }

    #[test]
    fn parses_simple_plain_text_message() {
        let raw = b"From: Boss <boss@company.com>\r\nTo: me@example.com, Team <team@example.com>\r\nCc: cc@example.com\r\nSubject: Hi\r\nMessage-ID: <abc@company.com>\r\nDate: Wed, 1 Mar 2023 10:00:00 +0000\r\n\r\nHello there";
        let summary = parse_summary(7, raw, None).expect("parse should succeed");

        assert_eq!(summary.uid, 7);
        assert_eq!(summary.subject, "Hi");
        assert_eq!(summary.sender, "Boss <boss@company.com>");
        assert_eq!(summary.recipients.len(), 3);
        assert!(summary.recipients[0].contains("me@example.com"));
        assert!(summary.recipients[2].contains("cc@example.com"));
        assert_eq!(summary.body_text, "Hello there");
        assert_eq!(summary.message_id.as_deref(), Some("<abc@company.com>"));
        let date = summary.date.expect("date header parsed");
        assert_eq!((date.year(), date.month(), date.day()), (2023, 3, 1));
        assert_eq!(summary.raw, raw.to_vec());
    }

    #[test]
    fn internal_date_wins_over_date_header() {
        let raw = b"From: a@example.com\r\nDate: Wed, 1 Mar 2023 10:00:00 +0000\r\n\r\nBody";
        let internal = DateTime::parse_from_rfc3339("2023-03-05T08:00:00+01:00").unwrap();
        let summary = parse_summary(1, raw, Some(internal)).expect("parse");
        assert_eq!(summary.date, Some(internal));
        assert_eq!(
            summary.date_header.as_deref(),
            Some("Wed, 1 Mar 2023 10:00:00 +0000")
        );
    }

    #[test]
    fn html_only_message_is_converted_to_text() {
        let raw = b"From: a@example.com\r\nSubject: News\r\nContent-Type: text/html; charset=utf-8\r\n\r\n<html><body><p>Quarterly <b>update</b></p></body></html>";
        let summary = parse_summary(2, raw, None).expect("parse");
        assert!(summary.body_text.contains("Quarterly"));
        assert!(summary.body_text.contains("update"));
        assert!(!summary.body_text.contains("<p>"));
        assert!(summary.body_html.is_some());
    }

    #[test]
    fn multipart_skips_attachments() {
        let raw = concat!(
            "From: a@example.com\r\n",
            "Subject: Report\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=\"XX\"\r\n",
            "\r\n",
            "--XX\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "See attached\r\n",
            "--XX\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: attachment; filename=\"notes.txt\"\r\n",
            "\r\n",
            "secret notes\r\n",
            "--XX--\r\n"
        );
        let summary = parse_summary(3, raw.as_bytes(), None).expect("parse");
        assert_eq!(summary.body_text, "See attached");
    }

    #[test]
    fn empty_message_reads_no_content() {
        assert_eq!(readable_body(Some("  "), None), NO_CONTENT);
    }

    #[test]
    fn decodes_encoded_word_subject() {
        let raw = b"From: a@example.com\r\nSubject: =?UTF-8?B?R3LDvMOfZQ==?=\r\n\r\nx";
        let summary = parse_summary(4, raw, None).expect("parse");
        assert_eq!(summary.subject, "Grüße");
    }
}
