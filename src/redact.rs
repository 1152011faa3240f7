//! Email address redaction for privacy mode
//!
//! Every email-shaped token (`local@domain`) keeps the first and last
//! character of its local part and its domain; everything in between becomes
//! [`MASK_CHAR`]. Local parts shorter than three characters are masked
//! completely, keeping only their length. Letters and digits from any script
//! count, and a domain may be a single label (`root@localhost`). A
//! whitespace-delimited token whose `@` signs are not all explained by
//! recognised addresses is masked wholesale. Masking maps local-part
//! characters to local-part characters and removes unexplained `@` signs, so
//! a second pass changes nothing.

use regex::Regex;
use regex::bytes::Regex as BytesRegex;

use crate::errors::{AppError, AppResult};
use crate::models::MessageSummary;

/// Replacement for masked characters
pub const MASK_CHAR: char = '-';

/// Local parts shorter than this are masked completely
const MIN_PARTIAL_LOCAL_LEN: usize = 3;

const EMAIL_PATTERN: &str = r"(?P<local>[\p{L}\p{N}._%+\-]+)@(?P<domain>[\p{L}\p{N}](?:[\p{L}\p{N}\-]*[\p{L}\p{N}])?(?:\.[\p{L}\p{N}](?:[\p{L}\p{N}\-]*[\p{L}\p{N}])?)*)";

/// Any whitespace-delimited token carrying an `@`
const AT_TOKEN_PATTERN: &str = r"\S*@\S*";

/// Headers whose values are address lists
const ADDRESS_HEADERS: [&str; 7] = [
    "from", "to", "cc", "bcc", "reply-to", "sender", "return-path",
];

/// Headers replaced when a raw message is flattened
const FLATTENED_HEADERS: [&str; 3] = ["content-type", "content-transfer-encoding", "mime-version"];

/// Mask the local part of an address
pub fn mask_local_part(local: &str) -> String {
    let chars: Vec<char> = local.chars().collect();
    if chars.len() < MIN_PARTIAL_LOCAL_LEN {
        return MASK_CHAR.to_string().repeat(chars.len());
    }
    let mut out = String::with_capacity(local.len());
    out.push(chars[0]);
    out.extend(std::iter::repeat_n(MASK_CHAR, chars.len() - 2));
    out.push(chars[chars.len() - 1]);
    out
}

/// Address masker for text, headers and raw message bytes
#[derive(Debug, Clone)]
pub struct Redactor {
    email: Regex,
    email_bytes: BytesRegex,
    at_token: Regex,
}

impl Redactor {
    /// # Errors
    ///
    /// Returns `Internal` if the address pattern fails to compile.
    pub fn new() -> AppResult<Self> {
        let email = Regex::new(EMAIL_PATTERN)
            .map_err(|e| AppError::Internal(format!("invalid email regex: {e}")))?;
        let email_bytes = BytesRegex::new(EMAIL_PATTERN)
            .map_err(|e| AppError::Internal(format!("invalid email regex: {e}")))?;
        let at_token = Regex::new(AT_TOKEN_PATTERN)
            .map_err(|e| AppError::Internal(format!("invalid token regex: {e}")))?;
        Ok(Self {
            email,
            email_bytes,
            at_token,
        })
    }

    /// Mask every address in free text
    ///
    /// Tokens with an `@` that no recognised address explains are masked
    /// wholesale.
    pub fn redact_text(&self, text: &str) -> String {
        self.at_token
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let token = &caps[0];
                if token.matches('@').count() > self.email.find_iter(token).count() {
                    mask_whole(token)
                } else {
                    self.mask_addresses(token)
                }
            })
            .into_owned()
    }

    fn mask_addresses(&self, text: &str) -> String {
        self.email
            .replace_all(text, |caps: &regex::Captures<'_>| {
                format!("{}@{}", mask_local_part(&caps["local"]), &caps["domain"])
            })
            .into_owned()
    }

    /// Mask an address-list field, masking it wholesale when it contains an
    /// `@` that is not part of a recognisable address
    pub fn redact_address_field(&self, value: &str) -> String {
        let recognised = self.email.find_iter(value).count();
        let ats = value.matches('@').count();
        if ats > recognised {
            return mask_whole(value);
        }
        self.redact_text(value)
    }

    /// Return `message` with every representation masked
    ///
    /// When `privacy` is false the message is returned unchanged.
    pub fn redact(&self, message: MessageSummary, privacy: bool) -> MessageSummary {
        if !privacy {
            return message;
        }

        let headers: Vec<(String, String)> = message
            .headers
            .iter()
            .map(|(k, v)| {
                let value = if is_address_header(k) {
                    self.redact_address_field(v)
                } else {
                    self.redact_text(v)
                };
                (k.clone(), value)
            })
            .collect();
        let body_text = self.redact_text(&message.body_text);
        let raw = self.redact_raw(&message.raw, &headers, &body_text);

        MessageSummary {
            uid: message.uid,
            sender: self.redact_address_field(&message.sender),
            recipients: message
                .recipients
                .iter()
                .map(|r| self.redact_address_field(r))
                .collect(),
            subject: self.redact_text(&message.subject),
            date: message.date,
            date_header: message.date_header,
            message_id: message.message_id.as_deref().map(|v| self.redact_text(v)),
            body_html: message.body_html.as_deref().map(|v| self.redact_text(v)),
            headers,
            body_text,
            raw,
        }
    }

    /// Mask addresses in the raw RFC822 source
    ///
    /// Bytes are masked in place when every address is visible in the source.
    /// Messages with transfer-encoded parts, encoded-word headers or an `@`
    /// that survives masking are flattened into a single text/plain message
    /// built from the already-redacted headers and body.
    fn redact_raw(&self, raw: &[u8], headers: &[(String, String)], body_text: &str) -> Vec<u8> {
        if is_transparent(raw) {
            let masked = self
                .email_bytes
                .replace_all(raw, |caps: &regex::bytes::Captures<'_>| {
                    let local = String::from_utf8_lossy(&caps["local"]);
                    let mut out = mask_local_part(&local).into_bytes();
                    out.push(b'@');
                    out.extend_from_slice(&caps["domain"]);
                    out
                })
                .into_owned();
            if self.stray_at_count(&masked) == 0 {
                return masked;
            }
        }
        tracing::debug!("flattening raw message for redaction");
        flatten(headers, body_text)
    }

    /// `@` bytes that are not part of a recognised address
    fn stray_at_count(&self, raw: &[u8]) -> usize {
        let ats = raw.iter().filter(|b| **b == b'@').count();
        ats.saturating_sub(self.email_bytes.find_iter(raw).count())
    }
}

fn is_address_header(key: &str) -> bool {
    ADDRESS_HEADERS.contains(&key.to_ascii_lowercase().as_str())
}

/// Replace every non-whitespace character with the mask
fn mask_whole(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_whitespace() { c } else { MASK_CHAR })
        .collect()
}

/// Whether every address in `raw` appears literally in the source
///
/// Sources that are not UTF-8 are never transparent: a legacy 8-bit charset
/// can hide letters of a local part from the pattern.
fn is_transparent(raw: &[u8]) -> bool {
    if std::str::from_utf8(raw).is_err() {
        return false;
    }
    let Ok(parsed) = mailparse::parse_mail(raw) else {
        return false;
    };
    if parsed
        .headers
        .iter()
        .any(|h| String::from_utf8_lossy(h.get_value_raw()).contains("=?"))
    {
        return false;
    }
    !has_encoded_part(&parsed)
}

fn has_encoded_part(part: &mailparse::ParsedMail<'_>) -> bool {
    let encoded = part
        .headers
        .iter()
        .filter(|h| h.get_key().eq_ignore_ascii_case("content-transfer-encoding"))
        .any(|h| {
            let value = h.get_value().trim().to_ascii_lowercase();
            value == "base64" || value == "quoted-printable"
        });
    encoded || part.subparts.iter().any(has_encoded_part)
}

/// Rebuild a single-part message from redacted headers and body
fn flatten(headers: &[(String, String)], body_text: &str) -> Vec<u8> {
    let mut out = String::new();
    for (key, value) in headers {
        if FLATTENED_HEADERS.contains(&key.to_ascii_lowercase().as_str()) {
            continue;
        }
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&value.replace(['\r', '\n'], " "));
        out.push_str("\r\n");
    }
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    out.push_str("Content-Transfer-Encoding: 8bit\r\n");
    out.push_str("\r\n");
    out.push_str(&body_text.replace("\r\n", "\n").replace('\n', "\r\n"));
    out.push_str("\r\n");
    out.into_bytes()
}
