//! Export path layout
//!
//! One directory per search invocation under the export root, named from
//! the invocation date and the non-empty criteria; one base file name per
//! message, named from its date, sender, recipient and subject. Every
//! segment is truncated first and then sanitized to `[A-Za-z0-9-]`, so no
//! separator or `..` segment can survive.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::mime::truncate_chars;
use crate::models::{ExportTarget, MatchResult, SearchCriteria};
use crate::redact::Redactor;

/// Characters of the subject kept in file names
pub const SUBJECT_CHARS: usize = 16;
/// Characters of sender and recipient kept in file names
pub const ADDRESS_CHARS: usize = 30;
/// Upper bound on a base file name, before counter and suffix
pub const MAX_BASE_LEN: usize = 200;

const UNDATED: &str = "undated";
const FALLBACK_BASE: &str = "message";

/// Replace non-alphanumeric characters with hyphens
///
/// Runs of hyphens collapse to one and leading/trailing hyphens are trimmed.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        let ch = if ch.is_ascii_alphanumeric() { ch } else { '-' };
        if ch == '-' && out.ends_with('-') {
            continue;
        }
        out.push(ch);
    }
    out.trim_matches('-').to_owned()
}

/// Directory and naming rules for one search invocation
#[derive(Debug, Clone)]
pub struct ExportLayout {
    directory: PathBuf,
    redacted: bool,
}

impl ExportLayout {
    /// Layout under `root` for the given invocation
    ///
    /// With `redactor` set (privacy mode), addresses in the sender and
    /// recipient criteria are masked before they become part of the
    /// directory name.
    pub fn new(
        root: &Path,
        invocation_date: NaiveDate,
        criteria: &SearchCriteria,
        redactor: Option<&Redactor>,
    ) -> Self {
        let mask = |v: &str| match redactor {
            Some(r) => r.redact_text(v),
            None => v.to_owned(),
        };

        let mut parts = vec![sanitize(&invocation_date.format("%Y-%m-%d").to_string())];
        if let Some(sender) = criteria.sender.as_deref() {
            parts.push(sanitize(&mask(sender)));
        }
        if let Some(recipient) = criteria.recipient.as_deref() {
            parts.push(sanitize(&mask(recipient)));
        }
        if !criteria.keywords.is_empty() {
            parts.push(sanitize(&criteria.keywords.join(" ")));
        }
        parts.retain(|p| !p.is_empty());

        Self {
            directory: root.join(parts.join("_")),
            redacted: redactor.is_some(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Target for a match, before collision resolution
    ///
    /// Pure: the same match always yields the same target.
    pub fn target_for(&self, result: &MatchResult) -> ExportTarget {
        ExportTarget {
            directory: self.directory.clone(),
            base_name: base_name(result),
            redacted: self.redacted,
        }
    }
}

/// `{date}_{sender}_{recipient}_{subject}`, empty segments omitted
fn base_name(result: &MatchResult) -> String {
    let message = &result.summary;
    let date = message
        .date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| UNDATED.to_owned());
    let recipient = message.recipients.first().map(String::as_str).unwrap_or("");

    let parts = [
        sanitize(&date),
        sanitize(&truncate_chars(&message.sender, ADDRESS_CHARS)),
        sanitize(&truncate_chars(recipient, ADDRESS_CHARS)),
        sanitize(&truncate_chars(&message.subject, SUBJECT_CHARS)),
    ];
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("_");

    let capped = truncate_chars(&joined, MAX_BASE_LEN);
    let capped = capped.trim_end_matches(['-', '_']);
    if capped.is_empty() {
        FALLBACK_BASE.to_owned()
    } else {
        capped.to_owned()
    }
}

/// Assigns collision-free base names within a run
///
/// The first claim of a name keeps it; later claims get `-2`, `-3`, ...
/// Names are compared case-insensitively so the layout is also
/// collision-free on case-insensitive file systems.
#[derive(Debug, Default)]
pub struct TargetAllocator {
    used: HashSet<(PathBuf, String)>,
}

impl TargetAllocator {
    pub fn allocate(&mut self, mut target: ExportTarget) -> ExportTarget {
        let base = target.base_name.clone();
        let mut counter = 1usize;
        loop {
            let key = (target.directory.clone(), target.base_name.to_ascii_lowercase());
            if self.used.insert(key) {
                return target;
            }
            counter += 1;
            target.base_name = format!("{base}-{counter}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Component, Path, PathBuf};

    use chrono::NaiveDate;

    use super::{ExportLayout, TargetAllocator, sanitize};
    use crate::models::{MatchResult, SearchCriteria};
    use crate::redact::Redactor;
    use crate::test_support::message;

    fn invocation() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn matched(uid: u32, from: &str, to: &str, subject: &str, date: &str) -> MatchResult {
        MatchResult {
            folder: "INBOX".to_owned(),
            summary: message(uid, from, to, subject, date),
            matched: vec![],
        }
    }

    fn plain_layout() -> ExportLayout {
        ExportLayout::new(Path::new("e"), invocation(), &SearchCriteria::default(), None)
    }

    #[test]
    fn sanitize_replaces_collapses_and_trims() {
        assert_eq!(sanitize("boss@company.com"), "boss-company-com");
        assert_eq!(sanitize("  Re: Hello!! "), "Re-Hello");
        assert_eq!(sanitize("../../etc/passwd"), "etc-passwd");
        assert_eq!(sanitize("Grüße"), "Gr-e");
        assert_eq!(sanitize("***"), "");
    }

    #[test]
    fn directory_combines_date_and_non_empty_criteria() {
        let criteria = SearchCriteria {
            sender: Some("boss@company.com".to_owned()),
            keywords: vec!["urgent".to_owned(), "project".to_owned()],
            ..SearchCriteria::default()
        };
        let layout = ExportLayout::new(Path::new("export"), invocation(), &criteria, None);
        assert_eq!(
            layout.directory(),
            Path::new("export/2024-05-01_boss-company-com_urgent-project")
        );
    }

    #[test]
    fn privacy_masks_criteria_in_directory_and_marks_targets() {
        let criteria = SearchCriteria {
            sender: Some("boss@company.com".to_owned()),
            ..SearchCriteria::default()
        };
        let redactor = Redactor::new().unwrap();
        let layout = ExportLayout::new(Path::new("out"), invocation(), &criteria, Some(&redactor));
        assert_eq!(
            layout.directory(),
            Path::new("out/2024-05-01_b-s-company-com")
        );

        let target = layout.target_for(&matched(1, "a@x.com", "b@x.com", "Hi", "2023-01-01"));
        assert!(target.redacted);
        assert!(target.file_name("eml").ends_with("-redacted.eml"));
    }

    #[test]
    fn base_name_truncates_before_sanitizing() {
        let layout = plain_layout();
        let target = layout.target_for(&matched(
            1,
            "boss@company.com",
            "client@company.com",
            "Quarterly results: final numbers",
            "2023-03-01",
        ));
        assert_eq!(
            target.base_name,
            "2023-03-01_boss-company-com_client-company-com_Quarterly-result"
        );
    }

    #[test]
    fn long_addresses_are_cut_at_thirty_characters() {
        let layout = plain_layout();
        let long = "a.very.long.sender.name@some-domain.example.com";
        let target = layout.target_for(&matched(1, long, "b@x.com", "", "2023-03-01"));
        assert_eq!(target.base_name, "2023-03-01_a-very-long-sender-name-some-d_b-x-com");
    }

    #[test]
    fn target_is_deterministic() {
        let layout = plain_layout();
        let m = matched(1, "a@x.com", "b@x.com", "Same", "2023-01-01");
        assert_eq!(layout.target_for(&m), layout.target_for(&m));
    }

    #[test]
    fn allocator_disambiguates_collisions() {
        let layout = plain_layout();
        let mut allocator = TargetAllocator::default();
        let mut claim = |uid, subject| {
            let m = matched(uid, "a@x.com", "b@x.com", subject, "2023-01-01");
            allocator.allocate(layout.target_for(&m))
        };
        let a = claim(1, "Same");
        let b = claim(2, "Same");
        let c = claim(3, "SAME");

        assert_eq!(a.base_name, "2023-01-01_a-x-com_b-x-com_Same");
        assert_eq!(b.base_name, "2023-01-01_a-x-com_b-x-com_Same-2");
        assert_eq!(c.base_name, "2023-01-01_a-x-com_b-x-com_SAME-3");
    }

    #[test]
    fn targets_never_escape_the_export_directory() {
        let criteria = SearchCriteria {
            sender: Some("../../..".to_owned()),
            recipient: Some("/etc/".to_owned()),
            ..SearchCriteria::default()
        };
        let root = PathBuf::from("export");
        let layout = ExportLayout::new(&root, invocation(), &criteria, None);
        let target = layout.target_for(&matched(1, "..", "../..", "/../x", "2023-01-01"));
        let path = target.path_for("eml");
        assert!(path.starts_with(&root));
        assert!(path.components().all(|c| !matches!(c, Component::ParentDir)));
        assert_eq!(path.components().count(), 3);
    }
}
