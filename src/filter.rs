//! Message filter engine
//!
//! Selects a folder, narrows candidates server-side by date where possible,
//! then fetches each candidate and applies the local predicates. All active
//! criteria must pass (AND across categories, AND across keyword tokens).

use crate::errors::{AppError, AppResult};
use crate::imap::MailSession;
use crate::models::{Criterion, FolderHandle, MatchResult, MessageSummary, SearchCriteria};
use crate::observer::RunObserver;

/// Search cursor over one folder
///
/// Only the candidate UIDs are held; messages are fetched one at a time as
/// [`FolderScan::next_match`] advances, in the server's native order.
#[derive(Debug)]
pub struct FolderScan<'a> {
    folder: &'a FolderHandle,
    criteria: &'a SearchCriteria,
    pending: std::vec::IntoIter<u32>,
    candidates: usize,
    skipped_messages: usize,
    matches: usize,
}

impl<'a> FolderScan<'a> {
    /// Select `folder` and list its candidates, narrowed by date on the server
    ///
    /// # Errors
    ///
    /// - `Search` if the folder cannot be selected or its UIDs cannot be listed
    pub async fn open<S: MailSession>(
        session: &mut S,
        folder: &'a FolderHandle,
        criteria: &'a SearchCriteria,
        observer: &dyn RunObserver,
    ) -> AppResult<Self> {
        session
            .select_folder(&folder.name)
            .await
            .map_err(|e| search_error(folder, e))?;

        let uids = session
            .search_message_ids(criteria.start_date, criteria.end_date)
            .await
            .map_err(|e| search_error(folder, e))?;
        observer.folder_started(&folder.display_name, uids.len());

        Ok(Self {
            folder,
            criteria,
            candidates: uids.len(),
            pending: uids.into_iter(),
            skipped_messages: 0,
            matches: 0,
        })
    }

    /// Fetch candidates until the next one passes every predicate
    ///
    /// Messages that fail to fetch are reported through `observer` and
    /// skipped. Returns `None` once the folder is exhausted.
    pub async fn next_match<S: MailSession>(
        &mut self,
        session: &mut S,
        observer: &dyn RunObserver,
    ) -> Option<MatchResult> {
        for uid in self.pending.by_ref() {
            let summary = match session.fetch_summary(uid).await {
                Ok(summary) => summary,
                Err(err) => {
                    observer.message_skipped(&self.folder.display_name, uid, &err.to_string());
                    self.skipped_messages += 1;
                    continue;
                }
            };

            if let Some(matched) = evaluate(self.criteria, &summary) {
                self.matches += 1;
                return Some(MatchResult {
                    folder: self.folder.display_name.clone(),
                    summary,
                    matched,
                });
            }
        }

        tracing::debug!(
            folder = %self.folder.display_name,
            candidates = self.candidates,
            matches = self.matches,
            "folder searched"
        );
        None
    }

    /// Candidate count after server-side narrowing
    pub fn candidates(&self) -> usize {
        self.candidates
    }

    /// Candidates that could not be fetched or parsed so far
    pub fn skipped_messages(&self) -> usize {
        self.skipped_messages
    }
}

fn search_error(folder: &FolderHandle, err: AppError) -> AppError {
    match err {
        AppError::Search { .. } => err,
        other => AppError::Search {
            folder: folder.display_name.clone(),
            reason: other.to_string(),
        },
    }
}

/// Apply every active predicate to a message
///
/// Returns the satisfied criteria when all active ones pass, `None`
/// otherwise. With no active criteria every message matches with an empty
/// set.
pub fn evaluate(criteria: &SearchCriteria, message: &MessageSummary) -> Option<Vec<Criterion>> {
    let cs = criteria.case_sensitive;
    let mut matched = Vec::new();

    if let Some(sender) = criteria.sender.as_deref() {
        if !contains(&message.sender, sender, cs) {
            return None;
        }
        matched.push(Criterion::Sender);
    }

    if let Some(recipient) = criteria.recipient.as_deref() {
        if !message
            .recipients
            .iter()
            .any(|r| contains(r, recipient, cs))
        {
            return None;
        }
        matched.push(Criterion::Recipient);
    }

    if !criteria.keywords.is_empty() {
        let all_present = criteria.keywords.iter().all(|token| {
            contains(&message.subject, token, cs) || contains(&message.body_text, token, cs)
        });
        if !all_present {
            return None;
        }
        matched.push(Criterion::Keywords);
    }

    if criteria.has_date_range() {
        if !in_date_range(criteria, message) {
            return None;
        }
        matched.push(Criterion::DateRange);
    }

    Some(matched)
}

/// Inclusive date-range check on the received date
///
/// A message without any date never satisfies an active range.
fn in_date_range(criteria: &SearchCriteria, message: &MessageSummary) -> bool {
    let Some(date) = message.date.map(|d| d.date_naive()) else {
        return false;
    };
    criteria.start_date.is_none_or(|start| date >= start)
        && criteria.end_date.is_none_or(|end| date <= end)
}

/// Substring test under the configured case sensitivity
fn contains(haystack: &str, needle: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        haystack.contains(needle)
    } else {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{FolderScan, evaluate};
    use crate::models::{Criterion, FolderHandle, SearchCriteria};
    use crate::observer::RecordingObserver;
    use crate::test_support::{FakeMailbox, FakeSession, message};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_criteria_match_everything() {
        let msg = message(1, "a@example.com", "b@example.com", "Anything", "2020-01-01");
        assert_eq!(evaluate(&SearchCriteria::default(), &msg), Some(vec![]));
    }

    #[test]
    fn keywords_use_and_semantics_and_respect_case() {
        let msg = message(
            1,
            "a@example.com",
            "b@example.com",
            "Re: Urgent Project Update",
            "2023-05-01",
        );
        let mut criteria = SearchCriteria {
            keywords: vec!["urgent".to_owned(), "project".to_owned()],
            ..SearchCriteria::default()
        };
        assert_eq!(evaluate(&criteria, &msg), Some(vec![Criterion::Keywords]));

        criteria.case_sensitive = true;
        assert_eq!(evaluate(&criteria, &msg), None);

        criteria.case_sensitive = false;
        criteria.keywords.push("budget".to_owned());
        assert_eq!(evaluate(&criteria, &msg), None);
    }

    #[test]
    fn keyword_may_match_body_while_another_matches_subject() {
        let mut msg = message(1, "a@example.com", "b@example.com", "Invoice", "2023-05-01");
        msg.body_text = "Please settle by Friday".to_owned();
        let criteria = SearchCriteria {
            keywords: vec!["invoice".to_owned(), "friday".to_owned()],
            ..SearchCriteria::default()
        };
        assert!(evaluate(&criteria, &msg).is_some());
    }

    #[test]
    fn recipient_matches_any_of_to_cc_bcc() {
        let mut msg = message(1, "a@example.com", "to@example.com", "Hi", "2023-05-01");
        msg.recipients.push("Client <client@corp.com>".to_owned());
        let criteria = SearchCriteria {
            recipient: Some("CLIENT@corp".to_owned()),
            ..SearchCriteria::default()
        };
        assert_eq!(evaluate(&criteria, &msg), Some(vec![Criterion::Recipient]));
    }

    #[test]
    fn date_range_is_inclusive_and_open_ended() {
        let criteria = SearchCriteria {
            start_date: Some(ymd(2023, 1, 1)),
            end_date: Some(ymd(2023, 12, 31)),
            ..SearchCriteria::default()
        };
        let first = message(1, "a@x.com", "b@x.com", "s", "2023-01-01");
        let last = message(2, "a@x.com", "b@x.com", "s", "2023-12-31");
        let after = message(3, "a@x.com", "b@x.com", "s", "2024-01-01");
        assert!(evaluate(&criteria, &first).is_some());
        assert!(evaluate(&criteria, &last).is_some());
        assert!(evaluate(&criteria, &after).is_none());

        let open_start = SearchCriteria {
            end_date: Some(ymd(2023, 6, 30)),
            ..SearchCriteria::default()
        };
        let old = message(4, "a@x.com", "b@x.com", "s", "1999-01-01");
        assert!(evaluate(&open_start, &old).is_some());
    }

    #[test]
    fn undated_message_fails_active_date_range() {
        let mut msg = message(1, "a@x.com", "b@x.com", "s", "2023-01-01");
        msg.date = None;
        let criteria = SearchCriteria {
            start_date: Some(ymd(2000, 1, 1)),
            ..SearchCriteria::default()
        };
        assert!(evaluate(&criteria, &msg).is_none());
        assert!(evaluate(&SearchCriteria::default(), &msg).is_some());
    }

    #[tokio::test]
    async fn search_keeps_server_order_and_skips_unfetchable() {
        let mailbox = FakeMailbox::default()
            .message("INBOX", message(3, "boss@company.com", "me@x.com", "c", "2023-03-01"))
            .message("INBOX", message(1, "boss@company.com", "me@x.com", "a", "2023-01-01"))
            .message("INBOX", message(2, "other@x.com", "me@x.com", "b", "2023-02-01"))
            .broken_message("INBOX", 4);
        let mut session = FakeSession::new(mailbox);
        let observer = RecordingObserver::default();
        let criteria = SearchCriteria {
            sender: Some("boss@company.com".to_owned()),
            ..SearchCriteria::default()
        };

        let inbox = FolderHandle::inbox();
        let mut scan = FolderScan::open(&mut session, &inbox, &criteria, &observer)
            .await
            .expect("search succeeds");

        let mut uids = Vec::new();
        while let Some(found) = scan.next_match(&mut session, &observer).await {
            uids.push(found.summary.uid);
        }
        assert_eq!(uids, vec![1, 3]);
        assert_eq!(scan.candidates(), 4);
        assert_eq!(scan.skipped_messages(), 1);
        assert_eq!(observer.skipped_messages().len(), 1);
    }

    #[tokio::test]
    async fn scan_fetches_only_up_to_the_match_it_returns() {
        let mailbox = FakeMailbox::default()
            .message("INBOX", message(1, "boss@company.com", "me@x.com", "a", "2023-01-01"))
            .message("INBOX", message(2, "boss@company.com", "me@x.com", "b", "2023-02-01"))
            .broken_message("INBOX", 3);
        let mut session = FakeSession::new(mailbox);
        let observer = RecordingObserver::default();
        let criteria = SearchCriteria::default();

        let inbox = FolderHandle::inbox();
        let mut scan = FolderScan::open(&mut session, &inbox, &criteria, &observer)
            .await
            .expect("search succeeds");
        let first = scan.next_match(&mut session, &observer).await.expect("a match");

        assert_eq!(first.summary.uid, 1);
        assert_eq!(scan.skipped_messages(), 0);
        assert!(observer.skipped_messages().is_empty());
    }

    #[test]
    fn sender_case_follows_the_case_sensitive_flag() {
        let msg = message(1, "boss@company.com", "me@x.com", "Hi", "2023-05-01");
        let mut criteria = SearchCriteria {
            sender: Some("BOSS@".to_owned()),
            ..SearchCriteria::default()
        };
        assert_eq!(evaluate(&criteria, &msg), Some(vec![Criterion::Sender]));

        criteria.case_sensitive = true;
        assert_eq!(evaluate(&criteria, &msg), None);

        criteria.sender = Some("boss@".to_owned());
        assert_eq!(evaluate(&criteria, &msg), Some(vec![Criterion::Sender]));
    }

    #[test]
    fn recipient_case_follows_the_case_sensitive_flag() {
        let msg = message(1, "a@x.com", "Client@Corp.com", "Hi", "2023-05-01");
        let criteria = SearchCriteria {
            recipient: Some("client@corp".to_owned()),
            case_sensitive: true,
            ..SearchCriteria::default()
        };
        assert_eq!(evaluate(&criteria, &msg), None);
        assert!(evaluate(&SearchCriteria { case_sensitive: false, ..criteria }, &msg).is_some());
    }

    #[tokio::test]
    async fn unselectable_folder_is_a_search_error() {
        let mailbox = FakeMailbox::default().folder("Broken", true).failing_select("Broken");
        let mut session = FakeSession::new(mailbox);
        let observer = RecordingObserver::default();
        let folder = FolderHandle {
            name: "Broken".to_owned(),
            display_name: "Broken".to_owned(),
            selectable: true,
        };

        let criteria = SearchCriteria::default();
        let err = FolderScan::open(&mut session, &folder, &criteria, &observer)
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("search failed in folder 'Broken'"));
    }
}
