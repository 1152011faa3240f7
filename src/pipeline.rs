//! Search and export orchestration
//!
//! One run opens a single session and walks the selected folders in
//! enumeration order. Each match is redacted, named and written as soon as
//! it is fetched, so an interrupted run keeps everything exported so far.
//! Connection and folder-listing failures abort the run; everything else is
//! tallied in the [`RunSummary`] and the run continues.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::RunConfig;
use crate::connect::connect;
use crate::errors::AppResult;
use crate::export::ArtifactWriter;
use crate::filter::FolderScan;
use crate::folders::list_folders;
use crate::imap::{Connector, MailSession};
use crate::models::MatchResult;
use crate::observer::RunObserver;
use crate::paths::{ExportLayout, TargetAllocator};
use crate::redact::Redactor;
use crate::render::{DocumentRenderer, RenderOptions};

/// Exit status of a run that finished with some messages not fully exported
pub const EXIT_PARTIAL: i32 = 3;

/// Folder left out of the run, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFolder {
    pub folder: String,
    pub reason: String,
}

/// Per-run tally
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub export_directory: PathBuf,
    pub folders_searched: usize,
    pub skipped_folders: Vec<SkippedFolder>,
    /// Messages considered after server-side narrowing
    pub candidates: usize,
    /// Candidates that could not be fetched or parsed
    pub skipped_messages: usize,
    pub matched: usize,
    /// Matches dropped as copies of an earlier Message-ID
    pub duplicates: usize,
    /// Fetching stopped early at `max_results`
    pub limit_reached: bool,
    /// Messages with every artifact written
    pub exported: usize,
    /// Messages with at least one artifact missing
    pub partial: usize,
    pub failed_artifacts: usize,
}

impl RunSummary {
    /// Matches selected for export
    pub fn selected(&self) -> usize {
        self.exported + self.partial
    }

    /// 0 when complete, [`EXIT_PARTIAL`] when any message or artifact was lost
    pub fn exit_code(&self) -> i32 {
        if self.skipped_messages > 0 || self.failed_artifacts > 0 {
            EXIT_PARTIAL
        } else {
            0
        }
    }
}

/// Run one search-and-export pass
///
/// The session is logged out whether or not the pass succeeds.
///
/// # Errors
///
/// - `Connection` if no transport mode yields an authenticated session
/// - `FolderList` if all folders were requested and listing fails
/// - `Internal` if the redactor cannot be built
pub async fn run<C: Connector>(
    connector: &C,
    config: &RunConfig,
    renderer: &dyn DocumentRenderer,
    observer: &dyn RunObserver,
) -> AppResult<RunSummary> {
    let mut session = connect(connector, &config.connection, observer).await?;
    let result = search_and_export(&mut session, config, renderer, observer).await;
    if let Err(e) = session.logout().await {
        tracing::debug!(error = %e, "logout failed");
    }
    result
}

async fn search_and_export<S: MailSession>(
    session: &mut S,
    config: &RunConfig,
    renderer: &dyn DocumentRenderer,
    observer: &dyn RunObserver,
) -> AppResult<RunSummary> {
    let criteria = &config.criteria;
    let options = &config.options;
    let redactor = Redactor::new()?;
    let layout = ExportLayout::new(
        &options.export_root,
        options.invocation_date,
        criteria,
        options.privacy.then_some(&redactor),
    );
    let mut summary = RunSummary {
        export_directory: layout.directory().to_path_buf(),
        ..RunSummary::default()
    };

    let folders = list_folders(session, criteria.all_folders, observer).await?;
    let mut exporter = Exporter {
        redactor: &redactor,
        privacy: options.privacy,
        layout,
        writer: ArtifactWriter::new(
            renderer,
            RenderOptions::new(options.page_size, options.privacy),
            options.keep_html,
        ),
        allocator: TargetAllocator::default(),
    };
    let mut seen = HashSet::new();

    for folder in &folders {
        if summary.limit_reached {
            break;
        }
        let mut scan = match FolderScan::open(session, folder, criteria, observer).await {
            Ok(scan) => scan,
            Err(e) => {
                let reason = e.to_string();
                observer.folder_skipped(&folder.display_name, &reason);
                summary.skipped_folders.push(SkippedFolder {
                    folder: folder.display_name.clone(),
                    reason,
                });
                continue;
            }
        };
        summary.folders_searched += 1;

        while let Some(result) = scan.next_match(session, observer).await {
            summary.matched += 1;
            if criteria.all_folders && is_duplicate(&mut seen, &result, observer) {
                summary.duplicates += 1;
                continue;
            }
            exporter.export(result, &mut summary, observer);
            if options
                .max_results
                .is_some_and(|limit| summary.selected() >= limit)
            {
                summary.limit_reached = true;
                break;
            }
        }
        summary.candidates += scan.candidates();
        summary.skipped_messages += scan.skipped_messages();
    }

    tracing::info!(
        directory = %summary.export_directory.display(),
        skipped_folders = summary.skipped_folders.len(),
        failed_artifacts = summary.failed_artifacts,
        limit_reached = summary.limit_reached,
        "exported {}/{} messages",
        summary.exported,
        summary.selected()
    );
    Ok(summary)
}

/// Whether an earlier match carried the same Message-ID
///
/// Matches without a Message-ID are never duplicates.
fn is_duplicate(
    seen: &mut HashSet<String>,
    result: &MatchResult,
    observer: &dyn RunObserver,
) -> bool {
    let Some(id) = result.summary.message_id.as_deref() else {
        return false;
    };
    if seen.insert(id.to_owned()) {
        return false;
    }
    observer.message_skipped(
        &result.folder,
        result.summary.uid,
        &format!("duplicate of {id} already exported"),
    );
    true
}

/// Redacts, names and writes one match at a time
struct Exporter<'a> {
    redactor: &'a Redactor,
    privacy: bool,
    layout: ExportLayout,
    writer: ArtifactWriter<'a>,
    allocator: TargetAllocator,
}

impl Exporter<'_> {
    fn export(
        &mut self,
        result: MatchResult,
        summary: &mut RunSummary,
        observer: &dyn RunObserver,
    ) {
        let result = MatchResult {
            summary: self.redactor.redact(result.summary, self.privacy),
            ..result
        };
        let target = self.allocator.allocate(self.layout.target_for(&result));
        tracing::debug!(
            folder = %result.folder,
            uid = result.summary.uid,
            criteria = ?result.matched,
            base = %target.base_name,
            "writing match"
        );
        let outcome = self.writer.write(&target, &result.summary);

        for failure in &outcome.failures {
            observer.artifact_failed(&result.folder, result.summary.uid, failure);
        }
        if outcome.artifacts.written() > 0 {
            observer.message_exported(&result.folder, result.summary.uid, &outcome.artifacts);
        }
        if outcome.failures.is_empty() {
            summary.exported += 1;
        } else {
            summary.partial += 1;
            summary.failed_artifacts += outcome.failures.len();
        }
    }
}
