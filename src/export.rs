//! Export writer
//!
//! Produces the artifact triplet for one message: the raw RFC822 source, a
//! readable text (or sanitized HTML) file, and a rendered document. Each
//! artifact is written to a `.part` file and renamed into place, so a file
//! with a final name is always complete. Artifacts are independent: one
//! failing never stops its siblings from being attempted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, ArtifactKind};
use crate::mime::sanitize_html;
use crate::models::{ExportArtifactSet, ExportTarget, MessageSummary};
use crate::render::{DocumentRenderer, RenderOptions};

const RAW_EXTENSION: &str = "eml";
const TEXT_EXTENSION: &str = "txt";
const HTML_EXTENSION: &str = "html";
const PART_SUFFIX: &str = "part";

/// Result of writing one message
#[derive(Debug, Default)]
pub struct ExportOutcome {
    pub artifacts: ExportArtifactSet,
    /// One `Write` error per artifact that was not produced
    pub failures: Vec<AppError>,
}

/// Writes artifact sets through a document renderer
pub struct ArtifactWriter<'a> {
    renderer: &'a dyn DocumentRenderer,
    render_options: RenderOptions,
    keep_html: bool,
}

impl<'a> ArtifactWriter<'a> {
    pub fn new(
        renderer: &'a dyn DocumentRenderer,
        render_options: RenderOptions,
        keep_html: bool,
    ) -> Self {
        Self {
            renderer,
            render_options,
            keep_html,
        }
    }

    /// Write every artifact of `message` under `target`
    ///
    /// The target directory is created if missing. `message` is written as
    /// given; redaction happens before this point.
    pub fn write(&self, target: &ExportTarget, message: &MessageSummary) -> ExportOutcome {
        let mut outcome = ExportOutcome::default();

        if let Err(e) = fs::create_dir_all(&target.directory) {
            for (artifact, extension) in [
                (ArtifactKind::Raw, RAW_EXTENSION),
                (ArtifactKind::Text, TEXT_EXTENSION),
                (ArtifactKind::Document, self.renderer.extension()),
            ] {
                outcome.failures.push(AppError::Write {
                    artifact,
                    path: target.path_for(extension),
                    reason: format!("failed to create export directory: {e}"),
                });
            }
            return outcome;
        }

        let raw_path = target.path_for(RAW_EXTENSION);
        match write_atomic(&raw_path, &message.raw) {
            Ok(()) => outcome.artifacts.raw_message = Some(raw_path),
            Err(e) => outcome
                .failures
                .push(write_error(ArtifactKind::Raw, raw_path, e.to_string())),
        }

        let (text_path, text) = self.text_artifact(target, message);
        match write_atomic(&text_path, text.as_bytes()) {
            Ok(()) => outcome.artifacts.text = Some(text_path),
            Err(e) => outcome
                .failures
                .push(write_error(ArtifactKind::Text, text_path, e.to_string())),
        }

        let document_path = target.path_for(self.renderer.extension());
        let written = match self.renderer.render(message, &self.render_options) {
            Ok(bytes) => write_atomic(&document_path, &bytes).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match written {
            Ok(()) => outcome.artifacts.document = Some(document_path),
            Err(reason) => {
                outcome
                    .failures
                    .push(write_error(ArtifactKind::Document, document_path, reason));
            }
        }

        outcome
    }

    /// Path and content of the readable artifact
    fn text_artifact(&self, target: &ExportTarget, message: &MessageSummary) -> (PathBuf, String) {
        if self.keep_html
            && let Some(html) = message.body_html.as_deref()
        {
            return (target.path_for(HTML_EXTENSION), sanitize_html(html));
        }
        (target.path_for(TEXT_EXTENSION), plain_text(message))
    }
}

/// Header block followed by the readable body
fn plain_text(message: &MessageSummary) -> String {
    let date = message
        .date_header
        .clone()
        .or_else(|| message.date.map(|d| d.to_rfc2822()))
        .unwrap_or_default();
    format!(
        "Date: {date}\nFrom: {}\nTo: {}\nSubject: {}\n\n{}\n",
        message.sender,
        message.recipients.join(", "),
        message.subject,
        message.body_text
    )
}

fn write_error(artifact: ArtifactKind, path: PathBuf, reason: String) -> AppError {
    AppError::Write {
        artifact,
        path,
        reason,
    }
}

/// Write to `<path>.part`, then rename over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    commit_through_part(path, |tmp| fs::write(tmp, bytes))
}

/// Run `write` against the temp path and rename it into place
///
/// The temp file is removed whenever either step fails.
fn commit_through_part<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".");
    tmp.push(PART_SUFFIX);
    let tmp = PathBuf::from(tmp);

    let result = write(&tmp).and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
