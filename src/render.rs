//! Paginated document rendering
//!
//! [`DocumentRenderer`] is the contract the export writer renders through;
//! the concrete backend is chosen by `main`. [`PdfRenderer`] lays a message
//! out on fixed-size pages with the standard PDF Helvetica faces: a running
//! header with the subject, a metadata block, the body with automatic page
//! breaks, and a page-number footer.

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument};

use crate::errors::{AppError, AppResult};
use crate::mime::truncate_chars;
use crate::models::{MessageSummary, PageSize};

/// Layout options handed to a renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub page_size: PageSize,
    /// Margin on every side, in millimetres
    pub margin_mm: f32,
    /// Add a notice that addresses are redacted
    pub privacy_notice: bool,
}

impl RenderOptions {
    pub fn new(page_size: PageSize, privacy_notice: bool) -> Self {
        Self {
            page_size,
            margin_mm: 15.0,
            privacy_notice,
        }
    }
}

/// Renders a message into a paginated document
pub trait DocumentRenderer {
    /// File extension of produced documents, without the dot
    fn extension(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns `Render` if the backend fails; callers treat this as a
    /// per-message failure.
    fn render(&self, message: &MessageSummary, options: &RenderOptions) -> AppResult<Vec<u8>>;
}

/// Characters of the subject shown in the running header
const HEADER_SUBJECT_CHARS: usize = 50;
const PRIVACY_NOTICE: &str = "Privacy mode: email addresses in this document are redacted.";

/// Approximate Helvetica advance width as a fraction of the font size
const AVG_GLYPH_EM: f32 = 0.52;
const PT_TO_MM: f32 = 0.3528;
/// Space reserved at the top for the running header
const HEADER_BAND_MM: f32 = 15.0;
/// Space reserved at the bottom for the footer
const FOOTER_BAND_MM: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Regular,
    Bold,
    Italic,
}

#[derive(Debug, Clone, PartialEq)]
struct Line {
    text: String,
    face: Face,
    size_pt: f32,
    height_mm: f32,
}

impl Line {
    fn new(text: impl Into<String>, face: Face, size_pt: f32, height_mm: f32) -> Self {
        Self {
            text: text.into(),
            face,
            size_pt,
            height_mm,
        }
    }

    fn gap(height_mm: f32) -> Self {
        Self::new("", Face::Regular, 10.0, height_mm)
    }
}

/// A line positioned on a page (`y_mm` from the bottom edge)
#[derive(Debug, Clone, PartialEq)]
struct Placed {
    line: Line,
    y_mm: f32,
}

/// PDF backend using `printpdf` built-in fonts
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfRenderer;

impl DocumentRenderer for PdfRenderer {
    fn extension(&self) -> &'static str {
        "pdf"
    }

    fn render(&self, message: &MessageSummary, options: &RenderOptions) -> AppResult<Vec<u8>> {
        let (width, height) = options.page_size.dimensions_mm();
        let margin = options.margin_mm;
        let lines = layout_lines(message, options, width - 2.0 * margin);
        let pages = paginate(lines, height, margin);

        let header = running_header(&message.subject);
        let (doc, first_page, first_layer) =
            PdfDocument::new(winansi(&header), Mm(width), Mm(height), "Layer 1");
        let fonts = Fonts {
            regular: builtin_font(&doc, BuiltinFont::Helvetica)?,
            bold: builtin_font(&doc, BuiltinFont::HelveticaBold)?,
            italic: builtin_font(&doc, BuiltinFont::HelveticaOblique)?,
        };

        let mut first = Some((first_page, first_layer));
        for (index, placed) in pages.iter().enumerate() {
            let (page, layer) = match first.take() {
                Some(indices) => indices,
                None => doc.add_page(Mm(width), Mm(height), "Layer 1"),
            };
            let layer = doc.get_page(page).get_layer(layer);

            layer.use_text(winansi(&header), 12.0, Mm(margin), Mm(height - margin), &fonts.bold);
            for item in placed {
                if item.line.text.is_empty() {
                    continue;
                }
                layer.use_text(
                    winansi(&item.line.text),
                    item.line.size_pt,
                    Mm(margin),
                    Mm(item.y_mm),
                    fonts.get(item.line.face),
                );
            }
            layer.use_text(
                format!("Page {}", index + 1),
                8.0,
                Mm(width / 2.0 - 5.0),
                Mm(margin / 2.0),
                &fonts.italic,
            );
        }

        doc.save_to_bytes()
            .map_err(|e| AppError::Render(format!("failed to serialize PDF: {e:?}")))
    }
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

impl Fonts {
    fn get(&self, face: Face) -> &IndirectFontRef {
        match face {
            Face::Regular => &self.regular,
            Face::Bold => &self.bold,
            Face::Italic => &self.italic,
        }
    }
}

fn builtin_font(
    doc: &printpdf::PdfDocumentReference,
    font: BuiltinFont,
) -> AppResult<IndirectFontRef> {
    doc.add_builtin_font(font)
        .map_err(|e| AppError::Render(format!("failed to load built-in font: {e:?}")))
}

/// `Email: <subject>` with long subjects cut at 50 characters
fn running_header(subject: &str) -> String {
    if subject.chars().count() > HEADER_SUBJECT_CHARS {
        format!("Email: {}...", truncate_chars(subject, HEADER_SUBJECT_CHARS))
    } else {
        format!("Email: {subject}")
    }
}

/// Metadata block followed by the wrapped body
fn layout_lines(message: &MessageSummary, options: &RenderOptions, usable_mm: f32) -> Vec<Line> {
    let meta_chars = chars_per_line(usable_mm - 30.0, 10.0);
    let body_chars = chars_per_line(usable_mm, 10.0);

    let mut lines = vec![
        Line::new("Email Message", Face::Bold, 12.0, 8.0),
        Line::gap(3.0),
    ];
    if options.privacy_notice {
        lines.push(Line::new(PRIVACY_NOTICE, Face::Italic, 9.0, 6.0));
    }

    let date = message
        .date_header
        .clone()
        .or_else(|| message.date.map(|d| d.to_rfc2822()))
        .unwrap_or_default();
    let fields = [
        ("Date:", date),
        ("From:", message.sender.clone()),
        ("To:", message.recipients.join(", ")),
        ("Subject:", message.subject.clone()),
    ];
    for (label, value) in fields {
        for (i, chunk) in wrap(&value, meta_chars).into_iter().enumerate() {
            let text = if i == 0 {
                format!("{label:<10}{chunk}")
            } else {
                format!("{:<10}{chunk}", "")
            };
            lines.push(Line::new(text, Face::Regular, 10.0, 6.0));
        }
    }

    lines.push(Line::gap(5.0));
    lines.push(Line::new("Message Body:", Face::Bold, 10.0, 8.0));
    for chunk in wrap(&message.body_text, body_chars) {
        lines.push(Line::new(chunk, Face::Regular, 10.0, 5.0));
    }
    lines
}

/// Assign lines to pages, breaking when the next line would enter the footer
fn paginate(lines: Vec<Line>, page_height_mm: f32, margin_mm: f32) -> Vec<Vec<Placed>> {
    let top = page_height_mm - margin_mm - HEADER_BAND_MM;
    let bottom = margin_mm + FOOTER_BAND_MM;

    let mut pages = vec![Vec::new()];
    let mut y = top;
    for line in lines {
        if y - line.height_mm < bottom && pages.last().is_some_and(|p| !p.is_empty()) {
            pages.push(Vec::new());
            y = top;
        }
        y -= line.height_mm;
        if let Some(page) = pages.last_mut() {
            page.push(Placed { line, y_mm: y });
        }
    }
    pages
}

fn chars_per_line(width_mm: f32, size_pt: f32) -> usize {
    let glyph_mm = size_pt * AVG_GLYPH_EM * PT_TO_MM;
    ((width_mm / glyph_mm).floor() as usize).max(10)
}

/// Greedy word wrap; words longer than a line are split
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    for paragraph in text.replace('\t', "    ").lines() {
        let mut current = String::new();
        for word in paragraph.split(' ') {
            let mut word = word.to_owned();
            while word.chars().count() > max_chars {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                let head = truncate_chars(&word, max_chars);
                word = word.chars().skip(max_chars).collect();
                out.push(head);
            }
            let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
            if needed > max_chars && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        out.push(current);
    }
    if out.is_empty() {
        out.push(String::new());
    }
    out
}

/// Map text onto what the built-in fonts can show
///
/// Characters outside Latin-1 become `?`; control characters are dropped.
fn winansi(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control())
        .map(|c| if (c as u32) <= 0xFF { c } else { '?' })
        .collect()
}
