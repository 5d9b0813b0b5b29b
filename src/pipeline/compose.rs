//! Report composition: one fixed-layout A4 page via `lopdf`.
//!
//! ## Why spawn_blocking?
//!
//! Decoding the photo and serialising the document are CPU-bound and use
//! synchronous file I/O. `tokio::task::spawn_blocking` moves that work off
//! the async worker threads so other requests keep being served.
//!
//! ## Coordinates
//!
//! Layout positions are expressed top-down (y grows towards the bottom of
//! the page) and converted to PDF user space only when an operator is
//! emitted.
//!
//! ## Atomic output
//!
//! The document is serialised in memory, written to `<out>.tmp` and renamed
//! into place, so a reader never observes a half-written report.

use crate::auth::UserIdentity;
use crate::error::PipelineError;
use crate::pipeline::advise::AdvisoryBundle;
use crate::pipeline::photo::{prepare_photo, PreparedPhoto};
use crate::prompts::AdvisoryKind;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
/// Baseline offset below the top of a line, as a fraction of the font size.
const ASCENT: f32 = 0.75;
const LINE_SPACING: f32 = 1.2;

const TITLE_COLOR: Rgb = Rgb(0x2B, 0x54, 0x7E);
const LABEL_COLOR: Rgb = Rgb(0x00, 0x00, 0x00);
const VALUE_COLOR: Rgb = Rgb(0x44, 0x44, 0x44);
const FOOTER_COLOR: Rgb = Rgb(0x66, 0x66, 0x66);

const PHOTO_X: f32 = 400.0;
const PHOTO_Y: f32 = 120.0;
const PHOTO_RADIUS: f32 = 60.0;

const CONTACT_VALUE_X: f32 = 150.0;
const ADVISORY_VALUE_X: f32 = 200.0;
const ADVISORY_TOP: f32 = 285.0;
const LABEL_SIZE: f32 = 12.0;
const VALUE_SIZE: f32 = 10.0;
const BLOCK_GAP: f32 = 14.0;
const FOOTER_Y: f32 = 780.0;

/// Placeholder for absent identity fields and empty advisories.
pub const NOT_AVAILABLE: &str = "N/A";

/// What the composer produced.
#[derive(Debug, Clone, Serialize)]
pub struct ComposeReport {
    pub path: PathBuf,
    pub bytes: u64,
    /// `false` when the source photo was missing or undecodable.
    pub photo_embedded: bool,
    /// Advisory lines dropped to keep the report on one page.
    pub truncated_lines: usize,
}

/// Advisory blocks in print order. The beard block is only printed for
/// `gender == "Male"` (exact, case-sensitive).
pub fn advisory_order(gender: Option<&str>) -> Vec<AdvisoryKind> {
    let mut order = vec![
        AdvisoryKind::Acne,
        AdvisoryKind::Spectacles,
        AdvisoryKind::Hairstyle,
    ];
    if gender == Some("Male") {
        order.push(AdvisoryKind::Beard);
    }
    order.extend([AdvisoryKind::Skin, AdvisoryKind::Wrinkles]);
    order
}

/// Render the report for `identity` to `out`.
pub async fn compose_report(
    identity: &UserIdentity,
    image: &Path,
    bundle: &AdvisoryBundle,
    out: &Path,
) -> Result<ComposeReport, PipelineError> {
    let identity = identity.clone();
    let image = image.to_path_buf();
    let bundle = bundle.clone();
    let out_path = out.to_path_buf();

    tokio::task::spawn_blocking(move || compose_blocking(&identity, &image, &bundle, &out_path))
        .await
        .map_err(|e| PipelineError::DocumentWrite {
            path: out.to_path_buf(),
            detail: format!("compose task panicked: {e}"),
        })?
}

fn compose_blocking(
    identity: &UserIdentity,
    image: &Path,
    bundle: &AdvisoryBundle,
    out: &Path,
) -> Result<ComposeReport, PipelineError> {
    let write_err = |detail: String| PipelineError::DocumentWrite {
        path: out.to_path_buf(),
        detail,
    };

    let photo = load_photo(image);
    let photo_embedded = photo.is_some();
    let (bytes, truncated_lines) =
        render_document(identity, photo.as_ref(), bundle).map_err(|e| write_err(e.to_string()))?;

    let tmp = out.with_extension("pdf.tmp");
    std::fs::write(&tmp, &bytes).map_err(|e| write_err(e.to_string()))?;
    if let Err(e) = std::fs::rename(&tmp, out) {
        let _ = std::fs::remove_file(&tmp);
        return Err(write_err(e.to_string()));
    }

    info!(
        "Report written: {} ({} bytes, photo: {})",
        out.display(),
        bytes.len(),
        photo_embedded
    );
    Ok(ComposeReport {
        path: out.to_path_buf(),
        bytes: bytes.len() as u64,
        photo_embedded,
        truncated_lines,
    })
}

/// A missing or unreadable photo degrades the report, it never fails it.
fn load_photo(image: &Path) -> Option<PreparedPhoto> {
    if !image.exists() {
        warn!("Image not found at: {}", image.display());
        return None;
    }
    match prepare_photo(image) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!("Skipping photo {}: {}", image.display(), e);
            None
        }
    }
}

/// Build the whole document in memory. Returns the bytes and how many
/// advisory lines had to be dropped.
pub(crate) fn render_document(
    identity: &UserIdentity,
    photo: Option<&PreparedPhoto>,
    bundle: &AdvisoryBundle,
) -> Result<(Vec<u8>, usize), lopdf::Error> {
    let mut canvas = Canvas::default();

    // Title + rule
    canvas.text_centered(Font::Bold, 22.0, TITLE_COLOR, MARGIN, "User Report");
    canvas.rule(MARGIN, 550.0, 88.0, TITLE_COLOR);

    // Contact block
    canvas.text(Font::Bold, 14.0, LABEL_COLOR, 55.0, 105.0, "CONTACT INFORMATION:");
    let fields = [
        ("USERNAME:", identity.username.as_deref()),
        ("EMAIL:", identity.email.as_deref()),
    ];
    let mut y = 130.0;
    for (label, value) in fields {
        canvas.text(Font::Bold, 12.0, LABEL_COLOR, MARGIN, y, label);
        canvas.text(
            Font::Regular,
            12.0,
            VALUE_COLOR,
            CONTACT_VALUE_X,
            y,
            or_placeholder(value),
        );
        y += 12.0 * LINE_SPACING + 4.0;
    }

    // Photo
    if let Some(p) = photo {
        canvas.circular_image("Im1", PHOTO_X, PHOTO_Y, PHOTO_RADIUS);
        debug!("Embedding photo {}x{}", p.width, p.height);
    }

    // Advisory blocks
    canvas.text(Font::Bold, 14.0, LABEL_COLOR, MARGIN, 250.0, "CLASSES:");
    let order = advisory_order(identity.gender.as_deref());
    let value_width = PAGE_WIDTH - MARGIN - ADVISORY_VALUE_X;
    let value_line = VALUE_SIZE * LINE_SPACING;
    let label_line = LABEL_SIZE * LINE_SPACING;
    let bottom = FOOTER_Y - BLOCK_GAP;
    let mut y = ADVISORY_TOP;
    let mut truncated = 0usize;

    for (i, kind) in order.iter().enumerate() {
        let text = or_placeholder(Some(bundle.get(*kind)));
        let mut lines = wrap_text(text, Font::Regular, VALUE_SIZE, value_width);

        // Fair share of what is left, recomputed per block so unused space carries over.
        let blocks_left = (order.len() - i) as f32;
        let share = ((bottom - y) / blocks_left - BLOCK_GAP).max(label_line);
        let max_lines = ((share / value_line).floor() as usize).max(1);
        if lines.len() > max_lines {
            truncated += lines.len() - max_lines;
            lines.truncate(max_lines);
            if let Some(last) = lines.last_mut() {
                last.push_str(" …");
            }
        }

        canvas.text(Font::Bold, LABEL_SIZE, LABEL_COLOR, MARGIN, y, kind.report_label());
        for (n, line) in lines.iter().enumerate() {
            canvas.text(
                Font::Regular,
                VALUE_SIZE,
                VALUE_COLOR,
                ADVISORY_VALUE_X,
                y + n as f32 * value_line,
                line,
            );
        }
        let block_height = (lines.len() as f32 * value_line).max(label_line);
        y += block_height + BLOCK_GAP;
    }
    if truncated > 0 {
        warn!("Report full: dropped {} advisory lines", truncated);
    }

    // Footer
    canvas.text_centered(
        Font::Oblique,
        10.0,
        FOOTER_COLOR,
        FOOTER_Y,
        "Generated by AI System",
    );

    Ok((canvas.finish(photo)?, truncated))
}

fn or_placeholder(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => NOT_AVAILABLE,
    }
}

// ── Text measurement ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Oblique,
}

impl Font {
    fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Oblique => "F3",
        }
    }
}

/// Approximate Helvetica advance width of `s` in points.
fn text_width(s: &str, font: Font, size: f32) -> f32 {
    let bold = font == Font::Bold;
    let em: f32 = s
        .chars()
        .map(|c| match c {
            ' ' => 0.278,
            'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '!' | '|' => 0.25,
            'm' | 'w' => 0.8,
            'M' | 'W' => 0.9,
            'A'..='Z' if bold => 0.72,
            'A'..='Z' => 0.667,
            '0'..='9' => 0.556,
            _ if bold => 0.6,
            _ => 0.53,
        })
        .sum();
    em * size
}

/// Greedy word wrap; explicit newlines start a new line.
fn wrap_text(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut out = Vec::new();
    for para in text.lines() {
        let mut line = String::new();
        for word in para.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{line} {word}")
            };
            if text_width(&candidate, font, size) <= max_width || line.is_empty() {
                line = candidate;
            } else {
                out.push(std::mem::take(&mut line));
                line = word.to_string();
            }
        }
        out.push(line);
    }
    // Paragraph breaks survive as a single blank line, never leading or trailing.
    out.dedup_by(|a, b| a.is_empty() && b.is_empty());
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    while out.first().is_some_and(|l| l.is_empty()) {
        out.remove(0);
    }
    if out.is_empty() {
        out.push(NOT_AVAILABLE.to_string());
    }
    out
}

/// Encode text for the base-14 fonts' WinAnsiEncoding. Unmappable
/// characters become `?`.
fn win_ansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7E}' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '\t' => b' ',
            _ => b'?',
        })
        .collect()
}

// ── Drawing ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Rgb(u8, u8, u8);

impl Rgb {
    fn operands(&self) -> Vec<Object> {
        [self.0, self.1, self.2]
            .iter()
            .map(|c| real(*c as f32 / 255.0))
            .collect()
    }
}

fn real(v: f32) -> Object {
    Object::Real(v.into())
}

#[derive(Default)]
struct Canvas {
    ops: Vec<Operation>,
}

impl Canvas {
    /// Text whose top edge sits at `y` (top-down).
    fn text(&mut self, font: Font, size: f32, color: Rgb, x: f32, y: f32, s: &str) {
        let baseline = PAGE_HEIGHT - y - size * ASCENT;
        self.ops.push(Operation::new("BT", vec![]));
        self.ops
            .push(Operation::new("Tf", vec![font.resource().into(), real(size)]));
        self.ops.push(Operation::new("rg", color.operands()));
        self.ops
            .push(Operation::new("Td", vec![real(x), real(baseline)]));
        self.ops
            .push(Operation::new("Tj", vec![Object::string_literal(win_ansi(s))]));
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn text_centered(&mut self, font: Font, size: f32, color: Rgb, y: f32, s: &str) {
        let width = text_width(s, font, size);
        let x = MARGIN + ((PAGE_WIDTH - 2.0 * MARGIN) - width).max(0.0) / 2.0;
        self.text(font, size, color, x, y, s);
    }

    fn rule(&mut self, x1: f32, x2: f32, y: f32, color: Rgb) {
        let py = PAGE_HEIGHT - y;
        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new("RG", color.operands()));
        self.ops.push(Operation::new("w", vec![real(1.0)]));
        self.ops.push(Operation::new("m", vec![real(x1), real(py)]));
        self.ops.push(Operation::new("l", vec![real(x2), real(py)]));
        self.ops.push(Operation::new("S", vec![]));
        self.ops.push(Operation::new("Q", vec![]));
    }

    /// Four-Bézier circle path around (`cx`, `cy`) in PDF space.
    fn circle_path(&mut self, cx: f32, cy: f32, r: f32) {
        let k = 0.552_284_8 * r;
        let c = |a: [f32; 6]| Operation::new("c", a.iter().map(|v| real(*v)).collect());
        self.ops.push(Operation::new("m", vec![real(cx + r), real(cy)]));
        self.ops.push(c([cx + r, cy + k, cx + k, cy + r, cx, cy + r]));
        self.ops.push(c([cx - k, cy + r, cx - r, cy + k, cx - r, cy]));
        self.ops.push(c([cx - r, cy - k, cx - k, cy - r, cx, cy - r]));
        self.ops.push(c([cx + k, cy - r, cx + r, cy - k, cx + r, cy]));
        self.ops.push(Operation::new("h", vec![]));
    }

    /// Draw image XObject `name` clipped to a circle, then a 2 pt black border.
    /// (`x`, `y`) is the top-left of the bounding square (top-down).
    fn circular_image(&mut self, name: &str, x: f32, y: f32, r: f32) {
        let side = 2.0 * r;
        let cx = x + r;
        let cy = PAGE_HEIGHT - (y + r);

        self.ops.push(Operation::new("q", vec![]));
        self.circle_path(cx, cy, r);
        self.ops.push(Operation::new("W", vec![]));
        self.ops.push(Operation::new("n", vec![]));
        self.ops.push(Operation::new(
            "cm",
            vec![
                real(side),
                real(0.0),
                real(0.0),
                real(side),
                real(x),
                real(PAGE_HEIGHT - y - side),
            ],
        ));
        self.ops.push(Operation::new("Do", vec![name.into()]));
        self.ops.push(Operation::new("Q", vec![]));

        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new("RG", LABEL_COLOR.operands()));
        self.ops.push(Operation::new("w", vec![real(2.0)]));
        self.circle_path(cx, cy, r);
        self.ops.push(Operation::new("S", vec![]));
        self.ops.push(Operation::new("Q", vec![]));
    }

    fn finish(self, photo: Option<&PreparedPhoto>) -> Result<Vec<u8>, lopdf::Error> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font = |base: &str| {
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => base.to_string(),
                "Encoding" => "WinAnsiEncoding",
            }
        };
        let f1 = doc.add_object(font("Helvetica"));
        let f2 = doc.add_object(font("Helvetica-Bold"));
        let f3 = doc.add_object(font("Helvetica-Oblique"));

        let mut resources = dictionary! {
            "Font" => dictionary! { "F1" => f1, "F2" => f2, "F3" => f3 },
        };
        if let Some(p) = photo {
            let image = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => Object::Integer(p.width as i64),
                    "Height" => Object::Integer(p.height as i64),
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => Object::Integer(8),
                },
                p.rgb.clone(),
            );
            let image_id = doc.add_object(image);
            resources.set("XObject", dictionary! { "Im1" => image_id });
        }
        let resources_id = doc.add_object(resources);

        let content = Content {
            operations: self.ops,
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                real(PAGE_WIDTH),
                real(PAGE_HEIGHT),
            ],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => Object::Integer(1),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf)?;
        Ok(buf)
    }
}
