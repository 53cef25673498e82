//! # Typst Drawing Document
//!
//! Builds one Typst document for the whole sheet set (one page per sheet)
//! and compiles it without touching the filesystem. The page and raster
//! exporters share the compiled document.
//!
//! ## Summary marker
//!
//! Every page carries an invisible line of text describing what was drawn
//! on it:
//!
//! ```text
//! SUMMARY;sheet=A1.01;rooms=5;walls=14;openings=11;envelope=10200x8400;END
//! ```
//!
//! Counts come from the drawn primitives of the plan view, not from the
//! plan model, so reading the marker back checks the drawing itself. Sheets
//! without a floor plan carry `SUMMARY;sheet=A2.01;END`.

use std::fmt::Write as _;

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use typst::diag::{FileError, FileResult};
use typst::foundations::{Bytes, Datetime};
use typst::layout::PagedDocument;
use typst::syntax::{FileId, Source};
use typst::text::{Font, FontBook};
use typst::utils::LazyHash;
use typst::{Library, LibraryExt, World};

use crate::errors::{CdError, CdResult};
use crate::geometry::Bounds;
use crate::layers::Layer;
use crate::model::ProjectModel;
use crate::sheets::{PaperRect, Sheet, Viewport, MARGIN_MM, SCHEDULE_TITLE_MM};
use crate::views::{Primitive, View};

use super::verify::FormatSummary;

// ============================================================================
// Typst World Implementation
// ============================================================================

/// Bundled fonts, loaded once per process
static FONTS: Lazy<Vec<Font>> = Lazy::new(|| {
    typst_assets::fonts()
        .flat_map(|data| Font::iter(Bytes::new(data.to_vec())))
        .collect()
});

/// An in-memory Typst world for a single generated source
struct SheetWorld {
    main: Source,
    book: LazyHash<FontBook>,
    library: LazyHash<Library>,
    /// Issue date; `datetime.today()` never reads the clock
    today: Option<Datetime>,
}

impl SheetWorld {
    fn new(source: String, issue_date: chrono::NaiveDate) -> Self {
        SheetWorld {
            main: Source::detached(source),
            book: LazyHash::new(FontBook::from_fonts(FONTS.iter())),
            library: LazyHash::new(Library::default()),
            today: Datetime::from_ymd(issue_date.year(), issue_date.month() as u8, issue_date.day() as u8),
        }
    }
}

impl World for SheetWorld {
    fn library(&self) -> &LazyHash<Library> {
        &self.library
    }

    fn book(&self) -> &LazyHash<FontBook> {
        &self.book
    }

    fn main(&self) -> FileId {
        self.main.id()
    }

    fn source(&self, id: FileId) -> FileResult<Source> {
        if id == self.main.id() {
            Ok(self.main.clone())
        } else {
            Err(FileError::NotFound(id.vpath().as_rootless_path().into()))
        }
    }

    fn file(&self, id: FileId) -> FileResult<Bytes> {
        Err(FileError::NotFound(id.vpath().as_rootless_path().into()))
    }

    fn font(&self, index: usize) -> Option<Font> {
        FONTS.get(index).cloned()
    }

    fn today(&self, _offset: Option<i64>) -> Option<Datetime> {
        self.today
    }
}

/// Compile the sheet set to a paged document
pub(super) fn compile(model: &ProjectModel, format: &str) -> CdResult<PagedDocument> {
    let source = sheet_set_source(model);
    let world = SheetWorld::new(source, model.config.issue_date.unwrap_or_default());
    let warned = typst::compile::<PagedDocument>(&world);
    warned.output.map_err(|errors| {
        let msgs: Vec<String> = errors.iter().map(|e| e.message.to_string()).collect();
        CdError::export(format, format!("Typst compilation failed: {}", msgs.join("; ")))
    })
}

// ============================================================================
// Source builder
// ============================================================================

/// Quote a string as a Typst string literal
fn typst_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn pt(p: (f64, f64)) -> String {
    format!("({:.2}mm, {:.2}mm)", p.0, p.1)
}

struct Page<'a> {
    out: &'a mut String,
    width: f64,
    height: f64,
}

impl Page<'_> {
    fn line(&mut self, a: (f64, f64), b: (f64, f64), weight: f64) {
        let _ = writeln!(
            self.out,
            "#place(top + left, line(start: {}, end: {}, stroke: {:.2}mm))",
            pt(a),
            pt(b),
            weight
        );
    }

    fn polygon(&mut self, points: &[(f64, f64)], weight: f64) {
        let verts: Vec<String> = points.iter().map(|p| pt(*p)).collect();
        let _ = writeln!(
            self.out,
            "#place(top + left, polygon(stroke: {:.2}mm, {}))",
            weight,
            verts.join(", ")
        );
    }

    fn rect(&mut self, r: &PaperRect, weight: f64) {
        let _ = writeln!(
            self.out,
            "#place(top + left, dx: {:.2}mm, dy: {:.2}mm, rect(width: {:.2}mm, height: {:.2}mm, stroke: {:.2}mm))",
            r.x, r.y, r.w, r.h, weight
        );
    }

    fn centered_text(&mut self, at: (f64, f64), size: f64, text: &str) {
        let _ = writeln!(
            self.out,
            "#place(center + horizon, dx: {:.2}mm, dy: {:.2}mm, text(size: {:.2}mm, {}))",
            at.0 - self.width / 2.0,
            at.1 - self.height / 2.0,
            size,
            typst_str(text)
        );
    }

    fn label(&mut self, at: (f64, f64), size: f64, text: &str) {
        let _ = writeln!(
            self.out,
            "#place(top + left, dx: {:.2}mm, dy: {:.2}mm, text(size: {:.2}mm, {}))",
            at.0,
            at.1,
            size,
            typst_str(text)
        );
    }

    fn view(&mut self, view: &View, viewport: &Viewport) {
        let t = viewport.transform;
        for primitive in &view.primitives {
            let weight = primitive.layer().lineweight_mm();
            match primitive {
                Primitive::Line { from, to, .. } => self.line(t.apply(*from), t.apply(*to), weight),
                Primitive::Polyline { points, .. } => {
                    for pair in points.windows(2) {
                        self.line(t.apply(pair[0]), t.apply(pair[1]), weight);
                    }
                }
                Primitive::Polygon { points, .. } => {
                    let pts: Vec<_> = points.iter().map(|p| t.apply(*p)).collect();
                    self.polygon(&pts, weight);
                }
                Primitive::Text { at, text, size_mm, .. } => self.centered_text(t.apply(*at), *size_mm, text),
            }
        }
        let f = &viewport.frame;
        self.label((f.x, f.bottom() + 3.0), 3.5, &viewport.title);
    }
}

fn sheet_page(model: &ProjectModel, sheet: &Sheet, out: &mut String) {
    let _ = writeln!(
        out,
        "#page(width: {:.2}mm, height: {:.2}mm, margin: 0mm, fill: white)[",
        sheet.width_mm, sheet.height_mm
    );
    let mut page = Page {
        out,
        width: sheet.width_mm,
        height: sheet.height_mm,
    };

    let border = PaperRect::new(
        MARGIN_MM,
        MARGIN_MM,
        sheet.width_mm - 2.0 * MARGIN_MM,
        sheet.height_mm - 2.0 * MARGIN_MM,
    );
    page.rect(&border, 0.7);

    let tb = &sheet.title_block;
    page.rect(&tb.frame, 0.5);
    let col_w = tb.frame.w / 3.0;
    for (i, (label, value)) in tb.fields().into_iter().enumerate() {
        let x = tb.frame.x + 5.0 + col_w * (i / 3) as f64;
        let y = tb.frame.y + 4.0 + 16.0 * (i % 3) as f64;
        page.label((x, y), 2.0, label);
        page.label((x, y + 4.0), 3.5, value);
    }

    for viewport in &sheet.viewports {
        if let Some(view) = model.view(&viewport.view_id) {
            page.view(view, viewport);
        }
    }

    for block in &sheet.schedules {
        let s = &block.schedule;
        let f = &block.frame;
        page.label((f.x, f.y + 1.0), 3.0, &s.title);
        let widths: Vec<String> = s.widths_mm.iter().map(|w| format!("{:.2}mm", w)).collect();
        let mut cells: Vec<String> = s.columns.iter().map(|c| format!("text(size: 2mm, {})", typst_str(c))).collect();
        for row in &s.rows {
            cells.extend(row.iter().map(|c| format!("text(size: 2mm, {})", typst_str(c))));
        }
        let _ = writeln!(
            page.out,
            "#place(top + left, dx: {:.2}mm, dy: {:.2}mm, table(columns: ({},), inset: 1mm, stroke: 0.18mm, {}))",
            f.x,
            f.y + SCHEDULE_TITLE_MM,
            widths.join(", "),
            cells.join(", ")
        );
    }

    let marker = summary_marker(model, sheet);
    let _ = writeln!(
        page.out,
        "#place(bottom + left, dx: 1mm, dy: -1mm, text(size: 1pt, fill: white, {}))",
        typst_str(&marker)
    );
    let _ = writeln!(page.out, "]");
}

/// Typst source for every sheet of the model
pub(super) fn sheet_set_source(model: &ProjectModel) -> String {
    let mut out = String::new();
    out.push_str("#set text(font: \"DejaVu Sans Mono\")\n");
    for sheet in &model.sheets.sheets {
        sheet_page(model, sheet, &mut out);
    }
    out
}

// ============================================================================
// Summary marker
// ============================================================================

/// Counts of what a plan view actually draws
#[derive(Debug, Clone, Copy, PartialEq)]
struct Drawn {
    rooms: usize,
    walls: usize,
    openings: usize,
    envelope_w_mm: f64,
    envelope_d_mm: f64,
}

fn drawn(view: &View) -> Option<Drawn> {
    let footprint = view.primitives.iter().find(|p| p.layer() == Layer::Footprint)?;
    let mut bounds = Bounds::empty();
    for p in footprint.points() {
        bounds.include(p);
    }
    let polygons_on = |pred: fn(Layer) -> bool| {
        view.primitives
            .iter()
            .filter(|p| matches!(p, Primitive::Polygon { layer, .. } if pred(*layer)))
            .count()
    };
    Some(Drawn {
        rooms: view.count_on(Layer::RoomName),
        walls: polygons_on(Layer::is_wall),
        openings: polygons_on(Layer::is_opening),
        envelope_w_mm: bounds.width() * 1000.0,
        envelope_d_mm: bounds.height() * 1000.0,
    })
}

/// Marker text for one sheet
pub(super) fn summary_marker(model: &ProjectModel, sheet: &Sheet) -> String {
    let plan = model
        .views_on(sheet)
        .into_iter()
        .filter(|v| v.kind.is_plan_like())
        .find_map(drawn);
    match plan {
        Some(d) => format!(
            "SUMMARY;sheet={};rooms={};walls={};openings={};envelope={:.0}x{:.0};END",
            sheet.number, d.rooms, d.walls, d.openings, d.envelope_w_mm, d.envelope_d_mm
        ),
        None => format!("SUMMARY;sheet={};END", sheet.number),
    }
}

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"SUMMARY;sheet=([A-Z0-9.]+)(?:;rooms=(\d+);walls=(\d+);openings=(\d+);envelope=(\d+)x(\d+))?;END")
        .expect("marker pattern is valid")
});

/// Fold the markers found in extracted text into a summary. Whitespace is
/// stripped first since text extraction may split the marker.
pub(super) fn summarize_markers(text: &str) -> FormatSummary {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let mut summary = FormatSummary::default();
    let mut sheets = 0;
    for caps in MARKER.captures_iter(&compact) {
        sheets += 1;
        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<usize>().ok());
        if summary.rooms.is_none() {
            if let Some(rooms) = num(2) {
                summary.rooms = Some(rooms);
                summary.walls = num(3);
                summary.openings = num(4);
                summary.envelope_w_m = num(5).map(|mm| mm as f64 / 1000.0);
                summary.envelope_d_m = num(6).map(|mm| mm as f64 / 1000.0);
            }
        }
    }
    summary.sheets = Some(sheets);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typst_string_escaping() {
        assert_eq!(typst_str("Living"), "\"Living\"");
        assert_eq!(typst_str("a \"b\" \\ c"), "\"a \\\"b\\\" \\\\ c\"");
        assert_eq!(typst_str("two\nlines"), "\"two\\nlines\"");
    }

    #[test]
    fn test_markers_survive_split_text() {
        let text = "SUMMARY;sheet=A1.01;rooms=5;walls=14;\nopenings=11;envelope=10200x8400;END\n\
                    SUMMARY;sheet=A1.02;END SUMMARY;sheet=A2.01;END";
        let summary = summarize_markers(text);
        assert_eq!(summary.sheets, Some(3));
        assert_eq!(summary.rooms, Some(5));
        assert_eq!(summary.walls, Some(14));
        assert_eq!(summary.openings, Some(11));
        assert_eq!(summary.envelope_w_m, Some(10.2));
        assert_eq!(summary.envelope_d_m, Some(8.4));
        assert_eq!(summary.room_names, None);
    }
}
