//! DXF (R12 ASCII) writer and reader.
//!
//! One file per sheet. Model space carries every view on the sheet at true
//! scale in millimetres, side by side; paper space carries the border, title
//! block, schedules and one VIEWPORT entity per view.

use std::fmt::{Display, Write as _};

use crate::errors::{CdError, CdResult};
use crate::geometry::Vec2;
use crate::layers::Layer;
use crate::model::ProjectModel;
use crate::sheets::{PaperRect, Sheet, MARGIN_MM, SCHEDULE_HEADER_MM, SCHEDULE_ROW_MM, SCHEDULE_TITLE_MM};
use crate::views::{Primitive, View};

use super::verify::FormatSummary;

/// Gap between views laid out in model space, millimetres
const MODEL_GAP_MM: f64 = 5000.0;
const PAPER_TEXT_MM: f64 = 2.5;

// ============================================================================
// Writer
// ============================================================================

struct DxfWriter {
    out: String,
}

impl DxfWriter {
    fn new() -> Self {
        DxfWriter { out: String::new() }
    }

    fn pair(&mut self, code: u16, value: impl Display) {
        let _ = write!(self.out, "{:>3}\n{}\n", code, value);
    }

    fn num(&mut self, code: u16, value: f64) {
        self.pair(code, format!("{:.3}", value));
    }

    fn header(&mut self, min: (f64, f64), max: (f64, f64)) {
        self.pair(0, "SECTION");
        self.pair(2, "HEADER");
        self.pair(9, "$ACADVER");
        self.pair(1, "AC1009");
        self.pair(9, "$INSUNITS");
        self.pair(70, 4);
        self.pair(9, "$EXTMIN");
        self.num(10, min.0);
        self.num(20, min.1);
        self.pair(9, "$EXTMAX");
        self.num(10, max.0);
        self.num(20, max.1);
        self.pair(0, "ENDSEC");
    }

    fn tables(&mut self) {
        self.pair(0, "SECTION");
        self.pair(2, "TABLES");

        self.pair(0, "TABLE");
        self.pair(2, "LTYPE");
        self.pair(70, 1);
        self.pair(0, "LTYPE");
        self.pair(2, "CONTINUOUS");
        self.pair(70, 0);
        self.pair(3, "Solid line");
        self.pair(72, 65);
        self.pair(73, 0);
        self.num(40, 0.0);
        self.pair(0, "ENDTAB");

        self.pair(0, "TABLE");
        self.pair(2, "LAYER");
        self.pair(70, Layer::ALL.len());
        for layer in Layer::ALL {
            self.pair(0, "LAYER");
            self.pair(2, layer.name());
            self.pair(70, 0);
            self.pair(62, layer.aci_color());
            self.pair(6, "CONTINUOUS");
        }
        self.pair(0, "ENDTAB");

        self.pair(0, "ENDSEC");
    }

    fn entity(&mut self, kind: &str, layer: Layer, paper: bool) {
        self.pair(0, kind);
        self.pair(8, layer.name());
        if paper {
            self.pair(67, 1);
        }
    }

    fn line(&mut self, layer: Layer, paper: bool, a: (f64, f64), b: (f64, f64)) {
        self.entity("LINE", layer, paper);
        self.num(10, a.0);
        self.num(20, a.1);
        self.num(30, 0.0);
        self.num(11, b.0);
        self.num(21, b.1);
        self.num(31, 0.0);
    }

    fn polyline(&mut self, layer: Layer, paper: bool, points: &[(f64, f64)], closed: bool) {
        self.entity("POLYLINE", layer, paper);
        self.pair(66, 1);
        self.num(10, 0.0);
        self.num(20, 0.0);
        self.num(30, 0.0);
        self.pair(70, if closed { 1 } else { 0 });
        for p in points {
            self.entity("VERTEX", layer, paper);
            self.num(10, p.0);
            self.num(20, p.1);
            self.num(30, 0.0);
        }
        self.entity("SEQEND", layer, paper);
    }

    /// Middle-centred single-line text
    fn text(&mut self, layer: Layer, paper: bool, at: (f64, f64), height: f64, value: &str) {
        self.entity("TEXT", layer, paper);
        self.num(10, at.0);
        self.num(20, at.1);
        self.num(30, 0.0);
        self.num(40, height);
        self.pair(1, encode_text(value));
        self.pair(72, 1);
        self.pair(73, 2);
        self.num(11, at.0);
        self.num(21, at.1);
        self.num(31, 0.0);
    }

    /// Left-aligned text (baseline at `at`)
    fn label(&mut self, layer: Layer, paper: bool, at: (f64, f64), height: f64, value: &str) {
        self.entity("TEXT", layer, paper);
        self.num(10, at.0);
        self.num(20, at.1);
        self.num(30, 0.0);
        self.num(40, height);
        self.pair(1, encode_text(value));
    }

    fn finish(mut self) -> String {
        self.pair(0, "EOF");
        self.out
    }
}

/// DXF text is single-line; non-ASCII goes out as `\U+XXXX`
fn encode_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\n' | '\r' => out.push(' '),
            c if c.is_ascii() => out.push(c),
            c => {
                let _ = write!(out, "\\U+{:04X}", c as u32);
            }
        }
    }
    out
}

fn decode_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find("\\U+") {
        out.push_str(&rest[..pos]);
        let hex = rest.get(pos + 3..pos + 7).unwrap_or("");
        match u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
            Some(c) if hex.len() == 4 => {
                out.push(c);
                rest = &rest[pos + 7..];
            }
            _ => {
                out.push_str("\\U+");
                rest = &rest[pos + 3..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Places a view's metre coordinates in model-space millimetres
struct ModelPlacement {
    view_min: Vec2,
    origin_x: f64,
}

impl ModelPlacement {
    fn map(&self, p: Vec2) -> (f64, f64) {
        (
            self.origin_x + (p.x - self.view_min.x) * 1000.0,
            (p.y - self.view_min.y) * 1000.0,
        )
    }
}

fn write_view(dxf: &mut DxfWriter, view: &View, placement: &ModelPlacement, text_scale: f64) {
    for primitive in &view.primitives {
        match primitive {
            Primitive::Line { layer, from, to } => {
                dxf.line(*layer, false, placement.map(*from), placement.map(*to));
            }
            Primitive::Polyline { layer, points } => {
                let pts: Vec<_> = points.iter().map(|p| placement.map(*p)).collect();
                dxf.polyline(*layer, false, &pts, false);
            }
            Primitive::Polygon { layer, points } => {
                let pts: Vec<_> = points.iter().map(|p| placement.map(*p)).collect();
                dxf.polyline(*layer, false, &pts, true);
            }
            Primitive::Text { layer, at, text, size_mm } => {
                dxf.text(*layer, false, placement.map(*at), size_mm * text_scale, text);
            }
        }
    }
}

fn paper_rect(dxf: &mut DxfWriter, layer: Layer, sheet: &Sheet, r: &PaperRect) {
    let h = sheet.height_mm;
    let pts = [
        (r.x, h - r.bottom()),
        (r.right(), h - r.bottom()),
        (r.right(), h - r.y),
        (r.x, h - r.y),
    ];
    dxf.polyline(layer, true, &pts, true);
}

fn write_paper(dxf: &mut DxfWriter, sheet: &Sheet, placements: &[(f64, f64, f64)]) {
    let h = sheet.height_mm;
    let border = PaperRect::new(
        MARGIN_MM,
        MARGIN_MM,
        sheet.width_mm - 2.0 * MARGIN_MM,
        sheet.height_mm - 2.0 * MARGIN_MM,
    );
    paper_rect(dxf, Layer::TitleBlock, sheet, &border);

    // Title block: label/value pairs in three columns
    let tb = &sheet.title_block;
    paper_rect(dxf, Layer::TitleBlock, sheet, &tb.frame);
    let col_w = tb.frame.w / 3.0;
    for (i, (label, value)) in tb.fields().into_iter().enumerate() {
        let x = tb.frame.x + 5.0 + col_w * (i / 3) as f64;
        let y = tb.frame.y + 12.0 + 16.0 * (i % 3) as f64;
        dxf.label(Layer::TitleBlock, true, (x, h - y), 2.0, label);
        dxf.label(Layer::TitleBlock, true, (x, h - y - 6.0), 3.5, value);
    }

    for (i, (vp, placement)) in sheet.viewports.iter().zip(placements).enumerate() {
        let (center_x, center_y) = vp.frame.center();
        let (model_cx, model_cy, model_h) = *placement;
        dxf.entity("VIEWPORT", Layer::Viewport, true);
        dxf.num(10, center_x);
        dxf.num(20, h - center_y);
        dxf.num(30, 0.0);
        dxf.num(40, vp.frame.w);
        dxf.num(41, vp.frame.h);
        dxf.pair(68, 1);
        dxf.pair(69, i + 2);
        dxf.num(12, model_cx);
        dxf.num(22, model_cy);
        dxf.num(45, model_h);
        dxf.label(Layer::Annotation, true, (vp.frame.x, h - vp.frame.bottom() - 6.0), 3.5, &vp.title);
    }

    for block in &sheet.schedules {
        let s = &block.schedule;
        let f = &block.frame;
        paper_rect(dxf, Layer::Schedule, sheet, f);
        dxf.label(Layer::Schedule, true, (f.x + 1.0, h - f.y - SCHEDULE_TITLE_MM + 2.0), 3.0, &s.title);
        let mut x = f.x;
        for (c, (column, width)) in s.columns.iter().zip(&s.widths_mm).enumerate() {
            let header_y = f.y + SCHEDULE_TITLE_MM + SCHEDULE_HEADER_MM - 2.0;
            dxf.label(Layer::Schedule, true, (x + 1.0, h - header_y), 2.0, column);
            for (r, row) in s.rows.iter().enumerate() {
                let cell = row.get(c).map(String::as_str).unwrap_or("");
                let y = f.y + SCHEDULE_TITLE_MM + SCHEDULE_HEADER_MM + SCHEDULE_ROW_MM * (r as f64 + 1.0) - 1.5;
                dxf.label(Layer::Schedule, true, (x + 1.0, h - y), PAPER_TEXT_MM * 0.8, cell);
            }
            x += width;
        }
    }
}

/// Render one sheet to DXF text
pub(super) fn write_sheet(model: &ProjectModel, sheet: &Sheet) -> String {
    let views = model.views_on(sheet);

    // Lay views out left to right in model space
    let mut layouts = Vec::new();
    let mut cursor = 0.0;
    let mut max_y: f64 = 0.0;
    for view in &views {
        let b = view.bbox;
        layouts.push(ModelPlacement {
            view_min: b.min,
            origin_x: cursor,
        });
        max_y = max_y.max(b.height() * 1000.0);
        cursor += b.width() * 1000.0 + MODEL_GAP_MM;
    }
    let ext_max_x = (cursor - MODEL_GAP_MM).max(0.0);

    let mut dxf = DxfWriter::new();
    dxf.header((0.0, 0.0), (ext_max_x, max_y));
    dxf.tables();
    dxf.pair(0, "SECTION");
    dxf.pair(2, "ENTITIES");

    let mut viewport_targets = Vec::new();
    for (view, placement) in views.iter().zip(&layouts) {
        let denominator = sheet
            .viewport(&view.id)
            .map(|vp| vp.scale.denominator() as f64)
            .unwrap_or(100.0);
        write_view(&mut dxf, view, placement, denominator);
        let b = view.bbox;
        let center = placement.map(b.center());
        viewport_targets.push((center.0, center.1, b.height() * 1000.0));
    }

    write_paper(&mut dxf, sheet, &viewport_targets);

    dxf.pair(0, "ENDSEC");
    dxf.finish()
}

// ============================================================================
// Reader
// ============================================================================

#[derive(Debug, Default)]
struct Entity {
    kind: String,
    layer: String,
    paper: bool,
    text: Option<String>,
    points: Vec<(f64, f64)>,
    pending_x: Option<f64>,
}

fn pairs(text: &str) -> CdResult<Vec<(u16, &str)>> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() % 2 != 0 {
        return Err(CdError::export("cad", "odd number of lines in group-code stream"));
    }
    lines
        .chunks(2)
        .map(|chunk| {
            let code = chunk[0]
                .trim()
                .parse::<u16>()
                .map_err(|_| CdError::export("cad", format!("bad group code '{}'", chunk[0].trim())))?;
            Ok((code, chunk[1].trim()))
        })
        .collect()
}

/// Entities of the ENTITIES section, with polyline vertices folded in
fn entities(text: &str) -> CdResult<Vec<Entity>> {
    let mut out = Vec::new();
    let mut in_entities = false;
    let mut expect_section_name = false;
    let mut current: Option<Entity> = None;
    let mut polyline: Option<Entity> = None;

    for (code, value) in pairs(text)? {
        if code == 0 {
            if let Some(done) = current.take() {
                match done.kind.as_str() {
                    "VERTEX" => {
                        if let Some(pl) = polyline.as_mut() {
                            pl.points.extend(done.points);
                        }
                    }
                    "POLYLINE" => {
                        polyline = Some(Entity {
                            points: Vec::new(),
                            ..done
                        })
                    }
                    _ => out.push(done),
                }
            }
            match value {
                "SECTION" => expect_section_name = true,
                "ENDSEC" => in_entities = false,
                "SEQEND" => {
                    if let Some(pl) = polyline.take() {
                        out.push(pl);
                    }
                }
                kind if in_entities => {
                    current = Some(Entity {
                        kind: kind.to_string(),
                        ..Entity::default()
                    })
                }
                _ => {}
            }
            continue;
        }
        if expect_section_name && code == 2 {
            in_entities = value == "ENTITIES";
            expect_section_name = false;
            continue;
        }
        let Some(entity) = current.as_mut() else {
            continue;
        };
        match code {
            8 => entity.layer = value.to_string(),
            67 => entity.paper = value == "1",
            1 => entity.text = Some(decode_text(value)),
            10 => entity.pending_x = value.parse().ok(),
            20 => {
                if let (Some(x), Ok(y)) = (entity.pending_x.take(), value.parse::<f64>()) {
                    entity.points.push((x, y));
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

/// Re-read the sheet files and summarize the plan drawing
pub(super) fn read_summary(files: &[&[u8]]) -> CdResult<FormatSummary> {
    let mut summary = FormatSummary {
        sheets: Some(files.len()),
        ..FormatSummary::default()
    };

    for bytes in files {
        let text = std::str::from_utf8(bytes).map_err(|e| CdError::export("cad", e.to_string()))?;
        let entities = entities(text)?;
        let layer_of = |e: &Entity| Layer::from_name(&e.layer);

        let Some(footprint) = entities
            .iter()
            .find(|e| e.kind == "POLYLINE" && !e.paper && layer_of(e) == Some(Layer::Footprint))
        else {
            continue;
        };

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for &(x, y) in &footprint.points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        if footprint.points.is_empty() {
            return Err(CdError::export("cad", "footprint polyline has no vertices"));
        }

        let mut room_names: Vec<String> = entities
            .iter()
            .filter(|e| e.kind == "TEXT" && !e.paper && layer_of(e) == Some(Layer::RoomName))
            .filter_map(|e| e.text.clone())
            .collect();
        room_names.sort();

        let model_polylines = || entities.iter().filter(|e| e.kind == "POLYLINE" && !e.paper);
        summary.rooms = Some(room_names.len());
        summary.room_names = Some(room_names);
        summary.walls = Some(model_polylines().filter(|e| layer_of(e).is_some_and(Layer::is_wall)).count());
        summary.openings = Some(
            model_polylines()
                .filter(|e| layer_of(e).is_some_and(Layer::is_opening))
                .count(),
        );
        summary.envelope_w_m = Some((max_x - min_x) / 1000.0);
        summary.envelope_d_m = Some((max_y - min_y) / 1000.0);
        break;
    }
    Ok(summary)
}
