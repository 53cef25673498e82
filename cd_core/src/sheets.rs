//! # Sheet Composer
//!
//! Lays the views out on numbered drawing sheets with viewports, schedules
//! and a title block.
//!
//! ## Numbering
//!
//! | Sheet   | Content                                  |
//! |---------|------------------------------------------|
//! | `A1.01` | Floor plan (+ room and opening schedule) |
//! | `A1.02` | Reflected ceiling plan (+ finishes)      |
//! | `A2.0n` | Exterior elevations, two per sheet       |
//! | `A3.0n` | Building sections, one per sheet         |
//! | `A6.01` | Schedules that did not fit elsewhere     |
//!
//! Paper coordinates are millimetres from the sheet's top-left corner with y
//! growing downwards. A viewport maps view metres onto paper through
//! `px = offset_x + factor * x` and `py = offset_y - factor * y`.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{DrawingScale, GenerationConfig, PaperSize};
use crate::geometry::{Bounds, Vec2};
use crate::plan::FloorPlan;
use crate::qc::{category, QcIssue};
use crate::requirements::{Finishes, RoomRequirement};
use crate::units;
use crate::views::{View, ViewKind};

pub const MARGIN_MM: f64 = 15.0;
pub const TITLE_BLOCK_MM: f64 = 60.0;
/// Right-hand column reserved for schedules
pub const SCHEDULE_COLUMN_MM: f64 = 140.0;
const GAP_MM: f64 = 10.0;
/// Band under each viewport for its title
const VIEW_TITLE_MM: f64 = 10.0;

pub const SCHEDULE_TITLE_MM: f64 = 8.0;
pub const SCHEDULE_HEADER_MM: f64 = 7.0;
pub const SCHEDULE_ROW_MM: f64 = 6.0;

// ============================================================================
// Sheet model
// ============================================================================

/// Rectangle on paper (top-left origin, millimetres)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaperRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl PaperRect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        PaperRect { x, y, w, h }
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// View metres to paper millimetres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportTransform {
    /// Paper millimetres per view metre
    pub factor: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl ViewportTransform {
    pub fn apply(&self, p: Vec2) -> (f64, f64) {
        (self.offset_x + self.factor * p.x, self.offset_y - self.factor * p.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub view_id: String,
    pub title: String,
    pub scale: DrawingScale,
    /// Paper extent of the drawn view
    pub frame: PaperRect,
    /// View extent the viewport shows, metres
    pub view_bounds: Bounds,
    pub transform: ViewportTransform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Room,
    Opening,
    Finish,
}

/// A tabular schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub kind: ScheduleKind,
    pub title: String,
    pub columns: Vec<String>,
    pub widths_mm: Vec<f64>,
    pub rows: Vec<Vec<String>>,
}

impl Schedule {
    pub fn width_mm(&self) -> f64 {
        self.widths_mm.iter().sum()
    }

    pub fn height_mm(&self) -> f64 {
        SCHEDULE_TITLE_MM + SCHEDULE_HEADER_MM + SCHEDULE_ROW_MM * self.rows.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub schedule: Schedule,
    pub frame: PaperRect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleBlock {
    pub project_name: String,
    pub project_number: String,
    pub client: String,
    pub sheet_number: String,
    pub sheet_name: String,
    pub scale: String,
    pub issue_date: String,
    pub revision: String,
    pub drawn_by: String,
    pub frame: PaperRect,
}

impl TitleBlock {
    /// Label/value pairs in print order
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("PROJECT", &self.project_name),
            ("PROJECT NO", &self.project_number),
            ("CLIENT", &self.client),
            ("SHEET", &self.sheet_name),
            ("SHEET NO", &self.sheet_number),
            ("SCALE", &self.scale),
            ("DATE", &self.issue_date),
            ("REV", &self.revision),
            ("DRAWN", &self.drawn_by),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    /// "A1.01"
    pub number: String,
    pub name: String,
    pub paper: PaperSize,
    pub width_mm: f64,
    pub height_mm: f64,
    pub viewports: Vec<Viewport>,
    pub schedules: Vec<ScheduleBlock>,
    pub title_block: TitleBlock,
}

impl Sheet {
    /// Common viewport scale, `None` for schedule-only or mixed sheets
    pub fn scale(&self) -> Option<DrawingScale> {
        let first = self.viewports.first()?.scale;
        self.viewports.iter().all(|v| v.scale == first).then_some(first)
    }

    pub fn viewport(&self, view_id: &str) -> Option<&Viewport> {
        self.viewports.iter().find(|v| v.view_id == view_id)
    }
}

/// Composed sheets plus the layout findings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetSet {
    pub sheets: Vec<Sheet>,
    pub issues: Vec<QcIssue>,
}

impl SheetSet {
    pub fn sheet(&self, number: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.number == number)
    }
}

// ============================================================================
// Schedules
// ============================================================================

pub fn room_schedule(plan: &FloorPlan) -> Schedule {
    Schedule {
        kind: ScheduleKind::Room,
        title: "ROOM SCHEDULE".to_string(),
        columns: ["NO", "NAME", "FUNCTION", "AREA (m2)"].map(String::from).to_vec(),
        widths_mm: vec![15.0, 50.0, 35.0, 25.0],
        rows: plan
            .rooms
            .iter()
            .map(|r| {
                vec![
                    r.number.clone(),
                    r.name.clone(),
                    r.function.label().to_string(),
                    format!("{:.2}", r.area_m2),
                ]
            })
            .collect(),
    }
}

pub fn opening_schedule(plan: &FloorPlan) -> Schedule {
    Schedule {
        kind: ScheduleKind::Opening,
        title: "DOOR AND WINDOW SCHEDULE".to_string(),
        columns: ["MARK", "WIDTH", "HEIGHT", "TYPE"].map(String::from).to_vec(),
        widths_mm: vec![20.0, 25.0, 25.0, 40.0],
        rows: plan
            .openings
            .iter()
            .map(|o| {
                vec![
                    o.id.clone(),
                    units::format_m(units::m(o.width_mm)),
                    units::format_m(units::m(o.height_mm())),
                    o.type_label().to_string(),
                ]
            })
            .collect(),
    }
}

pub fn finish_schedule(plan: &FloorPlan, requirements: &[RoomRequirement]) -> Schedule {
    Schedule {
        kind: ScheduleKind::Finish,
        title: "ROOM FINISH SCHEDULE".to_string(),
        columns: ["NO", "ROOM", "FLOOR", "WALL", "CEILING"].map(String::from).to_vec(),
        widths_mm: vec![15.0, 35.0, 30.0, 25.0, 25.0],
        rows: plan
            .rooms
            .iter()
            .map(|r| {
                let finishes = requirements
                    .get(r.requirement)
                    .map(|req| req.finishes.clone())
                    .unwrap_or_else(|| Finishes::for_function(r.function));
                vec![r.number.clone(), r.name.clone(), finishes.floor, finishes.wall, finishes.ceiling]
            })
            .collect(),
    }
}

// ============================================================================
// Composer
// ============================================================================

/// Stage 5 of the pipeline
pub struct SheetComposer<'a> {
    config: &'a GenerationConfig,
}

struct Layout {
    width: f64,
    height: f64,
}

impl Layout {
    /// Area between the margins above the title block
    fn drawable(&self) -> PaperRect {
        PaperRect::new(
            MARGIN_MM,
            MARGIN_MM,
            self.width - 2.0 * MARGIN_MM,
            self.height - 2.0 * MARGIN_MM - TITLE_BLOCK_MM,
        )
    }

    fn title_frame(&self) -> PaperRect {
        PaperRect::new(
            MARGIN_MM,
            self.height - MARGIN_MM - TITLE_BLOCK_MM,
            self.width - 2.0 * MARGIN_MM,
            TITLE_BLOCK_MM,
        )
    }
}

impl<'a> SheetComposer<'a> {
    pub fn new(config: &'a GenerationConfig) -> Self {
        SheetComposer { config }
    }

    pub fn compose(&self, plan: &FloorPlan, views: &[View], requirements: &[RoomRequirement]) -> SheetSet {
        let (width, height) = self.config.paper_size.dimensions_mm();
        let layout = Layout { width, height };
        let drawable = layout.drawable();
        let schedules_on = self.config.include_schedules;

        let mut set = SheetSet::default();
        let mut overflow: Vec<Schedule> = Vec::new();

        let column = PaperRect::new(
            drawable.right() - SCHEDULE_COLUMN_MM,
            drawable.y,
            SCHEDULE_COLUMN_MM,
            drawable.h,
        );
        let beside_column = PaperRect::new(
            drawable.x,
            drawable.y,
            drawable.w - SCHEDULE_COLUMN_MM - GAP_MM,
            drawable.h,
        );

        let find = |pred: fn(&ViewKind) -> bool| views.iter().filter(move |v| pred(&v.kind));

        // A1: plan and ceiling plan
        let plan_view = find(|k| matches!(k, ViewKind::Plan)).next();
        let ceiling_view = find(|k| matches!(k, ViewKind::ReflectedCeilingPlan)).next();

        let mut plan_schedules = Vec::new();
        let mut ceiling_schedules = Vec::new();
        if schedules_on {
            plan_schedules = vec![room_schedule(plan), opening_schedule(plan)];
            ceiling_schedules = vec![finish_schedule(plan, requirements)];
        }

        for (number, name, view, schedules) in [
            ("A1.01", "Floor Plan", plan_view, plan_schedules),
            ("A1.02", "Reflected Ceiling Plan", ceiling_view, ceiling_schedules),
        ] {
            let Some(view) = view else {
                overflow.extend(schedules);
                continue;
            };
            let slot = if schedules.is_empty() { drawable } else { beside_column };
            let viewport = self.place(view, slot, &mut set.issues);
            let (blocks, rest) = stack(schedules, column);
            overflow.extend(rest);
            set.sheets.push(self.sheet(&layout, number, name, vec![viewport], blocks));
        }

        // A2: elevations, two per sheet stacked vertically
        let elevations: Vec<&View> = find(|k| matches!(k, ViewKind::Elevation { .. })).collect();
        let half = (drawable.h - GAP_MM) / 2.0;
        for (i, pair) in elevations.chunks(2).enumerate() {
            let viewports = pair
                .iter()
                .enumerate()
                .map(|(j, view)| {
                    let slot = PaperRect::new(drawable.x, drawable.y + j as f64 * (half + GAP_MM), drawable.w, half);
                    self.place(view, slot, &mut set.issues)
                })
                .collect();
            set.sheets.push(self.sheet(
                &layout,
                &format!("A2.{:02}", i + 1),
                "Exterior Elevations",
                viewports,
                Vec::new(),
            ));
        }

        // A3: one section per sheet
        let sections: Vec<&View> = find(|k| matches!(k, ViewKind::Section { .. })).collect();
        for (i, view) in sections.iter().enumerate() {
            let viewport = self.place(view, drawable, &mut set.issues);
            set.sheets.push(self.sheet(
                &layout,
                &format!("A3.{:02}", i + 1),
                &view.name,
                vec![viewport],
                Vec::new(),
            ));
        }

        // A6: whatever schedules are left
        if !overflow.is_empty() {
            let blocks = flow_columns(overflow, drawable);
            set.sheets.push(self.sheet(&layout, "A6.01", "Schedules", Vec::new(), blocks));
        }

        debug!(sheets = set.sheets.len(), issues = set.issues.len(), "sheets composed");
        set
    }

    /// Fit a view into a slot, stepping the scale down while it overflows
    fn place(&self, view: &View, slot: PaperRect, issues: &mut Vec<QcIssue>) -> Viewport {
        let avail_w = slot.w;
        let avail_h = (slot.h - VIEW_TITLE_MM).max(0.0);
        let bounds = view.bbox;
        let fits = |scale: DrawingScale| {
            bounds.width() * scale.factor() <= avail_w && bounds.height() * scale.factor() <= avail_h
        };

        let mut scale = self.config.scale;
        while !fits(scale) {
            match scale.reduced() {
                Some(next) => {
                    warn!(view = %view.id, from = %scale.label(), to = %next.label(), "view overflows its slot");
                    issues.push(
                        QcIssue::warning(
                            category::SCALE_OVERFLOW,
                            format!(
                                "{} does not fit at {}, reduced to {}",
                                view.name,
                                scale.label(),
                                next.label()
                            ),
                        )
                        .on(&view.id),
                    );
                    scale = next;
                }
                None => {
                    issues.push(
                        QcIssue::error(
                            category::SCALE_OVERFLOW,
                            format!("{} does not fit even at {}; placed anyway", view.name, scale.label()),
                        )
                        .on(&view.id),
                    );
                    break;
                }
            }
        }

        let factor = scale.factor();
        let drawn_w = bounds.width() * factor;
        let drawn_h = bounds.height() * factor;
        let left = slot.x + (avail_w - drawn_w) / 2.0;
        let top = slot.y + (avail_h - drawn_h) / 2.0;
        Viewport {
            view_id: view.id.clone(),
            title: format!("{}  {}", view.name.to_uppercase(), scale.label()),
            scale,
            frame: PaperRect::new(left, top, drawn_w, drawn_h),
            view_bounds: bounds,
            transform: ViewportTransform {
                factor,
                offset_x: left - factor * bounds.min.x,
                offset_y: top + factor * bounds.max.y,
            },
        }
    }

    fn sheet(
        &self,
        layout: &Layout,
        number: &str,
        name: &str,
        viewports: Vec<Viewport>,
        schedules: Vec<ScheduleBlock>,
    ) -> Sheet {
        let title = &self.config.title;
        let mut sheet = Sheet {
            number: number.to_string(),
            name: name.to_string(),
            paper: self.config.paper_size,
            width_mm: layout.width,
            height_mm: layout.height,
            viewports,
            schedules,
            title_block: TitleBlock {
                project_name: title.project_name.clone(),
                project_number: title.project_number.clone(),
                client: title.client.clone(),
                sheet_number: number.to_string(),
                sheet_name: name.to_string(),
                scale: String::new(),
                issue_date: self.config.issue_date_label(),
                revision: title.revision.clone(),
                drawn_by: title.drawn_by.clone(),
                frame: layout.title_frame(),
            },
        };
        sheet.title_block.scale = match (sheet.scale(), sheet.viewports.is_empty()) {
            (Some(scale), _) => scale.label(),
            (None, true) => "NTS".to_string(),
            (None, false) => "AS NOTED".to_string(),
        };
        sheet
    }
}

/// Stack schedules top-down in one column; returns placed blocks and the rest
fn stack(schedules: Vec<Schedule>, column: PaperRect) -> (Vec<ScheduleBlock>, Vec<Schedule>) {
    let mut placed = Vec::new();
    let mut rest = Vec::new();
    let mut y = column.y;
    for schedule in schedules {
        let h = schedule.height_mm();
        if rest.is_empty() && y + h <= column.bottom() && schedule.width_mm() <= column.w {
            placed.push(ScheduleBlock {
                frame: PaperRect::new(column.x, y, schedule.width_mm(), h),
                schedule,
            });
            y += h + GAP_MM;
        } else {
            rest.push(schedule);
        }
    }
    (placed, rest)
}

/// Flow schedules over columns of a whole sheet. Tables taller than the
/// sheet are placed anyway at the top of a fresh column.
fn flow_columns(schedules: Vec<Schedule>, area: PaperRect) -> Vec<ScheduleBlock> {
    let mut blocks = Vec::new();
    let (mut x, mut y) = (area.x, area.y);
    let mut column_w: f64 = 0.0;
    for schedule in schedules {
        let (w, h) = (schedule.width_mm(), schedule.height_mm());
        if y > area.y && y + h > area.bottom() {
            x += column_w + GAP_MM;
            y = area.y;
            column_w = 0.0;
        }
        blocks.push(ScheduleBlock {
            frame: PaperRect::new(x, y, w, h),
            schedule,
        });
        column_w = column_w.max(w);
        y += h + GAP_MM;
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Layer;
    use crate::plan::tests::{demo_plan, demo_program};
    use crate::qc::{count_category, Severity};
    use crate::views::tests::demo_views;
    use crate::views::Primitive;

    fn compose(config: &GenerationConfig) -> SheetSet {
        SheetComposer::new(config).compose(&demo_plan(), &demo_views(), &demo_program())
    }

    #[test]
    fn test_default_sheet_numbers() {
        let set = compose(&GenerationConfig::default());
        let numbers: Vec<_> = set.sheets.iter().map(|s| s.number.as_str()).collect();
        assert_eq!(numbers, vec!["A1.01", "A1.02", "A2.01", "A2.02", "A3.01", "A3.02"]);
        assert!(set.issues.is_empty(), "{:?}", set.issues);
        let elevations = set.sheet("A2.01").unwrap();
        assert_eq!(elevations.viewports.len(), 2);
    }

    #[test]
    fn test_schedules_beside_plan() {
        let set = compose(&GenerationConfig::default());
        let sheet = set.sheet("A1.01").unwrap();
        let kinds: Vec<_> = sheet.schedules.iter().map(|b| b.schedule.kind).collect();
        assert_eq!(kinds, vec![ScheduleKind::Room, ScheduleKind::Opening]);
        let rooms = &sheet.schedules[0].schedule;
        assert_eq!(rooms.rows.len(), 5);
        assert_eq!(rooms.rows[0][0], "101");
        let viewport = &sheet.viewports[0];
        assert!(viewport.frame.right() <= sheet.schedules[0].frame.x);

        let finishes = &set.sheet("A1.02").unwrap().schedules[0].schedule;
        assert_eq!(finishes.kind, ScheduleKind::Finish);
        let bath = finishes.rows.iter().find(|r| r[1] == "Bathroom").unwrap();
        assert_eq!(bath[2], "Ceramic Tile");
    }

    #[test]
    fn test_viewport_transform_maps_bounds_into_frame() {
        let set = compose(&GenerationConfig::default());
        let viewport = &set.sheet("A1.01").unwrap().viewports[0];
        let (x0, y0) = viewport.transform.apply(Vec2::new(viewport.view_bounds.min.x, viewport.view_bounds.max.y));
        assert!((x0 - viewport.frame.x).abs() < 1e-6);
        assert!((y0 - viewport.frame.y).abs() < 1e-6);
        let (x1, y1) = viewport.transform.apply(viewport.view_bounds.min.offset(viewport.view_bounds.width(), 0.0));
        assert!((x1 - viewport.frame.right()).abs() < 1e-6);
        assert!((y1 - viewport.frame.bottom()).abs() < 1e-6);
    }

    #[test]
    fn test_small_paper_steps_scale_down() {
        let mut config = GenerationConfig::default();
        config.paper_size = PaperSize::A3;
        config.scale = DrawingScale::OneTo50;
        let set = compose(&config);
        assert!(count_category(&set.issues, category::SCALE_OVERFLOW) >= 1);
        let plan_vp = &set.sheet("A1.01").unwrap().viewports[0];
        assert_ne!(plan_vp.scale, DrawingScale::OneTo50);
        assert!(set.issues.iter().all(|i| i.severity == Severity::Warning));
    }

    #[test]
    fn test_oversized_view_is_placed_with_error() {
        let mut view = View::new("V-PLAN", ViewKind::Plan, "Floor Plan");
        view.push(Primitive::rect(Layer::Footprint, 0.0, 0.0, 500.0, 400.0));
        let view = view.finish();
        let config = GenerationConfig::default();
        let set = SheetComposer::new(&config).compose(&demo_plan(), &[view], &demo_program());
        let errors: Vec<_> = set.issues.iter().filter(|i| i.severity == Severity::Error).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(count_category(&set.issues, category::SCALE_OVERFLOW), 2);
        assert_eq!(set.sheet("A1.01").unwrap().viewports[0].scale, DrawingScale::OneTo200);
    }

    #[test]
    fn test_schedules_fall_back_to_schedule_sheet() {
        let mut config = GenerationConfig::default();
        config.views.include.plan = false;
        let views: Vec<View> = demo_views().into_iter().filter(|v| v.kind != ViewKind::Plan).collect();
        let set = SheetComposer::new(&config).compose(&demo_plan(), &views, &demo_program());
        let sheet = set.sheet("A6.01").unwrap();
        assert_eq!(sheet.schedules.len(), 2);
        assert_eq!(sheet.title_block.scale, "NTS");
    }

    #[test]
    fn test_title_block_uses_configured_date() {
        let mut config = GenerationConfig::default();
        config.issue_date = chrono::NaiveDate::from_ymd_opt(2025, 3, 14);
        let set = compose(&config);
        for sheet in &set.sheets {
            assert_eq!(sheet.title_block.issue_date, "2025-03-14");
            assert_eq!(sheet.title_block.sheet_number, sheet.number);
        }
    }
}
