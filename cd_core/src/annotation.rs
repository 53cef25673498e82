//! # CD Annotation Engine
//!
//! Adds construction-document annotation to a finished plan: exterior chain
//! and overall dimensions, clear interior room dimensions, room tags,
//! elevation markers and section cut lines.
//!
//! Annotation never edits the plan. Records are derived in a fixed order
//! from the plan alone, so annotating the same plan twice yields identical
//! records, ids included.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnnotationSettings;
use crate::geometry::{Axis, Rect, Vec2};
use crate::plan::{FloorPlan, Room, Wall};
use crate::units;

/// Compass direction an elevation looks at (the face it shows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::North, Direction::East, Direction::South, Direction::West];

    pub fn letter(self) -> char {
        match self {
            Direction::North => 'N',
            Direction::East => 'E',
            Direction::South => 'S',
            Direction::West => 'W',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::North => "North",
            Direction::East => "East",
            Direction::South => "South",
            Direction::West => "West",
        }
    }

    /// Outward unit normal of the building face
    pub fn normal(self) -> Vec2 {
        match self {
            Direction::North => Vec2::new(0.0, 1.0),
            Direction::East => Vec2::new(1.0, 0.0),
            Direction::South => Vec2::new(0.0, -1.0),
            Direction::West => Vec2::new(-1.0, 0.0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    /// One segment per exterior wall run
    Chain,
    /// Full length of a building side
    Overall,
    /// Clear room width or depth between wall faces
    Clear,
}

/// A linear dimension in plan metres
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub id: String,
    pub kind: DimensionKind,
    /// Measured points on the building
    pub from: Vec2,
    pub to: Vec2,
    /// Where the dimension line is drawn
    pub line_from: Vec2,
    pub line_to: Vec2,
    pub value_m: f64,
    pub text: String,
    /// Element the dimension belongs to (wall, room or side)
    pub element_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomTag {
    pub id: String,
    pub room_id: String,
    pub number: String,
    pub name: String,
    pub area_m2: f64,
    pub at: Vec2,
}

impl RoomTag {
    pub fn area_text(&self) -> String {
        format!("{:.1} m2", self.area_m2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationMarker {
    pub id: String,
    pub direction: Direction,
    /// Marker position outside the footprint
    pub at: Vec2,
    /// View the marker refers to
    pub view_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionCut {
    pub id: String,
    /// "A", "B", ...
    pub label: String,
    /// Horizontal cuts run east-west and look north; vertical ones look east
    pub axis: Axis,
    /// Cut line coordinate in plan millimetres (y for horizontal, x for vertical)
    pub position_mm: i64,
    pub start: Vec2,
    pub end: Vec2,
    pub view_id: String,
}

/// Everything the engine adds to a plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSet {
    pub dimensions: Vec<Dimension>,
    pub tags: Vec<RoomTag>,
    pub elevation_markers: Vec<ElevationMarker>,
    pub section_cuts: Vec<SectionCut>,
}

impl AnnotationSet {
    pub fn len(&self) -> usize {
        self.dimensions.len() + self.tags.len() + self.elevation_markers.len() + self.section_cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tag_for(&self, room_id: &str) -> Option<&RoomTag> {
        self.tags.iter().find(|t| t.room_id == room_id)
    }
}

/// View id an elevation marker or section cut points at
pub fn elevation_view_id(direction: Direction) -> String {
    format!("V-ELEV-{}", direction.letter())
}

pub fn section_view_id(label: &str) -> String {
    format!("V-SEC-{}", label)
}

/// Stage 3 of the pipeline
pub struct CDAnnotationEngine<'a> {
    settings: &'a AnnotationSettings,
}

impl<'a> CDAnnotationEngine<'a> {
    pub fn new(settings: &'a AnnotationSettings) -> Self {
        CDAnnotationEngine { settings }
    }

    pub fn annotate(&self, plan: &FloorPlan) -> AnnotationSet {
        let mut set = AnnotationSet::default();
        let mut next_dim = 1;

        for direction in [Direction::South, Direction::East, Direction::North, Direction::West] {
            self.side_dimensions(plan, direction, &mut set.dimensions, &mut next_dim);
        }
        for room in &plan.rooms {
            clear_dimensions(plan, room, &mut set.dimensions, &mut next_dim);
        }

        set.tags = plan
            .rooms
            .iter()
            .map(|room| RoomTag {
                id: format!("TAG-{}", room.number),
                room_id: room.id.clone(),
                number: room.number.clone(),
                name: room.name.clone(),
                area_m2: room.area_m2,
                at: room.rect.center(),
            })
            .collect();

        set.elevation_markers = self.markers(plan);
        set.section_cuts = self.section_cuts(plan);

        debug!(
            dimensions = set.dimensions.len(),
            tags = set.tags.len(),
            sections = set.section_cuts.len(),
            "annotation complete"
        );
        set
    }

    fn side_dimensions(&self, plan: &FloorPlan, side: Direction, out: &mut Vec<Dimension>, next: &mut usize) {
        let fp = &plan.footprint;
        let mut runs: Vec<&Wall> = plan
            .walls
            .iter()
            .filter(|w| w.is_exterior() && on_side(w, fp, side))
            .collect();
        runs.sort_by_key(|w| (w.start.x, w.start.y));
        if runs.is_empty() {
            return;
        }

        let normal = side.normal();
        let chain = self.settings.chain_offset_m;
        let overall = self.settings.overall_offset_m;

        for wall in &runs {
            let from = wall.start.to_vec2();
            let to = wall.end.to_vec2();
            out.push(linear(
                next,
                DimensionKind::Chain,
                from,
                to,
                normal,
                chain,
                &wall.id,
            ));
        }

        let first = runs[0].start.to_vec2();
        let last = runs[runs.len() - 1].end.to_vec2();
        out.push(linear(
            next,
            DimensionKind::Overall,
            first,
            last,
            normal,
            overall,
            &format!("SIDE-{}", side.letter()),
        ));
    }

    fn markers(&self, plan: &FloorPlan) -> Vec<ElevationMarker> {
        let fp = &plan.footprint;
        let center = fp.center();
        let half_w = units::m(fp.w) / 2.0;
        let half_h = units::m(fp.h) / 2.0;
        let off = self.settings.marker_offset_m;

        Direction::ALL
            .iter()
            .map(|&direction| {
                let n = direction.normal();
                let at = center.offset(n.x * (half_w + off), n.y * (half_h + off));
                ElevationMarker {
                    id: format!("EL-{}", direction.letter()),
                    direction,
                    at,
                    view_id: elevation_view_id(direction),
                }
            })
            .collect()
    }

    fn section_cuts(&self, plan: &FloorPlan) -> Vec<SectionCut> {
        let fp = &plan.footprint;
        let count = self.settings.section_cut_count as usize;
        let horizontal_total = count.div_ceil(2);
        let vertical_total = count / 2;
        let ext = self.settings.section_extension_m;

        let mut cuts = Vec::with_capacity(count);
        let (mut h_index, mut v_index) = (0, 0);
        for k in 0..count {
            let label = section_label(k);
            let (axis, position) = if k % 2 == 0 {
                h_index += 1;
                let y = fp.y + fp.h * h_index as i64 / (horizontal_total as i64 + 1);
                (Axis::Horizontal, clear_of_walls(plan, Axis::Horizontal, y, fp.y, fp.max_y()))
            } else {
                v_index += 1;
                let x = fp.x + fp.w * v_index as i64 / (vertical_total as i64 + 1);
                (Axis::Vertical, clear_of_walls(plan, Axis::Vertical, x, fp.x, fp.max_x()))
            };

            let (start, end) = match axis {
                Axis::Horizontal => (
                    Vec2::new(units::m(fp.x) - ext, units::m(position)),
                    Vec2::new(units::m(fp.max_x()) + ext, units::m(position)),
                ),
                Axis::Vertical => (
                    Vec2::new(units::m(position), units::m(fp.y) - ext),
                    Vec2::new(units::m(position), units::m(fp.max_y()) + ext),
                ),
            };
            cuts.push(SectionCut {
                id: format!("SEC-{}", label),
                view_id: section_view_id(&label),
                label,
                axis,
                position_mm: position,
                start,
                end,
            });
        }
        cuts
    }
}

/// "A".."Z", then "AA", "AB", ...
fn section_label(index: usize) -> String {
    let letter = |i: usize| char::from(b'A' + (i % 26) as u8);
    if index < 26 {
        letter(index).to_string()
    } else {
        format!("{}{}", letter(index / 26 - 1), letter(index))
    }
}

const SECTION_NUDGE_MM: i64 = 250;

/// Move a cut line off any wall lying on it
fn clear_of_walls(plan: &FloorPlan, axis: Axis, position: i64, min: i64, max: i64) -> i64 {
    let on_wall = |p: i64| {
        plan.walls.iter().any(|w| {
            w.axis == axis
                && match axis {
                    Axis::Horizontal => w.start.y == p,
                    Axis::Vertical => w.start.x == p,
                }
        })
    };
    if !on_wall(position) {
        return position;
    }
    for candidate in [position + SECTION_NUDGE_MM, position - SECTION_NUDGE_MM] {
        if candidate > min && candidate < max && !on_wall(candidate) {
            return candidate;
        }
    }
    position
}

fn on_side(wall: &Wall, fp: &Rect, side: Direction) -> bool {
    match side {
        Direction::South => wall.axis == Axis::Horizontal && wall.start.y == fp.y,
        Direction::North => wall.axis == Axis::Horizontal && wall.start.y == fp.max_y(),
        Direction::West => wall.axis == Axis::Vertical && wall.start.x == fp.x,
        Direction::East => wall.axis == Axis::Vertical && wall.start.x == fp.max_x(),
    }
}

fn linear(
    next: &mut usize,
    kind: DimensionKind,
    from: Vec2,
    to: Vec2,
    normal: Vec2,
    offset: f64,
    element_id: &str,
) -> Dimension {
    let value_m = from.distance_sq(to).sqrt();
    let dim = Dimension {
        id: format!("DIM-{:03}", *next),
        kind,
        from,
        to,
        line_from: from.offset(normal.x * offset, normal.y * offset),
        line_to: to.offset(normal.x * offset, normal.y * offset),
        value_m,
        text: units::format_m(value_m),
        element_id: element_id.to_string(),
    };
    *next += 1;
    dim
}

/// Thickest wall on one edge line of a room, in millimetres
fn edge_thickness(plan: &FloorPlan, room: &Room, side: Direction) -> i64 {
    let r = &room.rect;
    plan.walls_of(&room.id)
        .filter(|w| match side {
            Direction::South => w.axis == Axis::Horizontal && w.start.y == r.y,
            Direction::North => w.axis == Axis::Horizontal && w.start.y == r.max_y(),
            Direction::West => w.axis == Axis::Vertical && w.start.x == r.x,
            Direction::East => w.axis == Axis::Vertical && w.start.x == r.max_x(),
        })
        .map(|w| w.thickness_mm)
        .max()
        .unwrap_or(0)
}

fn clear_dimensions(plan: &FloorPlan, room: &Room, out: &mut Vec<Dimension>, next: &mut usize) {
    let r = &room.rect;
    let west = r.x + edge_thickness(plan, room, Direction::West) / 2;
    let east = r.max_x() - edge_thickness(plan, room, Direction::East) / 2;
    let south = r.y + edge_thickness(plan, room, Direction::South) / 2;
    let north = r.max_y() - edge_thickness(plan, room, Direction::North) / 2;

    // Width line a quarter of the way up, depth line a quarter of the way in
    let y = units::m(r.y + r.h / 4);
    let x = units::m(r.x + r.w / 4);
    out.push(linear(
        next,
        DimensionKind::Clear,
        Vec2::new(units::m(west), y),
        Vec2::new(units::m(east), y),
        Vec2::default(),
        0.0,
        &room.id,
    ));
    out.push(linear(
        next,
        DimensionKind::Clear,
        Vec2::new(x, units::m(south)),
        Vec2::new(x, units::m(north)),
        Vec2::default(),
        0.0,
        &room.id,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnnotationSettings;
    use crate::plan::tests::demo_plan;

    #[test]
    fn test_annotation_is_idempotent() {
        let plan = demo_plan();
        let settings = AnnotationSettings::default();
        let engine = CDAnnotationEngine::new(&settings);
        assert_eq!(engine.annotate(&plan), engine.annotate(&plan));
    }

    #[test]
    fn test_chain_dimensions_sum_to_overall() {
        let plan = demo_plan();
        let settings = AnnotationSettings::default();
        let set = CDAnnotationEngine::new(&settings).annotate(&plan);

        let overall: Vec<_> = set
            .dimensions
            .iter()
            .filter(|d| d.kind == DimensionKind::Overall)
            .collect();
        assert_eq!(overall.len(), 4);
        let south = overall.iter().find(|d| d.element_id == "SIDE-S").unwrap();
        assert!((south.value_m - plan.footprint_width_m()).abs() < 1e-9);

        let exterior = plan.walls.iter().filter(|w| w.is_exterior()).count();
        let chain = set.dimensions.iter().filter(|d| d.kind == DimensionKind::Chain).count();
        assert_eq!(chain, exterior);
        let chain_total: f64 = set
            .dimensions
            .iter()
            .filter(|d| d.kind == DimensionKind::Chain)
            .map(|d| d.value_m)
            .sum();
        let overall_total: f64 = overall.iter().map(|d| d.value_m).sum();
        assert!((chain_total - overall_total).abs() < 1e-6);
    }

    #[test]
    fn test_clear_dimensions_subtract_wall_faces() {
        let plan = demo_plan();
        let settings = AnnotationSettings::default();
        let set = CDAnnotationEngine::new(&settings).annotate(&plan);
        for room in &plan.rooms {
            let clear: Vec<_> = set
                .dimensions
                .iter()
                .filter(|d| d.kind == DimensionKind::Clear && d.element_id == room.id)
                .collect();
            assert_eq!(clear.len(), 2);
            assert!(clear[0].value_m < units::m(room.rect.w));
            assert!(clear[1].value_m < units::m(room.rect.h));
        }
    }

    #[test]
    fn test_tags_markers_and_cuts() {
        let plan = demo_plan();
        let settings = AnnotationSettings::default();
        let set = CDAnnotationEngine::new(&settings).annotate(&plan);

        assert_eq!(set.tags.len(), plan.rooms.len());
        assert_eq!(set.tags[0].number, "101");
        assert_eq!(set.elevation_markers.len(), 4);
        for marker in &set.elevation_markers {
            let fp = crate::geometry::Bounds::from_rect(&plan.footprint);
            let inside = marker.at.x > fp.min.x && marker.at.x < fp.max.x && marker.at.y > fp.min.y && marker.at.y < fp.max.y;
            assert!(!inside);
        }

        assert_eq!(set.section_cuts.len(), 2);
        assert_eq!(set.section_cuts[0].label, "A");
        assert_eq!(set.section_cuts[0].axis, Axis::Horizontal);
        assert_eq!(set.section_cuts[1].axis, Axis::Vertical);
        for cut in &set.section_cuts {
            let on_wall = plan.walls.iter().any(|w| {
                w.axis == cut.axis
                    && match cut.axis {
                        Axis::Horizontal => w.start.y == cut.position_mm,
                        Axis::Vertical => w.start.x == cut.position_mm,
                    }
            });
            assert!(!on_wall, "cut {} lies on a wall", cut.label);
        }
    }

    #[test]
    fn test_section_labels() {
        assert_eq!(section_label(0), "A");
        assert_eq!(section_label(25), "Z");
        assert_eq!(section_label(26), "AA");
    }
}
