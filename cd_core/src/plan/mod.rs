//! # Schematic Plan Generator
//!
//! Packs the room program into a rectangular envelope and synthesizes the
//! wall and opening topology around it.
//!
//! ## Pipeline
//!
//! ```text
//! RoomRequirement[] ─► packing ─► rooms + circulation ─► walls ─► doors/windows ─► QC
//! ```
//!
//! All geometry is integer millimetres on the configured grid. The only
//! randomness is the envelope proportion and each room's nominal proportion,
//! drawn from the run's RNG, so a fixed seed reproduces the plan exactly.
//!
//! ## Example
//!
//! ```rust
//! use cd_core::config::GenerationConfig;
//! use cd_core::plan::SchematicPlanGenerator;
//! use cd_core::requirements::RoomRequirement;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let rooms = vec![RoomRequirement::new("Living", 25.0), RoomRequirement::new("Bathroom", 6.0)];
//! let config = GenerationConfig::default();
//! let mut rng = StdRng::seed_from_u64(config.seed);
//! let plan = SchematicPlanGenerator::new(&config).generate(&rooms, &mut rng).unwrap();
//! assert_eq!(plan.rooms.len(), 2);
//! ```

mod openings;
mod packing;
mod validate;
mod walls;

use std::fmt;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{GenerationConfig, PlanSettings, ViewSettings};
use crate::errors::CdResult;
use crate::geometry::{Axis, Point, Rect, Vec2};
use crate::qc::{category, QcIssue, Severity};
use crate::requirements::{RoomFunction, RoomRequirement};
use crate::units;

pub use validate::validate_plan;

// ============================================================================
// Plan model
// ============================================================================

/// A packed room. Never mutated once the plan is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// "RM-101", "RM-102", ...
    pub id: String,
    /// Room number shown on tags and schedules ("101")
    pub number: String,
    /// Index into the requirement list
    pub requirement: usize,
    /// Display name, count-expanded ("Bedroom 2")
    pub name: String,
    pub function: RoomFunction,
    pub rect: Rect,
    /// Counter-clockwise outline
    pub polygon: Vec<Point>,
    pub area_m2: f64,
    pub target_area_m2: f64,
    pub level: u32,
}

/// Leftover packing space inside the footprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CirculationSpace {
    pub id: String,
    /// Touching circulation rectangles share a zone
    pub zone: String,
    pub rect: Rect,
}

/// What lies on one side of a wall
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Space {
    Room(String),
    Circulation(String),
    Outside,
}

impl Space {
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Space::Room(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_outside(&self) -> bool {
        matches!(self, Space::Outside)
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Space::Room(id) | Space::Circulation(id) => f.write_str(id),
            Space::Outside => f.write_str("outside"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WallKind {
    Exterior,
    Interior,
}

/// One straight wall run between the same pair of spaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub id: String,
    /// Centreline start (south or west end)
    pub start: Point,
    /// Centreline end (north or east end)
    pub end: Point,
    pub axis: Axis,
    pub thickness_mm: i64,
    pub kind: WallKind,
    /// [below or left, above or right]
    pub sides: [Space; 2],
}

impl Wall {
    pub fn length_mm(&self) -> i64 {
        (self.end.x - self.start.x) + (self.end.y - self.start.y)
    }

    pub fn is_exterior(&self) -> bool {
        self.kind == WallKind::Exterior
    }

    pub fn bounds(&self, space: &Space) -> bool {
        self.sides.contains(space)
    }

    /// The side that is not `space`
    pub fn other_side(&self, space: &Space) -> Option<&Space> {
        if &self.sides[0] == space {
            Some(&self.sides[1])
        } else if &self.sides[1] == space {
            Some(&self.sides[0])
        } else {
            None
        }
    }

    pub fn midpoint(&self) -> Vec2 {
        self.start.to_vec2().midpoint(self.end.to_vec2())
    }

    /// Point along the centreline, `offset` millimetres from the start
    pub fn point_at(&self, offset: i64) -> Point {
        match self.axis {
            Axis::Horizontal => Point::new(self.start.x + offset, self.start.y),
            Axis::Vertical => Point::new(self.start.x, self.start.y + offset),
        }
    }

    /// Wall body outline as a rectangle (thickness centred on the line)
    pub fn body(&self) -> Rect {
        self.span_body(0, self.length_mm())
    }

    /// Outline of the part of the body between two offsets
    pub fn span_body(&self, from: i64, to: i64) -> Rect {
        let half = self.thickness_mm / 2;
        let a = self.point_at(from);
        let b = self.point_at(to);
        match self.axis {
            Axis::Horizontal => Rect::from_corners(a.x, a.y - half, b.x, b.y + self.thickness_mm - half),
            Axis::Vertical => Rect::from_corners(a.x - half, a.y, b.x + self.thickness_mm - half, b.y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningKind {
    Door,
    Window,
}

impl OpeningKind {
    pub fn label(self) -> &'static str {
        match self {
            OpeningKind::Door => "Door",
            OpeningKind::Window => "Window",
        }
    }
}

/// A door or window hosted in a wall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opening {
    pub id: String,
    pub kind: OpeningKind,
    pub wall_id: String,
    /// Distance from the host wall start to the near jamb
    pub offset_mm: i64,
    pub width_mm: i64,
    pub sill_mm: i64,
    pub head_mm: i64,
    /// Spaces the opening joins (same order as the wall's sides)
    pub connects: [Space; 2],
    /// Door leading outside
    #[serde(default)]
    pub entry: bool,
}

impl Opening {
    pub fn height_mm(&self) -> i64 {
        self.head_mm - self.sill_mm
    }

    pub fn type_label(&self) -> &'static str {
        match (self.kind, self.entry) {
            (OpeningKind::Door, true) => "Entry Door",
            (OpeningKind::Door, false) => "Interior Door",
            (OpeningKind::Window, _) => "Fixed Window",
        }
    }
}

/// The packed plan with its topology and the QC findings raised building it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorPlan {
    /// Final packing envelope
    pub envelope: Rect,
    /// Bounding box of the rooms; the building outline
    pub footprint: Rect,
    pub rooms: Vec<Room>,
    pub circulation: Vec<CirculationSpace>,
    pub walls: Vec<Wall>,
    pub openings: Vec<Opening>,
    pub issues: Vec<QcIssue>,
    pub growth_iterations: u32,
}

impl FloorPlan {
    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    pub fn wall(&self, id: &str) -> Option<&Wall> {
        self.walls.iter().find(|w| w.id == id)
    }

    pub fn openings_on<'a>(&'a self, wall_id: &'a str) -> impl Iterator<Item = &'a Opening> + 'a {
        self.openings.iter().filter(move |o| o.wall_id == wall_id)
    }

    pub fn doors(&self) -> impl Iterator<Item = &Opening> {
        self.openings.iter().filter(|o| o.kind == OpeningKind::Door)
    }

    pub fn windows(&self) -> impl Iterator<Item = &Opening> {
        self.openings.iter().filter(|o| o.kind == OpeningKind::Window)
    }

    /// Walls bounding a room
    pub fn walls_of<'a>(&'a self, room_id: &str) -> impl Iterator<Item = &'a Wall> + 'a {
        let space = Space::Room(room_id.to_string());
        self.walls.iter().filter(move |w| w.bounds(&space))
    }

    pub fn footprint_width_m(&self) -> f64 {
        units::m(self.footprint.w)
    }

    pub fn footprint_depth_m(&self) -> f64 {
        units::m(self.footprint.h)
    }

    /// True when two rooms share a wall
    pub fn rooms_adjacent(&self, a: &str, b: &str) -> bool {
        let sa = Space::Room(a.to_string());
        let sb = Space::Room(b.to_string());
        self.walls.iter().any(|w| w.bounds(&sa) && w.bounds(&sb))
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Error).count()
    }
}

// ============================================================================
// Generator
// ============================================================================

/// Stage 2 of the pipeline
pub struct SchematicPlanGenerator<'a> {
    plan: &'a PlanSettings,
    views: &'a ViewSettings,
}

impl<'a> SchematicPlanGenerator<'a> {
    pub fn new(config: &'a GenerationConfig) -> Self {
        SchematicPlanGenerator {
            plan: &config.plan,
            views: &config.views,
        }
    }

    /// Pack, build topology and run plan QC
    pub fn generate(&self, requirements: &[RoomRequirement], rng: &mut StdRng) -> CdResult<FloorPlan> {
        let specs = packing::expand(requirements);
        let packed = packing::pack(&specs, self.plan, rng)?;

        let footprint = Rect::bounding(packed.placed.iter().map(|(_, r)| *r))
            .unwrap_or_else(|| Rect::new(0, 0, 0, 0));

        let rooms: Vec<Room> = packed
            .placed
            .iter()
            .enumerate()
            .map(|(i, (spec_idx, rect))| {
                let spec = &specs[*spec_idx];
                Room {
                    id: format!("RM-{}", 101 + i),
                    number: (101 + i).to_string(),
                    requirement: spec.requirement,
                    name: spec.name.clone(),
                    function: spec.function,
                    rect: *rect,
                    polygon: rect.corners().to_vec(),
                    area_m2: rect.area_m2(),
                    target_area_m2: spec.target_m2,
                    level: 0,
                }
            })
            .collect();

        let circulation = walls::circulation_spaces(&packed.free, &footprint);
        let walls = walls::synthesize(&rooms, &circulation, self.plan);

        let mut plan = FloorPlan {
            envelope: packed.envelope,
            footprint,
            rooms,
            circulation,
            walls,
            openings: Vec::new(),
            issues: Vec::new(),
            growth_iterations: packed.growth_iterations,
        };

        openings::place_doors(&mut plan, self.plan, self.views);
        openings::place_windows(&mut plan, requirements, self.plan, self.views);
        check_areas(&mut plan, self.plan);
        check_adjacencies(&mut plan, requirements);

        for issue in &plan.issues {
            match issue.severity {
                Severity::Error | Severity::Warning => warn!(%issue, "plan qc"),
                Severity::Info => debug!(%issue, "plan qc"),
            }
        }
        info!(
            rooms = plan.rooms.len(),
            walls = plan.walls.len(),
            openings = plan.openings.len(),
            footprint_w_m = plan.footprint_width_m(),
            footprint_d_m = plan.footprint_depth_m(),
            growth = plan.growth_iterations,
            "plan generated"
        );
        Ok(plan)
    }
}

fn check_areas(plan: &mut FloorPlan, settings: &PlanSettings) {
    let mut issues = Vec::new();
    for room in &plan.rooms {
        let deviation = (room.area_m2 - room.target_area_m2) / room.target_area_m2;
        if deviation.abs() > settings.area_tolerance {
            issues.push(
                QcIssue::warning(
                    category::AREA_DEVIATION,
                    format!(
                        "{} is {:.2} m2 against a target of {:.2} m2 ({:+.1}%)",
                        room.name,
                        room.area_m2,
                        room.target_area_m2,
                        deviation * 100.0
                    ),
                )
                .on(&room.id),
            );
        }
    }
    plan.issues.extend(issues);
}

fn check_adjacencies(plan: &mut FloorPlan, requirements: &[RoomRequirement]) {
    let mut issues = Vec::new();
    for (req_idx, req) in requirements.iter().enumerate() {
        for wanted in &req.adjacencies {
            let Some(target_idx) = requirements
                .iter()
                .position(|r| r.name.eq_ignore_ascii_case(wanted))
            else {
                issues.push(
                    QcIssue::info(
                        category::ADJACENCY_UNKNOWN,
                        format!("{} asks to border '{}', which is not in the program", req.name, wanted),
                    )
                    .on(&req.name),
                );
                continue;
            };

            let targets: Vec<&Room> = plan.rooms.iter().filter(|r| r.requirement == target_idx).collect();
            for room in plan.rooms.iter().filter(|r| r.requirement == req_idx) {
                let met = targets
                    .iter()
                    .any(|t| t.id != room.id && plan.rooms_adjacent(&room.id, &t.id));
                if !met {
                    issues.push(
                        QcIssue::warning(
                            category::ADJACENCY_UNMET,
                            format!("{} does not share a wall with {}", room.name, requirements[target_idx].name),
                        )
                        .on(&room.id),
                    );
                }
            }
        }
    }
    plan.issues.extend(issues);
}
