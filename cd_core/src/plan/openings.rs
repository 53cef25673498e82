//! Door and window placement.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::{PlanSettings, ViewSettings};
use crate::qc::{category, QcIssue};
use crate::requirements::{RoomFunction, RoomRequirement};
use crate::units;

use super::{FloorPlan, Opening, OpeningKind, Space, Wall};

// ============================================================================
// Connectivity
// ============================================================================

/// Union-find with path compression; smaller index becomes the root
pub(super) struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    pub(super) fn new(len: usize) -> Self {
        DisjointSet {
            parent: (0..len).collect(),
        }
    }

    pub(super) fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub(super) fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        self.parent[ra.max(rb)] = ra.min(rb);
        true
    }
}

/// Door graph over rooms and circulation zones
pub(super) struct DoorGraph {
    pub(super) nodes: BTreeMap<Space, usize>,
    pub(super) sets: DisjointSet,
}

impl DoorGraph {
    pub(super) fn build(plan: &FloorPlan) -> Self {
        let mut nodes = BTreeMap::new();
        for room in &plan.rooms {
            let next = nodes.len();
            nodes.entry(Space::Room(room.id.clone())).or_insert(next);
        }
        for space in &plan.circulation {
            let next = nodes.len();
            nodes.entry(Space::Circulation(space.zone.clone())).or_insert(next);
        }
        let mut graph = DoorGraph {
            sets: DisjointSet::new(nodes.len()),
            nodes,
        };
        for door in plan.doors() {
            graph.connect(&door.connects);
        }
        graph
    }

    pub(super) fn connect(&mut self, pair: &[Space; 2]) -> bool {
        match (self.nodes.get(&pair[0]), self.nodes.get(&pair[1])) {
            (Some(&a), Some(&b)) => self.sets.union(a, b),
            _ => false,
        }
    }

    pub(super) fn component(&mut self, space: &Space) -> Option<usize> {
        let idx = *self.nodes.get(space)?;
        Some(self.sets.find(idx))
    }

    /// Component holding the most rooms (lowest root on ties)
    pub(super) fn main_component(&mut self) -> Option<usize> {
        let rooms: Vec<usize> = self
            .nodes
            .iter()
            .filter(|(space, _)| matches!(space, Space::Room(_)))
            .map(|(_, &idx)| idx)
            .collect();
        let mut sizes: BTreeMap<usize, usize> = BTreeMap::new();
        for idx in rooms {
            *sizes.entry(self.sets.find(idx)).or_default() += 1;
        }
        sizes
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(root, _)| root)
    }
}

// ============================================================================
// Placement helpers
// ============================================================================

fn fits(wall: &Wall, width: i64, jamb: i64) -> bool {
    wall.length_mm() >= width + 2 * jamb
}

fn carries_door(plan: &FloorPlan, wall_id: &str) -> bool {
    plan.openings_on(wall_id).any(|o| o.kind == OpeningKind::Door)
}

fn is_circulation_space(plan: &FloorPlan, space: &Space) -> bool {
    match space {
        Space::Circulation(_) => true,
        Space::Room(id) => plan.room(id).is_some_and(|r| r.function.is_circulation()),
        Space::Outside => false,
    }
}

fn space_area(plan: &FloorPlan, space: &Space) -> f64 {
    match space {
        Space::Room(id) => plan.room(id).map(|r| r.area_m2).unwrap_or(0.0),
        Space::Circulation(zone) => plan
            .circulation
            .iter()
            .filter(|c| &c.zone == zone)
            .map(|c| c.rect.area_m2())
            .sum(),
        Space::Outside => 0.0,
    }
}

struct DoorSpec {
    width: i64,
    jamb: i64,
    head: i64,
}

impl DoorSpec {
    fn new(settings: &PlanSettings, views: &ViewSettings) -> Self {
        DoorSpec {
            width: units::mm(settings.door_width_m),
            jamb: units::mm(settings.jamb_margin_m),
            head: units::mm(views.door_head_m),
        }
    }

    /// Door centred on the wall
    fn on(&self, wall: &Wall, index: usize, entry: bool) -> Opening {
        Opening {
            id: format!("DR-{:02}", index),
            kind: OpeningKind::Door,
            wall_id: wall.id.clone(),
            offset_mm: (wall.length_mm() - self.width) / 2,
            width_mm: self.width,
            sill_mm: 0,
            head_mm: self.head,
            connects: wall.sides.clone(),
            entry,
        }
    }
}

// ============================================================================
// Doors
// ============================================================================

/// Primary doors, connectivity repair and the entry door
pub(super) fn place_doors(plan: &mut FloorPlan, settings: &PlanSettings, views: &ViewSettings) {
    let spec = DoorSpec::new(settings, views);

    for room_idx in 0..plan.rooms.len() {
        let room = &plan.rooms[room_idx];
        let space = Space::Room(room.id.clone());
        let centroid = room.rect.center();

        let candidates: Vec<&Wall> = plan
            .walls
            .iter()
            .filter(|w| !w.is_exterior() && w.bounds(&space))
            .filter(|w| fits(w, spec.width, spec.jamb) && !carries_door(plan, &w.id))
            .collect();

        let to_circulation = candidates
            .iter()
            .filter(|w| {
                w.other_side(&space)
                    .is_some_and(|other| is_circulation_space(plan, other))
            })
            .min_by(|a, b| {
                a.midpoint()
                    .distance_sq(centroid)
                    .total_cmp(&b.midpoint().distance_sq(centroid))
                    .then_with(|| a.id.cmp(&b.id))
            });

        let chosen = to_circulation.or_else(|| {
            candidates.iter().max_by(|a, b| {
                let area_a = a.other_side(&space).map(|s| space_area(plan, s)).unwrap_or(0.0);
                let area_b = b.other_side(&space).map(|s| space_area(plan, s)).unwrap_or(0.0);
                area_a
                    .total_cmp(&area_b)
                    .then_with(|| a.length_mm().cmp(&b.length_mm()))
                    .then_with(|| b.id.cmp(&a.id))
            })
        });

        match chosen {
            Some(wall) => {
                let door = spec.on(wall, plan.doors().count() + 1, false);
                debug!(room = %room.id, wall = %wall.id, door = %door.id, "primary door");
                plan.openings.push(door);
            }
            None => debug!(room = %room.id, "no usable interior wall for a door"),
        }
    }

    repair_connectivity(plan, &spec);
    report_connectivity(plan);

    if settings.entry_door {
        place_entry(plan, &spec);
    }
}

fn repair_connectivity(plan: &mut FloorPlan, spec: &DoorSpec) {
    loop {
        let mut graph = DoorGraph::build(plan);
        let bridge = plan
            .walls
            .iter()
            .filter(|w| !w.is_exterior() && fits(w, spec.width, spec.jamb) && !carries_door(plan, &w.id))
            .filter(|w| {
                match (graph.component(&w.sides[0]), graph.component(&w.sides[1])) {
                    (Some(a), Some(b)) => a != b,
                    _ => false,
                }
            })
            .max_by(|a, b| a.length_mm().cmp(&b.length_mm()).then_with(|| b.id.cmp(&a.id)));

        let Some(wall) = bridge else {
            break;
        };
        let door = spec.on(wall, plan.doors().count() + 1, false);
        debug!(wall = %wall.id, door = %door.id, "connectivity repair door");
        plan.openings.push(door);
    }
}

fn report_connectivity(plan: &mut FloorPlan) {
    let mut graph = DoorGraph::build(plan);
    let Some(main) = graph.main_component() else {
        return;
    };

    let mut issues = Vec::new();
    for room in &plan.rooms {
        if graph.component(&Space::Room(room.id.clone())) != Some(main) {
            issues.push(
                QcIssue::error(
                    category::DISCONNECTED,
                    format!("{} cannot be reached through doors from the rest of the plan", room.name),
                )
                .on(&room.id),
            );
        }
    }
    let mut seen_zones: Vec<&str> = Vec::new();
    for space in &plan.circulation {
        if seen_zones.contains(&space.zone.as_str()) {
            continue;
        }
        seen_zones.push(&space.zone);
        if graph.component(&Space::Circulation(space.zone.clone())) != Some(main) {
            issues.push(
                QcIssue::warning(
                    category::CIRCULATION_UNREACHABLE,
                    format!("circulation zone {} has no door to the rooms", space.zone),
                )
                .on(&space.zone),
            );
        }
    }
    plan.issues.extend(issues);
}

/// Entry host candidates in preference order
fn entry_candidates(plan: &FloorPlan) -> Vec<Space> {
    let mut out = Vec::new();
    let rooms_of = |function: RoomFunction| {
        plan.rooms
            .iter()
            .filter(move |r| r.function == function)
            .map(|r| Space::Room(r.id.clone()))
    };
    out.extend(rooms_of(RoomFunction::Lobby));
    out.extend(rooms_of(RoomFunction::Corridor));

    for space in &plan.circulation {
        let zone = Space::Circulation(space.zone.clone());
        if !out.contains(&zone) {
            out.push(zone);
        }
    }

    let mut by_area: Vec<_> = plan.rooms.iter().collect();
    by_area.sort_by(|a, b| b.area_m2.total_cmp(&a.area_m2).then_with(|| a.id.cmp(&b.id)));
    out.extend(
        by_area
            .iter()
            .filter(|r| r.function == RoomFunction::Living)
            .map(|r| Space::Room(r.id.clone())),
    );
    out.extend(by_area.iter().map(|r| Space::Room(r.id.clone())));
    out
}

fn place_entry(plan: &mut FloorPlan, spec: &DoorSpec) {
    let chosen = entry_candidates(plan).into_iter().find_map(|space| {
        plan.walls
            .iter()
            .filter(|w| w.is_exterior() && w.bounds(&space))
            .filter(|w| fits(w, spec.width, spec.jamb) && !carries_door(plan, &w.id))
            .max_by(|a, b| a.length_mm().cmp(&b.length_mm()).then_with(|| b.id.cmp(&a.id)))
            .cloned()
    });

    match chosen {
        Some(wall) => {
            let door = spec.on(&wall, plan.doors().count() + 1, true);
            debug!(wall = %wall.id, door = %door.id, "entry door");
            plan.openings.push(door);
        }
        None => plan.issues.push(QcIssue::warning(
            category::NO_ENTRY,
            "no exterior wall is long enough for an entry door",
        )),
    }
}

// ============================================================================
// Windows
// ============================================================================

/// Centred windows on the exterior walls of rooms that want daylight
pub(super) fn place_windows(
    plan: &mut FloorPlan,
    requirements: &[RoomRequirement],
    settings: &PlanSettings,
    views: &ViewSettings,
) {
    let width = units::mm(settings.window_width_m);
    let jamb = units::mm(settings.jamb_margin_m);
    let sill = units::mm(views.window_sill_m);
    let head = units::mm(views.window_head_m);

    let mut windows = Vec::new();
    let mut issues = Vec::new();

    for room in &plan.rooms {
        let wants = requirements
            .get(room.requirement)
            .map(RoomRequirement::wants_window)
            .unwrap_or_else(|| room.function.is_habitable());
        if !wants {
            continue;
        }

        let exterior: Vec<&Wall> = plan
            .walls_of(&room.id)
            .filter(|w| w.is_exterior())
            .collect();
        if exterior.is_empty() {
            issues.push(
                QcIssue::warning(
                    category::NO_EXTERIOR_WALL,
                    format!("{} has no exterior wall for a window", room.name),
                )
                .on(&room.id),
            );
            continue;
        }

        let mut placed = 0;
        let mut reported = false;
        for wall in exterior {
            if carries_door(plan, &wall.id) {
                continue;
            }
            if !fits(wall, width, jamb) {
                issues.push(
                    QcIssue::info(
                        category::WINDOW_NOT_PLACED,
                        format!(
                            "{} exterior wall {} is {} long, too short for a {} window",
                            room.name,
                            wall.id,
                            units::format_m(units::m(wall.length_mm())),
                            units::format_m(settings.window_width_m)
                        ),
                    )
                    .on(&wall.id),
                );
                reported = true;
                continue;
            }
            windows.push(Opening {
                id: format!("WN-{:02}", windows.len() + 1),
                kind: OpeningKind::Window,
                wall_id: wall.id.clone(),
                offset_mm: (wall.length_mm() - width) / 2,
                width_mm: width,
                sill_mm: sill,
                head_mm: head,
                connects: wall.sides.clone(),
                entry: false,
            });
            placed += 1;
        }
        if placed == 0 && !reported {
            issues.push(
                QcIssue::info(
                    category::WINDOW_NOT_PLACED,
                    format!("every exterior wall of {} already carries a door", room.name),
                )
                .on(&room.id),
            );
        }
    }

    plan.openings.extend(windows);
    plan.issues.extend(issues);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::plan::tests::demo_plan;
    use crate::plan::{walls, Room};
    use crate::qc::count_category;

    fn room(id: &str, function: RoomFunction, rect: Rect) -> Room {
        Room {
            id: id.to_string(),
            number: id.trim_start_matches("RM-").to_string(),
            requirement: 0,
            name: id.to_string(),
            function,
            rect,
            polygon: rect.corners().to_vec(),
            area_m2: rect.area_m2(),
            target_area_m2: rect.area_m2(),
            level: 0,
        }
    }

    fn plan_of(rooms: Vec<Room>) -> FloorPlan {
        let footprint = Rect::bounding(rooms.iter().map(|r| r.rect)).unwrap();
        let walls = walls::synthesize(&rooms, &[], &PlanSettings::default());
        FloorPlan {
            envelope: footprint,
            footprint,
            rooms,
            circulation: Vec::new(),
            walls,
            openings: Vec::new(),
            issues: Vec::new(),
            growth_iterations: 0,
        }
    }

    #[test]
    fn test_disjoint_set() {
        let mut set = DisjointSet::new(4);
        assert!(set.union(0, 1));
        assert!(set.union(3, 2));
        assert!(!set.union(1, 0));
        assert_eq!(set.find(1), 0);
        assert_eq!(set.find(3), 2);
        assert!(set.union(1, 3));
        assert_eq!(set.find(3), 0);
    }

    #[test]
    fn test_door_prefers_corridor() {
        let mut plan = plan_of(vec![
            room("RM-101", RoomFunction::Bedroom, Rect::new(0, 0, 4000, 4000)),
            room("RM-102", RoomFunction::Corridor, Rect::new(4000, 0, 1500, 4000)),
            room("RM-103", RoomFunction::Living, Rect::new(0, 4000, 5500, 4000)),
        ]);
        place_doors(&mut plan, &PlanSettings::default(), &ViewSettings::default());
        let first = &plan.openings[0];
        assert!(first.connects.contains(&Space::Room("RM-102".to_string())));
        assert_eq!(first.offset_mm, (4000 - 900) / 2);
        assert_eq!(count_category(&plan.issues, category::DISCONNECTED), 0);
    }

    #[test]
    fn test_short_walls_leave_room_disconnected() {
        let mut settings = PlanSettings::default();
        settings.door_width_m = 5.0;
        let mut plan = plan_of(vec![
            room("RM-101", RoomFunction::Bedroom, Rect::new(0, 0, 3000, 3000)),
            room("RM-102", RoomFunction::Living, Rect::new(3000, 0, 3000, 3000)),
        ]);
        place_doors(&mut plan, &settings, &ViewSettings::default());
        assert_eq!(plan.doors().count(), 0);
        assert_eq!(count_category(&plan.issues, category::DISCONNECTED), 1);
        assert_eq!(count_category(&plan.issues, category::NO_ENTRY), 1);
    }

    #[test]
    fn test_entry_on_living_room_without_circulation() {
        let mut plan = plan_of(vec![
            room("RM-101", RoomFunction::Bathroom, Rect::new(0, 0, 2000, 3000)),
            room("RM-102", RoomFunction::Living, Rect::new(2000, 0, 5000, 3000)),
        ]);
        place_doors(&mut plan, &PlanSettings::default(), &ViewSettings::default());
        let entry = plan.doors().find(|d| d.entry).unwrap();
        assert!(entry.connects.contains(&Space::Room("RM-102".to_string())));
        assert!(entry.connects.contains(&Space::Outside));
    }

    #[test]
    fn test_window_skipped_for_bathroom() {
        let mut plan = plan_of(vec![
            room("RM-101", RoomFunction::Bathroom, Rect::new(0, 0, 2000, 3000)),
            room("RM-102", RoomFunction::Bedroom, Rect::new(2000, 0, 4000, 3000)),
        ]);
        plan.rooms[1].requirement = 1;
        let requirements = vec![RoomRequirement::new("Bathroom", 6.0), RoomRequirement::new("Bedroom", 12.0)];
        place_windows(&mut plan, &requirements, &PlanSettings::default(), &ViewSettings::default());
        assert!(plan.windows().all(|w| {
            let wall = plan.wall(&w.wall_id).unwrap();
            wall.bounds(&Space::Room("RM-102".to_string()))
        }));
        assert_eq!(plan.windows().count(), 3);
    }

    #[test]
    fn test_demo_plan_is_connected() {
        let plan = demo_plan();
        let mut graph = DoorGraph::build(&plan);
        let main = graph.main_component();
        for room in &plan.rooms {
            assert_eq!(graph.component(&Space::Room(room.id.clone())), main);
        }
    }
}
