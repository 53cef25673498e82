//! Plan invariant checks.
//!
//! Returns human-readable violations instead of failing fast, so tests can
//! print everything wrong with a plan at once.

use std::collections::BTreeMap;

use crate::geometry::Point;

use super::openings::DoorGraph;
use super::{FloorPlan, OpeningKind, Space, WallKind};

/// Check the structural invariants of a generated plan.
/// An empty list means the plan is sound.
pub fn validate_plan(plan: &FloorPlan) -> Vec<String> {
    let mut out = Vec::new();
    check_rooms(plan, &mut out);
    check_tiling(plan, &mut out);
    check_walls(plan, &mut out);
    check_exterior_loop(plan, &mut out);
    check_openings(plan, &mut out);
    check_connectivity(plan, &mut out);
    out
}

fn check_rooms(plan: &FloorPlan, out: &mut Vec<String>) {
    for (i, room) in plan.rooms.iter().enumerate() {
        if room.rect.is_empty() {
            out.push(format!("{} has an empty outline", room.id));
        }
        if room.polygon != room.rect.corners() {
            out.push(format!("{} polygon does not match its rectangle", room.id));
        }
        if !plan.footprint.contains_rect(&room.rect) {
            out.push(format!("{} lies outside the footprint", room.id));
        }
        for other in &plan.rooms[i + 1..] {
            if room.rect.overlaps(&other.rect) {
                out.push(format!("{} overlaps {}", room.id, other.id));
            }
        }
        for space in &plan.circulation {
            if room.rect.overlaps(&space.rect) {
                out.push(format!("{} overlaps circulation {}", room.id, space.id));
            }
        }
    }
    if !plan.envelope.contains_rect(&plan.footprint) {
        out.push("footprint exceeds the packing envelope".to_string());
    }
}

fn check_tiling(plan: &FloorPlan, out: &mut Vec<String>) {
    let rooms: i64 = plan.rooms.iter().map(|r| r.rect.area_mm2()).sum();
    let circulation: i64 = plan.circulation.iter().map(|c| c.rect.area_mm2()).sum();
    if rooms > plan.envelope.area_mm2() {
        out.push(format!(
            "packed area {} mm2 exceeds envelope area {} mm2",
            rooms,
            plan.envelope.area_mm2()
        ));
    }
    if rooms + circulation != plan.footprint.area_mm2() {
        out.push(format!(
            "rooms and circulation cover {} mm2 of a {} mm2 footprint",
            rooms + circulation,
            plan.footprint.area_mm2()
        ));
    }
}

fn check_walls(plan: &FloorPlan, out: &mut Vec<String>) {
    for wall in &plan.walls {
        if wall.length_mm() <= 0 {
            out.push(format!("{} has no length", wall.id));
        }
        if wall.sides[0] == wall.sides[1] {
            out.push(format!("{} has the same space on both sides", wall.id));
        }
        let outside = wall.sides.iter().filter(|s| s.is_outside()).count();
        match wall.kind {
            WallKind::Exterior if outside != 1 => {
                out.push(format!("exterior wall {} must separate one space from outside", wall.id))
            }
            WallKind::Interior if outside != 0 => {
                out.push(format!("interior wall {} touches outside", wall.id))
            }
            WallKind::Interior if !wall.sides.iter().any(|s| matches!(s, Space::Room(_))) => {
                out.push(format!("interior wall {} bounds no room", wall.id))
            }
            _ => {}
        }
    }
}

fn check_exterior_loop(plan: &FloorPlan, out: &mut Vec<String>) {
    let mut degree: BTreeMap<Point, u32> = BTreeMap::new();
    let mut perimeter = 0;
    for wall in plan.walls.iter().filter(|w| w.is_exterior()) {
        *degree.entry(wall.start).or_default() += 1;
        *degree.entry(wall.end).or_default() += 1;
        perimeter += wall.length_mm();
    }
    if let Some((point, _)) = degree.iter().find(|(_, d)| **d % 2 != 0) {
        out.push(format!("exterior wall loop is open at ({}, {})", point.x, point.y));
    }
    let expected = 2 * (plan.footprint.w + plan.footprint.h);
    if perimeter != expected {
        out.push(format!("exterior walls run {} mm around a {} mm perimeter", perimeter, expected));
    }
}

fn check_openings(plan: &FloorPlan, out: &mut Vec<String>) {
    for opening in &plan.openings {
        let Some(wall) = plan.wall(&opening.wall_id) else {
            out.push(format!("{} is hosted on missing wall {}", opening.id, opening.wall_id));
            continue;
        };
        if opening.offset_mm <= 0 || opening.offset_mm + opening.width_mm >= wall.length_mm() {
            out.push(format!("{} does not fit inside {} between jambs", opening.id, wall.id));
        }
        if opening.kind == OpeningKind::Window && !wall.is_exterior() {
            out.push(format!("window {} sits on interior wall {}", opening.id, wall.id));
        }
        if opening.connects != wall.sides {
            out.push(format!("{} connects spaces its wall does not bound", opening.id));
        }
        if opening.head_mm <= opening.sill_mm {
            out.push(format!("{} has no height", opening.id));
        }
    }
    for (i, a) in plan.openings.iter().enumerate() {
        for b in plan.openings[i + 1..].iter().filter(|b| b.wall_id == a.wall_id) {
            if a.offset_mm < b.offset_mm + b.width_mm && b.offset_mm < a.offset_mm + a.width_mm {
                out.push(format!("{} overlaps {}", a.id, b.id));
            }
        }
    }
}

fn check_connectivity(plan: &FloorPlan, out: &mut Vec<String>) {
    let mut graph = DoorGraph::build(plan);
    let main = graph.main_component();
    for room in &plan.rooms {
        if graph.component(&Space::Room(room.id.clone())) != main {
            out.push(format!("{} is not reachable through doors", room.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::tests::demo_plan;

    #[test]
    fn test_demo_plan_is_valid() {
        assert!(validate_plan(&demo_plan()).is_empty());
    }

    #[test]
    fn test_overlap_detected() {
        let mut plan = demo_plan();
        let shifted = plan.rooms[0].rect;
        plan.rooms[1].rect = shifted;
        plan.rooms[1].polygon = shifted.corners().to_vec();
        let violations = validate_plan(&plan);
        assert!(violations.iter().any(|v| v.contains("overlaps")));
    }

    #[test]
    fn test_window_on_interior_wall_detected() {
        let mut plan = demo_plan();
        let interior = plan.walls.iter().find(|w| !w.is_exterior()).unwrap().clone();
        let window = plan.openings.iter_mut().find(|o| o.kind == OpeningKind::Window).unwrap();
        window.wall_id = interior.id.clone();
        window.connects = interior.sides.clone();
        window.offset_mm = 1;
        window.width_mm = 1;
        let violations = validate_plan(&plan);
        assert!(violations.iter().any(|v| v.contains("interior wall")));
    }

    #[test]
    fn test_missing_door_breaks_connectivity() {
        let mut plan = demo_plan();
        plan.openings.retain(|o| o.kind != OpeningKind::Door);
        let violations = validate_plan(&plan);
        assert!(violations.iter().any(|v| v.contains("not reachable")));
    }
}
