//! Wall synthesis.
//!
//! Every rectangle edge (rooms and circulation) is cut at all breakpoints on
//! its line. Each elementary piece is classified by probing half a millimetre
//! to either side, and consecutive pieces with the same pair of spaces merge
//! into one wall. A shared edge therefore yields exactly one wall instance.

use std::collections::BTreeMap;

use crate::config::PlanSettings;
use crate::geometry::{Axis, Point, Rect};
use crate::units;

use super::openings::DisjointSet;
use super::{CirculationSpace, Room, Space, Wall, WallKind};

/// Leftover free rectangles clipped to the footprint, grouped into zones
pub(super) fn circulation_spaces(free: &[Rect], footprint: &Rect) -> Vec<CirculationSpace> {
    let mut rects: Vec<Rect> = free.iter().filter_map(|f| f.intersection(footprint)).collect();
    rects.sort_by_key(|r| (r.y, r.x, r.w, r.h));

    let mut sets = DisjointSet::new(rects.len());
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if rects[i].shared_edge_len(&rects[j]) > 0 {
                sets.union(i, j);
            }
        }
    }

    let mut zone_names: BTreeMap<usize, String> = BTreeMap::new();
    let mut out = Vec::with_capacity(rects.len());
    for (i, rect) in rects.iter().enumerate() {
        let root = sets.find(i);
        let next_zone = zone_names.len() + 1;
        let zone = zone_names
            .entry(root)
            .or_insert_with(|| format!("CZ-{}", next_zone))
            .clone();
        out.push(CirculationSpace {
            id: format!("CS-{:02}", i + 1),
            zone,
            rect: *rect,
        });
    }
    out
}

struct Piece {
    from: i64,
    to: i64,
    sides: [Space; 2],
}

/// Build the wall set for packed rooms and circulation
pub(super) fn synthesize(rooms: &[Room], circulation: &[CirculationSpace], settings: &PlanSettings) -> Vec<Wall> {
    let spaces: Vec<(Rect, Space)> = rooms
        .iter()
        .map(|r| (r.rect, Space::Room(r.id.clone())))
        .chain(circulation.iter().map(|c| (c.rect, Space::Circulation(c.zone.clone()))))
        .collect();

    let locate = |px2: i64, py2: i64| -> Space {
        spaces
            .iter()
            .find(|(rect, _)| rect.contains_doubled(px2, py2))
            .map(|(_, space)| space.clone())
            .unwrap_or(Space::Outside)
    };

    // line coordinate -> edge intervals on that line
    let mut horizontal: BTreeMap<i64, Vec<(i64, i64)>> = BTreeMap::new();
    let mut vertical: BTreeMap<i64, Vec<(i64, i64)>> = BTreeMap::new();
    for (rect, _) in &spaces {
        horizontal.entry(rect.y).or_default().push((rect.x, rect.max_x()));
        horizontal.entry(rect.max_y()).or_default().push((rect.x, rect.max_x()));
        vertical.entry(rect.x).or_default().push((rect.y, rect.max_y()));
        vertical.entry(rect.max_x()).or_default().push((rect.y, rect.max_y()));
    }

    let interior = units::mm(settings.interior_wall_thickness_m);
    let exterior = units::mm(settings.exterior_wall_thickness_m);
    let mut walls = Vec::new();

    for (axis, lines) in [(Axis::Horizontal, &horizontal), (Axis::Vertical, &vertical)] {
        for (&line, edges) in lines {
            for piece in merged_pieces(line, edges, axis, &locate) {
                let (start, end) = match axis {
                    Axis::Horizontal => (Point::new(piece.from, line), Point::new(piece.to, line)),
                    Axis::Vertical => (Point::new(line, piece.from), Point::new(line, piece.to)),
                };
                let kind = if piece.sides.iter().any(Space::is_outside) {
                    WallKind::Exterior
                } else {
                    WallKind::Interior
                };
                walls.push(Wall {
                    id: format!("WL-{:03}", walls.len() + 1),
                    start,
                    end,
                    axis,
                    thickness_mm: if kind == WallKind::Exterior { exterior } else { interior },
                    kind,
                    sides: piece.sides,
                });
            }
        }
    }
    walls
}

fn merged_pieces(line: i64, edges: &[(i64, i64)], axis: Axis, locate: &impl Fn(i64, i64) -> Space) -> Vec<Piece> {
    let mut breaks: Vec<i64> = edges.iter().flat_map(|&(a, b)| [a, b]).collect();
    breaks.sort_unstable();
    breaks.dedup();

    let mut pieces: Vec<Piece> = Vec::new();
    for pair in breaks.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if !edges.iter().any(|&(x0, x1)| x0 <= a && b <= x1) {
            continue;
        }
        let mid2 = a + b;
        let sides = match axis {
            Axis::Horizontal => [locate(mid2, 2 * line - 1), locate(mid2, 2 * line + 1)],
            Axis::Vertical => [locate(2 * line - 1, mid2), locate(2 * line + 1, mid2)],
        };
        if sides[0] == sides[1] {
            continue;
        }
        match pieces.last_mut() {
            Some(last) if last.to == a && last.sides == sides => last.to = b,
            _ => pieces.push(Piece { from: a, to: b, sides }),
        }
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirements::RoomFunction;

    fn room(id: &str, rect: Rect) -> Room {
        Room {
            id: id.to_string(),
            number: id.trim_start_matches("RM-").to_string(),
            requirement: 0,
            name: id.to_string(),
            function: RoomFunction::Custom,
            rect,
            polygon: rect.corners().to_vec(),
            area_m2: rect.area_m2(),
            target_area_m2: rect.area_m2(),
            level: 0,
        }
    }

    #[test]
    fn test_two_rooms_share_one_wall() {
        let rooms = vec![
            room("RM-101", Rect::new(0, 0, 4000, 3000)),
            room("RM-102", Rect::new(4000, 0, 3000, 3000)),
        ];
        let walls = synthesize(&rooms, &[], &PlanSettings::default());
        let shared: Vec<_> = walls.iter().filter(|w| w.kind == WallKind::Interior).collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].length_mm(), 3000);
        assert_eq!(shared[0].thickness_mm, 200);
        // south, north (two rooms each), west, east
        assert_eq!(walls.iter().filter(|w| w.is_exterior()).count(), 6);
    }

    #[test]
    fn test_partial_edges_split_walls() {
        // A wide room above two narrow ones
        let rooms = vec![
            room("RM-101", Rect::new(0, 0, 3000, 3000)),
            room("RM-102", Rect::new(3000, 0, 3000, 3000)),
            room("RM-103", Rect::new(0, 3000, 6000, 3000)),
        ];
        let walls = synthesize(&rooms, &[], &PlanSettings::default());
        let on_line: Vec<_> = walls
            .iter()
            .filter(|w| w.axis == Axis::Horizontal && w.start.y == 3000)
            .collect();
        assert_eq!(on_line.len(), 2);
        assert!(on_line.iter().all(|w| w.sides[1] == Space::Room("RM-103".to_string())));
    }

    #[test]
    fn test_circulation_zones_merge_touching_rects() {
        let free = vec![
            Rect::new(0, 0, 2000, 2000),
            Rect::new(2000, 0, 2000, 1000),
            Rect::new(9000, 9000, 500, 500),
        ];
        let footprint = Rect::new(0, 0, 6000, 6000);
        let spaces = circulation_spaces(&free, &footprint);
        assert_eq!(spaces.len(), 2);
        assert_eq!(spaces[0].zone, spaces[1].zone);
    }

    #[test]
    fn test_same_zone_edges_make_no_wall() {
        let rooms = vec![room("RM-101", Rect::new(0, 0, 4000, 4000))];
        let circulation = circulation_spaces(
            &[Rect::new(4000, 0, 2000, 2000), Rect::new(4000, 2000, 2000, 2000)],
            &Rect::new(0, 0, 6000, 4000),
        );
        let walls = synthesize(&rooms, &circulation, &PlanSettings::default());
        assert!(!walls
            .iter()
            .any(|w| w.axis == Axis::Horizontal && w.start.y == 2000 && w.start.x == 4000));
        let between: Vec<_> = walls.iter().filter(|w| w.kind == WallKind::Interior).collect();
        assert_eq!(between.len(), 1);
        assert_eq!(between[0].length_mm(), 4000);
    }
}
