//! Exterior elevations and building sections.

use crate::annotation::{Direction, SectionCut};
use crate::config::ViewSettings;
use crate::geometry::{Axis, Rect, Vec2};
use crate::layers::Layer;
use crate::plan::{FloorPlan, Opening, OpeningKind, Wall};
use crate::units;

use super::{Primitive, View, ViewKind};

/// Horizontal overhang of ground and level lines past the building, metres
const GROUND_OVERHANG_M: f64 = 1.0;

/// Maps a plan coordinate along a face onto the view's `u` axis
#[derive(Debug, Clone, Copy)]
struct FaceAxis {
    /// Plan axis the face runs along
    along: Axis,
    origin_mm: i64,
    reversed: bool,
}

impl FaceAxis {
    fn for_elevation(direction: Direction, fp: &Rect) -> Self {
        match direction {
            // Looking south at the north face, east is on the left
            Direction::North => FaceAxis { along: Axis::Horizontal, origin_mm: fp.max_x(), reversed: true },
            Direction::South => FaceAxis { along: Axis::Horizontal, origin_mm: fp.x, reversed: false },
            Direction::East => FaceAxis { along: Axis::Vertical, origin_mm: fp.y, reversed: false },
            Direction::West => FaceAxis { along: Axis::Vertical, origin_mm: fp.max_y(), reversed: true },
        }
    }

    fn for_section(cut: &SectionCut, fp: &Rect) -> Self {
        match cut.axis {
            // Horizontal cut looks north, vertical cut looks east
            Axis::Horizontal => FaceAxis { along: Axis::Horizontal, origin_mm: fp.x, reversed: false },
            Axis::Vertical => FaceAxis { along: Axis::Vertical, origin_mm: fp.max_y(), reversed: true },
        }
    }

    fn u(&self, coord_mm: i64) -> f64 {
        if self.reversed {
            units::m(self.origin_mm - coord_mm)
        } else {
            units::m(coord_mm - self.origin_mm)
        }
    }

    /// Ordered `u` range of a plan span
    fn span(&self, a_mm: i64, b_mm: i64) -> (f64, f64) {
        let (ua, ub) = (self.u(a_mm), self.u(b_mm));
        (ua.min(ub), ua.max(ub))
    }

    fn face_length(&self, fp: &Rect) -> f64 {
        match self.along {
            Axis::Horizontal => units::m(fp.w),
            Axis::Vertical => units::m(fp.h),
        }
    }
}

/// Exterior walls forming the face seen from `direction`
fn facing_walls<'a>(plan: &'a FloorPlan, direction: Direction) -> impl Iterator<Item = &'a Wall> + 'a {
    let fp = plan.footprint;
    plan.walls.iter().filter(move |w| {
        w.is_exterior()
            && match direction {
                Direction::North => w.axis == Axis::Horizontal && w.start.y == fp.max_y(),
                Direction::South => w.axis == Axis::Horizontal && w.start.y == fp.y,
                Direction::East => w.axis == Axis::Vertical && w.start.x == fp.max_x(),
                Direction::West => w.axis == Axis::Vertical && w.start.x == fp.x,
            }
    })
}

/// Plan coordinate range of an opening along its wall
fn opening_range(wall: &Wall, opening: &Opening) -> (i64, i64) {
    let a = wall.point_at(opening.offset_mm);
    let b = wall.point_at(opening.offset_mm + opening.width_mm);
    match wall.axis {
        Axis::Horizontal => (a.x, b.x),
        Axis::Vertical => (a.y, b.y),
    }
}

fn opening_layer(opening: &Opening) -> Layer {
    match opening.kind {
        OpeningKind::Door => Layer::Door,
        OpeningKind::Window => Layer::Window,
    }
}

fn level_lines(view: &mut View, length: f64, height: f64, text: f64) {
    let o = GROUND_OVERHANG_M;
    view.push(Primitive::line(Layer::Elevation, Vec2::new(-o, 0.0), Vec2::new(length + o, 0.0)));
    view.push(Primitive::text(Layer::Annotation, Vec2::new(-o, 0.25), "FFL +0.00", text));
    view.push(Primitive::text(
        Layer::Annotation,
        Vec2::new(-o, height + 0.25),
        format!("TOW +{}", units::format_m(height)),
        text,
    ));
}

pub(super) fn elevation(plan: &FloorPlan, direction: Direction, settings: &ViewSettings) -> View {
    let fp = plan.footprint;
    let axis = FaceAxis::for_elevation(direction, &fp);
    let length = axis.face_length(&fp);
    let height = settings.floor_height_m;
    let text = settings.text_size_mm;

    let mut view = View::new(
        crate::annotation::elevation_view_id(direction),
        ViewKind::Elevation { direction },
        format!("{} Elevation", direction.label()),
    );

    view.push(Primitive::rect(Layer::Elevation, 0.0, 0.0, length, height));
    level_lines(&mut view, length, height, text);

    let mut joints: Vec<i64> = Vec::new();
    for wall in facing_walls(plan, direction) {
        view.reference(&wall.id);
        let (start, end) = match wall.axis {
            Axis::Horizontal => (wall.start.x, wall.end.x),
            Axis::Vertical => (wall.start.y, wall.end.y),
        };
        joints.extend([start, end]);

        for opening in plan.openings_on(&wall.id) {
            let (a, b) = opening_range(wall, opening);
            let (u0, u1) = axis.span(a, b);
            view.push(Primitive::rect(
                opening_layer(opening),
                u0,
                units::m(opening.sill_mm),
                u1,
                units::m(opening.head_mm),
            ));
            view.reference(&opening.id);
        }
    }

    // Run boundaries inside the face
    joints.sort_unstable();
    joints.dedup();
    for joint in joints {
        let u = axis.u(joint);
        if u > 1e-9 && u < length - 1e-9 {
            view.push(Primitive::line(Layer::Elevation, Vec2::new(u, 0.0), Vec2::new(u, height)));
        }
    }

    view.finish()
}

pub(super) fn section(plan: &FloorPlan, cut: &SectionCut, settings: &ViewSettings) -> View {
    let fp = plan.footprint;
    let axis = FaceAxis::for_section(cut, &fp);
    let length = axis.face_length(&fp);
    let height = settings.floor_height_m;
    let text = settings.text_size_mm;
    let c = cut.position_mm;

    let mut view = View::new(
        cut.view_id.clone(),
        ViewKind::Section { label: cut.label.clone() },
        format!("Section {}", cut.label),
    );

    level_lines(&mut view, length, height, text);
    view.push(Primitive::line(Layer::Elevation, Vec2::new(0.0, height), Vec2::new(length, height)));

    // Walls the cut line crosses run perpendicular to it
    let crossing = plan.walls.iter().filter(|w| {
        w.axis != cut.axis
            && match cut.axis {
                Axis::Horizontal => w.start.y < c && c < w.end.y,
                Axis::Vertical => w.start.x < c && c < w.end.x,
            }
    });

    for wall in crossing {
        view.reference(&wall.id);
        let line = match wall.axis {
            Axis::Horizontal => wall.start.y,
            Axis::Vertical => wall.start.x,
        };
        let half = wall.thickness_mm / 2;
        let (u0, u1) = axis.span(line - half, line - half + wall.thickness_mm);

        let along_cut = match wall.axis {
            Axis::Horizontal => c - wall.start.x,
            Axis::Vertical => c - wall.start.y,
        };
        let cut_opening = plan
            .openings_on(&wall.id)
            .find(|o| o.offset_mm < along_cut && along_cut < o.offset_mm + o.width_mm);

        match cut_opening {
            Some(opening) => {
                let sill = units::m(opening.sill_mm);
                let head = units::m(opening.head_mm);
                if sill > 0.0 {
                    view.push(Primitive::rect(Layer::SectionCut, u0, 0.0, u1, sill));
                }
                if head < height {
                    view.push(Primitive::rect(Layer::SectionCut, u0, head, u1, height));
                }
                view.push(Primitive::rect(opening_layer(opening), u0, sill, u1, head));
                view.reference(&opening.id);
            }
            None => view.push(Primitive::rect(Layer::SectionCut, u0, 0.0, u1, height)),
        }
    }

    for room in &plan.rooms {
        let r = &room.rect;
        let (lo, hi, span) = match cut.axis {
            Axis::Horizontal => (r.y, r.max_y(), (r.x, r.max_x())),
            Axis::Vertical => (r.x, r.max_x(), (r.y, r.max_y())),
        };
        if !(lo < c && c < hi) {
            continue;
        }
        let (u0, u1) = axis.span(span.0, span.1);
        view.push(Primitive::text(
            Layer::Annotation,
            Vec2::new((u0 + u1) / 2.0, height / 2.0),
            room.name.clone(),
            text,
        ));
        view.reference(&room.id);
    }

    view.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::tests::demo_plan;
    use crate::views::tests::demo_views;

    #[test]
    fn test_face_axis_orientation() {
        let fp = Rect::new(0, 0, 10_000, 8_000);
        let north = FaceAxis::for_elevation(Direction::North, &fp);
        assert_eq!(north.u(10_000), 0.0);
        assert_eq!(north.u(0), 10.0);
        let east = FaceAxis::for_elevation(Direction::East, &fp);
        assert_eq!(east.u(8_000), 8.0);
        let west = FaceAxis::for_elevation(Direction::West, &fp);
        assert_eq!(west.span(1_000, 3_000), (5.0, 7.0));
    }

    #[test]
    fn test_elevations_show_only_facing_openings() {
        let plan = demo_plan();
        let views = demo_views();
        let mut total = 0;
        for direction in Direction::ALL {
            let id = crate::annotation::elevation_view_id(direction);
            let view = views.iter().find(|v| v.id == id).unwrap();
            let expected: usize = facing_walls(&plan, direction)
                .map(|w| plan.openings_on(&w.id).count())
                .sum();
            let shown = view.count_on(Layer::Door) + view.count_on(Layer::Window);
            assert_eq!(shown, expected, "{} elevation", direction);
            total += shown;
        }
        let exterior_openings = plan
            .openings
            .iter()
            .filter(|o| plan.wall(&o.wall_id).is_some_and(|w| w.is_exterior()))
            .count();
        assert_eq!(total, exterior_openings);
    }

    #[test]
    fn test_elevation_extent() {
        let plan = demo_plan();
        let views = demo_views();
        let south = views.iter().find(|v| v.id == "V-ELEV-S").unwrap();
        assert!((south.bbox.width() - (plan.footprint_width_m() + 2.0 * GROUND_OVERHANG_M)).abs() < 1e-9);
    }

    #[test]
    fn test_section_cuts_walls_and_labels_rooms() {
        let views = demo_views();
        for id in ["V-SEC-A", "V-SEC-B"] {
            let view = views.iter().find(|v| v.id == id).unwrap();
            assert!(view.count_on(Layer::SectionCut) >= 2, "{} has no cut walls", id);
            assert!(view.count_on(Layer::Annotation) >= 3, "{} has no room labels", id);
        }
    }
}
