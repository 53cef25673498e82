//! Floor plan and reflected ceiling plan.

use std::f64::consts::FRAC_PI_2;

use crate::annotation::{AnnotationSet, Dimension, DimensionKind};
use crate::config::ViewSettings;
use crate::geometry::{Axis, Vec2};
use crate::layers::Layer;
use crate::plan::{FloorPlan, Opening, OpeningKind, Wall};
use crate::requirements::{RoomRequirement, DEFAULT_CEILING_HEIGHT_M};
use crate::units;

use super::{Primitive, View, ViewKind};

const TICK_M: f64 = 0.15;
const MARKER_RADIUS_M: f64 = 0.5;
const SWING_SEGMENTS: usize = 8;

pub(super) fn floor_plan(plan: &FloorPlan, annotations: &AnnotationSet, settings: &ViewSettings) -> View {
    let mut view = View::new("V-PLAN", ViewKind::Plan, "Floor Plan");
    let text = settings.text_size_mm;

    view.push(Primitive::outline(Layer::Footprint, &plan.footprint));

    for wall in &plan.walls {
        view.push(wall_outline(wall));
        view.reference(&wall.id);
    }

    for opening in &plan.openings {
        let Some(wall) = plan.wall(&opening.wall_id) else {
            continue;
        };
        let body = wall.span_body(opening.offset_mm, opening.offset_mm + opening.width_mm);
        match opening.kind {
            OpeningKind::Door => {
                view.push(Primitive::outline(Layer::Door, &body));
                door_swing(&mut view, wall, opening);
            }
            OpeningKind::Window => view.push(Primitive::outline(Layer::Window, &body)),
        }
        view.reference(&opening.id);
    }

    for tag in &annotations.tags {
        view.push(Primitive::text(Layer::RoomName, tag.at.offset(0.0, 0.35), tag.name.clone(), text * 1.2));
        view.push(Primitive::text(Layer::RoomNumber, tag.at, tag.number.clone(), text));
        view.push(Primitive::text(Layer::RoomArea, tag.at.offset(0.0, -0.35), tag.area_text(), text));
        view.reference(&tag.room_id);
    }

    for dim in &annotations.dimensions {
        dimension(&mut view, dim, text);
    }

    for marker in &annotations.elevation_markers {
        let c = marker.at;
        let r = MARKER_RADIUS_M;
        view.push(Primitive::Polygon {
            layer: Layer::ElevationMark,
            points: vec![c.offset(r, 0.0), c.offset(0.0, r), c.offset(-r, 0.0), c.offset(0.0, -r)],
        });
        view.push(Primitive::text(Layer::ElevationMark, c, marker.direction.letter().to_string(), text));
        view.reference(&marker.id);
    }

    for cut in &annotations.section_cuts {
        view.push(Primitive::line(Layer::SectionMark, cut.start, cut.end));
        view.push(Primitive::text(Layer::SectionMark, cut.start, cut.label.clone(), text * 1.4));
        view.push(Primitive::text(Layer::SectionMark, cut.end, cut.label.clone(), text * 1.4));
        view.reference(&cut.id);
    }

    view.finish()
}

pub(super) fn ceiling_plan(plan: &FloorPlan, requirements: &[RoomRequirement], settings: &ViewSettings) -> View {
    let mut view = View::new("V-RCP", ViewKind::ReflectedCeilingPlan, "Reflected Ceiling Plan");
    let text = settings.text_size_mm;
    let grid = units::mm(settings.ceiling_grid_m).max(1);

    for wall in &plan.walls {
        view.push(wall_outline(wall));
        view.reference(&wall.id);
    }

    for room in &plan.rooms {
        let r = &room.rect;
        let mut x = r.x + grid;
        while x < r.max_x() {
            view.push(Primitive::line(
                Layer::CeilingGrid,
                Vec2::new(units::m(x), units::m(r.y)),
                Vec2::new(units::m(x), units::m(r.max_y())),
            ));
            x += grid;
        }
        let mut y = r.y + grid;
        while y < r.max_y() {
            view.push(Primitive::line(
                Layer::CeilingGrid,
                Vec2::new(units::m(r.x), units::m(y)),
                Vec2::new(units::m(r.max_x()), units::m(y)),
            ));
            y += grid;
        }

        let height = requirements
            .get(room.requirement)
            .map(|req| req.ceiling_height_m)
            .unwrap_or(DEFAULT_CEILING_HEIGHT_M);
        let center = r.center();
        view.push(Primitive::text(Layer::RoomNumber, center.offset(0.0, 0.3), room.number.clone(), text));
        view.push(Primitive::text(
            Layer::Annotation,
            center.offset(0.0, -0.3),
            format!("CLG +{}", units::format_m(height)),
            text,
        ));
        view.reference(&room.id);
    }

    view.finish()
}

fn wall_outline(wall: &Wall) -> Primitive {
    let layer = if wall.is_exterior() { Layer::WallExterior } else { Layer::Wall };
    Primitive::outline(layer, &wall.body())
}

/// Leaf and quarter-circle swing, hinged on the near jamb and opening
/// towards the north or east side of the wall
fn door_swing(view: &mut View, wall: &Wall, door: &Opening) {
    let hinge = wall.point_at(door.offset_mm).to_vec2();
    let radius = units::m(door.width_mm);
    let arc: Vec<Vec2> = (0..=SWING_SEGMENTS)
        .map(|i| {
            let theta = FRAC_PI_2 * i as f64 / SWING_SEGMENTS as f64;
            match wall.axis {
                Axis::Horizontal => hinge.offset(radius * theta.cos(), radius * theta.sin()),
                Axis::Vertical => hinge.offset(radius * theta.sin(), radius * theta.cos()),
            }
        })
        .collect();
    let open_tip = arc[arc.len() - 1];
    view.push(Primitive::line(Layer::DoorSwing, hinge, open_tip));
    view.push(Primitive::Polyline {
        layer: Layer::DoorSwing,
        points: arc,
    });
}

fn dimension(view: &mut View, dim: &Dimension, text: f64) {
    view.push(Primitive::line(Layer::Dimension, dim.line_from, dim.line_to));
    if dim.kind != DimensionKind::Clear {
        view.push(Primitive::line(Layer::Dimension, dim.from, dim.line_from));
        view.push(Primitive::line(Layer::Dimension, dim.to, dim.line_to));
    }
    for end in [dim.line_from, dim.line_to] {
        view.push(Primitive::line(
            Layer::Dimension,
            end.offset(-TICK_M / 2.0, -TICK_M / 2.0),
            end.offset(TICK_M / 2.0, TICK_M / 2.0),
        ));
    }
    view.push(Primitive::text(
        Layer::Dimension,
        dim.line_from.midpoint(dim.line_to),
        dim.text.clone(),
        text,
    ));
    view.reference(&dim.id);
}

#[cfg(test)]
mod tests {
    use crate::layers::Layer;
    use crate::plan::tests::demo_plan;
    use crate::views::tests::demo_views;

    #[test]
    fn test_plan_view_counts_match_plan() {
        let plan = demo_plan();
        let views = demo_views();
        let view = views.iter().find(|v| v.id == "V-PLAN").unwrap();
        assert_eq!(view.count_on(Layer::Footprint), 1);
        assert_eq!(view.count_on(Layer::RoomName), plan.rooms.len());
        assert_eq!(view.count_on(Layer::Wall) + view.count_on(Layer::WallExterior), plan.walls.len());
        assert_eq!(view.count_on(Layer::Door), plan.doors().count());
        assert_eq!(view.count_on(Layer::Window), plan.windows().count());
        // leaf and arc per door
        assert_eq!(view.count_on(Layer::DoorSwing), 2 * plan.doors().count());
    }

    #[test]
    fn test_ceiling_plan_drops_doors() {
        let views = demo_views();
        let rcp = views.iter().find(|v| v.id == "V-RCP").unwrap();
        assert_eq!(rcp.count_on(Layer::Door), 0);
        assert_eq!(rcp.count_on(Layer::DoorSwing), 0);
        assert!(rcp.count_on(Layer::CeilingGrid) > 0);
        assert!(rcp
            .primitives
            .iter()
            .any(|p| matches!(p, super::Primitive::Text { text, .. } if text == "CLG +3.00")));
    }

    #[test]
    fn test_plan_bbox_covers_markers() {
        let plan = demo_plan();
        let views = demo_views();
        let view = views.iter().find(|v| v.id == "V-PLAN").unwrap();
        assert!(view.bbox.width() > plan.footprint_width_m() + 2.0);
        assert!(view.bbox.height() > plan.footprint_depth_m() + 2.0);
    }
}
