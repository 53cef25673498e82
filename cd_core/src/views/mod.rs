//! # View Generator
//!
//! Turns the annotated plan into drawable views: floor plan, reflected
//! ceiling plan, the four exterior elevations and one section per cut line.
//!
//! A view is a flat list of [`Primitive`]s on named [`Layer`]s in view
//! coordinates (metres). Plan-type views use plan coordinates; elevations
//! and sections use `u` along the face and `v` up from finished floor.
//!
//! Every view is built independently from the immutable plan, so the set is
//! built in parallel and collected in a stable order.

mod elevation;
mod floor;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::annotation::{AnnotationSet, Direction, SectionCut};
use crate::config::ViewSettings;
use crate::geometry::{Bounds, Rect, Vec2};
use crate::layers::Layer;
use crate::plan::FloorPlan;
use crate::requirements::RoomRequirement;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewKind {
    Plan,
    ReflectedCeilingPlan,
    Elevation { direction: Direction },
    Section { label: String },
}

impl ViewKind {
    pub fn is_plan_like(&self) -> bool {
        matches!(self, ViewKind::Plan | ViewKind::ReflectedCeilingPlan)
    }
}

/// A drawable primitive in view coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Primitive {
    Line { layer: Layer, from: Vec2, to: Vec2 },
    /// Open polyline
    Polyline { layer: Layer, points: Vec<Vec2> },
    /// Closed outline
    Polygon { layer: Layer, points: Vec<Vec2> },
    /// Centred text; size is the plotted height in paper millimetres
    Text {
        layer: Layer,
        at: Vec2,
        text: String,
        size_mm: f64,
    },
}

impl Primitive {
    pub fn layer(&self) -> Layer {
        match self {
            Primitive::Line { layer, .. }
            | Primitive::Polyline { layer, .. }
            | Primitive::Polygon { layer, .. }
            | Primitive::Text { layer, .. } => *layer,
        }
    }

    pub fn points(&self) -> Vec<Vec2> {
        match self {
            Primitive::Line { from, to, .. } => vec![*from, *to],
            Primitive::Polyline { points, .. } | Primitive::Polygon { points, .. } => points.clone(),
            Primitive::Text { at, .. } => vec![*at],
        }
    }

    pub fn rect(layer: Layer, x0: f64, y0: f64, x1: f64, y1: f64) -> Primitive {
        Primitive::Polygon {
            layer,
            points: vec![
                Vec2::new(x0, y0),
                Vec2::new(x1, y0),
                Vec2::new(x1, y1),
                Vec2::new(x0, y1),
            ],
        }
    }

    /// Outline of a plan rectangle
    pub fn outline(layer: Layer, rect: &Rect) -> Primitive {
        Primitive::Polygon {
            layer,
            points: rect.corners().iter().map(|p| p.to_vec2()).collect(),
        }
    }

    pub fn line(layer: Layer, from: Vec2, to: Vec2) -> Primitive {
        Primitive::Line { layer, from, to }
    }

    pub fn text(layer: Layer, at: Vec2, text: impl Into<String>, size_mm: f64) -> Primitive {
        Primitive::Text {
            layer,
            at,
            text: text.into(),
            size_mm,
        }
    }
}

/// One drawable view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    /// "V-PLAN", "V-RCP", "V-ELEV-N", "V-SEC-A"
    pub id: String,
    pub kind: ViewKind,
    pub name: String,
    pub level: u32,
    /// Extent of all primitives, metres
    pub bbox: Bounds,
    /// Plan elements this view shows
    pub elements: Vec<String>,
    pub primitives: Vec<Primitive>,
}

impl View {
    pub(crate) fn new(id: impl Into<String>, kind: ViewKind, name: impl Into<String>) -> Self {
        View {
            id: id.into(),
            kind,
            name: name.into(),
            level: 0,
            bbox: Bounds::empty(),
            elements: Vec::new(),
            primitives: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, primitive: Primitive) {
        self.primitives.push(primitive);
    }

    fn reference(&mut self, element_id: &str) {
        if !self.elements.iter().any(|e| e == element_id) {
            self.elements.push(element_id.to_string());
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        let mut bbox = Bounds::empty();
        for p in self.primitives.iter().flat_map(Primitive::points) {
            bbox.include(p);
        }
        self.bbox = bbox;
        self
    }

    pub fn count_on(&self, layer: Layer) -> usize {
        self.primitives.iter().filter(|p| p.layer() == layer).count()
    }
}

enum Job<'a> {
    Plan,
    Ceiling,
    Elevation(Direction),
    Section(&'a SectionCut),
}

/// Stage 4 of the pipeline
pub struct ViewGenerator<'a> {
    settings: &'a ViewSettings,
}

impl<'a> ViewGenerator<'a> {
    pub fn new(settings: &'a ViewSettings) -> Self {
        ViewGenerator { settings }
    }

    /// Build the requested views in a stable order
    pub fn generate(
        &self,
        plan: &FloorPlan,
        annotations: &AnnotationSet,
        requirements: &[RoomRequirement],
    ) -> Vec<View> {
        let include = &self.settings.include;
        let mut jobs = Vec::new();
        if include.plan {
            jobs.push(Job::Plan);
        }
        if include.ceiling {
            jobs.push(Job::Ceiling);
        }
        if include.elevations {
            jobs.extend(
                [Direction::North, Direction::South, Direction::East, Direction::West]
                    .into_iter()
                    .map(Job::Elevation),
            );
        }
        if include.sections {
            jobs.extend(annotations.section_cuts.iter().map(Job::Section));
        }

        let views: Vec<View> = jobs
            .par_iter()
            .map(|job| match job {
                Job::Plan => floor::floor_plan(plan, annotations, self.settings),
                Job::Ceiling => floor::ceiling_plan(plan, requirements, self.settings),
                Job::Elevation(direction) => elevation::elevation(plan, *direction, self.settings),
                Job::Section(cut) => elevation::section(plan, cut, self.settings),
            })
            .collect();

        info!(views = views.len(), "views generated");
        views
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::annotation::CDAnnotationEngine;
    use crate::config::{AnnotationSettings, ViewSettings};
    use crate::plan::tests::{demo_plan, demo_program};

    pub(crate) fn demo_views() -> Vec<View> {
        let plan = demo_plan();
        let annotations = CDAnnotationEngine::new(&AnnotationSettings::default()).annotate(&plan);
        ViewGenerator::new(&ViewSettings::default()).generate(&plan, &annotations, &demo_program())
    }

    #[test]
    fn test_default_view_set() {
        let views = demo_views();
        let ids: Vec<_> = views.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["V-PLAN", "V-RCP", "V-ELEV-N", "V-ELEV-S", "V-ELEV-E", "V-ELEV-W", "V-SEC-A", "V-SEC-B"]
        );
        assert!(views.iter().all(|v| !v.bbox.is_empty()));
    }

    #[test]
    fn test_view_selection_is_honoured() {
        let plan = demo_plan();
        let annotations = CDAnnotationEngine::new(&AnnotationSettings::default()).annotate(&plan);
        let mut settings = ViewSettings::default();
        settings.include.elevations = false;
        settings.include.sections = false;
        let views = ViewGenerator::new(&settings).generate(&plan, &annotations, &demo_program());
        assert_eq!(views.len(), 2);
    }

    #[test]
    fn test_views_are_deterministic() {
        assert_eq!(demo_views(), demo_views());
    }
}
