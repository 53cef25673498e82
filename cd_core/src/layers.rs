//! # Drawing Layers
//!
//! AIA-style layer names shared by every drawing primitive. The CAD export
//! writes one layer table entry per variant; the verifier maps names back to
//! variants through [`Layer::from_name`].

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Footprint,
    Wall,
    WallExterior,
    Door,
    DoorSwing,
    Window,
    RoomName,
    RoomArea,
    RoomNumber,
    Dimension,
    Annotation,
    ElevationMark,
    SectionMark,
    CeilingGrid,
    Elevation,
    SectionCut,
    Schedule,
    TitleBlock,
    Viewport,
}

static BY_NAME: Lazy<HashMap<&'static str, Layer>> =
    Lazy::new(|| Layer::ALL.iter().map(|layer| (layer.name(), *layer)).collect());

impl Layer {
    pub const ALL: [Layer; 19] = [
        Layer::Footprint,
        Layer::Wall,
        Layer::WallExterior,
        Layer::Door,
        Layer::DoorSwing,
        Layer::Window,
        Layer::RoomName,
        Layer::RoomArea,
        Layer::RoomNumber,
        Layer::Dimension,
        Layer::Annotation,
        Layer::ElevationMark,
        Layer::SectionMark,
        Layer::CeilingGrid,
        Layer::Elevation,
        Layer::SectionCut,
        Layer::Schedule,
        Layer::TitleBlock,
        Layer::Viewport,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Layer::Footprint => "A-AREA-GROS",
            Layer::Wall => "A-WALL",
            Layer::WallExterior => "A-WALL-EXTR",
            Layer::Door => "A-DOOR",
            Layer::DoorSwing => "A-DOOR-SWNG",
            Layer::Window => "A-GLAZ",
            Layer::RoomName => "A-ROOM-NAME",
            Layer::RoomArea => "A-ROOM-AREA",
            Layer::RoomNumber => "A-ROOM-NUMB",
            Layer::Dimension => "A-ANNO-DIMS",
            Layer::Annotation => "A-ANNO-TEXT",
            Layer::ElevationMark => "A-ELEV-IDEN",
            Layer::SectionMark => "A-SECT-IDEN",
            Layer::CeilingGrid => "A-CLNG-GRID",
            Layer::Elevation => "A-ELEV",
            Layer::SectionCut => "A-SECT-MCUT",
            Layer::Schedule => "A-ANNO-SCHD",
            Layer::TitleBlock => "G-ANNO-TTLB",
            Layer::Viewport => "G-ANNO-VPRT",
        }
    }

    pub fn from_name(name: &str) -> Option<Layer> {
        BY_NAME.get(name).copied()
    }

    /// AutoCAD colour index
    pub fn aci_color(self) -> u8 {
        match self {
            Layer::Wall | Layer::WallExterior | Layer::SectionCut => 7,
            Layer::Door | Layer::DoorSwing => 2,
            Layer::Window => 4,
            Layer::RoomName | Layer::RoomNumber => 3,
            Layer::RoomArea => 3,
            Layer::Dimension => 1,
            Layer::ElevationMark | Layer::SectionMark => 6,
            Layer::Footprint | Layer::CeilingGrid | Layer::Viewport => 8,
            Layer::Elevation | Layer::Annotation | Layer::Schedule | Layer::TitleBlock => 7,
        }
    }

    /// Plotted line weight in millimetres
    pub fn lineweight_mm(self) -> f64 {
        match self {
            Layer::WallExterior => 0.70,
            Layer::Wall | Layer::SectionCut => 0.50,
            Layer::Door | Layer::Window | Layer::Elevation | Layer::TitleBlock => 0.35,
            Layer::DoorSwing | Layer::ElevationMark | Layer::SectionMark => 0.25,
            Layer::Dimension | Layer::Annotation | Layer::Schedule => 0.18,
            Layer::RoomName | Layer::RoomArea | Layer::RoomNumber => 0.18,
            Layer::Footprint | Layer::CeilingGrid | Layer::Viewport => 0.13,
        }
    }

    /// Layers counted as walls by the cross-format check
    pub fn is_wall(self) -> bool {
        matches!(self, Layer::Wall | Layer::WallExterior)
    }

    /// Layers counted as openings by the cross-format check
    pub fn is_opening(self) -> bool {
        matches!(self, Layer::Door | Layer::Window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_lookup() {
        for layer in Layer::ALL {
            assert_eq!(Layer::from_name(layer.name()), Some(layer));
        }
        assert_eq!(Layer::from_name("NOT-A-LAYER"), None);
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = Layer::ALL.iter().map(|l| l.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Layer::ALL.len());
    }
}
