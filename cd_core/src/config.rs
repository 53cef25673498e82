//! # Generation Configuration
//!
//! [`GenerationConfig`] is everything a caller can tune about a run: output
//! formats, paper, scale, seed, and the nested tunables of each stage. Every
//! field has a default, so a JSON config only needs the values it changes.
//!
//! ## Structure
//!
//! ```text
//! GenerationConfig
//! ├── formats / paper_size / scale / seed / include_* (run options)
//! ├── title: TitleInfo (title block text)
//! ├── plan: PlanSettings (packing, walls, openings, QC tolerance)
//! ├── annotation: AnnotationSettings
//! ├── views: ViewSettings
//! └── export: ExportSettings
//! ```
//!
//! ## Example
//!
//! ```rust
//! use cd_core::config::{DrawingScale, ExportFormat, GenerationConfig};
//!
//! let config: GenerationConfig =
//!     serde_json::from_str(r#"{"formats": ["cad", "page"], "scale": "1:50", "seed": 7}"#).unwrap();
//! assert_eq!(config.scale, DrawingScale::OneTo50);
//! assert!(config.formats.contains(&ExportFormat::Page));
//! assert!(config.validate().is_ok());
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{CdError, CdResult};

/// Current schema version for saved configs
pub const SCHEMA_VERSION: &str = "0.1.0";

// ============================================================================
// Run options
// ============================================================================

/// Output format families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Vector CAD drawing (DXF)
    Cad,
    /// Building model (IFC STEP)
    Bim,
    /// Page description (PDF)
    Page,
    /// Raster preview (PNG)
    Raster,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [ExportFormat::Cad, ExportFormat::Bim, ExportFormat::Page, ExportFormat::Raster];

    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Cad => "cad",
            ExportFormat::Bim => "bim",
            ExportFormat::Page => "page",
            ExportFormat::Raster => "raster",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Cad => "dxf",
            ExportFormat::Bim => "ifc",
            ExportFormat::Page => "pdf",
            ExportFormat::Raster => "png",
        }
    }

    pub fn parse(s: &str) -> CdResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cad" | "dxf" => Ok(ExportFormat::Cad),
            "bim" | "ifc" => Ok(ExportFormat::Bim),
            "page" | "pdf" => Ok(ExportFormat::Page),
            "raster" | "png" => Ok(ExportFormat::Raster),
            other => Err(CdError::invalid_input("formats", other, "expected cad, bim, page or raster")),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paper sizes, always used in landscape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaperSize {
    #[serde(rename = "A1")]
    A1,
    #[serde(rename = "A2")]
    A2,
    #[serde(rename = "A3")]
    A3,
    #[serde(rename = "ARCH_D")]
    ArchD,
    #[serde(rename = "ARCH_E")]
    ArchE,
}

impl PaperSize {
    /// Landscape (width, height) in millimetres
    pub fn dimensions_mm(self) -> (f64, f64) {
        match self {
            PaperSize::A1 => (841.0, 594.0),
            PaperSize::A2 => (594.0, 420.0),
            PaperSize::A3 => (420.0, 297.0),
            PaperSize::ArchD => (914.0, 610.0),
            PaperSize::ArchE => (1219.0, 914.0),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PaperSize::A1 => "A1",
            PaperSize::A2 => "A2",
            PaperSize::A3 => "A3",
            PaperSize::ArchD => "ARCH D",
            PaperSize::ArchE => "ARCH E",
        }
    }
}

impl Default for PaperSize {
    fn default() -> Self {
        PaperSize::ArchD
    }
}

/// Standard drawing scales
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DrawingScale {
    #[serde(rename = "1:50")]
    OneTo50,
    #[serde(rename = "1:100")]
    OneTo100,
    #[serde(rename = "1:200")]
    OneTo200,
}

impl DrawingScale {
    pub fn denominator(self) -> u32 {
        match self {
            DrawingScale::OneTo50 => 50,
            DrawingScale::OneTo100 => 100,
            DrawingScale::OneTo200 => 200,
        }
    }

    /// Paper millimetres per model metre
    pub fn factor(self) -> f64 {
        1000.0 / self.denominator() as f64
    }

    /// The next smaller drawing scale, if any
    pub fn reduced(self) -> Option<DrawingScale> {
        match self {
            DrawingScale::OneTo50 => Some(DrawingScale::OneTo100),
            DrawingScale::OneTo100 => Some(DrawingScale::OneTo200),
            DrawingScale::OneTo200 => None,
        }
    }

    pub fn label(self) -> String {
        format!("1:{}", self.denominator())
    }
}

impl Default for DrawingScale {
    fn default() -> Self {
        DrawingScale::OneTo100
    }
}

/// Which CAD/BIM backend drives view generation and export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Native,
    Revit,
    Autocad,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Native
    }
}

/// Order among rooms of equal area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Keep the order the program listed them in
    InputOrder,
    /// Alphabetical by room name
    Name,
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::InputOrder
    }
}

/// Title block text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleInfo {
    pub project_name: String,
    pub project_number: String,
    pub client: String,
    pub drawn_by: String,
    pub revision: String,
}

impl Default for TitleInfo {
    fn default() -> Self {
        TitleInfo {
            project_name: "Untitled Project".to_string(),
            project_number: "P-001".to_string(),
            client: String::new(),
            drawn_by: "Planset".to_string(),
            revision: "A".to_string(),
        }
    }
}

// ============================================================================
// Stage tunables
// ============================================================================

/// Packing, wall and opening parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanSettings {
    /// Envelope area = program area x this factor
    pub circulation_factor: f64,
    pub envelope_aspect_min: f64,
    pub envelope_aspect_max: f64,
    pub max_envelope_width_m: f64,
    pub max_envelope_depth_m: f64,
    /// Coordinate grid all packed dimensions snap to
    pub grid_mm: i64,
    /// Range the nominal room proportion is drawn from
    pub room_aspect_min: f64,
    pub room_aspect_max: f64,
    /// Hard limit on room proportion
    pub max_room_aspect: f64,
    /// Hard limit for corridor and lobby rooms
    pub max_circulation_aspect: f64,
    pub min_room_dimension_m: f64,
    /// Smallest envelope growth per failed packing attempt
    pub growth_step_m: f64,
    pub max_growth_iterations: u32,
    pub tie_break: TieBreak,
    /// Rank placements by resulting footprint before free-rectangle size
    pub prefer_compact: bool,
    pub interior_wall_thickness_m: f64,
    pub exterior_wall_thickness_m: f64,
    pub door_width_m: f64,
    pub jamb_margin_m: f64,
    pub window_width_m: f64,
    pub entry_door: bool,
    /// Allowed relative deviation from the target room area
    pub area_tolerance: f64,
}

impl Default for PlanSettings {
    fn default() -> Self {
        PlanSettings {
            circulation_factor: 1.3,
            envelope_aspect_min: 1.2,
            envelope_aspect_max: 1.8,
            max_envelope_width_m: 30.0,
            max_envelope_depth_m: 20.0,
            grid_mm: 100,
            room_aspect_min: 1.0,
            room_aspect_max: 1.5,
            max_room_aspect: 2.5,
            max_circulation_aspect: 8.0,
            min_room_dimension_m: 1.2,
            growth_step_m: 0.5,
            max_growth_iterations: 12,
            tie_break: TieBreak::InputOrder,
            prefer_compact: true,
            interior_wall_thickness_m: 0.2,
            exterior_wall_thickness_m: 0.3,
            door_width_m: 0.9,
            jamb_margin_m: 0.1,
            window_width_m: 1.2,
            entry_door: true,
            area_tolerance: 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationSettings {
    /// Distance of exterior chain dimensions from the footprint
    pub chain_offset_m: f64,
    /// Distance of overall dimensions from the footprint
    pub overall_offset_m: f64,
    /// Distance of elevation markers from the footprint
    pub marker_offset_m: f64,
    pub section_cut_count: u32,
    /// How far section lines run past the footprint
    pub section_extension_m: f64,
}

impl Default for AnnotationSettings {
    fn default() -> Self {
        AnnotationSettings {
            chain_offset_m: 0.9,
            overall_offset_m: 1.5,
            marker_offset_m: 2.0,
            section_cut_count: 2,
            section_extension_m: 1.0,
        }
    }
}

/// Which view families to derive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSelection {
    pub plan: bool,
    pub ceiling: bool,
    pub elevations: bool,
    pub sections: bool,
}

impl Default for ViewSelection {
    fn default() -> Self {
        ViewSelection {
            plan: true,
            ceiling: true,
            elevations: true,
            sections: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    pub include: ViewSelection,
    pub floor_height_m: f64,
    pub door_head_m: f64,
    pub window_head_m: f64,
    pub window_sill_m: f64,
    pub ceiling_grid_m: f64,
    /// Annotation text height on paper
    pub text_size_mm: f64,
}

impl Default for ViewSettings {
    fn default() -> Self {
        ViewSettings {
            include: ViewSelection::default(),
            floor_height_m: 3.0,
            door_head_m: 2.1,
            window_head_m: 2.1,
            window_sill_m: 0.9,
            ceiling_grid_m: 0.6,
            text_size_mm: 2.5,
        }
    }
}

/// Raster resolutions the renderer accepts
pub const RASTER_DPI_RANGE: RangeInclusive<u32> = 10..=600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub raster_dpi: u32,
    /// Relative tolerance for cross-format dimension checks
    pub verify_tolerance: f64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        ExportSettings {
            raster_dpi: 150,
            verify_tolerance: 0.01,
        }
    }
}

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Schema version (for migration compatibility)
    pub version: String,
    pub formats: BTreeSet<ExportFormat>,
    pub paper_size: PaperSize,
    pub scale: DrawingScale,
    pub seed: u64,
    pub include_schedules: bool,
    /// Run cross-format verification and ship a QC report
    pub include_qc: bool,
    pub title: TitleInfo,
    /// Printed in title blocks; generation never reads the wall clock
    pub issue_date: Option<NaiveDate>,
    pub backend: BackendKind,
    pub plan: PlanSettings,
    pub annotation: AnnotationSettings,
    pub views: ViewSettings,
    pub export: ExportSettings,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            version: SCHEMA_VERSION.to_string(),
            formats: ExportFormat::ALL.into_iter().collect(),
            paper_size: PaperSize::default(),
            scale: DrawingScale::default(),
            seed: 42,
            include_schedules: true,
            include_qc: true,
            title: TitleInfo::default(),
            issue_date: None,
            backend: BackendKind::default(),
            plan: PlanSettings::default(),
            annotation: AnnotationSettings::default(),
            views: ViewSettings::default(),
            export: ExportSettings::default(),
        }
    }
}

impl GenerationConfig {
    /// Config with only the given formats
    pub fn with_formats(mut self, formats: &[ExportFormat]) -> Self {
        self.formats = formats.iter().copied().collect();
        self
    }

    /// Issue date printed on sheets (the Unix epoch when unset, so output
    /// stays reproducible)
    pub fn issue_date_label(&self) -> String {
        self.issue_date
            .unwrap_or_default()
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Check every tunable is usable. Returns the first problem found.
    pub fn validate(&self) -> CdResult<()> {
        let plan = &self.plan;
        positive("plan.circulation_factor", plan.circulation_factor)?;
        if plan.circulation_factor < 1.0 {
            return Err(CdError::invalid_input(
                "plan.circulation_factor",
                plan.circulation_factor.to_string(),
                "envelope cannot be smaller than the program",
            ));
        }
        range("plan.envelope_aspect", plan.envelope_aspect_min, plan.envelope_aspect_max)?;
        range("plan.room_aspect", plan.room_aspect_min, plan.room_aspect_max)?;
        positive("plan.max_envelope_width_m", plan.max_envelope_width_m)?;
        positive("plan.max_envelope_depth_m", plan.max_envelope_depth_m)?;
        positive("plan.min_room_dimension_m", plan.min_room_dimension_m)?;
        positive("plan.growth_step_m", plan.growth_step_m)?;
        positive("plan.interior_wall_thickness_m", plan.interior_wall_thickness_m)?;
        positive("plan.exterior_wall_thickness_m", plan.exterior_wall_thickness_m)?;
        positive("plan.door_width_m", plan.door_width_m)?;
        positive("plan.window_width_m", plan.window_width_m)?;
        positive("plan.area_tolerance", plan.area_tolerance)?;
        if plan.grid_mm <= 0 {
            return Err(CdError::invalid_input("plan.grid_mm", plan.grid_mm.to_string(), "grid must be positive"));
        }
        if plan.max_room_aspect < plan.room_aspect_max {
            return Err(CdError::invalid_input(
                "plan.max_room_aspect",
                plan.max_room_aspect.to_string(),
                "must not be below room_aspect_max",
            ));
        }
        if plan.jamb_margin_m < 0.0 {
            return Err(CdError::invalid_input(
                "plan.jamb_margin_m",
                plan.jamb_margin_m.to_string(),
                "must not be negative",
            ));
        }
        if plan.door_width_m + 2.0 * plan.jamb_margin_m > plan.min_room_dimension_m {
            return Err(CdError::invalid_input(
                "plan.door_width_m",
                plan.door_width_m.to_string(),
                "door plus jambs must fit the minimum room dimension",
            ));
        }
        if self.annotation.section_cut_count > 26 {
            return Err(CdError::invalid_input(
                "annotation.section_cut_count",
                self.annotation.section_cut_count.to_string(),
                "at most 26 lettered sections",
            ));
        }
        let views = &self.views;
        positive("views.floor_height_m", views.floor_height_m)?;
        positive("views.ceiling_grid_m", views.ceiling_grid_m)?;
        positive("views.text_size_mm", views.text_size_mm)?;
        if views.window_sill_m >= views.window_head_m || views.window_head_m > views.floor_height_m {
            return Err(CdError::invalid_input(
                "views.window_head_m",
                views.window_head_m.to_string(),
                "window sill must be below head and head below ceiling",
            ));
        }
        if views.door_head_m > views.floor_height_m {
            return Err(CdError::invalid_input(
                "views.door_head_m",
                views.door_head_m.to_string(),
                "door head must be below ceiling",
            ));
        }
        if !RASTER_DPI_RANGE.contains(&self.export.raster_dpi) {
            return Err(CdError::invalid_input(
                "export.raster_dpi",
                self.export.raster_dpi.to_string(),
                "expected 10 to 600",
            ));
        }
        positive("export.verify_tolerance", self.export.verify_tolerance)?;
        Ok(())
    }
}

fn positive(field: &str, value: f64) -> CdResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CdError::invalid_input(field, value.to_string(), "must be a positive number"))
    }
}

fn range(field: &str, min: f64, max: f64) -> CdResult<()> {
    positive(field, min)?;
    if max < min {
        return Err(CdError::invalid_input(field, format!("{}..{}", min, max), "min exceeds max"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GenerationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.seed, 42);
        assert_eq!(config.paper_size, PaperSize::ArchD);
        assert_eq!(config.formats.len(), 4);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"formats": ["bim"], "plan": {"door_width_m": 1.0}, "paper_size": "A3"}"#;
        let config: GenerationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.formats.iter().copied().collect::<Vec<_>>(), vec![ExportFormat::Bim]);
        assert_eq!(config.plan.door_width_m, 1.0);
        assert_eq!(config.plan.window_width_m, 1.2);
        assert_eq!(config.paper_size, PaperSize::A3);
    }

    #[test]
    fn test_scale_serialization_and_steps() {
        let json = serde_json::to_string(&DrawingScale::OneTo200).unwrap();
        assert_eq!(json, "\"1:200\"");
        assert_eq!(DrawingScale::OneTo50.reduced(), Some(DrawingScale::OneTo100));
        assert_eq!(DrawingScale::OneTo200.reduced(), None);
        assert_eq!(DrawingScale::OneTo100.factor(), 10.0);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = GenerationConfig::default();
        config.plan.circulation_factor = 0.8;
        assert_eq!(config.validate().unwrap_err().error_code(), "INVALID_INPUT");

        let mut config = GenerationConfig::default();
        config.views.window_sill_m = 2.5;
        assert!(config.validate().is_err());

        let mut config = GenerationConfig::default();
        config.plan.door_width_m = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(ExportFormat::parse("PDF").unwrap(), ExportFormat::Page);
        assert_eq!(ExportFormat::parse(" cad ").unwrap(), ExportFormat::Cad);
        assert!(ExportFormat::parse("svg").is_err());
    }

    #[test]
    fn test_issue_date_label() {
        let mut config = GenerationConfig::default();
        assert_eq!(config.issue_date_label(), "1970-01-01");
        config.issue_date = NaiveDate::from_ymd_opt(2026, 3, 14);
        assert_eq!(config.issue_date_label(), "2026-03-14");
    }
}
