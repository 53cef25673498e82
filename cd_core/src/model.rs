//! # Project Model
//!
//! The immutable result of one generation run. Each stage output sits behind
//! an [`Arc`] so exporters, the registry and background jobs can share the
//! same layers across threads without copying.

use std::sync::Arc;

use uuid::Uuid;

use crate::annotation::AnnotationSet;
use crate::config::GenerationConfig;
use crate::plan::FloorPlan;
use crate::requirements::RoomProgram;
use crate::sheets::{Sheet, SheetSet};
use crate::views::View;

/// Namespace for every deterministic id the crate derives
pub const PLANSET_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0x1d, 0x3c, 0x52, 0x8a, 0x44, 0x4f, 0x0e, 0x9d, 0x21, 0x5e, 0x7a, 0x30, 0xc4, 0x11, 0x8f,
]);

/// Deterministic revision id for a (project, program, config) triple
pub fn revision_id(project_id: &str, program: &RoomProgram, config: &GenerationConfig) -> Uuid {
    let program_json = serde_json::to_string(program).unwrap_or_default();
    let config_json = serde_json::to_string(config).unwrap_or_default();
    let name = format!("{}\n{}\n{}", project_id, program_json, config_json);
    Uuid::new_v5(&PLANSET_NAMESPACE, name.as_bytes())
}

#[derive(Debug, Clone)]
pub struct ProjectModel {
    pub project_id: String,
    pub revision_id: Uuid,
    pub config: Arc<GenerationConfig>,
    pub program: Arc<RoomProgram>,
    pub plan: Arc<FloorPlan>,
    pub annotations: Arc<AnnotationSet>,
    pub views: Arc<Vec<View>>,
    pub sheets: Arc<SheetSet>,
}

impl ProjectModel {
    pub fn view(&self, id: &str) -> Option<&View> {
        self.views.iter().find(|v| v.id == id)
    }

    /// Views shown on a sheet, in viewport order
    pub fn views_on<'a>(&'a self, sheet: &'a Sheet) -> Vec<&'a View> {
        sheet.viewports.iter().filter_map(|vp| self.view(&vp.view_id)).collect()
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.sheets.len()
    }

    /// Short file-name-safe project prefix ("P-001")
    pub fn file_prefix(&self) -> String {
        let raw = &self.config.title.project_number;
        let cleaned: String = raw
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if cleaned.is_empty() {
            "planset".to_string()
        } else {
            cleaned
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirements::RoomRequirement;

    #[test]
    fn test_revision_id_is_stable() {
        let program = RoomProgram {
            project_name: None,
            rooms: vec![RoomRequirement::new("Living", 20.0)],
            notes: Vec::new(),
        };
        let config = GenerationConfig::default();
        let a = revision_id("demo", &program, &config);
        let b = revision_id("demo", &program, &config);
        assert_eq!(a, b);

        let mut other = config.clone();
        other.seed = 7;
        assert_ne!(a, revision_id("demo", &program, &other));
        assert_ne!(a, revision_id("other", &program, &config));
    }
}
