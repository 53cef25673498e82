//! # CAD/BIM Backends
//!
//! View generation and export go through a [`CadBackend`] so a desktop CAD
//! or BIM application could take over drawing production. The
//! native backend does the work in-process; the Revit and AutoCAD adapters
//! are declared so configs can name them, and report
//! [`CdError::BackendUnavailable`] when used.

use std::sync::Arc;

use tracing::debug;

use crate::annotation::AnnotationSet;
use crate::config::{BackendKind, GenerationConfig};
use crate::errors::{CdError, CdResult};
use crate::export::{ExportAgent, ExportReport};
use crate::model::ProjectModel;
use crate::plan::FloorPlan;
use crate::requirements::RoomProgram;
use crate::views::{View, ViewGenerator};

/// A drawing-production backend
pub trait CadBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Open (or create) the backend-side project
    fn create_project(&mut self, project_id: &str, config: &GenerationConfig) -> CdResult<()>;

    /// Hand over the plan and its annotations
    fn push_model(
        &mut self,
        program: Arc<RoomProgram>,
        plan: Arc<FloorPlan>,
        annotations: Arc<AnnotationSet>,
    ) -> CdResult<()>;

    /// Derive the drawing views of the pushed model
    fn generate_views(&self) -> CdResult<Vec<View>>;

    /// Write every configured format for a finished model
    fn export(&self, model: &ProjectModel) -> CdResult<ExportReport>;
}

/// Backend for a config
pub fn backend_for(kind: BackendKind) -> Box<dyn CadBackend> {
    match kind {
        BackendKind::Native => Box::new(NativeBackend::default()),
        BackendKind::Revit | BackendKind::Autocad => Box::new(UnavailableBackend { kind }),
    }
}

fn backend_name(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Native => "native",
        BackendKind::Revit => "revit",
        BackendKind::Autocad => "autocad",
    }
}

// ============================================================================
// Native
// ============================================================================

struct Pushed {
    program: Arc<RoomProgram>,
    plan: Arc<FloorPlan>,
    annotations: Arc<AnnotationSet>,
}

/// In-process backend built on the crate's own generators
#[derive(Default)]
pub struct NativeBackend {
    config: Option<GenerationConfig>,
    pushed: Option<Pushed>,
}

impl NativeBackend {
    fn config(&self) -> CdResult<&GenerationConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| CdError::internal("native backend used before create_project"))
    }
}

impl CadBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn create_project(&mut self, project_id: &str, config: &GenerationConfig) -> CdResult<()> {
        debug!(project = project_id, "native backend project");
        self.config = Some(config.clone());
        self.pushed = None;
        Ok(())
    }

    fn push_model(
        &mut self,
        program: Arc<RoomProgram>,
        plan: Arc<FloorPlan>,
        annotations: Arc<AnnotationSet>,
    ) -> CdResult<()> {
        self.config()?;
        self.pushed = Some(Pushed {
            program,
            plan,
            annotations,
        });
        Ok(())
    }

    fn generate_views(&self) -> CdResult<Vec<View>> {
        let config = self.config()?;
        let pushed = self
            .pushed
            .as_ref()
            .ok_or_else(|| CdError::internal("native backend has no model to draw"))?;
        Ok(ViewGenerator::new(&config.views).generate(&pushed.plan, &pushed.annotations, &pushed.program.rooms))
    }

    fn export(&self, model: &ProjectModel) -> CdResult<ExportReport> {
        let config = self.config()?;
        Ok(ExportAgent::new(config).export(model))
    }
}

// ============================================================================
// External applications
// ============================================================================

/// Placeholder for an external application this build cannot drive
struct UnavailableBackend {
    kind: BackendKind,
}

impl UnavailableBackend {
    fn unavailable(&self) -> CdError {
        CdError::BackendUnavailable {
            backend: backend_name(self.kind).to_string(),
            reason: "no connector for this application in this build".to_string(),
        }
    }
}

impl CadBackend for UnavailableBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn create_project(&mut self, _project_id: &str, _config: &GenerationConfig) -> CdResult<()> {
        Err(self.unavailable())
    }

    fn push_model(&mut self, _: Arc<RoomProgram>, _: Arc<FloorPlan>, _: Arc<AnnotationSet>) -> CdResult<()> {
        Err(self.unavailable())
    }

    fn generate_views(&self) -> CdResult<Vec<View>> {
        Err(self.unavailable())
    }

    fn export(&self, _model: &ProjectModel) -> CdResult<ExportReport> {
        Err(self.unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::CDAnnotationEngine;
    use crate::plan::tests::{demo_plan, demo_program};

    #[test]
    fn test_native_backend_draws_pushed_model() {
        let config = GenerationConfig::default();
        let plan = demo_plan();
        let annotations = CDAnnotationEngine::new(&config.annotation).annotate(&plan);
        let program = RoomProgram {
            project_name: None,
            rooms: demo_program(),
            notes: Vec::new(),
        };

        let mut backend = backend_for(BackendKind::Native);
        assert!(backend.generate_views().is_err());
        backend.create_project("demo", &config).unwrap();
        backend
            .push_model(Arc::new(program), Arc::new(plan), Arc::new(annotations))
            .unwrap();
        let views = backend.generate_views().unwrap();
        assert!(views.iter().any(|v| v.id == "V-PLAN"));
    }

    #[test]
    fn test_external_backends_are_unavailable() {
        for kind in [BackendKind::Revit, BackendKind::Autocad] {
            let mut backend = backend_for(kind);
            assert_eq!(backend.kind(), kind);
            let err = backend.create_project("demo", &GenerationConfig::default()).unwrap_err();
            assert_eq!(err.error_code(), "BACKEND_UNAVAILABLE");
            assert!(!err.is_recoverable());
        }
    }
}
