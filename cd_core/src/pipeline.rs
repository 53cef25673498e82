//! # Generation Pipeline
//!
//! Runs the six stages in order over one seeded RNG:
//!
//! ```text
//! interpret → plan → annotate → views → sheets → export
//! ```
//!
//! Each stage reads only the outputs of earlier stages. An observer sees
//! every stage start and may cancel; cancellation is honoured between
//! stages, never inside one.

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span};

use crate::annotation::CDAnnotationEngine;
use crate::backend::{backend_for, CadBackend};
use crate::config::GenerationConfig;
use crate::errors::{CdError, CdResult};
use crate::export::ExportReport;
use crate::model::{revision_id, ProjectModel};
use crate::plan::SchematicPlanGenerator;
use crate::qc::{QcIssue, Severity};
use crate::requirements::{interpret, RequirementsInput, RoomProgram};
use crate::sheets::SheetComposer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Interpret,
    Plan,
    Annotate,
    Views,
    Sheets,
    Export,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Interpret,
        Stage::Plan,
        Stage::Annotate,
        Stage::Views,
        Stage::Sheets,
        Stage::Export,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Interpret => "interpret",
            Stage::Plan => "plan",
            Stage::Annotate => "annotate",
            Stage::Views => "views",
            Stage::Sheets => "sheets",
            Stage::Export => "export",
        }
    }

    /// Overall progress when the stage starts
    pub fn progress(self) -> f32 {
        match self {
            Stage::Interpret => 0.0,
            Stage::Plan => 0.05,
            Stage::Annotate => 0.3,
            Stage::Views => 0.4,
            Stage::Sheets => 0.55,
            Stage::Export => 0.65,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Watches a run. Both methods have no-op defaults.
pub trait PipelineObserver: Send + Sync {
    fn on_stage(&self, _stage: Stage, _progress: f32) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// The result of a full run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub model: ProjectModel,
    pub export: ExportReport,
    /// Plan, layout and export findings, in stage order
    pub issues: Vec<QcIssue>,
}

impl PipelineRun {
    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Error).count()
    }
}

struct Stages<'a> {
    observer: Option<&'a dyn PipelineObserver>,
}

impl Stages<'_> {
    fn enter(&self, stage: Stage) -> CdResult<()> {
        if let Some(observer) = self.observer {
            if observer.is_cancelled() {
                info!(stage = %stage, "run cancelled");
                return Err(CdError::Cancelled {
                    stage: stage.name().to_string(),
                });
            }
            observer.on_stage(stage, stage.progress());
        }
        Ok(())
    }
}

fn build_with(
    backend: &mut dyn CadBackend,
    project_id: &str,
    program: RoomProgram,
    config: &GenerationConfig,
    stages: &Stages<'_>,
) -> CdResult<ProjectModel> {
    let revision = revision_id(project_id, &program, config);
    let mut rng = StdRng::seed_from_u64(config.seed);

    stages.enter(Stage::Plan)?;
    let plan = Arc::new(SchematicPlanGenerator::new(config).generate(&program.rooms, &mut rng)?);

    stages.enter(Stage::Annotate)?;
    let annotations = Arc::new(CDAnnotationEngine::new(&config.annotation).annotate(&plan));
    info!(annotations = annotations.len(), "annotations placed");

    stages.enter(Stage::Views)?;
    let program = Arc::new(program);
    backend.create_project(project_id, config)?;
    backend.push_model(program.clone(), plan.clone(), annotations.clone())?;
    let views = Arc::new(backend.generate_views()?);

    stages.enter(Stage::Sheets)?;
    let sheets = Arc::new(SheetComposer::new(config).compose(&plan, &views, &program.rooms));
    info!(sheets = sheets.sheets.len(), issues = sheets.issues.len(), "sheets composed");

    Ok(ProjectModel {
        project_id: project_id.to_string(),
        revision_id: revision,
        config: Arc::new(config.clone()),
        program,
        plan,
        annotations,
        views,
        sheets,
    })
}

/// Stages 2 to 5 with the configured backend: everything but export
pub fn build_model(project_id: &str, program: RoomProgram, config: &GenerationConfig) -> CdResult<ProjectModel> {
    config.validate()?;
    let mut backend = backend_for(config.backend);
    build_with(backend.as_mut(), project_id, program, config, &Stages { observer: None })
}

/// Run every stage for one project
pub fn run_pipeline(
    project_id: &str,
    input: &RequirementsInput,
    config: &GenerationConfig,
    observer: Option<&dyn PipelineObserver>,
) -> CdResult<PipelineRun> {
    let span = info_span!("pipeline", project = project_id, seed = config.seed);
    let _guard = span.enter();

    config.validate()?;
    let stages = Stages { observer };
    let mut backend = backend_for(config.backend);

    stages.enter(Stage::Interpret)?;
    let program = interpret(input)?;
    info!(rooms = program.room_count(), notes = program.notes.len(), "requirements interpreted");

    let model = build_with(backend.as_mut(), project_id, program, config, &stages)?;

    stages.enter(Stage::Export)?;
    let export = backend.export(&model)?;

    let mut issues = model.plan.issues.clone();
    issues.extend(model.sheets.issues.iter().cloned());
    issues.extend(export.issues.iter().cloned());

    info!(
        revision = %model.revision_id,
        artifacts = export.artifacts.len(),
        issues = issues.len(),
        "run complete"
    );
    Ok(PipelineRun { model, export, issues })
}
