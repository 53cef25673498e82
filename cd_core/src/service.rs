//! # Studio
//!
//! In-process registry that collaborators talk to: submit a room program,
//! generate revisions (inline or as a background job), then list the
//! artifacts and QC issues of a revision or download it as a bundle.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cd_core::config::{ExportFormat, GenerationConfig};
//! use cd_core::requirements::RequirementsInput;
//! use cd_core::service::{GenerationState, Studio};
//!
//! let studio = Studio::new();
//! studio.submit_requirements("house", RequirementsInput::Text("Living: 25 m2\nBathroom: 5 m2".into())).unwrap();
//!
//! let config = GenerationConfig::default().with_formats(&[ExportFormat::Cad]);
//! let status = studio.generate("house", config).unwrap();
//! assert_eq!(status.state, GenerationState::Completed);
//!
//! let revision = status.revision_id.unwrap();
//! let bundle = studio.download(revision).unwrap();
//! println!("{} ({} bytes)", bundle.file_name, bundle.bytes.len());
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GenerationConfig;
use crate::errors::{CdError, CdResult};
use crate::export::bundle::{self, Bundle};
use crate::export::Artifact;
use crate::pipeline::{run_pipeline, PipelineObserver, PipelineRun, Stage};
use crate::qc::QcIssue;
use crate::requirements::RequirementsInput;

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl GenerationState {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            GenerationState::Completed | GenerationState::Failed | GenerationState::Cancelled
        )
    }
}

/// Polled view of a generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStatus {
    pub state: GenerationState,
    /// 0.0 to 1.0
    pub progress: f32,
    pub message: String,
    /// Set once the run completes
    pub revision_id: Option<Uuid>,
    /// Set when the run failed or was cancelled
    pub error: Option<CdError>,
}

impl GenerationStatus {
    fn queued() -> Self {
        GenerationStatus {
            state: GenerationState::Queued,
            progress: 0.0,
            message: "queued".to_string(),
            revision_id: None,
            error: None,
        }
    }

    fn completed(run: &PipelineRun) -> Self {
        GenerationStatus {
            state: GenerationState::Completed,
            progress: 1.0,
            message: format!(
                "{} artifacts, {} issues ({} errors)",
                run.export.artifacts.len(),
                run.issues.len(),
                run.error_count()
            ),
            revision_id: Some(run.model.revision_id),
            error: None,
        }
    }

    fn failed(error: CdError, progress: f32) -> Self {
        let state = match error {
            CdError::Cancelled { .. } => GenerationState::Cancelled,
            _ => GenerationState::Failed,
        };
        GenerationStatus {
            state,
            progress,
            message: error.to_string(),
            revision_id: None,
            error: Some(error),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Revisions a studio keeps before dropping the oldest
pub const DEFAULT_REVISION_LIMIT: usize = 16;

struct Registry {
    requirements: HashMap<String, RequirementsInput>,
    revisions: BTreeMap<Uuid, Arc<PipelineRun>>,
    /// Revision ids, least recently recorded first
    recorded: VecDeque<Uuid>,
    revision_limit: usize,
}

impl Registry {
    fn with_limit(revision_limit: usize) -> Self {
        Registry {
            requirements: HashMap::new(),
            revisions: BTreeMap::new(),
            recorded: VecDeque::new(),
            revision_limit: revision_limit.max(1),
        }
    }

    fn insert(&mut self, run: PipelineRun) {
        let id = run.model.revision_id;
        self.recorded.retain(|r| *r != id);
        self.recorded.push_back(id);
        self.revisions.insert(id, Arc::new(run));
        while self.recorded.len() > self.revision_limit {
            if let Some(oldest) = self.recorded.pop_front() {
                self.revisions.remove(&oldest);
                debug!(revision = %oldest, "revision evicted");
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::with_limit(DEFAULT_REVISION_LIMIT)
    }
}

/// Thread-safe project and revision store. Clones share the same registry.
///
/// Runs hold every artifact in memory, so only the most recently recorded
/// revisions are kept (see [`DEFAULT_REVISION_LIMIT`]).
#[derive(Clone, Default)]
pub struct Studio {
    registry: Arc<Mutex<Registry>>,
}

impl Studio {
    pub fn new() -> Self {
        Self::default()
    }

    /// A studio that keeps at most `limit` revisions (at least one)
    pub fn with_revision_limit(limit: usize) -> Self {
        Studio {
            registry: Arc::new(Mutex::new(Registry::with_limit(limit))),
        }
    }

    fn registry(&self) -> CdResult<MutexGuard<'_, Registry>> {
        self.registry
            .lock()
            .map_err(|_| CdError::internal("studio registry lock poisoned"))
    }

    /// Store (or replace) the program for a project
    pub fn submit_requirements(&self, project_id: &str, input: RequirementsInput) -> CdResult<()> {
        if project_id.trim().is_empty() {
            return Err(CdError::invalid_input("project_id", project_id, "must not be empty"));
        }
        info!(project = project_id, "requirements submitted");
        self.registry()?.requirements.insert(project_id.to_string(), input);
        Ok(())
    }

    fn requirements_for(&self, project_id: &str) -> CdResult<RequirementsInput> {
        self.registry()?
            .requirements
            .get(project_id)
            .cloned()
            .ok_or_else(|| CdError::not_found("project", project_id))
    }

    fn record(&self, run: PipelineRun) -> CdResult<GenerationStatus> {
        let status = GenerationStatus::completed(&run);
        self.registry()?.insert(run);
        Ok(status)
    }

    /// Generate a revision on the calling thread.
    ///
    /// Unknown projects are an error. A failed run is reported through the
    /// returned status and leaves no revision behind.
    pub fn generate(&self, project_id: &str, config: GenerationConfig) -> CdResult<GenerationStatus> {
        let input = self.requirements_for(project_id)?;
        match run_pipeline(project_id, &input, &config, None) {
            Ok(run) => self.record(run),
            Err(e) => {
                warn!(project = project_id, error = %e, "generation failed");
                Ok(GenerationStatus::failed(e, 0.0))
            }
        }
    }

    /// Generate a revision on a background thread
    pub fn spawn_generation(&self, project_id: &str, config: GenerationConfig) -> CdResult<GenerationJob> {
        let input = self.requirements_for(project_id)?;
        let tracker = Arc::new(JobTracker {
            status: Mutex::new(GenerationStatus::queued()),
            cancel: AtomicBool::new(false),
        });

        let studio = self.clone();
        let job_tracker = tracker.clone();
        let project_id = project_id.to_string();
        let handle = std::thread::spawn(move || {
            let observer: &JobTracker = &job_tracker;
            let outcome = run_pipeline(&project_id, &input, &config, Some(observer));
            let status = match outcome.and_then(|run| studio.record(run)) {
                Ok(status) => status,
                Err(e) => {
                    warn!(project = %project_id, error = %e, "background generation stopped");
                    GenerationStatus::failed(e, job_tracker.snapshot().progress)
                }
            };
            job_tracker.set(status.clone());
            status
        });

        Ok(GenerationJob {
            tracker,
            handle: Some(handle),
        })
    }

    /// Shared handle to a stored run; the registry lock is released on return
    fn revision(&self, revision_id: Uuid) -> CdResult<Arc<PipelineRun>> {
        self.registry()?
            .revisions
            .get(&revision_id)
            .cloned()
            .ok_or_else(|| CdError::not_found("revision", revision_id.to_string()))
    }

    /// Revision ids, oldest id first
    pub fn revisions(&self) -> CdResult<Vec<Uuid>> {
        Ok(self.registry()?.revisions.keys().copied().collect())
    }

    pub fn list_artifacts(&self, revision_id: Uuid) -> CdResult<Vec<Artifact>> {
        Ok(self.revision(revision_id)?.export.artifacts.clone())
    }

    pub fn list_qc_issues(&self, revision_id: Uuid) -> CdResult<Vec<QcIssue>> {
        Ok(self.revision(revision_id)?.issues.clone())
    }

    /// Pack every artifact of a revision, with the QC report when the run had
    /// QC enabled
    pub fn download(&self, revision_id: Uuid) -> CdResult<Bundle> {
        let run = self.revision(revision_id)?;
        let issues = run.model.config.include_qc.then_some(run.issues.as_slice());
        bundle::pack(&run.model, &run.export.artifacts, issues)
    }
}

// ============================================================================
// Background jobs
// ============================================================================

struct JobTracker {
    status: Mutex<GenerationStatus>,
    cancel: AtomicBool,
}

impl JobTracker {
    fn snapshot(&self) -> GenerationStatus {
        match self.status.lock() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set(&self, status: GenerationStatus) {
        match self.status.lock() {
            Ok(mut current) => *current = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
    }
}

impl PipelineObserver for JobTracker {
    fn on_stage(&self, stage: Stage, progress: f32) {
        self.set(GenerationStatus {
            state: GenerationState::Running,
            progress,
            message: stage.name().to_string(),
            revision_id: None,
            error: None,
        });
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// Handle to a background generation
pub struct GenerationJob {
    tracker: Arc<JobTracker>,
    handle: Option<JoinHandle<GenerationStatus>>,
}

impl GenerationJob {
    pub fn poll(&self) -> GenerationStatus {
        self.tracker.snapshot()
    }

    /// Ask the run to stop at the next stage boundary
    pub fn cancel(&self) {
        self.tracker.cancel.store(true, Ordering::Relaxed);
    }

    /// Wait for the run to finish
    pub fn join(mut self) -> CdResult<GenerationStatus> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| CdError::internal("generation thread panicked")),
            None => Ok(self.tracker.snapshot()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportFormat;
    use crate::export::bundle::{MANIFEST_NAME, QC_REPORT_NAME};

    const PROGRAM: &str = "Living: 25 m2\nKitchen: 15 m2\nBedroom: 16 m2\nBathroom: 6 m2";

    fn studio() -> Studio {
        let studio = Studio::new();
        studio
            .submit_requirements("house", RequirementsInput::Text(PROGRAM.to_string()))
            .unwrap();
        studio
    }

    fn cad_config() -> GenerationConfig {
        GenerationConfig::default().with_formats(&[ExportFormat::Cad])
    }

    #[test]
    fn test_generate_then_list() {
        let studio = studio();
        let status = studio.generate("house", cad_config()).unwrap();
        assert_eq!(status.state, GenerationState::Completed);
        assert_eq!(status.progress, 1.0);

        let revision = status.revision_id.unwrap();
        assert_eq!(studio.revisions().unwrap(), vec![revision]);
        let artifacts = studio.list_artifacts(revision).unwrap();
        assert!(!artifacts.is_empty());
        assert!(artifacts.iter().all(|a| a.format == ExportFormat::Cad));
        assert!(studio.list_qc_issues(revision).is_ok());
    }

    #[test]
    fn test_unknown_project_and_revision() {
        let studio = Studio::new();
        let err = studio.generate("nowhere", cad_config()).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
        let err = studio.list_artifacts(Uuid::nil()).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(studio.download(Uuid::nil()).is_err());
    }

    #[test]
    fn test_failed_run_reports_status() {
        let studio = Studio::new();
        studio
            .submit_requirements("empty", RequirementsInput::Structured(Vec::new()))
            .unwrap();
        let status = studio.generate("empty", cad_config()).unwrap();
        assert_eq!(status.state, GenerationState::Failed);
        assert!(status.error.is_some());
        assert!(studio.revisions().unwrap().is_empty());
    }

    #[test]
    fn test_download_carries_manifest_and_report() {
        let studio = studio();
        let revision = studio.generate("house", cad_config()).unwrap().revision_id.unwrap();
        let bundle = studio.download(revision).unwrap();
        let names = bundle::entry_names(&bundle.bytes).unwrap();
        assert_eq!(names.last().map(String::as_str), Some(QC_REPORT_NAME));
        assert!(names.iter().any(|n| n == MANIFEST_NAME));
        assert_eq!(bundle.manifest.revision_id, revision);
    }

    #[test]
    fn test_oldest_revision_is_evicted() {
        let studio = Studio::with_revision_limit(2);
        studio
            .submit_requirements("house", RequirementsInput::Text(PROGRAM.to_string()))
            .unwrap();
        let mut ids = Vec::new();
        for seed in [1, 2, 3] {
            let mut config = cad_config();
            config.seed = seed;
            ids.push(studio.generate("house", config).unwrap().revision_id.unwrap());
        }

        let mut kept = studio.revisions().unwrap();
        kept.sort();
        let mut expected = vec![ids[1], ids[2]];
        expected.sort();
        assert_eq!(kept, expected);
        assert_eq!(studio.list_artifacts(ids[0]).unwrap_err().error_code(), "NOT_FOUND");
        assert!(studio.download(ids[2]).is_ok());
    }

    #[test]
    fn test_download_releases_registry() {
        let studio = studio();
        let revision = studio.generate("house", cad_config()).unwrap().revision_id.unwrap();
        let run = studio.revision(revision).unwrap();
        // The handle outlives the lock, so the studio stays usable
        assert!(studio.list_qc_issues(revision).is_ok());
        assert_eq!(Arc::strong_count(&run), 2);
        drop(run);
        assert!(studio.download(revision).is_ok());
    }

    #[test]
    fn test_background_job_completes() {
        let studio = studio();
        let job = studio.spawn_generation("house", cad_config()).unwrap();
        let status = job.join().unwrap();
        assert_eq!(status.state, GenerationState::Completed);
        assert!(studio.list_artifacts(status.revision_id.unwrap()).is_ok());
    }

    #[test]
    fn test_cancelled_job_stores_nothing() {
        let studio = studio();
        let job = studio.spawn_generation("house", cad_config()).unwrap();
        job.cancel();
        let status = job.join().unwrap();
        // The run may finish before the flag is seen
        if status.state == GenerationState::Cancelled {
            assert_eq!(status.error.as_ref().map(CdError::error_code), Some("CANCELLED"));
            assert!(studio.revisions().unwrap().is_empty());
        } else {
            assert_eq!(status.state, GenerationState::Completed);
        }
        assert!(status.state.is_finished());
    }
}
