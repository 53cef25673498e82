//! # cd_core - Construction-Document Generation Engine
//!
//! `cd_core` turns a room program into a drawing set: a packed schematic
//! floor plan, annotated views, composed sheets, and DXF/IFC/PDF/PNG
//! exports that are checked against each other. All data types are
//! JSON-serializable so the engine can sit behind any transport.
//!
//! ## Design Philosophy
//!
//! - **Deterministic**: the same program, config and seed give the same bytes
//! - **Staged**: each stage reads only earlier outputs, never mutates them
//! - **Soft findings**: quality problems are [`QcIssue`] records, not errors
//! - **Rich Errors**: structured error types, not just strings
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cd_core::config::GenerationConfig;
//! use cd_core::pipeline::run_pipeline;
//! use cd_core::requirements::RequirementsInput;
//!
//! let input = RequirementsInput::Text("Living: 25 m2\nKitchen: 12 m2\nBathroom: 5 m2".into());
//! let run = run_pipeline("demo", &input, &GenerationConfig::default(), None).unwrap();
//! println!("{} sheets, {} artifacts", run.model.sheet_count(), run.export.artifacts.len());
//! ```
//!
//! ## Modules
//!
//! - [`requirements`] - Room program parsing and normalization
//! - [`plan`] - Envelope sizing, room packing, circulation, walls and openings
//! - [`annotation`] - Dimensions, tags, grid, section and elevation markers
//! - [`views`] - Plan, ceiling, elevation, section and schedule views
//! - [`sheets`] - Sheet numbering, viewports, title blocks and schedules
//! - [`export`] - File writers, re-readers and cross-format checks
//! - [`pipeline`] - The six stages wired together
//! - [`service`] - Thread-safe project/revision registry with background jobs
//! - [`backend`] - Drawing-production backends
//! - [`config`] - Generation settings
//! - [`file_io`] - Output directory locking and atomic writes
//! - [`errors`] - Structured error types

pub mod annotation;
pub mod backend;
pub mod config;
pub mod errors;
pub mod export;
pub mod file_io;
pub mod geometry;
pub mod layers;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod qc;
pub mod requirements;
pub mod service;
pub mod sheets;
pub mod units;
pub mod views;

pub use config::{ExportFormat, GenerationConfig};
pub use errors::{CdError, CdResult};
pub use export::{Artifact, Bundle, ExportAgent, ExportReport};
pub use file_io::{load_config, save_config, OutputLock};
pub use model::ProjectModel;
pub use pipeline::{run_pipeline, PipelineRun};
pub use qc::{QcIssue, Severity};
pub use requirements::{RequirementsInput, RoomRequirement};
pub use service::{GenerationJob, GenerationStatus, Studio};
