//! # Export Agent
//!
//! Turns a [`ProjectModel`] into files and checks that the files agree.
//!
//! | Format   | Output                                  | Re-read through          |
//! |----------|-----------------------------------------|--------------------------|
//! | `cad`    | DXF R12, one file per sheet             | group-code reader        |
//! | `bim`    | IFC2X3 STEP, one file for the model     | STEP entity parser       |
//! | `page`   | PDF, one page per sheet                 | `pdf-extract` + markers  |
//! | `raster` | PNG per sheet                           | `tEXt` summary chunk     |
//!
//! Formats run in parallel over the shared model. A failing format becomes
//! an `export-failed` issue; the others still complete. With QC enabled,
//! every artifact set is read back into a [`FormatSummary`] and compared
//! with the model and with the other formats.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cd_core::config::{ExportFormat, GenerationConfig};
//! use cd_core::export::ExportAgent;
//! use cd_core::pipeline::run_pipeline;
//! use cd_core::requirements::RequirementsInput;
//!
//! let config = GenerationConfig::default().with_formats(&[ExportFormat::Cad]);
//! let input = RequirementsInput::Text("Living: 25 m2\nKitchen: 12 m2\nBathroom: 5 m2".into());
//! let run = run_pipeline("demo", &input, &config, None).unwrap();
//! let report = ExportAgent::new(&config).export(&run.model);
//! for artifact in &report.artifacts {
//!     println!("{} ({} bytes)", artifact.file_name, artifact.bytes.len());
//! }
//! ```

pub mod bundle;
mod document;
mod dxf;
mod ifc;
mod page;
mod raster;
pub mod step;
pub mod verify;

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ExportFormat, GenerationConfig};
use crate::errors::CdResult;
use crate::model::{ProjectModel, PLANSET_NAMESPACE};
use crate::qc::{category, QcIssue};

pub use bundle::{Bundle, Manifest};
pub use ifc::compress_guid;
pub use verify::FormatSummary;

/// What an artifact stands for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "sheet", rename_all = "snake_case")]
pub enum ArtifactTarget {
    Sheet(String),
    SheetSet,
    Model,
}

/// One exported file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Name-based id over file name and content
    pub id: Uuid,
    pub format: ExportFormat,
    pub file_name: String,
    pub target: ArtifactTarget,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(format: ExportFormat, file_name: String, target: ArtifactTarget, bytes: Vec<u8>) -> Self {
        let mut name = file_name.clone().into_bytes();
        name.push(0);
        name.extend_from_slice(&bytes);
        Artifact {
            id: Uuid::new_v5(&PLANSET_NAMESPACE, &name),
            format,
            file_name,
            target,
            bytes,
        }
    }
}

/// Everything one export pass produced
#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    /// Artifacts in format order, then sheet order
    pub artifacts: Vec<Artifact>,
    pub summaries: BTreeMap<ExportFormat, FormatSummary>,
    pub issues: Vec<QcIssue>,
}

impl ExportReport {
    pub fn artifacts_for(&self, format: ExportFormat) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(move |a| a.format == format)
    }
}

pub struct ExportAgent<'a> {
    config: &'a GenerationConfig,
}

impl<'a> ExportAgent<'a> {
    pub fn new(config: &'a GenerationConfig) -> Self {
        ExportAgent { config }
    }

    pub fn export(&self, model: &ProjectModel) -> ExportReport {
        let formats: Vec<ExportFormat> = self.config.formats.iter().copied().collect();
        let verify = self.config.include_qc;

        let outcomes: Vec<(ExportFormat, CdResult<(Vec<Artifact>, Option<FormatSummary>)>)> = formats
            .par_iter()
            .map(|&format| (format, run_format(format, model, verify)))
            .collect();

        let mut report = ExportReport::default();
        for (format, outcome) in outcomes {
            match outcome {
                Ok((artifacts, summary)) => {
                    info!(format = %format, files = artifacts.len(), "export complete");
                    report.artifacts.extend(artifacts);
                    if let Some(summary) = summary {
                        report.summaries.insert(format, summary);
                    }
                }
                Err(e) => {
                    warn!(format = %format, error = %e, "export failed");
                    report.issues.push(
                        QcIssue::error(category::EXPORT_FAILED, e.to_string()).on(format.as_str()),
                    );
                }
            }
        }

        if verify {
            let expected = verify::model_summary(model);
            let mismatches = verify::cross_check(&expected, &report.summaries, self.config.export.verify_tolerance);
            for issue in &mismatches {
                warn!(issue = %issue, "cross-format mismatch");
            }
            report.issues.extend(mismatches);
        }
        report
    }
}

fn run_format(
    format: ExportFormat,
    model: &ProjectModel,
    verify: bool,
) -> CdResult<(Vec<Artifact>, Option<FormatSummary>)> {
    debug!(format = %format, "export started");
    let prefix = model.file_prefix();
    let artifacts = match format {
        ExportFormat::Cad => model
            .sheets
            .sheets
            .iter()
            .map(|sheet| {
                Artifact::new(
                    format,
                    format!("{}_{}.dxf", prefix, sheet.number),
                    ArtifactTarget::Sheet(sheet.number.clone()),
                    dxf::write_sheet(model, sheet).into_bytes(),
                )
            })
            .collect(),
        ExportFormat::Bim => {
            let file_name = format!("{}_model.ifc", prefix);
            let text = ifc::write_ifc(model, &file_name);
            vec![Artifact::new(format, file_name, ArtifactTarget::Model, text.into_bytes())]
        }
        ExportFormat::Page => vec![Artifact::new(
            format,
            format!("{}_drawings.pdf", prefix),
            ArtifactTarget::SheetSet,
            page::write_pdf(model)?,
        )],
        ExportFormat::Raster => raster::write_pngs(model)?
            .into_iter()
            .map(|(number, bytes)| {
                Artifact::new(
                    format,
                    format!("{}_{}.png", prefix, number),
                    ArtifactTarget::Sheet(number),
                    bytes,
                )
            })
            .collect(),
    };

    if !verify {
        return Ok((artifacts, None));
    }
    let payloads: Vec<&[u8]> = artifacts.iter().map(|a| a.bytes.as_slice()).collect();
    let summary = match format {
        ExportFormat::Cad => dxf::read_summary(&payloads)?,
        ExportFormat::Bim => ifc::read_summary(payloads.first().copied().unwrap_or_default())?,
        ExportFormat::Page => page::read_summary(payloads.first().copied().unwrap_or_default())?,
        ExportFormat::Raster => raster::read_summary(&payloads)?,
    };
    debug!(format = %format, ?summary, "export re-read");
    Ok((artifacts, Some(summary)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::tests::demo_model;
    use crate::qc::count_category;

    #[test]
    fn test_artifact_ids_follow_content() {
        let a = Artifact::new(ExportFormat::Cad, "a.dxf".into(), ArtifactTarget::Model, b"x".to_vec());
        let b = Artifact::new(ExportFormat::Cad, "a.dxf".into(), ArtifactTarget::Model, b"x".to_vec());
        let c = Artifact::new(ExportFormat::Cad, "a.dxf".into(), ArtifactTarget::Model, b"y".to_vec());
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_cad_and_bim_agree_with_model() {
        let model = demo_model(&[ExportFormat::Cad, ExportFormat::Bim]);
        let report = ExportAgent::new(&model.config).export(&model);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.artifacts_for(ExportFormat::Cad).count(), model.sheet_count());
        assert_eq!(report.artifacts_for(ExportFormat::Bim).count(), 1);

        let expected = verify::model_summary(&model);
        let cad = &report.summaries[&ExportFormat::Cad];
        assert_eq!(cad.rooms, expected.rooms);
        assert_eq!(cad.room_names, expected.room_names);
        assert_eq!(cad.walls, expected.walls);
        assert_eq!(cad.openings, expected.openings);
        let bim = &report.summaries[&ExportFormat::Bim];
        assert_eq!(bim.room_names, expected.room_names);
        assert_eq!(bim.openings, expected.openings);
    }

    #[test]
    fn test_export_is_deterministic() {
        let model = demo_model(&[ExportFormat::Cad, ExportFormat::Bim]);
        let a = ExportAgent::new(&model.config).export(&model);
        let b = ExportAgent::new(&model.config).export(&model);
        let ids = |r: &ExportReport| r.artifacts.iter().map(|a| a.id).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn test_qc_disabled_skips_summaries() {
        let mut model = demo_model(&[ExportFormat::Cad]);
        let mut config = (*model.config).clone();
        config.include_qc = false;
        model.config = std::sync::Arc::new(config);
        let report = ExportAgent::new(&model.config).export(&model);
        assert!(report.summaries.is_empty());
        assert!(!report.artifacts.is_empty());
    }

    #[test]
    fn test_failing_format_does_not_stop_the_others() {
        let mut model = demo_model(&[ExportFormat::Cad, ExportFormat::Bim, ExportFormat::Raster]);
        let mut config = (*model.config).clone();
        config.export.raster_dpi = 0;
        model.config = std::sync::Arc::new(config);

        let report = ExportAgent::new(&model.config).export(&model);
        assert_eq!(report.artifacts_for(ExportFormat::Cad).count(), model.sheet_count());
        assert_eq!(report.artifacts_for(ExportFormat::Bim).count(), 1);
        assert_eq!(report.artifacts_for(ExportFormat::Raster).count(), 0);

        let failed: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.category == category::EXPORT_FAILED)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].element_id.as_deref(), Some("raster"));
        assert_eq!(count_category(&report.issues, category::CROSS_FORMAT_MISMATCH), 0);
        assert!(report.summaries.contains_key(&ExportFormat::Cad));
        assert!(!report.summaries.contains_key(&ExportFormat::Raster));
    }

    #[test]
    fn test_tampered_dxf_is_flagged() {
        let model = demo_model(&[ExportFormat::Cad]);
        let report = ExportAgent::new(&model.config).export(&model);
        let mut summary = report.summaries[&ExportFormat::Cad].clone();
        summary.rooms = summary.rooms.map(|n| n - 1);
        let mut formats = BTreeMap::new();
        formats.insert(ExportFormat::Cad, summary);
        let issues = verify::cross_check(&verify::model_summary(&model), &formats, 0.01);
        assert_eq!(issues.len(), 1);
    }
}
