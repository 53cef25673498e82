//! Deterministic `.tar.gz` bundle of a revision's artifacts.
//!
//! Entries are sorted by file name, carry a zero mtime and fixed mode, and
//! the gzip header has no timestamp, so the same revision always produces
//! the same bytes.

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CdError, CdResult};
use crate::model::ProjectModel;
use crate::qc::QcIssue;

use super::{Artifact, ArtifactTarget};

pub const MANIFEST_NAME: &str = "manifest.json";
pub const QC_REPORT_NAME: &str = "qc_report.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_name: String,
    pub format: String,
    pub target: ArtifactTarget,
    pub id: Uuid,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub project_id: String,
    pub revision_id: Uuid,
    pub issue_date: String,
    pub artifacts: Vec<ManifestEntry>,
}

/// A packed revision, ready to download
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub file_name: String,
    pub manifest: Manifest,
    pub bytes: Vec<u8>,
}

fn append(builder: &mut tar::Builder<GzEncoder<Vec<u8>>>, name: &str, data: &[u8]) -> CdResult<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder
        .append_data(&mut header, name, data)
        .map_err(|e| CdError::export("bundle", format!("{}: {}", name, e)))
}

/// Pack artifacts, manifest and (optionally) the QC report
pub fn pack(model: &ProjectModel, artifacts: &[Artifact], issues: Option<&[QcIssue]>) -> CdResult<Bundle> {
    let mut sorted: Vec<&Artifact> = artifacts.iter().collect();
    sorted.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    let manifest = Manifest {
        project_id: model.project_id.clone(),
        revision_id: model.revision_id,
        issue_date: model.config.issue_date_label(),
        artifacts: sorted
            .iter()
            .map(|a| ManifestEntry {
                file_name: a.file_name.clone(),
                format: a.format.as_str().to_string(),
                target: a.target.clone(),
                id: a.id,
                size: a.bytes.len(),
            })
            .collect(),
    };

    let gz = GzBuilder::new().mtime(0).write(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(gz);
    builder.mode(tar::HeaderMode::Deterministic);
    for artifact in &sorted {
        append(&mut builder, &artifact.file_name, &artifact.bytes)?;
    }
    append(&mut builder, MANIFEST_NAME, &serde_json::to_vec_pretty(&manifest)?)?;
    if let Some(issues) = issues {
        append(&mut builder, QC_REPORT_NAME, &serde_json::to_vec_pretty(issues)?)?;
    }

    let gz = builder
        .into_inner()
        .map_err(|e| CdError::export("bundle", e.to_string()))?;
    let bytes = gz.finish().map_err(|e| CdError::export("bundle", e.to_string()))?;

    Ok(Bundle {
        file_name: format!("{}_{}.tar.gz", model.file_prefix(), model.config.issue_date_label()),
        manifest,
        bytes,
    })
}

/// List the entry names of a bundle, in archive order
pub fn entry_names(bytes: &[u8]) -> CdResult<Vec<String>> {
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(bytes));
    let entries = archive
        .entries()
        .map_err(|e| CdError::export("bundle", e.to_string()))?;
    entries
        .map(|entry| {
            let entry = entry.map_err(|e| CdError::export("bundle", e.to_string()))?;
            let path = entry.path().map_err(|e| CdError::export("bundle", e.to_string()))?;
            Ok(path.to_string_lossy().into_owned())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportFormat;
    use crate::export::ExportAgent;
    use crate::pipeline::tests::demo_model;
    use crate::qc::category;

    fn artifacts(model: &ProjectModel) -> Vec<Artifact> {
        ExportAgent::new(&model.config).export(model).artifacts
    }

    #[test]
    fn test_pack_is_byte_identical() {
        let model = demo_model(&[ExportFormat::Cad, ExportFormat::Bim]);
        let files = artifacts(&model);
        let a = pack(&model, &files, None).unwrap();
        let b = pack(&model, &files, None).unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.file_name, format!("{}_1970-01-01.tar.gz", model.file_prefix()));
    }

    #[test]
    fn test_entries_sorted_with_manifest_and_report_last() {
        let model = demo_model(&[ExportFormat::Cad, ExportFormat::Bim]);
        let mut files = artifacts(&model);
        files.reverse();
        let issues = vec![QcIssue::warning(category::AREA_DEVIATION, "Living is 4% small")];
        let bundle = pack(&model, &files, Some(&issues)).unwrap();

        let names = entry_names(&bundle.bytes).unwrap();
        assert_eq!(names[names.len() - 2], MANIFEST_NAME);
        assert_eq!(names[names.len() - 1], QC_REPORT_NAME);

        let artifact_names = &names[..names.len() - 2];
        let mut sorted = artifact_names.to_vec();
        sorted.sort();
        assert_eq!(artifact_names, sorted.as_slice());
        assert_eq!(bundle.manifest.artifacts.len(), files.len());
    }

    #[test]
    fn test_manifest_lists_sizes_and_ids() {
        let model = demo_model(&[ExportFormat::Bim]);
        let files = artifacts(&model);
        let bundle = pack(&model, &files, None).unwrap();
        let entry = &bundle.manifest.artifacts[0];
        assert_eq!(entry.format, "bim");
        assert_eq!(entry.target, ArtifactTarget::Model);
        assert_eq!(entry.size, files[0].bytes.len());
        assert_eq!(entry.id, files[0].id);
        assert!(!entry_names(&bundle.bytes).unwrap().contains(&QC_REPORT_NAME.to_string()));
    }
}
