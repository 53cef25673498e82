//! Cross-format consistency checks.
//!
//! Each exporter re-reads what it wrote into a [`FormatSummary`]. Every
//! summary is compared with the summary of the project model itself and
//! with every other format; fields a format cannot express stay `None` and
//! are skipped.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::ExportFormat;
use crate::model::ProjectModel;
use crate::qc::{category, QcIssue};

/// What one format says about the project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatSummary {
    pub sheets: Option<usize>,
    pub rooms: Option<usize>,
    /// Sorted room names
    pub room_names: Option<Vec<String>>,
    pub walls: Option<usize>,
    pub openings: Option<usize>,
    pub envelope_w_m: Option<f64>,
    pub envelope_d_m: Option<f64>,
}

/// Summary of the model all formats were derived from
pub fn model_summary(model: &ProjectModel) -> FormatSummary {
    let plan = &model.plan;
    let mut room_names: Vec<String> = plan.rooms.iter().map(|r| r.name.clone()).collect();
    room_names.sort();
    FormatSummary {
        sheets: Some(model.sheet_count()),
        rooms: Some(plan.rooms.len()),
        room_names: Some(room_names),
        walls: Some(plan.walls.len()),
        openings: Some(plan.openings.len()),
        envelope_w_m: Some(plan.footprint_width_m()),
        envelope_d_m: Some(plan.footprint_depth_m()),
    }
}

fn within(a: f64, b: f64, tolerance: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1e-9);
    (a - b).abs() / scale <= tolerance
}

/// Field-by-field differences between two summaries
fn differences(a: &FormatSummary, b: &FormatSummary, tolerance: f64) -> Vec<(&'static str, String, String)> {
    let mut out = Vec::new();
    let mut count = |field: &'static str, x: Option<usize>, y: Option<usize>| {
        if let (Some(x), Some(y)) = (x, y) {
            if x != y {
                out.push((field, x.to_string(), y.to_string()));
            }
        }
    };
    count("sheets", a.sheets, b.sheets);
    count("rooms", a.rooms, b.rooms);
    count("walls", a.walls, b.walls);
    count("openings", a.openings, b.openings);

    if let (Some(x), Some(y)) = (&a.room_names, &b.room_names) {
        if x != y {
            let xs: BTreeSet<_> = x.iter().collect();
            let ys: BTreeSet<_> = y.iter().collect();
            let only_x: Vec<_> = xs.difference(&ys).map(|s| s.as_str()).collect();
            let only_y: Vec<_> = ys.difference(&xs).map(|s| s.as_str()).collect();
            out.push(("room_names", only_x.join(", "), only_y.join(", ")));
        }
    }

    for (field, x, y) in [
        ("envelope_w_m", a.envelope_w_m, b.envelope_w_m),
        ("envelope_d_m", a.envelope_d_m, b.envelope_d_m),
    ] {
        if let (Some(x), Some(y)) = (x, y) {
            if !within(x, y, tolerance) {
                out.push((field, format!("{:.3}", x), format!("{:.3}", y)));
            }
        }
    }
    out
}

/// Compare every format with the model, then formats pairwise. A field that
/// already disagrees with the model is not reported again between formats.
pub fn cross_check(
    model: &FormatSummary,
    formats: &BTreeMap<ExportFormat, FormatSummary>,
    tolerance: f64,
) -> Vec<QcIssue> {
    let mut issues = Vec::new();
    let mut flagged: BTreeSet<(ExportFormat, &'static str)> = BTreeSet::new();

    for (format, summary) in formats {
        for (field, expected, found) in differences(model, summary, tolerance) {
            flagged.insert((*format, field));
            issues.push(
                QcIssue::error(
                    category::CROSS_FORMAT_MISMATCH,
                    format!("{} {}: model has {}, export has {}", format, field, expected, found),
                )
                .on(format.as_str()),
            );
        }
    }

    let entries: Vec<_> = formats.iter().collect();
    for (i, (fa, a)) in entries.iter().enumerate() {
        for (fb, b) in &entries[i + 1..] {
            for (field, va, vb) in differences(a, b, tolerance) {
                if flagged.contains(&(**fa, field)) || flagged.contains(&(**fb, field)) {
                    continue;
                }
                issues.push(
                    QcIssue::error(
                        category::CROSS_FORMAT_MISMATCH,
                        format!("{} vs {} {}: {} / {}", fa, fb, field, va, vb),
                    )
                    .on(format!("{}+{}", fa, fb)),
                );
            }
        }
    }
    issues
}
