//! End-to-end runs through the public API.

use cd_core::annotation::CDAnnotationEngine;
use cd_core::config::{BackendKind, ExportFormat, GenerationConfig};
use cd_core::export::{bundle, ExportAgent};
use cd_core::pipeline::{run_pipeline, PipelineObserver, Stage};
use cd_core::plan::validate_plan;
use cd_core::qc::{category, count_category, Severity};
use cd_core::requirements::{RequirementsInput, RoomRequest, RoomRequirement};

fn house() -> Vec<RoomRequirement> {
    vec![
        RoomRequirement::new("Living", 25.0),
        RoomRequirement::new("Kitchen", 15.0),
        RoomRequirement::new("Bedroom", 16.0).with_count(2),
        RoomRequirement::new("Bathroom", 6.0),
    ]
}

fn structured(rooms: Vec<RoomRequirement>) -> RequirementsInput {
    RequirementsInput::Structured(rooms.into_iter().map(RoomRequest::from).collect())
}

fn config(formats: &[ExportFormat]) -> GenerationConfig {
    let mut config = GenerationConfig::default().with_formats(formats);
    config.seed = 42;
    config
}

#[test]
fn test_house_to_cad_and_page() {
    let run = run_pipeline("house", &structured(house()), &config(&[ExportFormat::Cad, ExportFormat::Page]), None)
        .unwrap();
    let plan = &run.model.plan;

    assert_eq!(plan.rooms.len(), 5);
    let footprint_m2 = plan.footprint_width_m() * plan.footprint_depth_m();
    assert!((70.0..=95.0).contains(&footprint_m2), "footprint {:.1} m2", footprint_m2);
    assert!(plan.doors().count() >= 5);

    assert!(run.export.artifacts_for(ExportFormat::Cad).count() > 0);
    assert_eq!(run.export.artifacts_for(ExportFormat::Page).count(), 1);
    for format in [ExportFormat::Cad, ExportFormat::Page] {
        assert_eq!(run.export.summaries[&format].rooms, Some(5), "{}", format);
    }
    assert_eq!(count_category(&run.issues, category::CROSS_FORMAT_MISMATCH), 0, "{:?}", run.issues);
    assert_eq!(count_category(&run.issues, category::EXPORT_FAILED), 0, "{:?}", run.issues);
}

#[test]
fn test_oversized_room_cannot_be_packed() {
    let mut config = config(&[ExportFormat::Cad]);
    config.plan.max_envelope_width_m = 10.0;
    config.plan.max_envelope_depth_m = 10.0;
    let err = run_pipeline("hall", &structured(vec![RoomRequirement::new("Hall", 500.0)]), &config, None)
        .unwrap_err();
    assert_eq!(err.error_code(), "PACKING_INFEASIBLE");
}

#[test]
fn test_unmet_adjacency_is_a_finding() {
    let rooms = vec![
        RoomRequirement::new("Living", 28.0),
        RoomRequirement::new("Dining", 14.0),
        RoomRequirement::new("Kitchen", 12.0),
        RoomRequirement::new("Study", 10.0),
        RoomRequirement::new("Bedroom", 15.0),
        RoomRequirement::new("Bathroom", 6.0),
    ];
    let config = config(&[ExportFormat::Cad]);
    let baseline = run_pipeline("flat", &structured(rooms), &config, None).unwrap();
    assert_eq!(count_category(&baseline.issues, category::ADJACENCY_UNMET), 0);

    // Six rooms cannot all border each other; pick a pair that does not
    let plan = &baseline.model.plan;
    let (a, b) = plan
        .rooms
        .iter()
        .flat_map(|a| plan.rooms.iter().map(move |b| (a, b)))
        .find(|(a, b)| a.id < b.id && !plan.rooms_adjacent(&a.id, &b.id))
        .map(|(a, b)| (a.requirement, b.requirement))
        .unwrap();

    let mut wanted = baseline.model.program.rooms.clone();
    let target = wanted[b].name.clone();
    wanted[a] = wanted[a].clone().adjacent_to(target);
    let run = run_pipeline("flat", &structured(wanted), &config, None).unwrap();

    assert_eq!(run.model.plan.rooms, baseline.model.plan.rooms);
    assert!(count_category(&run.issues, category::ADJACENCY_UNMET) >= 1);
    assert_eq!(run.model.plan.rooms.len(), 6);
    assert!(validate_plan(&run.model.plan).is_empty());
}

#[test]
fn test_runs_are_byte_identical() {
    let config = config(&[ExportFormat::Cad, ExportFormat::Bim]);
    let a = run_pipeline("house", &structured(house()), &config, None).unwrap();
    let b = run_pipeline("house", &structured(house()), &config, None).unwrap();

    assert_eq!(a.model.revision_id, b.model.revision_id);
    assert_eq!(a.export.artifacts.len(), b.export.artifacts.len());
    for (x, y) in a.export.artifacts.iter().zip(&b.export.artifacts) {
        assert_eq!(x.file_name, y.file_name);
        assert_eq!(x.bytes, y.bytes, "{} differs", x.file_name);
    }

    let pa = bundle::pack(&a.model, &a.export.artifacts, Some(&a.issues)).unwrap();
    let pb = bundle::pack(&b.model, &b.export.artifacts, Some(&b.issues)).unwrap();
    assert_eq!(pa.bytes, pb.bytes);
}

#[test]
fn test_all_formats_agree_and_repeat_exactly() {
    let mut config = config(&ExportFormat::ALL);
    config.export.raster_dpi = 30;
    let a = run_pipeline("house", &structured(house()), &config, None).unwrap();
    let b = run_pipeline("house", &structured(house()), &config, None).unwrap();

    assert_eq!(count_category(&a.issues, category::EXPORT_FAILED), 0, "{:?}", a.issues);
    assert_eq!(count_category(&a.issues, category::CROSS_FORMAT_MISMATCH), 0, "{:?}", a.issues);
    assert_eq!(a.export.summaries.len(), 4);
    for (format, summary) in &a.export.summaries {
        assert_eq!(summary.rooms, Some(5), "{}", format);
    }
    let sheets = a.model.sheet_count();
    assert_eq!(a.export.artifacts_for(ExportFormat::Raster).count(), sheets);
    assert_eq!(a.export.summaries[&ExportFormat::Raster].sheets, Some(sheets));
    assert_eq!(a.export.summaries[&ExportFormat::Page].sheets, Some(sheets));

    assert_eq!(a.export.artifacts.len(), b.export.artifacts.len());
    for (x, y) in a.export.artifacts.iter().zip(&b.export.artifacts) {
        assert_eq!(x.file_name, y.file_name);
        assert_eq!(x.bytes, y.bytes, "{} differs", x.file_name);
    }
}

#[test]
fn test_tiny_rooms_are_findings_not_failures() {
    for text in ["Living: 25\nWC: 1.2\n", "Bedroom: 12\nCloset: 1\n"] {
        let input = RequirementsInput::Text(text.to_string());
        let run = run_pipeline("small", &input, &config(&[ExportFormat::Cad]), None).unwrap();
        let plan = &run.model.plan;
        assert_eq!(plan.rooms.len(), 2);
        assert!(plan.rooms.iter().all(|r| r.rect.w >= 1200 && r.rect.h >= 1200));
        assert_eq!(count_category(&run.issues, category::AREA_DEVIATION), 1, "{:?}", run.issues);
        assert!(validate_plan(plan).is_empty());
    }
}

#[test]
fn test_expanded_names_stay_unique() {
    let input = RequirementsInput::Text("2x Bedroom: 12\nBedroom 2: 10\nLiving: 20\n".to_string());
    let run = run_pipeline("names", &input, &config(&[ExportFormat::Cad]), None).unwrap();
    let mut names: Vec<_> = run.model.plan.rooms.iter().map(|r| r.name.to_lowercase()).collect();
    assert_eq!(names.len(), 4);
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 4, "{:?}", run.model.plan.rooms);
    assert_eq!(count_category(&run.issues, category::CROSS_FORMAT_MISMATCH), 0);
}

#[test]
fn test_text_and_structured_programs_agree() {
    let text = RequirementsInput::Text(
        "Living: 25 m2\nKitchen: 15 m2\n2x Bedroom: 16 m2\nBathroom: 6 m2\n".to_string(),
    );
    let config = config(&[ExportFormat::Bim]);
    let from_text = run_pipeline("house", &text, &config, None).unwrap();
    let from_list = run_pipeline("house", &structured(house()), &config, None).unwrap();
    let names = |run: &cd_core::PipelineRun| run.model.plan.rooms.iter().map(|r| r.name.clone()).collect::<Vec<_>>();
    assert_eq!(names(&from_text), names(&from_list));
}

#[test]
fn test_annotation_is_idempotent() {
    let run = run_pipeline("house", &structured(house()), &config(&[ExportFormat::Cad]), None).unwrap();
    let again = CDAnnotationEngine::new(&run.model.config.annotation).annotate(&run.model.plan);
    assert_eq!(again, *run.model.annotations);
}

#[test]
fn test_export_agent_rerun_matches_pipeline() {
    let run = run_pipeline("house", &structured(house()), &config(&[ExportFormat::Cad]), None).unwrap();
    let report = ExportAgent::new(&run.model.config).export(&run.model);
    let ids = |a: &[cd_core::Artifact]| a.iter().map(|x| x.id).collect::<Vec<_>>();
    assert_eq!(ids(&report.artifacts), ids(&run.export.artifacts));
}

#[test]
fn test_plan_invariants_across_seeds() {
    for seed in [3_u64, 11, 2024] {
        let mut config = config(&[ExportFormat::Cad]);
        config.seed = seed;
        let run = run_pipeline("house", &structured(house()), &config, None).unwrap();
        assert!(validate_plan(&run.model.plan).is_empty(), "seed {}", seed);
        assert!(
            run.issues
                .iter()
                .filter(|i| i.severity == Severity::Error)
                .all(|i| i.category != category::CROSS_FORMAT_MISMATCH),
            "seed {}: {:?}",
            seed,
            run.issues
        );
    }
}

struct StopBefore {
    stage: Stage,
    seen: std::sync::Mutex<Vec<Stage>>,
}

impl PipelineObserver for StopBefore {
    fn on_stage(&self, stage: Stage, _progress: f32) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(stage);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.seen
            .lock()
            .map(|seen| seen.len() == Stage::ALL.iter().position(|s| *s == self.stage).unwrap_or(0))
            .unwrap_or(false)
    }
}

#[test]
fn test_cancellation_stops_at_stage_boundary() {
    let observer = StopBefore {
        stage: Stage::Export,
        seen: Default::default(),
    };
    let err = run_pipeline("house", &structured(house()), &config(&[ExportFormat::Cad]), Some(&observer))
        .unwrap_err();
    assert_eq!(err.error_code(), "CANCELLED");
    assert_eq!(observer.seen.lock().unwrap().last(), Some(&Stage::Sheets));
}

#[test]
fn test_external_backend_is_unavailable() {
    let mut config = config(&[ExportFormat::Cad]);
    config.backend = BackendKind::Autocad;
    let err = run_pipeline("house", &structured(house()), &config, None).unwrap_err();
    assert_eq!(err.error_code(), "BACKEND_UNAVAILABLE");
}
