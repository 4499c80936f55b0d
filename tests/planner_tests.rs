//! Integration tests for copy planning.
//!
//! Tests cover:
//! - Folder and file name patterns
//! - Collision resolution within one run and against the destination
//! - Duplicate handling policies
//! - Associated files
//! - Filters
//! - Determinism and re-runs

use chrono::NaiveDate;
use media_ingest::core::context::{RunContext, RunEvent};
use media_ingest::core::decision::{AutoDecision, DuplicateDecision};
use media_ingest::core::executor::{CopyExecutor, RunOutcome};
use media_ingest::core::filters::{Filter, FilterDecision, FilterRegistry};
use media_ingest::core::planner::{CopyPlanner, PlannedRun};
use media_ingest::core::scanner::{scan_directory, ScanOptions};
use media_ingest::generators::pattern::{
    parse_filename_pattern, parse_folder_pattern, PatternResolver, SequenceState,
};
use media_ingest::models::config::GlobalSettings;
use media_ingest::models::plan::{Classification, PlanAction};
use media_ingest::models::preset::{DuplicateHandling, FilterSpec, Preset};
use media_ingest::models::record::{FileRecord, FileStatus, MediaType, Metadata};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn settings() -> GlobalSettings {
    GlobalSettings {
        cache_hashes: false,
        workers: 3,
        max_concurrent_operations: 2,
        ..Default::default()
    }
}

fn context(destination: &Path) -> RunContext {
    RunContext::new(destination, settings())
}

fn preset(folder: &str) -> Preset {
    Preset {
        folder_structure: parse_folder_pattern(folder).unwrap(),
        ..Default::default()
    }
}

fn write(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn scan(source: &Path) -> Vec<FileRecord> {
    scan_directory(source, &ScanOptions::default())
        .unwrap()
        .records
}

async fn plan(preset: Preset, ctx: RunContext, records: Vec<FileRecord>) -> PlannedRun {
    let planner = CopyPlanner::new(preset, Arc::new(ctx)).unwrap();
    planner.plan(records).await.unwrap()
}

#[tokio::test]
async fn test_pattern_scenario_target_path() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "DSC00001.JPG", "jpeg");

    let mut metadata = Metadata::new();
    metadata.insert(
        "datetime".to_string(),
        NaiveDate::from_ymd_opt(2023, 10, 27)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap()
            .into(),
    );
    let records: Vec<FileRecord> = scan(src.path())
        .into_iter()
        .map(|r| r.with_metadata(metadata.clone()))
        .collect();

    let mut preset = preset("{year}/{month:%02d}");
    preset.file_name_pattern =
        parse_filename_pattern("{datetime:YYYYMMDD_HHMMSS}_{original_filename}").unwrap();

    let run = plan(preset, context(dst.path()), records).await;

    assert_eq!(run.plan.entries.len(), 1);
    let entry = &run.plan.entries[0];
    assert_eq!(
        entry.destination,
        dst.path().join("2023").join("10").join("20231027_153000_DSC00001.JPG")
    );
    assert_eq!(entry.action, PlanAction::Copy);
    assert_eq!(entry.classification, Classification::New);
    assert_eq!(run.records[0].status(), FileStatus::Planned);
    assert_eq!(
        run.records[0].target_file_name.as_deref(),
        Some("20231027_153000_DSC00001.JPG")
    );
}

#[tokio::test]
async fn test_same_name_different_content_is_renamed() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "a/IMG_0001.JPG", "first");
    write(src.path(), "b/IMG_0001.JPG", "second!");

    let run = plan(preset("library"), context(dst.path()), scan(src.path())).await;

    let library = dst.path().join("library");
    assert_eq!(run.plan.entries[0].destination, library.join("IMG_0001.JPG"));
    assert_eq!(run.plan.entries[0].action, PlanAction::Copy);
    assert_eq!(run.plan.entries[1].destination, library.join("IMG_0001_1.JPG"));
    assert_eq!(run.plan.entries[1].action, PlanAction::Rename);
    assert_eq!(
        run.plan.entries[1].classification,
        Classification::NameConflictDifferentContent
    );
    assert_eq!(run.plan.counters.included, 2);
}

#[tokio::test]
async fn test_collision_resolution_is_injective() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    for (i, content) in ["a", "bb", "ccc", "dddd", "eeeee", "ffffff"].iter().enumerate() {
        write(src.path(), &format!("card{}/IMG.JPG", i), content);
    }
    // Same size as "ccc" but different bytes.
    write(src.path(), "card9/IMG.JPG", "xyz");

    let run = plan(preset("library"), context(dst.path()), scan(src.path())).await;

    let destinations: HashSet<_> = run.plan.entries.iter().map(|e| e.destination.clone()).collect();
    assert_eq!(run.plan.entries.len(), 7);
    assert_eq!(destinations.len(), 7);
    assert!(run.plan.entries.iter().all(|e| e.action.writes()));
}

#[tokio::test]
async fn test_identical_files_in_one_run_copy_once() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "a/IMG_0001.JPG", "same bytes");
    write(src.path(), "b/IMG_0001.JPG", "same bytes");

    let run = plan(preset("library"), context(dst.path()), scan(src.path())).await;

    assert_eq!(run.plan.entries[0].action, PlanAction::Copy);
    assert_eq!(run.plan.entries[1].action, PlanAction::Skip);
    assert_eq!(
        run.plan.entries[1].classification,
        Classification::DuplicateContent
    );
    assert_eq!(run.records[1].status(), FileStatus::Duplicate);
    assert_eq!(run.plan.counters.duplicate, 1);
}

#[tokio::test]
async fn test_skip_policy_existing_duplicate_writes_nothing() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "IMG_0001.JPG", "holiday");
    write(dst.path(), "library/IMG_0001.JPG", "holiday");

    let mut preset = preset("library");
    preset.duplicate_handling = DuplicateHandling::Skip;
    let ctx = Arc::new(context(dst.path()));
    let planner = CopyPlanner::new(preset, Arc::clone(&ctx)).unwrap();
    let run = planner.plan(scan(src.path())).await.unwrap();

    let entry = &run.plan.entries[0];
    assert_eq!(entry.action, PlanAction::Skip);
    assert_eq!(entry.classification, Classification::DuplicateContent);
    assert_eq!(entry.reason.as_deref(), Some("duplicate"));
    assert_eq!(run.records[0].status(), FileStatus::FilteredOut);
    assert_eq!(run.records[0].detail.as_deref(), Some("duplicate"));
    assert_eq!(run.plan.counters.included, 0);
    assert_eq!(run.plan.counters.duplicate, 1);

    let report = CopyExecutor::new(ctx).execute(&run.plan).await.unwrap();
    assert_eq!(report.bytes_copied, 0);
    assert_eq!(report.outcome(), RunOutcome::NothingToCopy);
}

#[tokio::test]
async fn test_skip_policy_still_renames_name_conflicts() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "IMG_0001.JPG", "new shot");
    write(dst.path(), "library/IMG_0001.JPG", "an older, unrelated shot");

    let mut preset = preset("library");
    preset.duplicate_handling = DuplicateHandling::Skip;
    let run = plan(preset, context(dst.path()), scan(src.path())).await;

    let entry = &run.plan.entries[0];
    assert_eq!(entry.action, PlanAction::Rename);
    assert_eq!(entry.destination, dst.path().join("library").join("IMG_0001_1.JPG"));
}

#[tokio::test]
async fn test_ask_policy_uses_decision_provider() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "IMG_0001.JPG", "new shot");
    write(dst.path(), "library/IMG_0001.JPG", "an older, unrelated shot");

    let mut ask = preset("library");
    ask.duplicate_handling = DuplicateHandling::Ask;

    let overwrite = context(dst.path())
        .with_decisions(Arc::new(AutoDecision(DuplicateDecision::Overwrite)));
    let run = plan(ask.clone(), overwrite, scan(src.path())).await;
    assert_eq!(run.plan.entries[0].action, PlanAction::Overwrite);
    assert_eq!(
        run.plan.entries[0].destination,
        dst.path().join("library").join("IMG_0001.JPG")
    );

    // Headless default answers skip.
    let run = plan(ask, context(dst.path()), scan(src.path())).await;
    assert_eq!(run.plan.entries[0].action, PlanAction::Skip);
    assert_eq!(run.records[0].status(), FileStatus::FilteredOut);
}

#[tokio::test]
async fn test_sidecar_travels_with_main_file() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "IMG_0001.JPG", "jpeg");
    write(src.path(), "IMG_0001.AAE", "edits");
    write(src.path(), "IMG_0002.JPG", "other jpeg");

    let mut preset = preset("library");
    preset.associated_file_rules.same_base_name = vec!["aae".to_string()];
    let run = plan(preset, context(dst.path()), scan(src.path())).await;

    assert_eq!(run.records.len(), 2);
    let main = &run.records[0];
    assert_eq!(main.original_filename, "IMG_0001.JPG");
    assert_eq!(main.associated().len(), 1);
    assert_eq!(main.associated()[0].original_filename, "IMG_0001.AAE");
    assert_eq!(main.associated()[0].parent(), Some(main.id));

    // The sidecar follows its parent in the plan.
    assert_eq!(run.plan.entries.len(), 3);
    assert_eq!(run.plan.entries[1].parent, Some(main.id));
    assert_eq!(
        run.plan.entries[1].destination,
        dst.path().join("library").join("IMG_0001.AAE")
    );
    for entry in run.plan.entries.iter().filter(|e| e.parent.is_some()) {
        let parent = run.plan.entry(entry.parent.unwrap()).unwrap();
        assert!(parent.action.writes());
    }
}

#[tokio::test]
async fn test_sidecar_follows_renamed_main_file() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "IMG_0001.JPG", "new shot");
    write(src.path(), "IMG_0001.XMP", "<xmp/>");
    write(dst.path(), "library/IMG_0001.JPG", "an older, unrelated shot");

    let run = plan(preset("library"), context(dst.path()), scan(src.path())).await;

    let library = dst.path().join("library");
    assert_eq!(run.plan.entries[0].destination, library.join("IMG_0001_1.JPG"));
    assert_eq!(run.plan.entries[1].destination, library.join("IMG_0001_1.XMP"));
}

#[tokio::test]
async fn test_filter_excludes_file_and_its_sidecar() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "IMG_0001.JPG", "jpeg");
    write(src.path(), "Screenshot_01.PNG", "png");
    write(src.path(), "Screenshot_01.XMP", "<xmp/>");

    let mut preset = preset("library");
    preset.filters.insert(
        "extension".to_string(),
        FilterSpec::new(serde_json::json!({ "excludeExtensions": ["png"] })),
    );
    let run = plan(preset, context(dst.path()), scan(src.path())).await;

    assert_eq!(run.plan.entries.len(), 1);
    assert_eq!(run.plan.excluded.len(), 2);
    assert!(run.plan.excluded.iter().all(|e| e.filter == "extension"));
    assert_eq!(run.plan.counters.excluded_by_filter, 2);
    assert_eq!(run.filter_stats.total, 2);
    assert_eq!(run.filter_stats.excluded, 1);
    assert_eq!(run.filter_stats.exclusion_by_filter.get("extension"), Some(&1));
}

fn sidecar_filter_preset(apply_filters: bool) -> Preset {
    let mut preset = preset("library");
    preset.associated_file_rules.apply_filters = apply_filters;
    preset.filters.insert(
        "extension".to_string(),
        FilterSpec::new(serde_json::json!({ "excludeExtensions": ["xmp"] })),
    );
    preset
}

#[tokio::test]
async fn test_sidecars_bypass_filters_by_default() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "A.JPG", "jpeg");
    write(src.path(), "A.xmp", "<xmp/>");

    let run = plan(sidecar_filter_preset(false), context(dst.path()), scan(src.path())).await;

    assert_eq!(run.plan.entries.len(), 2);
    assert!(run.plan.excluded.is_empty());
    assert_eq!(run.filter_stats.total, 1);
    assert_eq!(run.records[0].associated()[0].status(), FileStatus::Planned);
}

#[tokio::test]
async fn test_sidecars_filtered_when_opted_in() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "A.JPG", "jpeg");
    write(src.path(), "A.xmp", "<xmp/>");

    let run = plan(sidecar_filter_preset(true), context(dst.path()), scan(src.path())).await;

    assert_eq!(run.plan.entries.len(), 1);
    assert_eq!(run.plan.entries[0].source, src.path().join("A.JPG"));
    assert_eq!(run.plan.entries[0].action, PlanAction::Copy);

    assert_eq!(run.plan.excluded.len(), 1);
    assert_eq!(run.plan.excluded[0].source, src.path().join("A.xmp"));
    assert_eq!(run.plan.excluded[0].filter, "extension");
    assert_eq!(run.filter_stats.total, 2);
    assert_eq!(
        run.records[0].associated()[0].status(),
        FileStatus::FilteredOut
    );
}

struct NoRawFilter {
    name: String,
}

impl Filter for NoRawFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        5
    }

    fn evaluate(&self, record: &FileRecord) -> media_ingest::Result<FilterDecision> {
        if record.media_type == MediaType::Raw {
            Ok(FilterDecision::exclude("raw files are imported separately"))
        } else {
            Ok(FilterDecision::include())
        }
    }
}

fn build_no_raw(name: &str, _spec: &FilterSpec) -> media_ingest::Result<Box<dyn Filter>> {
    Ok(Box::new(NoRawFilter {
        name: name.to_string(),
    }))
}

#[tokio::test]
async fn test_custom_filter_kind_from_registry() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "DSC_0001.NEF", "raw");
    write(src.path(), "DSC_0002.JPG", "jpeg");

    let mut preset = preset("library");
    preset.filters.insert(
        "no_raw".to_string(),
        FilterSpec::new(serde_json::json!({})),
    );

    // Unknown to the built-in registry.
    assert!(preset.validate().is_err());
    assert!(CopyPlanner::new(preset.clone(), Arc::new(context(dst.path()))).is_err());

    let mut registry = FilterRegistry::with_builtins();
    registry.register("no_raw", build_no_raw);
    assert!(preset.validate_with(&registry).is_ok());

    let planner =
        CopyPlanner::with_registry(preset, Arc::new(context(dst.path())), &registry).unwrap();
    let run = planner.plan(scan(src.path())).await.unwrap();

    assert_eq!(run.plan.entries.len(), 1);
    assert_eq!(run.plan.entries[0].source, src.path().join("DSC_0002.JPG"));
    assert_eq!(run.plan.excluded.len(), 1);
    assert_eq!(run.plan.excluded[0].filter, "no_raw");
    assert_eq!(run.plan.excluded[0].reason, "raw files are imported separately");
}

#[tokio::test]
async fn test_strict_resolver_records_missing_metadata_as_error() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "IMG_0001.JPG", "jpeg");
    write(src.path(), "IMG_0001.XMP", "<xmp/>");

    let planner = CopyPlanner::new(preset("{make}"), Arc::new(context(dst.path())))
        .unwrap()
        .with_resolver(PatternResolver::strict());
    let run = planner.plan(scan(src.path())).await.unwrap();

    assert!(run.plan.entries.is_empty());
    assert_eq!(run.plan.errors.len(), 2);
    assert_eq!(run.records[0].status(), FileStatus::Error);
    assert_eq!(run.records[0].associated()[0].status(), FileStatus::Error);
}

#[tokio::test]
async fn test_sequence_continues_from_earlier_state() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "IMG_0001.JPG", "one");
    write(src.path(), "IMG_0002.JPG", "two");

    let mut preset = preset("library");
    preset.file_name_pattern = parse_filename_pattern("{seq:3}_{original_filename}").unwrap();
    let ctx = context(dst.path()).with_sequences(SequenceState::starting_after(41));
    let run = plan(preset, ctx, scan(src.path())).await;

    let library = dst.path().join("library");
    assert_eq!(run.plan.entries[0].destination, library.join("042_IMG_0001.JPG"));
    assert_eq!(run.plan.entries[1].destination, library.join("043_IMG_0002.JPG"));
}

#[tokio::test]
async fn test_planning_is_deterministic() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    for i in 0..12 {
        write(
            src.path(),
            &format!("card{}/IMG_{:04}.JPG", i % 3, i % 4),
            &"x".repeat(i + 1),
        );
    }
    write(dst.path(), "library/IMG_0000.JPG", "already here");

    let preset = preset("library");
    let records = scan(src.path());

    let first = plan(preset.clone(), context(dst.path()), records.clone()).await;
    let second = plan(preset, context(dst.path()), records).await;

    assert_eq!(first.plan.entries, second.plan.entries);
    assert_eq!(first.plan.counters, second.plan.counters);
    assert_eq!(
        serde_json::to_string(&first.plan.entries).unwrap(),
        serde_json::to_string(&second.plan.entries).unwrap()
    );
}

#[tokio::test]
async fn test_rerun_classifies_copied_files_as_duplicates() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "a/IMG_0001.JPG", "first");
    write(src.path(), "b/IMG_0001.JPG", "second!");
    write(src.path(), "b/IMG_0002.JPG", "third");

    let ctx = Arc::new(context(dst.path()));
    let planner = CopyPlanner::new(preset("library"), Arc::clone(&ctx)).unwrap();
    let run = planner.plan(scan(src.path())).await.unwrap();
    let report = CopyExecutor::new(ctx).execute(&run.plan).await.unwrap();
    assert_eq!(report.outcome(), RunOutcome::AllSucceeded);
    assert_eq!(report.copied, 3);

    let rerun = plan(preset("library"), context(dst.path()), scan(src.path())).await;
    assert!(rerun
        .plan
        .entries
        .iter()
        .all(|e| e.action == PlanAction::Skip
            && e.classification == Classification::DuplicateContent));
    assert_eq!(rerun.plan.counters.included, 0);
    assert_eq!(rerun.plan.counters.duplicate, 3);

    let names: Vec<String> = fs::read_dir(dst.path().join("library"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names.len(), 3);
}

#[tokio::test]
async fn test_events_are_emitted() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "IMG_0001.JPG", "jpeg");
    write(src.path(), "IMG_0002.PNG", "png");

    let mut preset = preset("library");
    preset.filters.insert(
        "extension".to_string(),
        FilterSpec::new(serde_json::json!({ "includeExtensions": ["jpg"] })),
    );
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _run = plan(preset, context(dst.path()).with_events(tx), scan(src.path())).await;

    let mut planned = 0;
    let mut excluded = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            RunEvent::Planned { .. } => planned += 1,
            RunEvent::Excluded { .. } => excluded += 1,
            _ => {}
        }
    }
    assert_eq!(planned, 1);
    assert_eq!(excluded, 1);
}

#[tokio::test]
async fn test_cancelled_run_stops_planning() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "IMG_0001.JPG", "jpeg");

    let ctx = context(dst.path());
    ctx.cancel.cancel();
    let planner = CopyPlanner::new(preset("library"), Arc::new(ctx)).unwrap();
    let result = planner.plan(scan(src.path())).await;
    assert!(matches!(result, Err(media_ingest::Error::Cancelled)));
}
