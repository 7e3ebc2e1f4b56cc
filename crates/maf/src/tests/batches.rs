//! Canned batch tests
//!
//! Verifies:
//! - All-bands and per-filter selections with extra constraints and labels
//! - Metadata batch bundle counts, names, captions and summaries
//! - Stacked values and optional maps and filters
//! - Batches configured in YAML expand and run against a synthetic survey
//! - Stacker conflicts between entries are rejected while building

use maf_core::{ColumnSet, PlotKind, Runner, SlicerSpec};

use crate::batches::{AllMetadataBatch, MetadataBatch, all_metadata, filter_list};
use crate::config::RunConfig;
use crate::sqlite::SqliteSource;
use crate::synth::{SynthConfig, write_survey};

fn survey_columns() -> ColumnSet {
    [
        "fieldID",
        "fieldRA",
        "fieldDec",
        "filter",
        "night",
        "expMJD",
        "airmass",
        "finSeeing",
        "fivesigma_modified",
        "lst",
    ]
    .into_iter()
    .collect()
}

fn default_filters() -> Vec<String> {
    ["u", "g", "r", "i", "z", "y"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Selections cover all bands first, then each filter in display order
#[test]
fn test_filter_list_labels() {
    let plain = filter_list(&default_filters(), None, None);
    assert_eq!(plain.len(), 7);
    assert!(plain[0].constraint.is_empty());
    assert_eq!(plain[0].metadata, "all bands");
    assert_eq!(plain[2].constraint, "filter = 'g'");
    assert_eq!(plain[2].metadata, "g band");
    assert_eq!(plain[6].order, 6);

    let wfd = filter_list(&default_filters(), Some("night < 100"), Some("WFD"));
    assert_eq!(wfd[0].constraint, "night < 100");
    assert_eq!(wfd[0].metadata, "WFD");
    assert_eq!(wfd[3].constraint, "(night < 100) and (filter = 'r')");
    assert_eq!(wfd[3].metadata, "WFD r band");

    let sql_only = filter_list(&default_filters(), Some("night < 100"), None);
    assert_eq!(sql_only[1].metadata, "night < 100 u band");
}

/// Every selection gets the extended statistics, a histogram and three maps
#[test]
fn test_metadata_basics() {
    let bundles = MetadataBatch::new("airmass")
        .build("baseline", &survey_columns())
        .unwrap();
    assert_eq!(bundles.len(), 7 * (9 + 1 + 3));
    assert!(bundles.iter().all(|b| b.run_name() == "baseline"));
    assert_eq!(bundles[0].metric().name(), "Mean airmass");
    assert_eq!(bundles[0].metadata(), "all bands");

    let histogram = bundles
        .iter()
        .find(|b| b.metric().name() == "airmass Histogram" && b.metadata() == "r band")
        .unwrap();
    assert_eq!(histogram.constraint().as_str(), "filter = 'r'");
    assert_eq!(
        histogram.display().caption.as_deref(),
        Some("Histogram of airmass for r band.")
    );
    assert_eq!(histogram.display().order, 3);

    let map = bundles
        .iter()
        .find(|b| {
            b.metric().name() == "Min airmass"
                && b.metadata() == "r band"
                && matches!(b.slicer(), SlicerSpec::Healpix { .. })
        })
        .unwrap();
    assert_eq!(map.summary_metrics().len(), 8);
    assert_eq!(map.plot_kinds(), &[PlotKind::SkyMap, PlotKind::Histogram]);
    assert_eq!(map.display().group.as_deref(), Some("Airmass"));
    assert_eq!(map.display().subgroup.as_deref(), Some("All visits"));
    assert_eq!(
        map.display().caption.as_deref(),
        Some("Map of Min airmass for r band.")
    );
}

/// Stacked values bring their stacker; maps and filters can be skipped
#[test]
fn test_stacked_value_without_maps() {
    let batch = MetadataBatch {
        value_name: Some("normAirmass".to_string()),
        group: Some("airmass".to_string()),
        nside: None,
        filters: None,
        ..MetadataBatch::new("normairmass")
    };
    let bundles = batch.build("opsim", &survey_columns()).unwrap();
    assert_eq!(bundles.len(), 9 + 1);
    assert!(bundles.iter().all(|b| b.stackers().len() == 1));
    assert_eq!(bundles[0].metric().name(), "Mean normAirmass");
    assert_eq!(bundles[0].display().subgroup.as_deref(), Some("Normairmass"));
    assert_eq!(
        bundles[9].display().caption.as_deref(),
        Some("Histogram of normairmass (normAirmass) for all bands.")
    );
}

/// The all-metadata batch repeats the metadata batch for every value
#[test]
fn test_all_metadata() {
    let batch = AllMetadataBatch {
        nside: None,
        filters: None,
        ..AllMetadataBatch::default()
    };
    let bundles = all_metadata(&batch, "opsim", &survey_columns()).unwrap();
    assert_eq!(bundles.len(), 5 * 10);

    let columns: ColumnSet = ["airmass"].into_iter().collect();
    assert!(all_metadata(&batch, "opsim", &columns).is_err());
}

/// A YAML batch expands next to bundle entries and runs cleanly
#[test]
fn test_configured_batch_runs() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("survey.db");
    let survey = SynthConfig {
        nights: 4,
        visits_per_night: 40,
        num_fields: 60,
        seed: 11,
        ..SynthConfig::default()
    };
    write_survey(&db, &survey).unwrap();

    let yaml = r#"
run_name: synth
batches:
  - {type: Metadata, value: airmass, nside: 4, filters: null}
  - {type: Metadata, value: HA, nside: null, filters: null, extra_sql: "night < 2", extra_metadata: early}
"#;
    let config = RunConfig::from_yaml(yaml).unwrap();
    assert!(config.bundles.is_empty());
    let source = SqliteSource::open(&db, &config.table).unwrap();
    let mut bundles = config.build_bundles(&source.columns()).unwrap();
    assert_eq!(bundles.len(), 13 + 10);

    let report = Runner::new(&source).run(&mut bundles);
    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(report.fetches, 2);
    let median_map = bundles
        .iter()
        .find(|b| {
            b.metric().name() == "Median airmass" && matches!(b.slicer(), SlicerSpec::Healpix { .. })
        })
        .unwrap();
    let results = median_map.results().unwrap();
    assert_eq!(results.len(), 192);
    assert!(results.summary("Mean", "Median airmass").is_some());
    assert!(bundles.iter().any(|b| b.metadata() == "early"));
}

/// Differently configured stackers for one column fail the expansion
#[test]
fn test_stacker_conflict_rejected() {
    let yaml = r#"
bundles:
  - metric: {type: Max, column: normairmass}
    slicer: {type: Uni}
    stackers:
      - {type: NormAirmass, degrees: false}
batches:
  - {type: Metadata, value: normairmass, nside: null, filters: null}
"#;
    let config = RunConfig::from_yaml(yaml).unwrap();
    let err = config.build_bundles(&survey_columns()).unwrap_err();
    let message = format!("{err:?}");
    assert!(message.contains("conflicting stackers"));
    assert!(message.contains("normairmass"));
}

/// The metadata demo configuration expands without errors
#[test]
fn test_demo_config_builds() {
    let config = RunConfig::from_yaml(include_str!("../../../../demos/metadata.yaml")).unwrap();
    let bundles = config.build_bundles(&survey_columns()).unwrap();
    assert_eq!(bundles.len(), (5 + 1) * 7 * 13);
    assert!(
        bundles
            .iter()
            .any(|b| b.metric().name() == "Median seeing" && b.metadata() == "first month r band")
    );
}
