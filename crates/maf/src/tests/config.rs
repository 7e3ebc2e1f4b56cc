//! Run configuration tests
//!
//! Verifies:
//! - YAML entries parse with descriptor defaults
//! - One bundle per constraint, and a single all-visits bundle without constraints
//! - Standard summary set and extra summary metrics
//! - Validation errors surface with the failing entry

use maf_core::{ColumnSet, PlotKind, SlicerSpec};

use crate::config::RunConfig;

const CONFIG: &str = r#"
run_name: baseline
table: Summary
source_columns: [fieldRA, fieldDec, filter, night, expMJD, finSeeing, airmass]
bundles:
  - metric: {type: Median, column: finSeeing}
    slicer: {type: Healpix, nside: 8}
    constraints:
      - "filter = 'r'"
      - "filter = 'i'"
    standard_summary: true
    display: {group: Seeing, order: 2}
  - metric: {type: Count, column: airmass}
    slicer: {type: OneD, column: airmass, bins: {count: 10}}
    summary_metrics:
      - {type: Max}
  - metric: {type: VisitPairs}
    slicer: {type: GroupBy, columns: [fieldID]}
    plot_kinds: [Histogram]
"#;

fn columns(names: &[&str]) -> ColumnSet {
    names.iter().copied().collect()
}

/// Descriptors pick up their defaults when fields are omitted
#[test]
fn test_parse_with_defaults() {
    let config = RunConfig::from_yaml(CONFIG).unwrap();
    assert_eq!(config.run_name, "baseline");
    assert_eq!(config.bundles.len(), 3);
    assert!(config.database.is_none());
    assert!(config.time_columns.is_empty());

    match &config.bundles[0].slicer {
        SlicerSpec::Healpix {
            nside,
            lon_col,
            radius_deg,
            ..
        } => {
            assert_eq!(*nside, 8);
            assert_eq!(lon_col, "fieldRA");
            assert_eq!(*radius_deg, 1.75);
        }
        other => panic!("expected HEALPix slicer, got {other:?}"),
    }
    assert_eq!(config.bundles[2].plot_kinds, Some(vec![PlotKind::Histogram]));
    assert_eq!(config.bundles[0].display.group.as_deref(), Some("Seeing"));
}

/// Each constraint of an entry becomes its own bundle
#[test]
fn test_expands_per_constraint() {
    let mut config = RunConfig::from_yaml(CONFIG).unwrap();
    config.bundles.truncate(2);
    let available = config.declared_columns().unwrap();

    let bundles = config.build_bundles(&available).unwrap();
    assert_eq!(bundles.len(), 3);
    assert_eq!(bundles[0].constraint().as_str(), "filter = 'r'");
    assert_eq!(bundles[1].constraint().as_str(), "filter = 'i'");
    assert!(bundles[2].constraint().is_empty());
    assert!(bundles.iter().all(|b| b.run_name() == "baseline"));
    assert_eq!(bundles[0].metadata(), "r");
    assert_eq!(bundles[2].metadata(), "all visits");
}

/// The standard summary set is prepended and extra summaries appended
#[test]
fn test_summary_metrics() {
    let mut config = RunConfig::from_yaml(CONFIG).unwrap();
    config.bundles.truncate(2);
    let available = config.declared_columns().unwrap();
    let bundles = config.build_bundles(&available).unwrap();

    assert_eq!(bundles[0].summary_metrics().len(), 8);
    let names: Vec<&str> = bundles[2]
        .summary_metrics()
        .iter()
        .map(|m| m.name())
        .collect();
    assert_eq!(names, vec!["Max"]);
}

/// A bundle needing an unavailable column fails expansion
#[test]
fn test_missing_column_fails() {
    let config = RunConfig::from_yaml(CONFIG).unwrap();
    let available = config.declared_columns().unwrap();

    // VisitPairs groups on fieldID, which the declared columns lack
    let err = config.build_bundles(&available).unwrap_err();
    let chain = format!("{err:?}");
    assert!(chain.contains("bundle entry 2"));
    assert!(chain.contains("fieldID"));
}

/// Invalid descriptor parameters are rejected while building
#[test]
fn test_invalid_parameters_rejected() {
    let yaml = r#"
bundles:
  - metric: {type: Percentile, column: finSeeing, percentile: 150}
    slicer: {type: Uni}
"#;
    let config = RunConfig::from_yaml(yaml).unwrap();
    assert_eq!(config.run_name, "opsim");
    assert_eq!(config.table, "Summary");
    assert!(config.build_bundles(&columns(&["finSeeing"])).is_err());

    let yaml = r#"
bundles:
  - metric: {type: Count, column: expMJD}
    slicer: {type: Healpix, nside: 3}
"#;
    let config = RunConfig::from_yaml(yaml).unwrap();
    let available = columns(&["expMJD", "fieldRA", "fieldDec"]);
    assert!(config.build_bundles(&available).is_err());
}

/// Stackers make their output columns available to the metric
#[test]
fn test_stacker_columns() {
    let yaml = r#"
bundles:
  - metric: {type: Mean, column: normairmass}
    slicer: {type: Uni}
    stackers:
      - {type: NormAirmass}
"#;
    let config = RunConfig::from_yaml(yaml).unwrap();
    let bundles = config
        .build_bundles(&columns(&["airmass", "fieldDec"]))
        .unwrap();
    assert_eq!(bundles[0].stackers().len(), 1);
    assert_eq!(bundles[0].fetch_columns(), &columns(&["airmass", "fieldDec"]));
}
