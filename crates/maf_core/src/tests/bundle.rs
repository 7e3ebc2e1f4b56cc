//! Tests for bundle construction
//!
//! These tests verify:
//! - Column requirements checked against the declared source columns
//! - Stacker outputs satisfying metric and slicer requirements
//! - Metric/slicer compatibility and summary metric checks
//! - Metadata labels, run names and file roots

use std::sync::Arc;

use crate::bundle::{DisplayInfo, MetricBundle, PlotKind, required_columns};
use crate::error::ConfigurationError;
use crate::metrics::{MedianGapMetric, SimpleMetric, standard_summary};
use crate::slicers::SlicerSpec;
use crate::stackers::{NORM_AIRMASS_COLUMN, NormAirmassStacker};
use crate::table::ColumnSet;

fn source_columns() -> ColumnSet {
    [
        "fieldID", "fieldRA", "fieldDec", "filter", "night", "expMJD", "airmass", "finSeeing",
    ]
    .into_iter()
    .collect()
}

/// A complete bundle records exactly the source columns it needs
#[test]
fn test_fetch_columns() {
    let bundle = MetricBundle::builder(
        SimpleMetric::mean("finSeeing").into_arc(),
        SlicerSpec::healpix(16, "fieldRA", "fieldDec"),
    )
    .constraint("filter = 'r'")
    .build(&source_columns())
    .unwrap();
    let expected: ColumnSet = ["finSeeing", "fieldRA", "fieldDec"].into_iter().collect();
    assert_eq!(bundle.fetch_columns(), &expected);
}

/// Columns nobody provides are reported with the bundle and column names
#[test]
fn test_missing_column_rejected() {
    let err = MetricBundle::builder(
        SimpleMetric::mean("skyBrightness").into_arc(),
        SlicerSpec::Uni,
    )
    .build(&source_columns())
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::MissingColumn { ref column, .. } if column == "skyBrightness"
    ));
}

/// Stacker outputs count as available and their inputs are fetched instead
#[test]
fn test_stacker_provides_column() {
    let bundle = MetricBundle::builder(
        SimpleMetric::max(NORM_AIRMASS_COLUMN).into_arc(),
        SlicerSpec::opsim_field(),
    )
    .stacker(Arc::new(NormAirmassStacker::default()))
    .build(&source_columns())
    .unwrap();
    let fetch = bundle.fetch_columns();
    assert!(!fetch.contains(NORM_AIRMASS_COLUMN));
    assert!(fetch.contains("airmass") && fetch.contains("fieldDec") && fetch.contains("fieldID"));
    assert_eq!(bundle.stackers().len(), 1);
}

/// Time-gap metrics need a time-ordered slicer
#[test]
fn test_incompatible_slicer_rejected() {
    let available = source_columns();
    let err = MetricBundle::builder(
        Arc::new(MedianGapMetric::default()),
        SlicerSpec::opsim_field(),
    )
    .build(&available)
    .unwrap_err();
    assert!(matches!(err, ConfigurationError::IncompatibleSlicer { .. }));

    assert!(
        MetricBundle::builder(Arc::new(MedianGapMetric::default()), SlicerSpec::night())
            .build(&available)
            .is_ok()
    );
}

/// Malformed constraints and slicer parameters fail construction
#[test]
fn test_invalid_parts_rejected() {
    let available = source_columns();
    let err = MetricBundle::builder(SimpleMetric::count("night").into_arc(), SlicerSpec::Uni)
        .constraint("filter = 'r")
        .build(&available)
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidConstraint { .. }));

    let err = MetricBundle::builder(
        SimpleMetric::count("night").into_arc(),
        SlicerSpec::healpix(12, "fieldRA", "fieldDec"),
    )
    .build(&available)
    .unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidParameter { .. }));
}

/// Summary metrics must read the summary data column
#[test]
fn test_summary_metric_column_checked() {
    let err = MetricBundle::builder(SimpleMetric::count("night").into_arc(), SlicerSpec::Uni)
        .summary_metric(SimpleMetric::mean("airmass").into_arc())
        .build(&source_columns())
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidSummaryMetric { .. }));

    assert!(
        MetricBundle::builder(SimpleMetric::count("night").into_arc(), SlicerSpec::Uni)
            .summary_metrics(standard_summary())
            .build(&source_columns())
            .is_ok()
    );
}

/// Metadata comes from the constraint plus any extra label
#[test]
fn test_metadata_and_file_root() {
    let mut bundle = MetricBundle::builder(
        SimpleMetric::median("finSeeing").into_arc(),
        SlicerSpec::healpix(64, "fieldRA", "fieldDec"),
    )
    .constraint("filter = 'r' and night < 730")
    .extra_metadata("dith")
    .build(&source_columns())
    .unwrap();
    assert_eq!(bundle.metadata(), "r and night < 730 dith");
    assert_eq!(bundle.run_name(), "opsim");

    bundle.set_run_name("baseline_v1");
    assert_eq!(bundle.run_name(), "baseline_v1");
    assert_eq!(
        bundle.file_root(),
        "baseline_v1_Median_finSeeing_r_and_night_730_dith_HEALPIX_64"
    );
}

/// Plot kinds default from the slicer and can be replaced
#[test]
fn test_plot_kinds_and_display() {
    let available = source_columns();
    let sky = MetricBundle::builder(
        SimpleMetric::count("night").into_arc(),
        SlicerSpec::healpix(8, "fieldRA", "fieldDec"),
    )
    .build(&available)
    .unwrap();
    assert_eq!(
        sky.plot_kinds(),
        &[
            PlotKind::SkyMap,
            PlotKind::Histogram,
            PlotKind::PowerSpectrum
        ]
    );

    let display = DisplayInfo {
        group: Some("Seeing".into()),
        subgroup: None,
        caption: Some("Median seeing per bin".into()),
        order: 2,
    };
    let binned = MetricBundle::builder(
        SimpleMetric::median("finSeeing").into_arc(),
        SlicerSpec::one_d("airmass", 10, None),
    )
    .plot_kinds(vec![PlotKind::OneDBinned])
    .display(display.clone())
    .build(&available)
    .unwrap();
    assert_eq!(binned.display(), &display);
    assert!(binned.record().is_none());
}

/// The fetch set of a bundle list is the union of their needs
#[test]
fn test_required_columns_union() {
    let available = source_columns();
    let bundles = vec![
        MetricBundle::builder(SimpleMetric::count("night").into_arc(), SlicerSpec::Uni)
            .build(&available)
            .unwrap(),
        MetricBundle::builder(
            SimpleMetric::mean("airmass").into_arc(),
            SlicerSpec::one_d("finSeeing", 5, None),
        )
        .build(&available)
        .unwrap(),
    ];
    let expected: ColumnSet = ["night", "airmass", "finSeeing"].into_iter().collect();
    assert_eq!(required_columns(&bundles), expected);
}
