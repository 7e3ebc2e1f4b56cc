//! Metrics analysis engine for survey simulation output
//!
//! This crate slices a table of simulated visits into partitions and evaluates
//! metrics over every partition. It supports:
//! - Columnar visit tables with numeric, text and time columns
//! - Stackers that derive new columns (normalized airmass, hour angle, dithers)
//! - Slicers: whole survey, 1-D histogram bins, HEALPix sky grid, per-field
//!   grouping and per-night time ordering
//! - Reduce functions that split structured metric values into scalars
//! - Summary metrics evaluated over a bundle's full result array
//!
//! # Example
//!
//! ```ignore
//! use maf_core::{InMemorySource, MetricBundle, Runner, SlicerSpec, SimpleMetric};
//!
//! let bundle = MetricBundle::builder(
//!         SimpleMetric::count("expMJD").into_arc(),
//!         SlicerSpec::healpix(64, "fieldRA", "fieldDec"),
//!     )
//!     .constraint("filter = 'r'")
//!     .summary_metrics(maf_core::standard_summary())
//!     .build(&available_columns)?;
//!
//! let mut bundles = vec![bundle];
//! let report = Runner::new(&source).run(&mut bundles);
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod bundle;
pub mod error;
pub mod results;
pub mod runner;
pub mod source;
pub mod summary;
pub mod table;

// ============================================================================
// Component modules
// ============================================================================

pub mod metrics;
pub mod slicers;
pub mod stackers;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use bundle::{
    BundleBuilder, Constraint, DisplayInfo, MetricBundle, PlotKind, StackerConflict,
    required_columns, validate_set,
};
pub use error::{
    ConfigurationError, DataFetchError, MafError, MetricError, SlicerError, TableError,
};
pub use metrics::{
    ColumnStat, MedianGapMetric, Metric, MetricSpec, MetricValue, OpenShutterFractionMetric,
    Reducer, SimpleMetric, VisitPairsMetric, extended_metrics, standard_summary,
};
pub use results::{BundleResults, ReducedResult, ResultRecord};
pub use runner::{RunFailure, RunReport, Runner};
pub use slicers::{BinSpec, Partition, PartitionGeometry, PartitionIndex, Slicer, SlicerSpec};
pub use source::{InMemorySource, RowSource};
pub use stackers::{
    ExistingColumns, HourAngleStacker, NormAirmassStacker, RandomDitherStacker, Stacker,
    StackerSpec,
};
pub use summary::{METRIC_DATA_COLUMN, SummaryOutcome, SummaryStat};
pub use table::{ColumnData, ColumnKind, ColumnSet, DataSlice, Table, Value};
