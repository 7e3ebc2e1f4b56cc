//! Metrics evaluated over one partition of visits.
//!
//! A metric reads the columns it declared at construction and maps a
//! [`DataSlice`] to a [`MetricValue`]. Empty partitions always produce
//! [`MetricValue::Missing`].
//!
//! Metrics that return [`MetricValue::Series`] may declare [`Reducer`]s; the
//! runner expands each reducer into its own named result array.

mod complex;
mod simple;
mod spec;
pub(crate) mod stats;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{ConfigurationError, MetricError};
use crate::summary::METRIC_DATA_COLUMN;
use crate::table::{ColumnSet, DataSlice};

pub use complex::{MedianGapMetric, OpenShutterFractionMetric, VisitPairsMetric};
pub use simple::{ColumnStat, SimpleMetric};
pub use spec::{ColumnMetricSpec, MetricSpec};

/// Result of evaluating a metric on one partition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// No data in the partition, or the statistic is undefined for it
    Missing,
    Scalar(f64),
    /// Structured value to be split by reduce functions
    Series(Vec<f64>),
}

impl MetricValue {
    /// Scalar value, mapping NaN to `Missing`
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            MetricValue::Missing
        } else {
            MetricValue::Scalar(value)
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, MetricValue::Missing)
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(MetricValue::Missing, MetricValue::from_f64)
    }
}

/// Named function mapping a structured metric value to a scalar
#[derive(Debug, Clone, Copy)]
pub struct Reducer {
    pub name: &'static str,
    pub func: fn(&[f64]) -> Result<f64, MetricError>,
}

impl Reducer {
    pub fn apply(&self, value: &[f64]) -> Result<f64, MetricError> {
        (self.func)(value)
    }
}

/// A statistic computed from the rows of one partition
pub trait Metric: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Columns read by `run`
    fn columns(&self) -> ColumnSet;

    /// Evaluate the metric. Must return `Missing` rather than fail on an empty slice.
    fn run(&self, slice: &DataSlice<'_>) -> Result<MetricValue, MetricError>;

    /// Reduce functions applied to `Series` values
    fn reducers(&self) -> &[Reducer] {
        &[]
    }

    /// Whether partitions must arrive ordered in time
    fn requires_time_order(&self) -> bool {
        false
    }

    fn units(&self) -> &str {
        ""
    }

    /// Check construction parameters
    fn validate(&self) -> Result<(), ConfigurationError> {
        Ok(())
    }
}

/// Summary metrics applied to most sky maps: mean, rms, median, max, min,
/// 3-sigma outlier count, robust rms and count.
#[must_use]
pub fn standard_summary() -> Vec<Arc<dyn Metric>> {
    [
        ColumnStat::Mean,
        ColumnStat::Rms,
        ColumnStat::Median,
        ColumnStat::Max,
        ColumnStat::Min,
        ColumnStat::NOutliers(3.0),
        ColumnStat::RobustRms,
        ColumnStat::Count,
    ]
    .into_iter()
    .map(|stat| SimpleMetric::new(stat, METRIC_DATA_COLUMN).into_arc())
    .collect()
}

/// Statistics describing one visit column over a whole-survey slicer.
///
/// Metric names read `"<Stat> <value_name>"`, so a column can be reported
/// under a stable name whatever the source calls it.
#[must_use]
pub fn extended_metrics(column: &str, value_name: &str) -> Vec<Arc<dyn Metric>> {
    [
        ColumnStat::Mean,
        ColumnStat::Median,
        ColumnStat::Min,
        ColumnStat::Max,
        ColumnStat::Rms,
        ColumnStat::NOutliers(3.0),
        ColumnStat::Percentile(25.0),
        ColumnStat::Percentile(75.0),
        ColumnStat::Count,
    ]
    .into_iter()
    .map(|stat| {
        SimpleMetric::new(stat, column)
            .with_name(format!("{} {value_name}", stat.label()))
            .into_arc()
    })
    .collect()
}
