//! Result arrays attached to a bundle after a run.

use serde::Serialize;

use crate::bundle::{DisplayInfo, PlotKind};
use crate::metrics::MetricValue;
use crate::slicers::{PartitionGeometry, SlicerSpec};
use crate::summary::{SummaryOutcome, SummaryStat};

/// One reduce function's output, aligned with the partitions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReducedResult {
    /// `"<metric> <reducer>"`
    pub name: String,
    pub values: Vec<Option<f64>>,
    /// Partitions where the reduce function failed and a missing value was recorded
    pub failures: usize,
}

/// Everything a run produced for one bundle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleResults {
    /// Per-partition metric values, in slicer partition order
    pub values: Vec<MetricValue>,
    pub geometry: Vec<PartitionGeometry>,
    pub reduced: Vec<ReducedResult>,
    pub summaries: Vec<SummaryStat>,
}

impl BundleResults {
    /// Scalar view of the metric values; structured and missing values are `None`
    #[must_use]
    pub fn scalars(&self) -> Vec<Option<f64>> {
        self.values.iter().map(MetricValue::as_scalar).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of partitions whose metric value is missing
    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }

    #[must_use]
    pub fn reduced(&self, name: &str) -> Option<&ReducedResult> {
        self.reduced.iter().find(|r| r.name == name)
    }

    /// Outcome of summary `metric` computed over result array `target`
    #[must_use]
    pub fn summary(&self, metric: &str, target: &str) -> Option<&SummaryOutcome> {
        self.summaries
            .iter()
            .find(|s| s.metric == metric && s.target == target)
            .map(|s| &s.outcome)
    }
}

/// Read-only view of a finished bundle, shaped for persistence
#[derive(Debug, Serialize)]
pub struct ResultRecord<'a> {
    pub run_name: &'a str,
    pub metric: &'a str,
    pub units: &'a str,
    pub slicer: &'a SlicerSpec,
    pub constraint: &'a str,
    pub metadata: &'a str,
    pub file_root: String,
    pub display: &'a DisplayInfo,
    pub plot_kinds: &'a [PlotKind],
    #[serde(flatten)]
    pub results: &'a BundleResults,
}
