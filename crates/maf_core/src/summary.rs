//! Summary statistics over a bundle's result array.
//!
//! A summary metric is an ordinary [`Metric`] evaluated on a one-column table
//! named [`METRIC_DATA_COLUMN`] holding the non-missing values of the result
//! array. Summaries are best-effort: every evaluation yields a
//! [`SummaryOutcome`] instead of an error.

use serde::Serialize;

use crate::metrics::{Metric, MetricValue};
use crate::table::{ColumnData, DataSlice, Table};

/// Name of the column summary metrics read
pub const METRIC_DATA_COLUMN: &str = "metricdata";

/// Result of one summary evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryOutcome {
    Value(f64),
    Unavailable(String),
}

impl SummaryOutcome {
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        match self {
            SummaryOutcome::Value(v) => Some(*v),
            SummaryOutcome::Unavailable(_) => None,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, SummaryOutcome::Value(_))
    }
}

/// One summary statistic attached to a bundle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStat {
    /// Summary metric name, e.g. "Mean"
    pub metric: String,
    /// Result array the summary was computed over (the bundle metric or a reduced sub-metric)
    pub target: String,
    pub outcome: SummaryOutcome,
}

/// Evaluate `metric` over the non-missing `values`
pub fn compute_summary(
    metric: &dyn Metric,
    values: impl IntoIterator<Item = Option<f64>>,
) -> SummaryOutcome {
    let data: Vec<f64> = values.into_iter().flatten().collect();
    let rows: Vec<usize> = (0..data.len()).collect();
    let table = match Table::from_columns([(METRIC_DATA_COLUMN, ColumnData::Float(data))]) {
        Ok(table) => table,
        Err(err) => return SummaryOutcome::Unavailable(err.to_string()),
    };

    match metric.run(&DataSlice::new(&table, &rows)) {
        Ok(MetricValue::Scalar(v)) => SummaryOutcome::Value(v),
        Ok(MetricValue::Missing) => SummaryOutcome::Unavailable("no data".to_string()),
        Ok(MetricValue::Series(_)) => {
            SummaryOutcome::Unavailable("summary metric returned a structured value".to_string())
        }
        Err(err) => SummaryOutcome::Unavailable(err.to_string()),
    }
}
