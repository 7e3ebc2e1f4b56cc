//! Single-column statistics.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::stats;
use super::{Metric, MetricValue};
use crate::error::{ConfigurationError, MetricError};
use crate::summary::METRIC_DATA_COLUMN;
use crate::table::{ColumnSet, DataSlice};

/// Statistic computed over one column of a partition.
///
/// NaN cells are ignored by every statistic except `Count` and `CountUnique`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColumnStat {
    /// Number of rows
    Count,
    /// Number of distinct values (any column kind)
    CountUnique,
    Sum,
    Mean,
    Median,
    Min,
    Max,
    /// Population standard deviation
    Rms,
    /// Max - min
    Range,
    /// Percentile in `[0, 100]`
    Percentile(f64),
    /// Interquartile range / 1.349
    RobustRms,
    /// Coadded 5-sigma limiting magnitude
    Coaddm5,
    /// Fraction of values `>=` threshold
    FractionAbove(f64),
    /// Fraction of values `<=` threshold
    FractionBelow(f64),
    /// Number of values more than n standard deviations from the mean
    NOutliers(f64),
}

impl ColumnStat {
    /// Short label used to build metric names
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Count => "Count".to_string(),
            Self::CountUnique => "CountUnique".to_string(),
            Self::Sum => "Sum".to_string(),
            Self::Mean => "Mean".to_string(),
            Self::Median => "Median".to_string(),
            Self::Min => "Min".to_string(),
            Self::Max => "Max".to_string(),
            Self::Rms => "Rms".to_string(),
            Self::Range => "Range".to_string(),
            Self::Percentile(p) => format!("{p}th%ile"),
            Self::RobustRms => "RobustRms".to_string(),
            Self::Coaddm5 => "CoaddM5".to_string(),
            Self::FractionAbove(t) => format!("Frac>={t}"),
            Self::FractionBelow(t) => format!("Frac<={t}"),
            Self::NOutliers(n) => format!("N(+/-){n}sigma"),
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidParameter {
            component: "metric",
            reason,
        };
        match self {
            Self::Percentile(p) if !(0.0..=100.0).contains(p) => {
                Err(invalid(format!("percentile {p} outside [0, 100]")))
            }
            Self::NOutliers(n) if !(n.is_finite() && *n > 0.0) => {
                Err(invalid(format!("outlier threshold {n} must be positive")))
            }
            Self::FractionAbove(t) | Self::FractionBelow(t) if !t.is_finite() => {
                Err(invalid(format!("fraction threshold {t} must be finite")))
            }
            _ => Ok(()),
        }
    }

    /// Apply the statistic to already-finite values
    fn compute(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        match self {
            Self::Count => Some(n),
            Self::CountUnique => {
                let unique: FxHashSet<u64> = values.iter().map(|v| v.to_bits()).collect();
                Some(unique.len() as f64)
            }
            Self::Sum => Some(values.iter().sum()),
            Self::Mean => stats::mean(values),
            Self::Median => stats::median(values),
            Self::Min => values.iter().copied().reduce(f64::min),
            Self::Max => values.iter().copied().reduce(f64::max),
            Self::Rms => stats::std_dev(values),
            Self::Range => {
                let min = values.iter().copied().reduce(f64::min)?;
                let max = values.iter().copied().reduce(f64::max)?;
                Some(max - min)
            }
            Self::Percentile(p) => stats::percentile(values, *p),
            Self::RobustRms => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let iqr =
                    stats::percentile_sorted(&sorted, 75.0) - stats::percentile_sorted(&sorted, 25.0);
                Some(iqr / 1.349)
            }
            Self::Coaddm5 => {
                let flux: f64 = values.iter().map(|m| 10f64.powf(0.8 * m)).sum();
                Some(1.25 * flux.log10())
            }
            Self::FractionAbove(t) => Some(values.iter().filter(|&&v| v >= *t).count() as f64 / n),
            Self::FractionBelow(t) => Some(values.iter().filter(|&&v| v <= *t).count() as f64 / n),
            Self::NOutliers(nsigma) => {
                let mu = stats::mean(values)?;
                let sigma = stats::std_dev(values)?;
                let count = values
                    .iter()
                    .filter(|&&v| (v - mu).abs() > nsigma * sigma)
                    .count();
                Some(count as f64)
            }
        }
    }
}

/// A [`ColumnStat`] bound to one column
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleMetric {
    column: String,
    stat: ColumnStat,
    name: String,
    units: String,
}

impl SimpleMetric {
    /// Metric named `"<Stat> <column>"`, or just `"<Stat>"` on the summary data column
    pub fn new(stat: ColumnStat, column: impl Into<String>) -> Self {
        let column = column.into();
        let name = if column == METRIC_DATA_COLUMN {
            stat.label()
        } else {
            format!("{} {}", stat.label(), column)
        };
        Self {
            column,
            stat,
            name,
            units: String::new(),
        }
    }

    pub fn count(column: impl Into<String>) -> Self {
        Self::new(ColumnStat::Count, column)
    }

    pub fn sum(column: impl Into<String>) -> Self {
        Self::new(ColumnStat::Sum, column)
    }

    pub fn mean(column: impl Into<String>) -> Self {
        Self::new(ColumnStat::Mean, column)
    }

    pub fn median(column: impl Into<String>) -> Self {
        Self::new(ColumnStat::Median, column)
    }

    pub fn min(column: impl Into<String>) -> Self {
        Self::new(ColumnStat::Min, column)
    }

    pub fn max(column: impl Into<String>) -> Self {
        Self::new(ColumnStat::Max, column)
    }

    pub fn rms(column: impl Into<String>) -> Self {
        Self::new(ColumnStat::Rms, column)
    }

    pub fn percentile(column: impl Into<String>, percentile: f64) -> Self {
        Self::new(ColumnStat::Percentile(percentile), column)
    }

    pub fn coaddm5(column: impl Into<String>) -> Self {
        let mut metric = Self::new(ColumnStat::Coaddm5, column);
        metric.units = "mag".to_string();
        metric
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    #[must_use]
    pub fn stat(&self) -> ColumnStat {
        self.stat
    }

    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    #[must_use]
    pub fn into_arc(self) -> Arc<dyn Metric> {
        Arc::new(self)
    }
}

impl Metric for SimpleMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> ColumnSet {
        [self.column.as_str()].into_iter().collect()
    }

    fn run(&self, slice: &DataSlice<'_>) -> Result<MetricValue, MetricError> {
        match self.stat {
            // Counting works on any column kind, NaN cells included
            ColumnStat::Count => {
                slice.column(&self.column)?;
                if slice.is_empty() {
                    return Ok(MetricValue::Missing);
                }
                Ok(MetricValue::Scalar(slice.len() as f64))
            }
            ColumnStat::CountUnique => {
                let cells = slice.cells(&self.column)?;
                if cells.is_empty() {
                    return Ok(MetricValue::Missing);
                }
                let unique: FxHashSet<_> = cells.into_iter().collect();
                Ok(MetricValue::Scalar(unique.len() as f64))
            }
            stat => {
                let values = stats::finite(&slice.values(&self.column)?);
                Ok(stat.compute(&values).into())
            }
        }
    }

    fn units(&self) -> &str {
        &self.units
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        self.stat.validate()
    }
}
