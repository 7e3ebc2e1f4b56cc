//! Serializable metric descriptions used by configuration files.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    ColumnStat, MedianGapMetric, Metric, OpenShutterFractionMetric, SimpleMetric,
    VisitPairsMetric,
};
use crate::error::ConfigurationError;
use crate::summary::METRIC_DATA_COLUMN;

fn default_metric_column() -> String {
    METRIC_DATA_COLUMN.to_string()
}

fn default_time_col() -> String {
    "expMJD".to_string()
}

fn default_night_col() -> String {
    "night".to_string()
}

fn default_pair_min() -> f64 {
    15.0
}

fn default_pair_max() -> f64 {
    90.0
}

fn default_exp_time_col() -> String {
    "visitExpTime".to_string()
}

fn default_slew_time_col() -> String {
    "slewTime".to_string()
}

/// Column and optional display name shared by the single-column metrics.
///
/// The column defaults to the summary data column so summary metrics can be
/// written as just `{type: Mean}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetricSpec {
    #[serde(default = "default_metric_column")]
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl ColumnMetricSpec {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            name: None,
            units: None,
        }
    }
}

/// Description of a metric, buildable into a [`Metric`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MetricSpec {
    Count(ColumnMetricSpec),
    CountUnique(ColumnMetricSpec),
    Sum(ColumnMetricSpec),
    Mean(ColumnMetricSpec),
    Median(ColumnMetricSpec),
    Min(ColumnMetricSpec),
    Max(ColumnMetricSpec),
    Rms(ColumnMetricSpec),
    Range(ColumnMetricSpec),
    RobustRms(ColumnMetricSpec),
    Coaddm5(ColumnMetricSpec),
    Percentile {
        #[serde(flatten)]
        target: ColumnMetricSpec,
        percentile: f64,
    },
    FractionAbove {
        #[serde(flatten)]
        target: ColumnMetricSpec,
        threshold: f64,
    },
    FractionBelow {
        #[serde(flatten)]
        target: ColumnMetricSpec,
        threshold: f64,
    },
    NOutliers {
        #[serde(flatten)]
        target: ColumnMetricSpec,
        nsigma: f64,
    },
    VisitPairs {
        #[serde(default = "default_time_col")]
        time_col: String,
        #[serde(default = "default_night_col")]
        night_col: String,
        #[serde(default = "default_pair_min")]
        dt_min_minutes: f64,
        #[serde(default = "default_pair_max")]
        dt_max_minutes: f64,
        #[serde(default)]
        name: Option<String>,
    },
    OpenShutterFraction {
        #[serde(default = "default_exp_time_col")]
        exp_time_col: String,
        #[serde(default = "default_slew_time_col")]
        slew_time_col: String,
        #[serde(default)]
        overhead_seconds: f64,
        #[serde(default)]
        name: Option<String>,
    },
    MedianGap {
        #[serde(default = "default_time_col")]
        time_col: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl MetricSpec {
    /// Build and validate the metric
    pub fn build(&self) -> Result<Arc<dyn Metric>, ConfigurationError> {
        let metric: Arc<dyn Metric> = match self {
            MetricSpec::Count(t) => column_metric(ColumnStat::Count, t),
            MetricSpec::CountUnique(t) => column_metric(ColumnStat::CountUnique, t),
            MetricSpec::Sum(t) => column_metric(ColumnStat::Sum, t),
            MetricSpec::Mean(t) => column_metric(ColumnStat::Mean, t),
            MetricSpec::Median(t) => column_metric(ColumnStat::Median, t),
            MetricSpec::Min(t) => column_metric(ColumnStat::Min, t),
            MetricSpec::Max(t) => column_metric(ColumnStat::Max, t),
            MetricSpec::Rms(t) => column_metric(ColumnStat::Rms, t),
            MetricSpec::Range(t) => column_metric(ColumnStat::Range, t),
            MetricSpec::RobustRms(t) => column_metric(ColumnStat::RobustRms, t),
            MetricSpec::Coaddm5(t) => {
                let mut metric = SimpleMetric::coaddm5(&t.column);
                if let Some(name) = &t.name {
                    metric = metric.with_name(name);
                }
                if let Some(units) = &t.units {
                    metric = metric.with_units(units);
                }
                Arc::new(metric)
            }
            MetricSpec::Percentile { target, percentile } => {
                column_metric(ColumnStat::Percentile(*percentile), target)
            }
            MetricSpec::FractionAbove { target, threshold } => {
                column_metric(ColumnStat::FractionAbove(*threshold), target)
            }
            MetricSpec::FractionBelow { target, threshold } => {
                column_metric(ColumnStat::FractionBelow(*threshold), target)
            }
            MetricSpec::NOutliers { target, nsigma } => {
                column_metric(ColumnStat::NOutliers(*nsigma), target)
            }
            MetricSpec::VisitPairs {
                time_col,
                night_col,
                dt_min_minutes,
                dt_max_minutes,
                name,
            } => {
                let mut metric =
                    VisitPairsMetric::new(time_col, night_col, *dt_min_minutes, *dt_max_minutes);
                if let Some(name) = name {
                    metric = metric.with_name(name);
                }
                Arc::new(metric)
            }
            MetricSpec::OpenShutterFraction {
                exp_time_col,
                slew_time_col,
                overhead_seconds,
                name,
            } => {
                let mut metric =
                    OpenShutterFractionMetric::new(exp_time_col, slew_time_col, *overhead_seconds);
                if let Some(name) = name {
                    metric = metric.with_name(name);
                }
                Arc::new(metric)
            }
            MetricSpec::MedianGap { time_col, name } => {
                let mut metric = MedianGapMetric::new(time_col);
                if let Some(name) = name {
                    metric = metric.with_name(name);
                }
                Arc::new(metric)
            }
        };
        metric.validate()?;
        Ok(metric)
    }
}

fn column_metric(stat: ColumnStat, target: &ColumnMetricSpec) -> Arc<dyn Metric> {
    let mut metric = SimpleMetric::new(stat, &target.column);
    if let Some(name) = &target.name {
        metric = metric.with_name(name);
    }
    if let Some(units) = &target.units {
        metric = metric.with_units(units);
    }
    Arc::new(metric)
}
