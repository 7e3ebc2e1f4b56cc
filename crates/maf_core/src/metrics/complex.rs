//! Metrics that look at more than one column or at the time ordering of visits.

use std::collections::BTreeMap;

use super::stats;
use super::{Metric, MetricValue, Reducer};
use crate::error::{ConfigurationError, MetricError};
use crate::table::{ColumnSet, DataSlice};

const MINUTES_PER_DAY: f64 = 24.0 * 60.0;

/// Counts, per night, the pairs of visits separated by `[dt_min, dt_max]` days.
///
/// Returns a series with one entry per night that has visits. Reduce
/// functions collapse it to the median, mean and rms number of pairs per
/// night and to the number of nights with at least one pair.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitPairsMetric {
    time_col: String,
    night_col: String,
    dt_min: f64,
    dt_max: f64,
    name: String,
}

impl Default for VisitPairsMetric {
    fn default() -> Self {
        Self::new("expMJD", "night", 15.0, 90.0)
    }
}

impl VisitPairsMetric {
    /// Window bounds are given in minutes
    pub fn new(
        time_col: impl Into<String>,
        night_col: impl Into<String>,
        dt_min_minutes: f64,
        dt_max_minutes: f64,
    ) -> Self {
        Self {
            time_col: time_col.into(),
            night_col: night_col.into(),
            dt_min: dt_min_minutes / MINUTES_PER_DAY,
            dt_max: dt_max_minutes / MINUTES_PER_DAY,
            name: "VisitPairs".to_string(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn pairs_in_night(&self, times: &mut [f64]) -> usize {
        times.sort_by(f64::total_cmp);
        times
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let later = &times[i + 1..];
                let lo = later.partition_point(|&x| x - t < self.dt_min);
                let hi = later.partition_point(|&x| x - t <= self.dt_max);
                hi.saturating_sub(lo)
            })
            .sum()
    }
}

fn reduce_median(series: &[f64]) -> Result<f64, MetricError> {
    stats::median(series).ok_or(MetricError::Undefined("median of an empty series"))
}

fn reduce_mean(series: &[f64]) -> Result<f64, MetricError> {
    stats::mean(series).ok_or(MetricError::Undefined("mean of an empty series"))
}

fn reduce_rms(series: &[f64]) -> Result<f64, MetricError> {
    stats::std_dev(series).ok_or(MetricError::Undefined("rms of an empty series"))
}

fn reduce_nights_with_pairs(series: &[f64]) -> Result<f64, MetricError> {
    Ok(series.iter().filter(|&&pairs| pairs > 0.0).count() as f64)
}

const VISIT_PAIR_REDUCERS: [Reducer; 4] = [
    Reducer {
        name: "Median",
        func: reduce_median,
    },
    Reducer {
        name: "Mean",
        func: reduce_mean,
    },
    Reducer {
        name: "Rms",
        func: reduce_rms,
    },
    Reducer {
        name: "NightsWithPairs",
        func: reduce_nights_with_pairs,
    },
];

impl Metric for VisitPairsMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> ColumnSet {
        [self.time_col.as_str(), self.night_col.as_str()]
            .into_iter()
            .collect()
    }

    fn run(&self, slice: &DataSlice<'_>) -> Result<MetricValue, MetricError> {
        let times = slice.values(&self.time_col)?;
        let nights = slice.values(&self.night_col)?;

        let mut by_night: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        for (&night, &time) in nights.iter().zip(&times) {
            if night.is_nan() || time.is_nan() {
                continue;
            }
            by_night.entry(night as i64).or_default().push(time);
        }
        if by_night.is_empty() {
            return Ok(MetricValue::Missing);
        }

        let series = by_night
            .values_mut()
            .map(|times| self.pairs_in_night(times) as f64)
            .collect();
        Ok(MetricValue::Series(series))
    }

    fn reducers(&self) -> &[Reducer] {
        &VISIT_PAIR_REDUCERS
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.dt_min.is_nan()
            || self.dt_min < 0.0
            || self.dt_max.is_nan()
            || self.dt_max <= self.dt_min
        {
            return Err(ConfigurationError::InvalidParameter {
                component: "metric",
                reason: format!(
                    "visit pair window [{}, {}] minutes is empty",
                    self.dt_min * MINUTES_PER_DAY,
                    self.dt_max * MINUTES_PER_DAY
                ),
            });
        }
        Ok(())
    }
}

/// Fraction of wall-clock time spent with the shutter open:
/// `sum(exposure) / sum(exposure + slew + overhead)`.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenShutterFractionMetric {
    exp_time_col: String,
    slew_time_col: String,
    overhead_seconds: f64,
    name: String,
}

impl Default for OpenShutterFractionMetric {
    fn default() -> Self {
        Self::new("visitExpTime", "slewTime", 0.0)
    }
}

impl OpenShutterFractionMetric {
    pub fn new(
        exp_time_col: impl Into<String>,
        slew_time_col: impl Into<String>,
        overhead_seconds: f64,
    ) -> Self {
        Self {
            exp_time_col: exp_time_col.into(),
            slew_time_col: slew_time_col.into(),
            overhead_seconds,
            name: "OpenShutterFraction".to_string(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Metric for OpenShutterFractionMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> ColumnSet {
        [self.exp_time_col.as_str(), self.slew_time_col.as_str()]
            .into_iter()
            .collect()
    }

    fn run(&self, slice: &DataSlice<'_>) -> Result<MetricValue, MetricError> {
        let exposure: f64 = stats::finite(&slice.values(&self.exp_time_col)?).iter().sum();
        let slew: f64 = stats::finite(&slice.values(&self.slew_time_col)?).iter().sum();
        let total = exposure + slew + self.overhead_seconds * slice.len() as f64;
        if slice.is_empty() || total <= 0.0 {
            return Ok(MetricValue::Missing);
        }
        Ok(MetricValue::from_f64(exposure / total))
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.overhead_seconds.is_nan() || self.overhead_seconds < 0.0 {
            return Err(ConfigurationError::InvalidParameter {
                component: "metric",
                reason: format!("overhead {} s must be non-negative", self.overhead_seconds),
            });
        }
        Ok(())
    }
}

/// Median interval, in minutes, between consecutive visits of a partition.
///
/// Needs time-ordered partitions; partitions with fewer than two visits are
/// missing.
#[derive(Debug, Clone, PartialEq)]
pub struct MedianGapMetric {
    time_col: String,
    name: String,
}

impl Default for MedianGapMetric {
    fn default() -> Self {
        Self::new("expMJD")
    }
}

impl MedianGapMetric {
    pub fn new(time_col: impl Into<String>) -> Self {
        Self {
            time_col: time_col.into(),
            name: "MedianGap".to_string(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Metric for MedianGapMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> ColumnSet {
        [self.time_col.as_str()].into_iter().collect()
    }

    fn run(&self, slice: &DataSlice<'_>) -> Result<MetricValue, MetricError> {
        let times = stats::finite(&slice.values(&self.time_col)?);
        let gaps: Vec<f64> = times
            .windows(2)
            .map(|w| (w[1] - w[0]) * MINUTES_PER_DAY)
            .collect();
        Ok(stats::median(&gaps).into())
    }

    fn requires_time_order(&self) -> bool {
        true
    }

    fn units(&self) -> &str {
        "minutes"
    }
}
