//! Canned bundle sets.
//!
//! A metadata batch describes one visit column (airmass, seeing, hour angle
//! and so on) over all bands and each filter: summary statistics on the whole
//! survey, a histogram and min/median/max sky maps.

use std::sync::Arc;

use maf_core::stackers::{HOUR_ANGLE_COLUMN, NORM_AIRMASS_COLUMN};
use maf_core::{
    BinSpec, ColumnSet, ConfigurationError, DisplayInfo, HourAngleStacker, Metric, MetricBundle,
    NormAirmassStacker, PlotKind, SimpleMetric, SlicerSpec, Stacker, extended_metrics,
    standard_summary,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Filters of the standard per-band evaluation, in display order
pub const DEFAULT_FILTERS: [&str; 6] = ["u", "g", "r", "i", "z", "y"];

/// Columns described by [`all_metadata`] unless configured otherwise
pub const DEFAULT_METADATA_VALUES: [&str; 5] = [
    "airmass",
    NORM_AIRMASS_COLUMN,
    "finSeeing",
    "fivesigma_modified",
    HOUR_ANGLE_COLUMN,
];

fn default_nside() -> Option<u32> {
    Some(64)
}

fn default_filters() -> Option<Vec<String>> {
    Some(DEFAULT_FILTERS.iter().map(|f| f.to_string()).collect())
}

fn default_metadata_values() -> Vec<String> {
    DEFAULT_METADATA_VALUES.iter().map(|v| v.to_string()).collect()
}

/// One row selection of a per-filter evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSelection {
    /// `None` for all bands
    pub filter: Option<String>,
    pub constraint: String,
    pub metadata: String,
    pub order: i32,
}

/// All-bands selection followed by one selection per filter.
///
/// `extra_sql` is combined with every filter constraint, and `extra_metadata`
/// (or else `extra_sql`) prefixes every label.
#[must_use]
pub fn filter_list(
    filters: &[String],
    extra_sql: Option<&str>,
    extra_metadata: Option<&str>,
) -> Vec<FilterSelection> {
    let extra_sql = extra_sql.map(str::trim).filter(|sql| !sql.is_empty());
    let prefix = extra_metadata.or(extra_sql);

    let mut selections = vec![FilterSelection {
        filter: None,
        constraint: extra_sql.unwrap_or_default().to_string(),
        metadata: prefix.unwrap_or("all bands").to_string(),
        order: 0,
    }];
    for (i, filter) in filters.iter().enumerate() {
        let band = format!("filter = '{filter}'");
        let constraint = match extra_sql {
            Some(sql) => format!("({sql}) and ({band})"),
            None => band,
        };
        let metadata = match prefix {
            Some(prefix) => format!("{prefix} {filter} band"),
            None => format!("{filter} band"),
        };
        let order = DEFAULT_FILTERS
            .iter()
            .position(|f| f == filter)
            .unwrap_or(DEFAULT_FILTERS.len() + i) as i32
            + 1;
        selections.push(FilterSelection {
            filter: Some(filter.clone()),
            constraint,
            metadata,
            order,
        });
    }
    selections
}

/// Basic statistics, histogram and sky maps of one visit column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataBatch {
    /// Column to describe, from the source or a stacker
    pub value: String,
    /// Name used in metric names and captions; `value` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_name: Option<String>,
    /// Display group; the capitalized value name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_metadata: Option<String>,
    /// Resolution of the sky maps; null skips the maps
    #[serde(default = "default_nside")]
    pub nside: Option<u32>,
    /// Filters evaluated one by one besides all bands; null keeps all bands only
    #[serde(default = "default_filters")]
    pub filters: Option<Vec<String>>,
}

impl MetadataBatch {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            value_name: None,
            group: None,
            extra_sql: None,
            extra_metadata: None,
            nside: default_nside(),
            filters: default_filters(),
        }
    }

    fn value_name(&self) -> &str {
        self.value_name.as_deref().unwrap_or(&self.value)
    }

    /// Stackers producing the value, for values that are not source columns
    fn stackers(&self) -> Vec<Arc<dyn Stacker>> {
        let stacker: Arc<dyn Stacker> = match self.value.as_str() {
            HOUR_ANGLE_COLUMN => Arc::new(HourAngleStacker::default()),
            NORM_AIRMASS_COLUMN => Arc::new(NormAirmassStacker::default()),
            _ => return Vec::new(),
        };
        vec![stacker]
    }

    fn display(&self) -> DisplayInfo {
        let value_name = self.value_name();
        let (group, subgroup) = match &self.group {
            Some(group) => (capitalize(group), capitalize(value_name)),
            None => (
                capitalize(value_name),
                self.extra_metadata
                    .clone()
                    .unwrap_or_else(|| "All visits".to_string()),
            ),
        };
        DisplayInfo {
            group: Some(group),
            subgroup: Some(subgroup),
            caption: None,
            order: 0,
        }
    }

    /// Build every bundle of the batch, validated against `available`
    pub fn build(
        &self,
        run_name: &str,
        available: &ColumnSet,
    ) -> Result<Vec<MetricBundle>, ConfigurationError> {
        let value = self.value.as_str();
        let value_name = self.value_name();
        let (renamed_histogram, renamed_map) = if value_name == value {
            (String::new(), String::new())
        } else {
            (format!(" ({value_name})"), format!(" ({value})"))
        };
        let stackers = self.stackers();
        let base_display = self.display();
        let selections = filter_list(
            self.filters.as_deref().unwrap_or_default(),
            self.extra_sql.as_deref(),
            self.extra_metadata.as_deref(),
        );

        let bundle = |metric: Arc<dyn Metric>,
                      slicer: SlicerSpec,
                      selection: &FilterSelection,
                      caption: String| {
            MetricBundle::builder(metric, slicer)
                .constraint(selection.constraint.as_str())
                .stackers(stackers.iter().cloned())
                .metadata(selection.metadata.as_str())
                .display(DisplayInfo {
                    caption: Some(caption),
                    order: selection.order,
                    ..base_display.clone()
                })
        };

        let mut bundles = Vec::new();
        for selection in &selections {
            for metric in extended_metrics(value, value_name) {
                let caption = format!("{} for {}.", metric.name(), selection.metadata);
                bundles.push(bundle(metric, SlicerSpec::Uni, selection, caption).build(available)?);
            }
        }

        for selection in &selections {
            let metric = SimpleMetric::count(value)
                .with_name(format!("{value_name} Histogram"))
                .into_arc();
            let slicer = SlicerSpec::OneD {
                column: value.to_string(),
                bins: BinSpec::Auto,
                range: None,
            };
            let caption = format!(
                "Histogram of {value}{renamed_histogram} for {}.",
                selection.metadata
            );
            bundles.push(bundle(metric, slicer, selection, caption).build(available)?);
        }

        if let Some(nside) = self.nside {
            let slicer = SlicerSpec::healpix(nside, "fieldRA", "fieldDec");
            for selection in &selections {
                let maps = [
                    SimpleMetric::min(value).with_name(format!("Min {value_name}")),
                    SimpleMetric::median(value).with_name(format!("Median {value_name}")),
                    SimpleMetric::max(value).with_name(format!("Max {value_name}")),
                ];
                for metric in maps {
                    let caption = format!(
                        "Map of {}{renamed_map} for {}.",
                        metric.name(),
                        selection.metadata
                    );
                    bundles.push(
                        bundle(metric.into_arc(), slicer.clone(), selection, caption)
                            .plot_kinds(vec![PlotKind::SkyMap, PlotKind::Histogram])
                            .summary_metrics(standard_summary())
                            .build(available)?,
                    );
                }
            }
        }

        for bundle in &mut bundles {
            bundle.set_run_name(run_name);
        }
        debug!(value, bundles = bundles.len(), "metadata batch built");
        Ok(bundles)
    }
}

/// Metadata batches over several visit columns sharing one selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllMetadataBatch {
    #[serde(default = "default_metadata_values")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_metadata: Option<String>,
    #[serde(default = "default_nside")]
    pub nside: Option<u32>,
    #[serde(default = "default_filters")]
    pub filters: Option<Vec<String>>,
}

impl Default for AllMetadataBatch {
    fn default() -> Self {
        Self {
            values: default_metadata_values(),
            extra_sql: None,
            extra_metadata: None,
            nside: default_nside(),
            filters: default_filters(),
        }
    }
}

/// One [`MetadataBatch`] per configured value, concatenated
pub fn all_metadata(
    batch: &AllMetadataBatch,
    run_name: &str,
    available: &ColumnSet,
) -> Result<Vec<MetricBundle>, ConfigurationError> {
    let mut bundles = Vec::new();
    for value in &batch.values {
        let single = MetadataBatch {
            extra_sql: batch.extra_sql.clone(),
            extra_metadata: batch.extra_metadata.clone(),
            nside: batch.nside,
            filters: batch.filters.clone(),
            ..MetadataBatch::new(value.as_str())
        };
        bundles.extend(single.build(run_name, available)?);
    }
    Ok(bundles)
}

/// A canned bundle set in a run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BatchConfig {
    Metadata(MetadataBatch),
    AllMetadata(AllMetadataBatch),
}

impl BatchConfig {
    pub fn build(
        &self,
        run_name: &str,
        available: &ColumnSet,
    ) -> Result<Vec<MetricBundle>, ConfigurationError> {
        match self {
            BatchConfig::Metadata(batch) => batch.build(run_name, available),
            BatchConfig::AllMetadata(batch) => all_metadata(batch, run_name, available),
        }
    }
}

/// First letter upper case, the rest lower case
fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
