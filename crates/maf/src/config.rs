//! YAML run configuration.
//!
//! A run names the visit table, the columns it offers, a list of bundle
//! entries and canned batches. Each entry expands into one [`MetricBundle`]
//! per constraint.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{WrapErr, eyre};
use maf_core::{
    ColumnSet, DisplayInfo, MetricBundle, MetricSpec, PlotKind, SlicerSpec, StackerSpec,
    standard_summary, validate_set,
};
use serde::{Deserialize, Serialize};

use crate::batches::BatchConfig;

fn default_run_name() -> String {
    "opsim".to_string()
}

fn default_table() -> String {
    "Summary".to_string()
}

/// Top-level run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_run_name")]
    pub run_name: String,
    /// SQLite database holding the visit table; the command line may override it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    #[serde(default = "default_table")]
    pub table: String,
    /// Columns the source offers. Read from the database schema when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_columns: Option<Vec<String>>,
    /// Text columns to parse as RFC 3339 timestamps
    #[serde(default)]
    pub time_columns: Vec<String>,
    #[serde(default)]
    pub bundles: Vec<BundleConfig>,
    #[serde(default)]
    pub batches: Vec<BatchConfig>,
}

/// One metric on one slicer, under one or more constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleConfig {
    pub metric: MetricSpec,
    pub slicer: SlicerSpec,
    /// An empty list runs the bundle once over all visits
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub stackers: Vec<StackerSpec>,
    #[serde(default)]
    pub summary_metrics: Vec<MetricSpec>,
    /// Prepend the standard summary set to `summary_metrics`
    #[serde(default)]
    pub standard_summary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_kinds: Option<Vec<PlotKind>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_metadata: Option<String>,
    #[serde(default)]
    pub display: DisplayInfo,
}

impl RunConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_saphyr::Error> {
        serde_saphyr::from_str(yaml)
    }

    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading config {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .map_err(|e| eyre!("{e}"))
            .wrap_err_with(|| format!("parsing config {}", path.display()))?;
        if config.bundles.is_empty() && config.batches.is_empty() {
            return Err(eyre!("config {} defines no bundles or batches", path.display()));
        }
        Ok(config)
    }

    /// Declared source columns, if the config lists them
    #[must_use]
    pub fn declared_columns(&self) -> Option<ColumnSet> {
        self.source_columns
            .as_ref()
            .map(|cols| cols.iter().map(String::as_str).collect())
    }

    /// Expand every entry and batch into validated bundles.
    ///
    /// The first invalid entry aborts the whole expansion, as do bundles whose
    /// stackers cannot share a pass with the rest of their constraint.
    pub fn build_bundles(&self, available: &ColumnSet) -> color_eyre::Result<Vec<MetricBundle>> {
        let mut bundles = Vec::new();
        for (i, entry) in self.bundles.iter().enumerate() {
            let expanded = entry
                .build(&self.run_name, available)
                .wrap_err_with(|| format!("bundle entry {i}"))?;
            bundles.extend(expanded);
        }
        for (i, batch) in self.batches.iter().enumerate() {
            let expanded = batch
                .build(&self.run_name, available)
                .wrap_err_with(|| format!("batch entry {i}"))?;
            bundles.extend(expanded);
        }

        let conflicts = validate_set(&bundles);
        if let Some(first) = conflicts.first() {
            let names: Vec<&str> = conflicts.iter().map(|c| c.bundle.as_str()).collect();
            return Err(eyre!(
                "conflicting stackers in {}: {}",
                names.join(", "),
                first.error
            ));
        }
        Ok(bundles)
    }
}

impl BundleConfig {
    /// Build one bundle per constraint
    pub fn build(
        &self,
        run_name: &str,
        available: &ColumnSet,
    ) -> color_eyre::Result<Vec<MetricBundle>> {
        let metric = self.metric.build()?;
        let stackers = self
            .stackers
            .iter()
            .map(StackerSpec::build)
            .collect::<Result<Vec<_>, _>>()?;

        let mut summaries = if self.standard_summary {
            standard_summary()
        } else {
            Vec::new()
        };
        for spec in &self.summary_metrics {
            summaries.push(spec.build()?);
        }

        let constraints: Vec<&str> = if self.constraints.is_empty() {
            vec![""]
        } else {
            self.constraints.iter().map(String::as_str).collect()
        };

        constraints
            .into_iter()
            .map(|constraint| {
                let mut builder = MetricBundle::builder(metric.clone(), self.slicer.clone())
                    .constraint(constraint)
                    .stackers(stackers.iter().cloned())
                    .summary_metrics(summaries.iter().cloned())
                    .display(self.display.clone())
                    .run_name(run_name);
                if let Some(kinds) = &self.plot_kinds {
                    builder = builder.plot_kinds(kinds.clone());
                }
                if let Some(metadata) = &self.metadata {
                    builder = builder.metadata(metadata);
                }
                if let Some(extra) = &self.extra_metadata {
                    builder = builder.extra_metadata(extra);
                }
                builder
                    .build(available)
                    .wrap_err_with(|| format!("{} with constraint \"{constraint}\"", metric.name()))
            })
            .collect()
    }
}
