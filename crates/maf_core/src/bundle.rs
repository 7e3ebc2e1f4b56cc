//! Metric bundles: one metric bound to one slicer and one constraint.
//!
//! Bundles are assembled with [`BundleBuilder`], which checks every
//! requirement up front (columns, slicer compatibility, constraint syntax,
//! stacker ordering) so a bundle that exists can always be executed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::metrics::Metric;
use crate::results::{BundleResults, ResultRecord};
use crate::slicers::SlicerSpec;
use crate::stackers::{Stacker, resolve_order};
use crate::summary::METRIC_DATA_COLUMN;
use crate::table::ColumnSet;

/// Metadata label of a bundle selecting every visit
pub const ALL_VISITS: &str = "all visits";

/// Row-selection predicate handed verbatim to the row source.
///
/// Only the shape is checked here: balanced parentheses and quotes, and a
/// single statement. An empty constraint selects every row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Constraint(String);

impl Constraint {
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let text = text.trim();
        let invalid = |reason: &'static str| ConfigurationError::InvalidConstraint {
            constraint: text.to_string(),
            reason,
        };

        let mut depth = 0i32;
        let mut quote: Option<char> = None;
        for c in text.chars() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(invalid("unbalanced parentheses"));
                    }
                }
                (None, ';') => return Err(invalid("multiple statements")),
                (None, _) => {}
            }
        }
        if quote.is_some() {
            return Err(invalid("unterminated quote"));
        }
        if depth != 0 {
            return Err(invalid("unbalanced parentheses"));
        }
        Ok(Constraint(text.to_string()))
    }

    /// The constraint selecting every row
    #[must_use]
    pub fn all() -> Self {
        Constraint::default()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Human-readable label: `filter = 'r' and night < 730` becomes `r and night < 730`
    #[must_use]
    pub fn metadata_label(&self) -> String {
        let stripped = self
            .0
            .replace('=', "")
            .replace("filter", "")
            .replace(['\'', '"'], "")
            .replace('/', ".");
        let label = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        if label.is_empty() {
            ALL_VISITS.to_string()
        } else {
            label
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Grouping and ordering hints for result browsers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgroup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default)]
    pub order: i32,
}

/// Plot a persisted bundle asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotKind {
    SkyMap,
    Histogram,
    PowerSpectrum,
    OneDBinned,
}

impl PlotKind {
    /// Plots that suit a slicer's geometry
    #[must_use]
    pub fn defaults_for(slicer: &SlicerSpec) -> Vec<PlotKind> {
        match slicer {
            SlicerSpec::Healpix { .. } => vec![
                PlotKind::SkyMap,
                PlotKind::Histogram,
                PlotKind::PowerSpectrum,
            ],
            SlicerSpec::OneD { .. } => vec![PlotKind::OneDBinned],
            SlicerSpec::GroupBy {
                lon_col: Some(_), ..
            } => vec![PlotKind::SkyMap, PlotKind::Histogram],
            SlicerSpec::GroupBy { .. } | SlicerSpec::Night { .. } => vec![PlotKind::Histogram],
            SlicerSpec::Uni => Vec::new(),
        }
    }
}

/// A validated unit of work
#[derive(Debug, Clone)]
pub struct MetricBundle {
    metric: Arc<dyn Metric>,
    slicer: SlicerSpec,
    constraint: Constraint,
    stackers: Vec<Arc<dyn Stacker>>,
    summary_metrics: Vec<Arc<dyn Metric>>,
    plot_kinds: Vec<PlotKind>,
    metadata: String,
    display: DisplayInfo,
    run_name: String,
    fetch_columns: ColumnSet,
    results: Option<BundleResults>,
}

impl MetricBundle {
    pub fn builder(metric: Arc<dyn Metric>, slicer: SlicerSpec) -> BundleBuilder {
        BundleBuilder::new(metric, slicer)
    }

    /// `"<metric> <metadata> <slicer>"`, used in logs and errors
    #[must_use]
    pub fn name(&self) -> String {
        format!(
            "{} {} {}",
            self.metric.name(),
            self.metadata,
            self.slicer.label()
        )
    }

    #[must_use]
    pub fn metric(&self) -> &Arc<dyn Metric> {
        &self.metric
    }

    #[must_use]
    pub fn slicer(&self) -> &SlicerSpec {
        &self.slicer
    }

    #[must_use]
    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// Stackers in dependency order
    #[must_use]
    pub fn stackers(&self) -> &[Arc<dyn Stacker>] {
        &self.stackers
    }

    #[must_use]
    pub fn summary_metrics(&self) -> &[Arc<dyn Metric>] {
        &self.summary_metrics
    }

    #[must_use]
    pub fn plot_kinds(&self) -> &[PlotKind] {
        &self.plot_kinds
    }

    #[must_use]
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    #[must_use]
    pub fn display(&self) -> &DisplayInfo {
        &self.display
    }

    #[must_use]
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn set_run_name(&mut self, run_name: impl Into<String>) {
        self.run_name = run_name.into();
    }

    /// Source columns the bundle needs fetched
    #[must_use]
    pub fn fetch_columns(&self) -> &ColumnSet {
        &self.fetch_columns
    }

    #[must_use]
    pub fn results(&self) -> Option<&BundleResults> {
        self.results.as_ref()
    }

    pub(crate) fn set_results(&mut self, results: BundleResults) {
        self.results = Some(results);
    }

    pub(crate) fn clear_results(&mut self) {
        self.results = None;
    }

    /// `<run>_<metric>_<metadata>_<slicer>` with unsafe characters replaced
    #[must_use]
    pub fn file_root(&self) -> String {
        let raw = format!(
            "{}_{}_{}_{}",
            self.run_name,
            self.metric.name(),
            self.metadata,
            self.slicer.label()
        );
        let mut root = String::with_capacity(raw.len());
        for c in raw.chars() {
            let c = if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            };
            if !(c == '_' && root.ends_with('_')) {
                root.push(c);
            }
        }
        root.trim_matches('_').to_string()
    }

    /// Persistence view, available once the bundle has results
    #[must_use]
    pub fn record(&self) -> Option<ResultRecord<'_>> {
        let results = self.results.as_ref()?;
        Some(ResultRecord {
            run_name: &self.run_name,
            metric: self.metric.name(),
            units: self.metric.units(),
            slicer: &self.slicer,
            constraint: self.constraint.as_str(),
            metadata: &self.metadata,
            file_root: self.file_root(),
            display: &self.display,
            plot_kinds: &self.plot_kinds,
            results,
        })
    }
}

/// Union of the source columns a set of bundles needs
#[must_use]
pub fn required_columns(bundles: &[MetricBundle]) -> ColumnSet {
    let mut columns = ColumnSet::new();
    for bundle in bundles {
        columns.extend_from(bundle.fetch_columns());
    }
    columns
}

/// A bundle whose stackers cannot share a stacker pass with the other
/// bundles of its constraint
#[derive(Debug, Clone, PartialEq)]
pub struct StackerConflict {
    /// Position of the bundle in the checked slice
    pub index: usize,
    pub bundle: String,
    pub error: ConfigurationError,
}

/// Check that the bundles sharing a constraint can run one combined stacker pass.
///
/// Both bundles of a conflicting pair are reported. A bundle that only
/// conflicts with the combined stackers of earlier bundles is reported alone.
/// Bundles without stackers never conflict.
#[must_use]
pub fn validate_set(bundles: &[MetricBundle]) -> Vec<StackerConflict> {
    let mut groups: Vec<(&Constraint, Vec<usize>)> = Vec::new();
    for (i, bundle) in bundles.iter().enumerate() {
        if bundle.stackers.is_empty() {
            continue;
        }
        match groups.iter_mut().find(|(c, _)| *c == &bundle.constraint) {
            Some((_, members)) => members.push(i),
            None => groups.push((&bundle.constraint, vec![i])),
        }
    }

    let mut rejected: BTreeMap<usize, ConfigurationError> = BTreeMap::new();
    for (_, members) in &groups {
        for (pos, &a) in members.iter().enumerate() {
            for &b in &members[pos + 1..] {
                let pair: Vec<Arc<dyn Stacker>> = bundles[a]
                    .stackers
                    .iter()
                    .chain(&bundles[b].stackers)
                    .cloned()
                    .collect();
                if let Err(error) = resolve_order(&pair) {
                    rejected.entry(a).or_insert_with(|| error.clone());
                    rejected.entry(b).or_insert(error);
                }
            }
        }

        let remaining: Vec<usize> = members
            .iter()
            .copied()
            .filter(|i| !rejected.contains_key(i))
            .collect();
        let mut accepted: Vec<Arc<dyn Stacker>> = Vec::new();
        for i in remaining {
            let mut candidate = accepted.clone();
            candidate.extend(bundles[i].stackers.iter().cloned());
            match resolve_order(&candidate) {
                Ok(_) => accepted = candidate,
                Err(error) => {
                    rejected.insert(i, error);
                }
            }
        }
    }

    rejected
        .into_iter()
        .map(|(index, error)| StackerConflict {
            index,
            bundle: bundles[index].name(),
            error,
        })
        .collect()
}

/// Collects the optional parts of a bundle and validates them together
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    metric: Arc<dyn Metric>,
    slicer: SlicerSpec,
    constraint: String,
    stackers: Vec<Arc<dyn Stacker>>,
    summary_metrics: Vec<Arc<dyn Metric>>,
    plot_kinds: Option<Vec<PlotKind>>,
    metadata: Option<String>,
    extra_metadata: Option<String>,
    display: DisplayInfo,
    run_name: String,
}

impl BundleBuilder {
    pub fn new(metric: Arc<dyn Metric>, slicer: SlicerSpec) -> Self {
        Self {
            metric,
            slicer,
            constraint: String::new(),
            stackers: Vec::new(),
            summary_metrics: Vec::new(),
            plot_kinds: None,
            metadata: None,
            extra_metadata: None,
            display: DisplayInfo::default(),
            run_name: "opsim".to_string(),
        }
    }

    #[must_use]
    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = constraint.into();
        self
    }

    #[must_use]
    pub fn stacker(mut self, stacker: Arc<dyn Stacker>) -> Self {
        self.stackers.push(stacker);
        self
    }

    #[must_use]
    pub fn stackers(mut self, stackers: impl IntoIterator<Item = Arc<dyn Stacker>>) -> Self {
        self.stackers.extend(stackers);
        self
    }

    #[must_use]
    pub fn summary_metric(mut self, metric: Arc<dyn Metric>) -> Self {
        self.summary_metrics.push(metric);
        self
    }

    #[must_use]
    pub fn summary_metrics(mut self, metrics: impl IntoIterator<Item = Arc<dyn Metric>>) -> Self {
        self.summary_metrics.extend(metrics);
        self
    }

    /// Replace the plots chosen from the slicer type
    #[must_use]
    pub fn plot_kinds(mut self, kinds: Vec<PlotKind>) -> Self {
        self.plot_kinds = Some(kinds);
        self
    }

    /// Replace the label derived from the constraint
    #[must_use]
    pub fn metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Append to the label derived from the constraint
    #[must_use]
    pub fn extra_metadata(mut self, extra: impl Into<String>) -> Self {
        self.extra_metadata = Some(extra.into());
        self
    }

    #[must_use]
    pub fn display(mut self, display: DisplayInfo) -> Self {
        self.display = display;
        self
    }

    #[must_use]
    pub fn run_name(mut self, run_name: impl Into<String>) -> Self {
        self.run_name = run_name.into();
        self
    }

    /// Validate against the columns the row source offers and build the bundle
    pub fn build(self, available: &ColumnSet) -> Result<MetricBundle, ConfigurationError> {
        let constraint = Constraint::parse(&self.constraint)?;
        self.slicer.validate()?;
        self.metric.validate()?;

        if self.metric.requires_time_order() && !self.slicer.time_ordered() {
            return Err(ConfigurationError::IncompatibleSlicer {
                metric: self.metric.name().to_string(),
                slicer: self.slicer.label(),
                reason: "metric needs partitions ordered in time",
            });
        }

        let stackers = resolve_order(&self.stackers)?;

        for summary in &self.summary_metrics {
            summary.validate()?;
            if let Some(column) = summary.columns().iter().find(|c| *c != METRIC_DATA_COLUMN) {
                return Err(ConfigurationError::InvalidSummaryMetric {
                    metric: summary.name().to_string(),
                    column: column.to_string(),
                });
            }
        }

        let mut needed = self.metric.columns();
        needed.extend_from(&self.slicer.columns());
        let mut produced = ColumnSet::new();
        for stacker in &stackers {
            needed.extend_from(&stacker.columns_required());
            produced.extend_from(&stacker.columns_added());
        }

        let metadata = match (self.metadata, self.extra_metadata) {
            (Some(metadata), _) => metadata,
            (None, Some(extra)) => format!("{} {}", constraint.metadata_label(), extra),
            (None, None) => constraint.metadata_label(),
        };

        let mut fetch_columns = ColumnSet::new();
        for column in needed.iter() {
            if available.contains(column) {
                fetch_columns.insert(column);
            } else if !produced.contains(column) {
                return Err(ConfigurationError::MissingColumn {
                    bundle: format!("{} {}", self.metric.name(), metadata),
                    column: column.to_string(),
                });
            }
        }

        let plot_kinds = self
            .plot_kinds
            .unwrap_or_else(|| PlotKind::defaults_for(&self.slicer));

        Ok(MetricBundle {
            metric: self.metric,
            slicer: self.slicer,
            constraint,
            stackers,
            summary_metrics: self.summary_metrics,
            plot_kinds,
            metadata,
            display: self.display,
            run_name: self.run_name,
            fetch_columns,
            results: None,
        })
    }
}
