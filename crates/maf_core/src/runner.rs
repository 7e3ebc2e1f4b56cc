//! Executes bundles against a row source.
//!
//! Bundles are grouped by constraint, then by slicer. Each distinct
//! constraint costs one fetch and one stacker pass; each distinct slicer
//! within it costs one setup. Slicers differing only in k-d tree leaf size
//! count as one. Metrics then run over every partition of the
//! shared index.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::bundle::{Constraint, MetricBundle, validate_set};
use crate::error::{MafError, SlicerError};
use crate::metrics::MetricValue;
use crate::results::{BundleResults, ReducedResult};
use crate::slicers::{PartitionGeometry, Slicer, SlicerSpec};
use crate::source::RowSource;
use crate::stackers::{apply_stacker, resolve_order};
use crate::summary::{SummaryOutcome, SummaryStat, compute_summary};
use crate::table::{ColumnSet, DataSlice, Table};

/// A failure that stopped one or more bundles
#[derive(Debug)]
pub struct RunFailure {
    /// Names of the bundles left without results
    pub bundles: Vec<String>,
    pub error: MafError,
}

/// Counters and failures from one execution pass
#[derive(Debug, Default)]
pub struct RunReport {
    pub fetches: usize,
    pub stacker_runs: usize,
    pub slicer_setups: usize,
    pub bundles_completed: usize,
    pub failures: Vec<RunFailure>,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs bundles against a row source
pub struct Runner<'s, S: RowSource + ?Sized> {
    source: &'s S,
}

impl<'s, S: RowSource + ?Sized> Runner<'s, S> {
    pub fn new(source: &'s S) -> Self {
        Self { source }
    }

    /// Execute every bundle, storing results on the bundles that succeed.
    ///
    /// Previous results are discarded first, so a bundle that fails in this
    /// pass has no results afterwards. Bundles rejected by [`validate_set`]
    /// fail alone, before anything is fetched.
    pub fn run(&self, bundles: &mut [MetricBundle]) -> RunReport {
        let mut report = RunReport::default();
        for bundle in bundles.iter_mut() {
            bundle.clear_results();
        }

        let conflicts = validate_set(bundles);
        for conflict in &conflicts {
            error!(bundle = %conflict.bundle, "{}", conflict.error);
            report.failures.push(RunFailure {
                bundles: vec![conflict.bundle.clone()],
                error: MafError::Configuration(conflict.error.clone()),
            });
        }
        let runnable: Vec<usize> = (0..bundles.len())
            .filter(|i| !conflicts.iter().any(|c| c.index == *i))
            .collect();

        for (constraint, members) in
            group_by_indices(&runnable, bundles, |b| b.constraint().clone())
        {
            if let Err(error) = self.run_constraint(&constraint, &members, bundles, &mut report) {
                let names: Vec<String> = members.iter().map(|&i| bundles[i].name()).collect();
                error!(constraint = %constraint, bundles = names.len(), "{error}");
                report.failures.push(RunFailure {
                    bundles: names,
                    error,
                });
            }
        }

        info!(
            fetches = report.fetches,
            slicer_setups = report.slicer_setups,
            completed = report.bundles_completed,
            failed = report.failures.iter().map(|f| f.bundles.len()).sum::<usize>(),
            "run finished"
        );
        report
    }

    /// Fetch, stack and slice for one constraint. Errors returned here are
    /// fatal to every bundle of the group.
    fn run_constraint(
        &self,
        constraint: &Constraint,
        members: &[usize],
        bundles: &mut [MetricBundle],
        report: &mut RunReport,
    ) -> Result<(), MafError> {
        let mut columns = ColumnSet::new();
        let mut stackers = Vec::new();
        for &i in members {
            columns.extend_from(bundles[i].fetch_columns());
            stackers.extend(bundles[i].stackers().iter().cloned());
        }
        let stackers = resolve_order(&stackers)?;

        let mut table = self
            .source
            .fetch(&columns, constraint)
            .map_err(|source| MafError::Fetch {
                constraint: constraint.to_string(),
                source,
            })?;
        report.fetches += 1;
        debug!(
            constraint = %constraint,
            rows = table.num_rows(),
            columns = columns.len(),
            "fetched rows"
        );

        for stacker in &stackers {
            let ran = apply_stacker(stacker.as_ref(), &mut table).map_err(|source| {
                MafError::Stacker {
                    stacker: stacker.key(),
                    constraint: constraint.to_string(),
                    source,
                }
            })?;
            if ran {
                report.stacker_runs += 1;
            }
        }

        let by_slicer = group_by_indices(members, bundles, |b| b.slicer().partition_key());
        for (_, slicer_members) in by_slicer {
            // Members differ at most in tuning; the first one's spec is built
            let spec = bundles[slicer_members[0]].slicer().clone();
            self.run_slicer(&spec, &slicer_members, &table, constraint, bundles, report);
        }
        Ok(())
    }

    /// Set up one slicer and evaluate the bundles sharing it
    fn run_slicer(
        &self,
        spec: &SlicerSpec,
        members: &[usize],
        table: &Table,
        constraint: &Constraint,
        bundles: &mut [MetricBundle],
        report: &mut RunReport,
    ) {
        let slicer = match setup_slicer(spec, table, constraint) {
            Ok(slicer) => slicer,
            Err(error) => {
                let names: Vec<String> = members.iter().map(|&i| bundles[i].name()).collect();
                error!(constraint = %constraint, slicer = %spec, "{error}");
                report.failures.push(RunFailure {
                    bundles: names,
                    error,
                });
                return;
            }
        };
        report.slicer_setups += 1;

        let shared: &[MetricBundle] = bundles;
        #[cfg(feature = "parallel")]
        let outcomes: Vec<(usize, Result<BundleResults, MafError>)> = members
            .par_iter()
            .map(|&i| (i, evaluate_bundle(&shared[i], slicer.as_ref(), table)))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<(usize, Result<BundleResults, MafError>)> = members
            .iter()
            .map(|&i| (i, evaluate_bundle(&shared[i], slicer.as_ref(), table)))
            .collect();

        for (i, outcome) in outcomes {
            let bundle = &mut bundles[i];
            match outcome {
                Ok(results) => {
                    info!(
                        bundle = %bundle.name(),
                        constraint = %constraint,
                        partitions = results.len(),
                        missing = results.missing_count(),
                        "bundle complete"
                    );
                    bundle.set_results(results);
                    report.bundles_completed += 1;
                }
                Err(error) => {
                    error!(bundle = %bundle.name(), constraint = %constraint, "{error}");
                    report.failures.push(RunFailure {
                        bundles: vec![bundle.name()],
                        error,
                    });
                }
            }
        }
    }
}

fn setup_slicer(
    spec: &SlicerSpec,
    table: &Table,
    constraint: &Constraint,
) -> Result<Box<dyn Slicer>, MafError> {
    let mut slicer = spec.build()?;
    slicer
        .setup(table)
        .map_err(|source| MafError::SlicerSetup {
            slicer: spec.label(),
            constraint: constraint.to_string(),
            source,
        })?;
    debug!(
        slicer = %spec,
        constraint = %constraint,
        partitions = slicer.len().unwrap_or(0),
        "slicer set up"
    );
    Ok(slicer)
}

/// Run one bundle's metric over every partition, then reduce and summarize
pub(crate) fn evaluate_bundle(
    bundle: &MetricBundle,
    slicer: &dyn Slicer,
    table: &Table,
) -> Result<BundleResults, MafError> {
    let constraint = bundle.constraint();
    let setup_error = |source: SlicerError| MafError::SlicerSetup {
        slicer: slicer.label(),
        constraint: constraint.to_string(),
        source,
    };
    let index = slicer.partitions().map_err(setup_error)?;
    let metric = bundle.metric();

    let mut values = Vec::with_capacity(index.len());
    for partition in index.iter() {
        let slice = DataSlice::new(table, partition.rows);
        let value = metric.run(&slice).map_err(|source| MafError::Partition {
            bundle: bundle.name(),
            metric: metric.name().to_string(),
            constraint: constraint.to_string(),
            partition: partition.id,
            source,
        })?;
        values.push(value);
    }

    let geometry = (0..index.len())
        .map(|id| slicer.geometry(id))
        .collect::<Option<Vec<PartitionGeometry>>>()
        .ok_or(SlicerError::NotSetUp)
        .map_err(setup_error)?;

    let reduced: Vec<ReducedResult> = metric
        .reducers()
        .iter()
        .map(|reducer| {
            let mut failures = 0;
            let reduced_values = values
                .iter()
                .map(|value| match value {
                    MetricValue::Missing => None,
                    MetricValue::Series(series) => match reducer.apply(series) {
                        Ok(v) if !v.is_nan() => Some(v),
                        Ok(_) => None,
                        Err(_) => {
                            failures += 1;
                            None
                        }
                    },
                    MetricValue::Scalar(_) => {
                        failures += 1;
                        None
                    }
                })
                .collect();
            let name = format!("{} {}", metric.name(), reducer.name);
            if failures > 0 {
                warn!(
                    bundle = %bundle.name(),
                    reducer = reducer.name,
                    failures,
                    "reduce function failed on some partitions"
                );
            }
            ReducedResult {
                name,
                values: reduced_values,
                failures,
            }
        })
        .collect();

    let mut targets: Vec<(String, Vec<Option<f64>>)> = Vec::new();
    if reduced.is_empty() {
        let scalars = values.iter().map(MetricValue::as_scalar).collect();
        targets.push((metric.name().to_string(), scalars));
    }
    targets.extend(reduced.iter().map(|r| (r.name.clone(), r.values.clone())));

    let mut summaries = Vec::new();
    for (target, array) in &targets {
        for summary in bundle.summary_metrics() {
            let outcome = compute_summary(summary.as_ref(), array.iter().copied());
            if let SummaryOutcome::Unavailable(reason) = &outcome {
                warn!(
                    bundle = %bundle.name(),
                    summary = summary.name(),
                    target = %target,
                    "summary unavailable: {reason}"
                );
            }
            summaries.push(SummaryStat {
                metric: summary.name().to_string(),
                target: target.clone(),
                outcome,
            });
        }
    }

    Ok(BundleResults {
        values,
        geometry,
        reduced,
        summaries,
    })
}

/// Group bundle indices by key, keeping first-appearance order
fn group_by_indices<K: PartialEq>(
    indices: &[usize],
    bundles: &[MetricBundle],
    key: impl Fn(&MetricBundle) -> K,
) -> Vec<(K, Vec<usize>)> {
    let mut groups: Vec<(K, Vec<usize>)> = Vec::new();
    for &i in indices {
        let k = key(&bundles[i]);
        match groups.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, members)) => members.push(i),
            None => groups.push((k, vec![i])),
        }
    }
    groups
}
