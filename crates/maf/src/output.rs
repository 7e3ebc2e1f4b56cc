//! Writes bundle results to an output directory.
//!
//! Each bundle with results is written to `<file_root>.json`. A
//! `summary.json` index lists every bundle, its summary statistics and the
//! failures of the run.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::WrapErr;
use maf_core::{MetricBundle, RunReport, SummaryStat};
use serde::Serialize;
use tracing::info;

/// Name of the run index written next to the bundle files
pub const SUMMARY_FILE: &str = "summary.json";

/// One bundle's line in the run index
#[derive(Debug, Serialize)]
pub struct IndexEntry<'a> {
    pub name: String,
    pub file_root: String,
    pub metric: &'a str,
    pub metadata: &'a str,
    pub slicer: String,
    pub constraint: &'a str,
    pub completed: bool,
    pub summaries: &'a [SummaryStat],
}

#[derive(Debug, Serialize)]
struct FailureEntry<'a> {
    bundles: &'a [String],
    error: String,
}

#[derive(Debug, Serialize)]
struct RunIndex<'a> {
    run_name: &'a str,
    bundles: Vec<IndexEntry<'a>>,
    failures: Vec<FailureEntry<'a>>,
}

/// Build the index entry for a bundle
#[must_use]
pub fn index_entry(bundle: &MetricBundle) -> IndexEntry<'_> {
    IndexEntry {
        name: bundle.name(),
        file_root: bundle.file_root(),
        metric: bundle.metric().name(),
        metadata: bundle.metadata(),
        slicer: bundle.slicer().label(),
        constraint: bundle.constraint().as_str(),
        completed: bundle.results().is_some(),
        summaries: bundle
            .results()
            .map_or(&[][..], |results| results.summaries.as_slice()),
    }
}

/// Write every completed bundle and the run index. Returns the files written.
pub fn write_results(
    out_dir: &Path,
    run_name: &str,
    bundles: &[MetricBundle],
    report: &RunReport,
) -> color_eyre::Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .wrap_err_with(|| format!("creating output directory {}", out_dir.display()))?;

    let mut written = Vec::new();
    for record in bundles.iter().filter_map(MetricBundle::record) {
        let path = out_dir.join(format!("{}.json", record.file_root));
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(&path, json).wrap_err_with(|| format!("writing {}", path.display()))?;
        written.push(path);
    }

    let index = RunIndex {
        run_name,
        bundles: bundles.iter().map(index_entry).collect(),
        failures: report
            .failures
            .iter()
            .map(|f| FailureEntry {
                bundles: &f.bundles,
                error: f.error.to_string(),
            })
            .collect(),
    };
    let path = out_dir.join(SUMMARY_FILE);
    fs::write(&path, serde_json::to_string_pretty(&index)?)
        .wrap_err_with(|| format!("writing {}", path.display()))?;
    written.push(path);

    info!(
        dir = %out_dir.display(),
        files = written.len(),
        "results written"
    );
    Ok(written)
}

/// Plain-text summary table for the terminal
#[must_use]
pub fn summary_table(bundles: &[MetricBundle]) -> String {
    let mut out = String::new();
    for bundle in bundles {
        let _ = writeln!(out, "{}", bundle.name());
        let Some(results) = bundle.results() else {
            let _ = writeln!(out, "  (no results)");
            continue;
        };
        let _ = writeln!(
            out,
            "  partitions: {}  missing: {}",
            results.len(),
            results.missing_count()
        );
        for stat in &results.summaries {
            match stat.outcome.value() {
                Some(value) => {
                    let _ = writeln!(out, "  {:<28} {:<10} {value:.4}", stat.target, stat.metric);
                }
                None => {
                    let _ = writeln!(out, "  {:<28} {:<10} n/a", stat.target, stat.metric);
                }
            }
        }
    }
    out
}
