use super::{BinSpec, MAX_AUTO_BINS, PartitionGeometry, PartitionIndex, Slicer, SlicerSpec};
use crate::error::SlicerError;
use crate::metrics::stats;
use crate::table::Table;

/// Contiguous histogram bins over one numeric column.
///
/// Bins are `[e_i, e_{i+1})` except the last, which is closed on both ends.
/// NaN rows and rows outside the edges belong to no bin.
#[derive(Debug, Clone)]
pub struct OneDSlicer {
    spec: SlicerSpec,
    edges: Vec<f64>,
    index: Option<PartitionIndex>,
}

impl OneDSlicer {
    /// Caller guarantees `spec` is a validated [`SlicerSpec::OneD`]
    pub(crate) fn from_spec(spec: SlicerSpec) -> Self {
        Self {
            spec,
            edges: Vec::new(),
            index: None,
        }
    }

    /// Bin edges chosen by the last setup
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    fn bin_of(&self, value: f64) -> Option<usize> {
        let (&first, &last) = (self.edges.first()?, self.edges.last()?);
        if value.is_nan() || value < first || value > last {
            return None;
        }
        let nbins = self.edges.len() - 1;
        if value == last {
            return Some(nbins - 1);
        }
        Some(self.edges.partition_point(|&e| e <= value) - 1)
    }
}

/// Derive edges from the bin rule, an optional range and the data
fn compute_edges(
    column: &str,
    bins: &BinSpec,
    range: Option<[f64; 2]>,
    values: &[f64],
) -> Result<Vec<f64>, SlicerError> {
    if let BinSpec::Edges(edges) = bins {
        return Ok(edges.clone());
    }

    let finite = stats::finite(values);
    let (lo, mut hi) = match range {
        Some([lo, hi]) => (lo, hi),
        None => {
            let lo = finite.iter().copied().reduce(f64::min);
            let hi = finite.iter().copied().reduce(f64::max);
            match (lo, hi) {
                (Some(lo), Some(hi)) => (lo, hi),
                _ => return Err(SlicerError::EmptyRange(column.to_string())),
            }
        }
    };
    if hi <= lo {
        hi = lo + 1.0;
    }

    match bins {
        BinSpec::Count(n) => Ok(linspace(lo, hi, *n)),
        BinSpec::Size(width) => {
            let count = (((hi - lo) / width).ceil() as usize).max(1);
            let mut edges: Vec<f64> = (0..=count).map(|i| lo + i as f64 * width).collect();
            // Rounding can leave the last edge just below the range maximum
            if let Some(last) = edges.last_mut() {
                *last = last.max(hi);
            }
            Ok(edges)
        }
        BinSpec::Auto => {
            let in_range: Vec<f64> = finite
                .iter()
                .copied()
                .filter(|v| (lo..=hi).contains(v))
                .collect();
            Ok(linspace(lo, hi, auto_bin_count(&in_range, hi - lo)))
        }
        BinSpec::Edges(edges) => Ok(edges.clone()),
    }
}

/// `count + 1` evenly spaced edges, the last exactly `hi`
fn linspace(lo: f64, hi: f64, count: usize) -> Vec<f64> {
    let width = (hi - lo) / count as f64;
    let mut edges: Vec<f64> = (0..count).map(|i| lo + i as f64 * width).collect();
    edges.push(hi);
    edges
}

/// Freedman-Diaconis bin count, capped, with a `sqrt(n)` fallback
fn auto_bin_count(values: &[f64], span: f64) -> usize {
    let n = values.len();
    let fallback = ((n as f64).sqrt().ceil() as usize).clamp(1, MAX_AUTO_BINS);
    if n < 2 {
        return fallback;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let iqr = stats::percentile_sorted(&sorted, 75.0) - stats::percentile_sorted(&sorted, 25.0);
    let width = 2.0 * iqr / (n as f64).cbrt();
    if !(width.is_finite() && width > 0.0) {
        return fallback;
    }
    ((span / width).ceil() as usize).clamp(1, MAX_AUTO_BINS)
}

impl Slicer for OneDSlicer {
    fn spec(&self) -> &SlicerSpec {
        &self.spec
    }

    fn setup(&mut self, table: &Table) -> Result<(), SlicerError> {
        let SlicerSpec::OneD {
            column,
            bins,
            range,
        } = &self.spec
        else {
            return Err(SlicerError::NotSetUp);
        };
        let values = table.numeric(column)?;
        self.edges = compute_edges(column, bins, *range, &values)?;

        let assignments: Vec<Option<usize>> = values.iter().map(|&v| self.bin_of(v)).collect();
        self.index = Some(PartitionIndex::from_assignments(
            self.edges.len() - 1,
            &assignments,
        ));
        Ok(())
    }

    fn index(&self) -> Option<&PartitionIndex> {
        self.index.as_ref()
    }

    fn geometry(&self, id: usize) -> Option<PartitionGeometry> {
        self.index.as_ref()?;
        let low = *self.edges.get(id)?;
        let high = *self.edges.get(id + 1)?;
        Some(PartitionGeometry::Bin { low, high })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_range_widened() {
        let edges = compute_edges("x", &BinSpec::Count(2), None, &[3.0, 3.0]).unwrap();
        assert_eq!(edges, vec![3.0, 3.5, 4.0]);
    }

    #[test]
    fn test_no_finite_data_without_range() {
        let err = compute_edges("x", &BinSpec::Auto, None, &[f64::NAN]).unwrap_err();
        assert_eq!(err, SlicerError::EmptyRange("x".to_string()));
    }

    #[test]
    fn test_bin_size_covers_range() {
        let edges = compute_edges("x", &BinSpec::Size(0.4), Some([0.0, 1.0]), &[]).unwrap();
        assert_eq!(edges.len(), 4);
        assert!(*edges.last().unwrap() >= 1.0);
    }

    #[test]
    fn test_bin_size_last_edge_reaches_data_max() {
        // 33 * 0.58 rounds to just below 19.14
        let edges = compute_edges("x", &BinSpec::Size(0.58), None, &[0.0, 5.0, 19.14]).unwrap();
        assert_eq!(edges.len(), 34);
        assert_eq!(*edges.last().unwrap(), 19.14);
    }

    #[test]
    fn test_auto_bins_are_capped() {
        let values: Vec<f64> = (0..10_000).map(|i| i as f64).collect();
        assert!(auto_bin_count(&values, 1e9) <= MAX_AUTO_BINS);
        assert_eq!(auto_bin_count(&[], 1.0), 1);
    }
}
