//! Slicers partition a visit table into row-index subsets.
//!
//! A slicer is described by a [`SlicerSpec`]; two slicers are interchangeable
//! exactly when their specs are equal, which is what the runner uses to set up
//! each distinct slicer once per constraint. After [`Slicer::setup`] the
//! partition index is read-only and can be iterated any number of times.

mod groupby;
mod healpix;
mod kdtree;
mod night;
mod oned;
mod uni;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, SlicerError};
use crate::table::{ColumnSet, Table, Value};

pub use groupby::GroupBySlicer;
pub use healpix::{HealpixSlicer, pix2ang_ring, pixel_resolution_deg};
pub use kdtree::KdTree;
pub use night::NightSlicer;
pub use oned::OneDSlicer;
pub use uni::UniSlicer;

/// Largest supported HEALPix resolution
pub const MAX_NSIDE: u32 = 1 << 13;

/// Upper bound on automatically chosen 1-D bin counts
pub const MAX_AUTO_BINS: usize = 1000;

/// Row indices of every partition, stored contiguously.
///
/// Partition `i` owns `rows[offsets[i]..offsets[i + 1]]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionIndex {
    offsets: Vec<usize>,
    rows: Vec<usize>,
}

impl PartitionIndex {
    /// One partition per group, in iteration order
    pub fn from_groups<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = Vec<usize>>,
    {
        let mut offsets = vec![0];
        let mut rows = Vec::new();
        for group in groups {
            rows.extend(group);
            offsets.push(rows.len());
        }
        Self { offsets, rows }
    }

    /// Place each row in at most one partition, keeping row order inside a partition
    #[must_use]
    pub fn from_assignments(num_partitions: usize, assignments: &[Option<usize>]) -> Self {
        let mut counts = vec![0usize; num_partitions + 1];
        for &p in assignments.iter().flatten() {
            counts[p + 1] += 1;
        }
        for i in 1..counts.len() {
            counts[i] += counts[i - 1];
        }
        let offsets = counts.clone();
        let mut cursor = counts;
        let mut rows = vec![0; offsets[num_partitions]];
        for (row, assignment) in assignments.iter().enumerate() {
            if let Some(p) = *assignment {
                rows[cursor[p]] = row;
                cursor[p] += 1;
            }
        }
        Self { offsets, rows }
    }

    /// Number of partitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows of partition `id`
    #[must_use]
    pub fn get(&self, id: usize) -> Option<&[usize]> {
        if id >= self.len() {
            return None;
        }
        Some(&self.rows[self.offsets[id]..self.offsets[id + 1]])
    }

    /// Total row memberships; exceeds the table size when partitions overlap
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    /// Iterate partitions in order. Each call starts from the first partition.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Partition<'_>> + '_ {
        self.offsets.windows(2).enumerate().map(|(id, w)| Partition {
            id,
            rows: &self.rows[w[0]..w[1]],
        })
    }
}

/// One partition: its position in the slicer's ordering and its rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition<'a> {
    pub id: usize,
    pub rows: &'a [usize],
}

/// Where a partition sits, for plotting and persistence
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionGeometry {
    Global,
    /// 1-D bin `[low, high)`; the last bin also includes `high`
    Bin { low: f64, high: f64 },
    /// HEALPix pixel center (ring scheme)
    Pixel { id: usize, lon_deg: f64, lat_deg: f64 },
    Group {
        key: Vec<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lon_deg: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lat_deg: Option<f64>,
    },
    Night { night: Value },
}

/// Partitions a table
pub trait Slicer: fmt::Debug + Send + Sync {
    /// Parameters this slicer was built from
    fn spec(&self) -> &SlicerSpec;

    /// Build the partition index. Calling it again replaces the previous index.
    fn setup(&mut self, table: &Table) -> Result<(), SlicerError>;

    /// Partition index, once set up
    fn index(&self) -> Option<&PartitionIndex>;

    /// Geometry of partition `id`, once set up
    fn geometry(&self, id: usize) -> Option<PartitionGeometry>;

    /// Rows inside each partition are sorted by time
    fn time_ordered(&self) -> bool {
        false
    }

    fn partitions(&self) -> Result<&PartitionIndex, SlicerError> {
        self.index().ok_or(SlicerError::NotSetUp)
    }

    fn len(&self) -> Result<usize, SlicerError> {
        Ok(self.partitions()?.len())
    }

    fn label(&self) -> String {
        self.spec().label()
    }
}

/// How a 1-D slicer chooses its bin edges
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinSpec {
    /// Freedman-Diaconis width over the data, falling back to `sqrt(n)` bins
    #[default]
    Auto,
    /// Fixed number of equal-width bins over the range
    Count(usize),
    /// Fixed bin width starting at the range minimum
    Size(f64),
    /// Explicit, strictly increasing edges
    Edges(Vec<f64>),
}

fn default_true() -> bool {
    true
}

fn default_lon_col() -> String {
    "fieldRA".to_string()
}

fn default_lat_col() -> String {
    "fieldDec".to_string()
}

fn default_radius() -> f64 {
    1.75
}

fn default_leaf_size() -> usize {
    100
}

fn default_night_col() -> String {
    "night".to_string()
}

fn default_time_col() -> String {
    "expMJD".to_string()
}

/// Parameters of a slicer.
///
/// Specs with equal [`SlicerSpec::partition_key`]s produce identical partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SlicerSpec {
    /// Single partition holding every row
    Uni,
    /// Histogram bins over one numeric column
    OneD {
        column: String,
        #[serde(default)]
        bins: BinSpec,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range: Option<[f64; 2]>,
    },
    /// HEALPix ring-scheme sky grid; each pixel collects the rows within `radius_deg`
    Healpix {
        nside: u32,
        #[serde(default = "default_lon_col")]
        lon_col: String,
        #[serde(default = "default_lat_col")]
        lat_col: String,
        #[serde(default = "default_true")]
        lat_lon_deg: bool,
        #[serde(default = "default_radius")]
        radius_deg: f64,
        #[serde(default = "default_leaf_size")]
        leaf_size: usize,
    },
    /// Exact-match grouping on one or more columns
    GroupBy {
        columns: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lon_col: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lat_col: Option<String>,
        #[serde(default = "default_true")]
        lat_lon_deg: bool,
    },
    /// One partition per night, rows ordered by time inside each night
    Night {
        #[serde(default = "default_night_col")]
        night_col: String,
        #[serde(default = "default_time_col")]
        time_col: String,
    },
}

impl SlicerSpec {
    /// 1-D slicer with `bins` equal-width bins
    pub fn one_d(column: impl Into<String>, bins: usize, range: Option<[f64; 2]>) -> Self {
        SlicerSpec::OneD {
            column: column.into(),
            bins: BinSpec::Count(bins),
            range,
        }
    }

    /// HEALPix slicer with degree coordinates and default radius and leaf size
    pub fn healpix(nside: u32, lon_col: impl Into<String>, lat_col: impl Into<String>) -> Self {
        SlicerSpec::Healpix {
            nside,
            lon_col: lon_col.into(),
            lat_col: lat_col.into(),
            lat_lon_deg: true,
            radius_deg: default_radius(),
            leaf_size: default_leaf_size(),
        }
    }

    /// Group by the survey field id, positioned at the field center
    #[must_use]
    pub fn opsim_field() -> Self {
        SlicerSpec::GroupBy {
            columns: vec!["fieldID".to_string()],
            lon_col: Some(default_lon_col()),
            lat_col: Some(default_lat_col()),
            lat_lon_deg: true,
        }
    }

    #[must_use]
    pub fn night() -> Self {
        SlicerSpec::Night {
            night_col: default_night_col(),
            time_col: default_time_col(),
        }
    }

    /// Short label used in file names and logs
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            SlicerSpec::Uni => "UNI".to_string(),
            SlicerSpec::OneD { column, .. } => format!("ONED_{column}"),
            SlicerSpec::Healpix { nside, .. } => format!("HEALPIX_{nside}"),
            SlicerSpec::GroupBy { columns, .. } => format!("GROUPBY_{}", columns.join("-")),
            SlicerSpec::Night { .. } => "NIGHT".to_string(),
        }
    }

    /// Columns read during setup
    #[must_use]
    pub fn columns(&self) -> ColumnSet {
        let mut set = ColumnSet::new();
        match self {
            SlicerSpec::Uni => {}
            SlicerSpec::OneD { column, .. } => {
                set.insert(column.as_str());
            }
            SlicerSpec::Healpix {
                lon_col, lat_col, ..
            } => {
                set.insert(lon_col.as_str());
                set.insert(lat_col.as_str());
            }
            SlicerSpec::GroupBy {
                columns,
                lon_col,
                lat_col,
                ..
            } => {
                for column in columns.iter().chain(lon_col).chain(lat_col) {
                    set.insert(column.as_str());
                }
            }
            SlicerSpec::Night {
                night_col,
                time_col,
            } => {
                set.insert(night_col.as_str());
                set.insert(time_col.as_str());
            }
        }
        set
    }

    /// This spec with setup-only tuning (the k-d tree leaf size) reset, for
    /// deciding which bundles can share one set-up slicer
    #[must_use]
    pub fn partition_key(&self) -> SlicerSpec {
        let mut key = self.clone();
        if let SlicerSpec::Healpix { leaf_size, .. } = &mut key {
            *leaf_size = default_leaf_size();
        }
        key
    }

    /// Whether partitions come out sorted by time
    #[must_use]
    pub fn time_ordered(&self) -> bool {
        matches!(self, SlicerSpec::Night { .. })
    }

    /// Check the parameters without building anything
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidParameter {
            component: "slicer",
            reason,
        };
        match self {
            SlicerSpec::Uni => Ok(()),
            SlicerSpec::OneD {
                column,
                bins,
                range,
            } => {
                if column.is_empty() {
                    return Err(invalid("1-D slicer needs a column".to_string()));
                }
                match bins {
                    BinSpec::Count(0) => {
                        return Err(invalid("1-D bin count must be positive".to_string()));
                    }
                    BinSpec::Size(w) if !(w.is_finite() && *w > 0.0) => {
                        return Err(invalid(format!("1-D bin size {w} must be positive")));
                    }
                    BinSpec::Edges(edges) => {
                        if edges.len() < 2 {
                            return Err(invalid("1-D slicer needs at least two edges".to_string()));
                        }
                        if edges.iter().any(|e| !e.is_finite())
                            || edges.windows(2).any(|w| w[1] <= w[0])
                        {
                            return Err(invalid(
                                "1-D edges must be finite and strictly increasing".to_string(),
                            ));
                        }
                    }
                    _ => {}
                }
                if let Some([lo, hi]) = range
                    && !(lo.is_finite() && hi.is_finite() && lo < hi)
                {
                    return Err(invalid(format!("1-D range [{lo}, {hi}] is empty")));
                }
                Ok(())
            }
            SlicerSpec::Healpix {
                nside,
                radius_deg,
                leaf_size,
                ..
            } => {
                if !nside.is_power_of_two() || *nside > MAX_NSIDE {
                    return Err(invalid(format!(
                        "nside {nside} must be a power of two no larger than {MAX_NSIDE}"
                    )));
                }
                if !(radius_deg.is_finite() && *radius_deg > 0.0 && *radius_deg <= 180.0) {
                    return Err(invalid(format!("radius {radius_deg} deg must be in (0, 180]")));
                }
                if *leaf_size == 0 {
                    return Err(invalid("k-d tree leaf size must be positive".to_string()));
                }
                Ok(())
            }
            SlicerSpec::GroupBy {
                columns,
                lon_col,
                lat_col,
                ..
            } => {
                if columns.is_empty() {
                    return Err(invalid("group-by slicer needs at least one column".to_string()));
                }
                if lon_col.is_some() != lat_col.is_some() {
                    return Err(invalid(
                        "group-by position needs both lon_col and lat_col".to_string(),
                    ));
                }
                Ok(())
            }
            SlicerSpec::Night { .. } => Ok(()),
        }
    }

    /// Validate and build a slicer ready for [`Slicer::setup`]
    pub fn build(&self) -> Result<Box<dyn Slicer>, ConfigurationError> {
        self.validate()?;
        let slicer: Box<dyn Slicer> = match self {
            SlicerSpec::Uni => Box::new(UniSlicer::new()),
            SlicerSpec::OneD { .. } => Box::new(OneDSlicer::from_spec(self.clone())),
            SlicerSpec::Healpix { .. } => Box::new(HealpixSlicer::from_spec(self.clone())),
            SlicerSpec::GroupBy { .. } => Box::new(GroupBySlicer::from_spec(self.clone())),
            SlicerSpec::Night { .. } => Box::new(NightSlicer::from_spec(self.clone())),
        };
        Ok(slicer)
    }
}

impl fmt::Display for SlicerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
