use std::collections::BTreeMap;

use super::{PartitionGeometry, PartitionIndex, Slicer, SlicerSpec};
use crate::error::SlicerError;
use crate::table::{Table, Value};

/// One partition per night, with each night's rows sorted by time.
///
/// Metrics that look at the spacing between consecutive visits need this
/// ordering. Rows with a NaN time sort last within their night.
#[derive(Debug, Clone)]
pub struct NightSlicer {
    spec: SlicerSpec,
    nights: Vec<Value>,
    index: Option<PartitionIndex>,
}

impl NightSlicer {
    /// Caller guarantees `spec` is a [`SlicerSpec::Night`]
    pub(crate) fn from_spec(spec: SlicerSpec) -> Self {
        Self {
            spec,
            nights: Vec::new(),
            index: None,
        }
    }
}

impl Slicer for NightSlicer {
    fn spec(&self) -> &SlicerSpec {
        &self.spec
    }

    fn setup(&mut self, table: &Table) -> Result<(), SlicerError> {
        let SlicerSpec::Night {
            night_col,
            time_col,
        } = &self.spec
        else {
            return Err(SlicerError::NotSetUp);
        };

        let nights = table.column(night_col)?;
        let times = table.numeric(time_col)?;
        let mut groups: BTreeMap<Value, Vec<usize>> = BTreeMap::new();
        for row in 0..table.num_rows() {
            groups.entry(nights.value(row)).or_default().push(row);
        }
        for rows in groups.values_mut() {
            rows.sort_by(|&a, &b| match (times[a].is_nan(), times[b].is_nan()) {
                (false, false) => times[a].total_cmp(&times[b]),
                (nan_a, nan_b) => nan_a.cmp(&nan_b),
            });
        }

        let (nights, members): (Vec<_>, Vec<_>) = groups.into_iter().unzip();
        self.nights = nights;
        self.index = Some(PartitionIndex::from_groups(members));
        Ok(())
    }

    fn index(&self) -> Option<&PartitionIndex> {
        self.index.as_ref()
    }

    fn geometry(&self, id: usize) -> Option<PartitionGeometry> {
        let night = self.nights.get(id)?.clone();
        Some(PartitionGeometry::Night { night })
    }

    fn time_ordered(&self) -> bool {
        true
    }
}
