use std::collections::BTreeMap;

use super::{PartitionGeometry, PartitionIndex, Slicer, SlicerSpec};
use crate::error::SlicerError;
use crate::table::{Table, Value};

/// Partitions rows by exact equality of one or more columns.
///
/// The domain is the set of distinct keys present in the data, in ascending
/// key order. When position columns are configured, each partition is placed
/// at the position of its first row.
#[derive(Debug, Clone)]
pub struct GroupBySlicer {
    spec: SlicerSpec,
    keys: Vec<Vec<Value>>,
    positions: Vec<Option<(f64, f64)>>,
    index: Option<PartitionIndex>,
}

impl GroupBySlicer {
    /// Caller guarantees `spec` is a validated [`SlicerSpec::GroupBy`]
    pub(crate) fn from_spec(spec: SlicerSpec) -> Self {
        Self {
            spec,
            keys: Vec::new(),
            positions: Vec::new(),
            index: None,
        }
    }

    /// Distinct keys found by the last setup, in partition order
    #[must_use]
    pub fn keys(&self) -> &[Vec<Value>] {
        &self.keys
    }
}

impl Slicer for GroupBySlicer {
    fn spec(&self) -> &SlicerSpec {
        &self.spec
    }

    fn setup(&mut self, table: &Table) -> Result<(), SlicerError> {
        let SlicerSpec::GroupBy {
            columns,
            lon_col,
            lat_col,
            lat_lon_deg,
        } = &self.spec
        else {
            return Err(SlicerError::NotSetUp);
        };

        let key_columns = columns
            .iter()
            .map(|name| table.column(name))
            .collect::<Result<Vec<_>, _>>()?;
        let mut groups: BTreeMap<Vec<Value>, Vec<usize>> = BTreeMap::new();
        for row in 0..table.num_rows() {
            let key = key_columns.iter().map(|c| c.value(row)).collect();
            groups.entry(key).or_default().push(row);
        }

        let coords = match (lon_col, lat_col) {
            (Some(lon), Some(lat)) => Some((table.numeric(lon)?, table.numeric(lat)?)),
            _ => None,
        };
        let positions = groups
            .values()
            .map(|rows| {
                let (lon, lat) = coords.as_ref()?;
                let first = *rows.first()?;
                let (lon, lat) = (lon[first], lat[first]);
                Some(if *lat_lon_deg {
                    (lon, lat)
                } else {
                    (lon.to_degrees(), lat.to_degrees())
                })
            })
            .collect();

        let (keys, members): (Vec<_>, Vec<_>) = groups.into_iter().unzip();
        self.positions = positions;
        self.keys = keys;
        self.index = Some(PartitionIndex::from_groups(members));
        Ok(())
    }

    fn index(&self) -> Option<&PartitionIndex> {
        self.index.as_ref()
    }

    fn geometry(&self, id: usize) -> Option<PartitionGeometry> {
        let key = self.keys.get(id)?.clone();
        let position = self.positions.get(id).copied().flatten();
        Some(PartitionGeometry::Group {
            key,
            lon_deg: position.map(|p| p.0),
            lat_deg: position.map(|p| p.1),
        })
    }
}
