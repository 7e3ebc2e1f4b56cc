use super::{PartitionGeometry, PartitionIndex, Slicer, SlicerSpec};
use crate::error::SlicerError;
use crate::table::Table;

/// One partition covering the whole table
#[derive(Debug, Clone)]
pub struct UniSlicer {
    spec: SlicerSpec,
    index: Option<PartitionIndex>,
}

impl Default for UniSlicer {
    fn default() -> Self {
        Self::new()
    }
}

impl UniSlicer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: SlicerSpec::Uni,
            index: None,
        }
    }
}

impl Slicer for UniSlicer {
    fn spec(&self) -> &SlicerSpec {
        &self.spec
    }

    fn setup(&mut self, table: &Table) -> Result<(), SlicerError> {
        self.index = Some(PartitionIndex::from_groups([(0..table.num_rows()).collect()]));
        Ok(())
    }

    fn index(&self) -> Option<&PartitionIndex> {
        self.index.as_ref()
    }

    fn geometry(&self, id: usize) -> Option<PartitionGeometry> {
        (self.index.is_some() && id == 0).then_some(PartitionGeometry::Global)
    }
}
