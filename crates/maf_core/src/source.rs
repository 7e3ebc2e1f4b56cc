//! Row source collaborator.
//!
//! The runner asks a [`RowSource`] for rows exactly once per distinct
//! constraint per pass. Sources backed by a database live outside this crate;
//! [`InMemorySource`] serves pre-loaded tables and counts fetches.

use std::sync::atomic::{AtomicUsize, Ordering};

use rustc_hash::FxHashMap;

use crate::bundle::Constraint;
use crate::error::{DataFetchError, TableError};
use crate::table::{ColumnSet, Table, Value};

/// Supplies visit rows for a constraint.
///
/// Implementations must return a consistent snapshot containing at least the
/// requested columns. An empty constraint means "all rows".
pub trait RowSource {
    fn fetch(&self, columns: &ColumnSet, constraint: &Constraint) -> Result<Table, DataFetchError>;
}

/// A row source over a table held in memory.
///
/// Constraints are not parsed: each non-empty constraint the source should
/// answer is registered up front with the rows it selects.
#[derive(Debug, Default)]
pub struct InMemorySource {
    table: Table,
    selections: FxHashMap<String, Vec<usize>>,
    fetches: AtomicUsize,
}

impl InMemorySource {
    #[must_use]
    pub fn new(table: Table) -> Self {
        Self {
            table,
            selections: FxHashMap::default(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Register the rows selected by `constraint`
    #[must_use]
    pub fn with_selection(mut self, constraint: &str, rows: Vec<usize>) -> Self {
        self.selections.insert(constraint.trim().to_string(), rows);
        self
    }

    /// Register `constraint` as the rows whose `column` value satisfies `predicate`.
    ///
    /// Unknown columns select nothing.
    #[must_use]
    pub fn with_filter(
        self,
        constraint: &str,
        column: &str,
        predicate: impl Fn(&Value) -> bool,
    ) -> Self {
        let rows = match self.table.column(column) {
            Ok(data) => (0..data.len())
                .filter(|&i| predicate(&data.value(i)))
                .collect(),
            Err(_) => Vec::new(),
        };
        self.with_selection(constraint, rows)
    }

    /// Number of fetches served so far
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }
}

impl RowSource for InMemorySource {
    fn fetch(&self, columns: &ColumnSet, constraint: &Constraint) -> Result<Table, DataFetchError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let projected = self.table.select(columns).map_err(|e| match e {
            TableError::UnknownColumn(name) => DataFetchError::UnknownColumn(name),
            other => DataFetchError::Table(other),
        })?;

        if constraint.is_empty() {
            return Ok(projected);
        }
        let rows = self
            .selections
            .get(constraint.as_str())
            .ok_or_else(|| DataFetchError::UnsupportedConstraint(constraint.to_string()))?;
        Ok(projected.take(rows))
    }
}
