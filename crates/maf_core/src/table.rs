//! Columnar visit table
//!
//! Rows are stored column-wise with a name → column lookup resolved once when
//! the table is built. Metrics read partitions through [`DataSlice`], a
//! borrowed view of a row-index subset, so slicing never copies column data.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use jiff::Timestamp;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::TableError;

/// Modified Julian Date of the Unix epoch (1970-01-01T00:00:00Z)
pub const MJD_UNIX_EPOCH: f64 = 40_587.0;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Convert a timestamp to a Modified Julian Date
#[must_use]
pub fn timestamp_to_mjd(ts: Timestamp) -> f64 {
    ts.as_millisecond() as f64 / MILLIS_PER_DAY + MJD_UNIX_EPOCH
}

/// Convert a Modified Julian Date to a timestamp (millisecond precision)
pub fn mjd_to_timestamp(mjd: f64) -> Result<Timestamp, jiff::Error> {
    let millis = ((mjd - MJD_UNIX_EPOCH) * MILLIS_PER_DAY).round() as i64;
    Timestamp::from_millisecond(millis)
}

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Float,
    Int,
    Text,
    Time,
}

/// A single cell value.
///
/// Floats compare and hash by their total ordering so values can be used as
/// grouping keys.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Time(Timestamp),
}

impl Value {
    /// Numeric view of the value. Times are returned as MJD, text has no numeric view.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Time(ts) => Some(timestamp_to_mjd(*ts)),
            Value::Text(_) => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Float(_) => 1,
            Value::Text(_) => 2,
            Value::Time(_) => 3,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Text(v) => v.hash(state),
            Value::Time(v) => v.hash(state),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
            Value::Time(v) => write!(f, "{v}"),
        }
    }
}

/// Typed storage for one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Text(Vec<String>),
    Time(Vec<Timestamp>),
}

impl ColumnData {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Time(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Float(_) => ColumnKind::Float,
            ColumnData::Int(_) => ColumnKind::Int,
            ColumnData::Text(_) => ColumnKind::Text,
            ColumnData::Time(_) => ColumnKind::Time,
        }
    }

    /// Value at `row`. Panics if `row` is out of bounds, like slice indexing.
    #[must_use]
    pub fn value(&self, row: usize) -> Value {
        match self {
            ColumnData::Float(v) => Value::Float(v[row]),
            ColumnData::Int(v) => Value::Int(v[row]),
            ColumnData::Text(v) => Value::Text(v[row].clone()),
            ColumnData::Time(v) => Value::Time(v[row]),
        }
    }

    /// Numeric value at `row`, `None` for text columns
    #[must_use]
    pub fn numeric(&self, row: usize) -> Option<f64> {
        match self {
            ColumnData::Float(v) => Some(v[row]),
            ColumnData::Int(v) => Some(v[row] as f64),
            ColumnData::Time(v) => Some(timestamp_to_mjd(v[row])),
            ColumnData::Text(_) => None,
        }
    }

    /// Whole column as floats. Float columns are borrowed, others converted.
    pub fn to_f64(&self, name: &str) -> Result<Cow<'_, [f64]>, TableError> {
        match self {
            ColumnData::Float(v) => Ok(Cow::Borrowed(v)),
            ColumnData::Int(v) => Ok(Cow::Owned(v.iter().map(|&x| x as f64).collect())),
            ColumnData::Time(v) => Ok(Cow::Owned(
                v.iter().map(|&ts| timestamp_to_mjd(ts)).collect(),
            )),
            ColumnData::Text(_) => Err(TableError::NotNumeric {
                column: name.to_string(),
                kind: ColumnKind::Text,
            }),
        }
    }

    /// Gather the given rows into a new column
    #[must_use]
    pub fn take(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Float(v) => ColumnData::Float(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Int(v) => ColumnData::Int(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Text(v) => ColumnData::Text(rows.iter().map(|&i| v[i].clone()).collect()),
            ColumnData::Time(v) => ColumnData::Time(rows.iter().map(|&i| v[i]).collect()),
        }
    }
}

/// Ordered set of column names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnSet(BTreeSet<String>);

impl ColumnSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>) -> bool {
        self.0.insert(column.into())
    }

    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains(column)
    }

    pub fn extend_from(&mut self, other: &ColumnSet) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Columns in `self` that are not in `other`
    #[must_use]
    pub fn without(&self, other: &ColumnSet) -> ColumnSet {
        ColumnSet(self.0.difference(&other.0).cloned().collect())
    }

    #[must_use]
    pub fn is_subset(&self, other: &ColumnSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ColumnSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ColumnSet(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a ColumnSet {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Schema-described columnar table of visits
#[derive(Debug, Clone, Default)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<ColumnData>,
    lookup: FxHashMap<String, usize>,
    num_rows: usize,
}

impl Table {
    /// Create an empty table with no columns
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from named columns. All columns must have the same length.
    pub fn from_columns<I, S>(columns: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = (S, ColumnData)>,
        S: Into<String>,
    {
        let mut table = Table::new();
        for (name, data) in columns {
            table.push_column(name, data)?;
        }
        Ok(table)
    }

    /// Append a new column. Fails if the name is taken or the length differs.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        data: ColumnData,
    ) -> Result<(), TableError> {
        let name = name.into();
        if self.lookup.contains_key(&name) {
            return Err(TableError::DuplicateColumn(name));
        }
        self.check_length(&name, &data)?;
        if self.columns.is_empty() {
            self.num_rows = data.len();
        }
        self.lookup.insert(name.clone(), self.columns.len());
        self.names.push(name);
        self.columns.push(data);
        Ok(())
    }

    /// Insert or replace a column. Returns `true` if an existing column was replaced.
    pub fn set_column(
        &mut self,
        name: impl Into<String>,
        data: ColumnData,
    ) -> Result<bool, TableError> {
        let name = name.into();
        match self.lookup.get(&name) {
            Some(&idx) => {
                self.check_length(&name, &data)?;
                self.columns[idx] = data;
                Ok(true)
            }
            None => {
                self.push_column(name, data)?;
                Ok(false)
            }
        }
    }

    fn check_length(&self, name: &str, data: &ColumnData) -> Result<(), TableError> {
        if !self.columns.is_empty() && data.len() != self.num_rows {
            return Err(TableError::LengthMismatch {
                column: name.to_string(),
                expected: self.num_rows,
                found: data.len(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Result<&ColumnData, TableError> {
        self.lookup
            .get(name)
            .map(|&idx| &self.columns[idx])
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    /// Whole column as floats (see [`ColumnData::to_f64`])
    pub fn numeric(&self, name: &str) -> Result<Cow<'_, [f64]>, TableError> {
        self.column(name)?.to_f64(name)
    }

    /// Project the table onto a set of columns
    pub fn select(&self, columns: &ColumnSet) -> Result<Table, TableError> {
        let mut out = Table::new();
        for name in columns.iter() {
            out.push_column(name, self.column(name)?.clone())?;
        }
        if out.columns.is_empty() {
            out.num_rows = self.num_rows;
        }
        Ok(out)
    }

    /// Gather a subset of rows into a new table
    #[must_use]
    pub fn take(&self, rows: &[usize]) -> Table {
        Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            lookup: self.lookup.clone(),
            num_rows: rows.len(),
        }
    }

    /// All cells of one row, in column order
    #[must_use]
    pub fn row(&self, row: usize) -> Vec<(&str, Value)> {
        self.names
            .iter()
            .zip(&self.columns)
            .map(|(name, col)| (name.as_str(), col.value(row)))
            .collect()
    }
}

/// Borrowed view of the rows belonging to one partition
#[derive(Debug, Clone, Copy)]
pub struct DataSlice<'a> {
    table: &'a Table,
    indices: &'a [usize],
}

impl<'a> DataSlice<'a> {
    #[must_use]
    pub fn new(table: &'a Table, indices: &'a [usize]) -> Self {
        Self { table, indices }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[must_use]
    pub fn indices(&self) -> &'a [usize] {
        self.indices
    }

    #[must_use]
    pub fn table(&self) -> &'a Table {
        self.table
    }

    pub fn column(&self, name: &str) -> Result<&'a ColumnData, TableError> {
        self.table.column(name)
    }

    /// Numeric values of a column for the rows of this slice, in slice order
    pub fn values(&self, name: &str) -> Result<Vec<f64>, TableError> {
        let column = self.table.column(name)?;
        let values = match column {
            ColumnData::Float(v) => self.indices.iter().map(|&i| v[i]).collect(),
            ColumnData::Int(v) => self.indices.iter().map(|&i| v[i] as f64).collect(),
            ColumnData::Time(v) => self
                .indices
                .iter()
                .map(|&i| timestamp_to_mjd(v[i]))
                .collect(),
            ColumnData::Text(_) => {
                return Err(TableError::NotNumeric {
                    column: name.to_string(),
                    kind: ColumnKind::Text,
                });
            }
        };
        Ok(values)
    }

    /// Cell values of a column for the rows of this slice
    pub fn cells(&self, name: &str) -> Result<Vec<Value>, TableError> {
        let column = self.table.column(name)?;
        Ok(self.indices.iter().map(|&i| column.value(i)).collect())
    }
}
