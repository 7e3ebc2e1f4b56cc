//! SQLite-backed row source.

use std::collections::BTreeSet;
use std::path::Path;

use jiff::Timestamp;
use maf_core::table::mjd_to_timestamp;
use maf_core::{ColumnData, ColumnSet, Constraint, DataFetchError, RowSource, Table};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

/// Reads visits from one table of a SQLite database.
///
/// Constraints are passed to SQLite verbatim as the `WHERE` clause. Column
/// types follow the storage classes of the fetched values; columns listed as
/// time columns are parsed into timestamps.
pub struct SqliteSource {
    conn: Connection,
    table: String,
    /// Declared name and type of every column, in schema order
    schema: Vec<(String, String)>,
    time_columns: BTreeSet<String>,
}

impl SqliteSource {
    /// Open a database read-only
    pub fn open(path: &Path, table: &str) -> Result<Self, DataFetchError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(db_error)?;
        Self::from_connection(conn, table)
    }

    pub fn from_connection(conn: Connection, table: &str) -> Result<Self, DataFetchError> {
        let schema = {
            let mut stmt = conn
                .prepare("SELECT name, type FROM pragma_table_info(?1)")
                .map_err(db_error)?;
            let columns = stmt
                .query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(db_error)?
                .collect::<Result<Vec<(String, String)>, _>>()
                .map_err(db_error)?;
            columns
        };
        if schema.is_empty() {
            return Err(DataFetchError::Source(format!(
                "table '{table}' does not exist or has no columns"
            )));
        }
        Ok(Self {
            conn,
            table: table.to_string(),
            schema,
            time_columns: BTreeSet::new(),
        })
    }

    #[must_use]
    pub fn with_time_columns(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.time_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Columns offered by the table
    #[must_use]
    pub fn columns(&self) -> ColumnSet {
        self.schema.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn declared_type(&self, column: &str) -> &str {
        self.schema
            .iter()
            .find(|(name, _)| name == column)
            .map_or("", |(_, ty)| ty.as_str())
    }
}

impl RowSource for SqliteSource {
    fn fetch(&self, columns: &ColumnSet, constraint: &Constraint) -> Result<Table, DataFetchError> {
        let offered = self.columns();
        if let Some(missing) = columns.iter().find(|c| !offered.contains(c)) {
            return Err(DataFetchError::UnknownColumn(missing.to_string()));
        }
        let names: Vec<&str> = columns.iter().collect();
        if names.is_empty() {
            return Ok(Table::new());
        }

        let mut sql = format!(
            "SELECT {} FROM {}",
            names
                .iter()
                .map(|n| quote_ident(n))
                .collect::<Vec<_>>()
                .join(", "),
            quote_ident(&self.table)
        );
        if !constraint.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(constraint.as_str());
        }
        debug!(sql = %sql, "querying visits");

        let mut stmt = self.conn.prepare(&sql).map_err(|e| {
            DataFetchError::Source(format!("cannot evaluate \"{constraint}\": {e}"))
        })?;
        let mut cells: Vec<Vec<SqlValue>> = vec![Vec::new(); names.len()];
        let mut rows = stmt.query([]).map_err(db_error)?;
        while let Some(row) = rows.next().map_err(db_error)? {
            for (i, column) in cells.iter_mut().enumerate() {
                column.push(row.get::<_, SqlValue>(i).map_err(db_error)?);
            }
        }

        let mut table = Table::new();
        for (name, values) in names.iter().zip(cells) {
            let data = if self.time_columns.contains(*name) {
                time_column(name, values)?
            } else {
                infer_column(values, self.declared_type(name))
            };
            table.push_column(*name, data)?;
        }
        Ok(table)
    }
}

fn db_error(err: rusqlite::Error) -> DataFetchError {
    DataFetchError::Source(err.to_string())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Pick a column type from the storage classes present.
///
/// Integers with nulls or mixed with reals become floats with NaN for null.
/// Any text makes the column text. An empty result falls back to the
/// declared column type.
fn infer_column(values: Vec<SqlValue>, declared: &str) -> ColumnData {
    let mut has_text = false;
    let mut has_real = false;
    let mut has_int = false;
    let mut has_null = false;
    for value in &values {
        match value {
            SqlValue::Text(_) | SqlValue::Blob(_) => has_text = true,
            SqlValue::Real(_) => has_real = true,
            SqlValue::Integer(_) => has_int = true,
            SqlValue::Null => has_null = true,
        }
    }

    if values.is_empty() {
        let declared = declared.to_ascii_uppercase();
        return if declared.contains("INT") {
            ColumnData::Int(Vec::new())
        } else if declared.contains("CHAR") || declared.contains("TEXT") || declared.contains("CLOB")
        {
            ColumnData::Text(Vec::new())
        } else {
            ColumnData::Float(Vec::new())
        };
    }

    if has_text {
        ColumnData::Text(
            values
                .into_iter()
                .map(|v| match v {
                    SqlValue::Text(s) => s,
                    SqlValue::Integer(i) => i.to_string(),
                    SqlValue::Real(f) => f.to_string(),
                    SqlValue::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
                    SqlValue::Null => String::new(),
                })
                .collect(),
        )
    } else if has_int && !has_real && !has_null {
        ColumnData::Int(
            values
                .into_iter()
                .map(|v| match v {
                    SqlValue::Integer(i) => i,
                    _ => 0,
                })
                .collect(),
        )
    } else {
        ColumnData::Float(
            values
                .into_iter()
                .map(|v| match v {
                    SqlValue::Integer(i) => i as f64,
                    SqlValue::Real(f) => f,
                    _ => f64::NAN,
                })
                .collect(),
        )
    }
}

/// Text is parsed as RFC 3339, reals as MJD and integers as Unix seconds
fn time_column(name: &str, values: Vec<SqlValue>) -> Result<ColumnData, DataFetchError> {
    let bad = |detail: String| DataFetchError::Source(format!("time column '{name}': {detail}"));
    let timestamps = values
        .into_iter()
        .map(|v| match v {
            SqlValue::Text(s) => s
                .parse::<Timestamp>()
                .map_err(|e| bad(format!("'{s}': {e}"))),
            SqlValue::Real(mjd) => mjd_to_timestamp(mjd).map_err(|e| bad(e.to_string())),
            SqlValue::Integer(secs) => {
                Timestamp::from_second(secs).map_err(|e| bad(e.to_string()))
            }
            SqlValue::Null => Err(bad("null value".to_string())),
            SqlValue::Blob(_) => Err(bad("binary value".to_string())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ColumnData::Time(timestamps))
}
