use crate::table::ColumnKind;

/// Errors raised by table construction and column access
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("column '{column}' has {found} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("column '{column}' holds {kind:?} values and cannot be read as numbers")]
    NotNumeric { column: String, kind: ColumnKind },
}

/// Malformed bundle or component parameters.
///
/// Always raised while a bundle (or one of its components) is being built,
/// never while it executes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("bundle '{bundle}' requires column '{column}' which is neither a source column nor produced by a stacker")]
    MissingColumn { bundle: String, column: String },

    #[error("metric '{metric}' cannot run on a {slicer} slicer: {reason}")]
    IncompatibleSlicer {
        metric: String,
        slicer: String,
        reason: &'static str,
    },

    #[error("invalid constraint \"{constraint}\": {reason}")]
    InvalidConstraint {
        constraint: String,
        reason: &'static str,
    },

    #[error("invalid {component} parameter: {reason}")]
    InvalidParameter {
        component: &'static str,
        reason: String,
    },

    #[error("stackers '{first}' and '{second}' both produce column '{column}'")]
    DuplicateStackerOutput {
        column: String,
        first: String,
        second: String,
    },

    #[error("stacker dependency cycle between: {0}")]
    StackerCycle(String),

    #[error("summary metric '{metric}' must read only the 'metricdata' column, found '{column}'")]
    InvalidSummaryMetric { metric: String, column: String },
}

/// Row source failures. Fatal to the group being processed; never retried here.
#[derive(Debug, thiserror::Error)]
pub enum DataFetchError {
    #[error("row source has no column '{0}'")]
    UnknownColumn(String),

    #[error("row source cannot evaluate constraint \"{0}\"")]
    UnsupportedConstraint(String),

    #[error("row source error: {0}")]
    Source(String),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// A metric or reduce function failed on one partition
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("{0} is undefined for this data")]
    Undefined(&'static str),

    #[error("reduce function '{0}' expects a structured metric value")]
    NotStructured(&'static str),
}

/// Failures while a slicer builds its partition index
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SlicerError {
    #[error("slicer has not been set up")]
    NotSetUp,

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("cannot derive bin edges for column '{0}': no finite values and no explicit range")]
    EmptyRange(String),
}

/// Top-level error for an execution pass.
///
/// Every variant that aborts work names the constraint (and bundle, where one
/// is involved) so the failure can be traced back to its configuration.
#[derive(Debug, thiserror::Error)]
pub enum MafError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("fetch failed for constraint \"{constraint}\": {source}")]
    Fetch {
        constraint: String,
        #[source]
        source: DataFetchError,
    },

    #[error("stacker '{stacker}' failed for constraint \"{constraint}\": {source}")]
    Stacker {
        stacker: String,
        constraint: String,
        #[source]
        source: TableError,
    },

    #[error("{slicer} slicer setup failed for constraint \"{constraint}\": {source}")]
    SlicerSetup {
        slicer: String,
        constraint: String,
        #[source]
        source: SlicerError,
    },

    #[error("metric '{metric}' failed on partition {partition} of bundle '{bundle}' (constraint \"{constraint}\"): {source}")]
    Partition {
        bundle: String,
        metric: String,
        constraint: String,
        partition: usize,
        #[source]
        source: MetricError,
    },
}
