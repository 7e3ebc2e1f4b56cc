//! Scenario tests for the metrics engine
//!
//! Tests are organized by topic:
//! - `slicers` - Partitioning, restartable iteration and HEALPix geometry
//! - `metrics` - Metric catalogue, empty partitions and reduce functions
//! - `stackers` - Derived columns and dependency ordering
//! - `bundle` - Bundle validation, metadata and persistence records
//! - `runner` - Fetch amortization, failures and summaries end to end

mod bundle;
mod slicers;
