//! Command-line driver for the metrics analysis engine
//!
//! This crate connects [`maf_core`] to the outside world:
//! - YAML run configurations expanded into metric bundles
//! - Canned metadata batches over all bands and each filter
//! - A SQLite row source for scheduler simulation output
//! - JSON result files and a run index
//! - File and stderr logging
//! - A synthetic survey generator for demos and tests

// ============================================================================
// Modules
// ============================================================================

pub mod batches;
pub mod config;
pub mod logging;
pub mod output;
pub mod sqlite;
pub mod synth;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use batches::{AllMetadataBatch, BatchConfig, MetadataBatch, all_metadata};
pub use config::{BundleConfig, RunConfig};
pub use logging::init_logging;
pub use output::{summary_table, write_results};
pub use sqlite::SqliteSource;
pub use synth::{SynthConfig, write_survey};
