//! Tests for the command-line driver
//!
//! Tests are organized by topic:
//! - `batches` - Canned metadata batches and their configuration
//! - `config` - YAML parsing and expansion into bundles
//! - `sqlite` - Row source typing, constraints and failures
//! - `pipeline` - Synthetic survey through run and result files

mod batches;
mod config;
