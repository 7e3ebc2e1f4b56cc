//! Stackers derive new columns from existing ones before slicing.
//!
//! Each stacker declares the columns it reads and the columns it adds. When a
//! group of bundles asks for several stackers, [`resolve_order`] removes
//! duplicates and sorts them so that a stacker runs after every stacker whose
//! output it reads.

mod airmass;
mod dither;
mod hour_angle;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, TableError};
use crate::table::{ColumnData, ColumnSet, Table};

pub use airmass::{NORM_AIRMASS_COLUMN, NormAirmassStacker};
pub use dither::{DITHER_DEC_COLUMN, DITHER_RA_COLUMN, RandomDitherStacker};
pub use hour_angle::{HOUR_ANGLE_COLUMN, HourAngleStacker};

/// What a stacker does when its output columns already exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingColumns {
    /// Recompute and replace them
    Overwrite,
    /// Leave them untouched if all of them are present
    Skip,
}

/// Derives columns from a table
pub trait Stacker: fmt::Debug + Send + Sync {
    /// Identity including parameters; stackers with equal keys are interchangeable
    fn key(&self) -> String;

    fn columns_required(&self) -> ColumnSet;

    fn columns_added(&self) -> ColumnSet;

    fn on_existing(&self) -> ExistingColumns {
        ExistingColumns::Overwrite
    }

    /// Compute the added columns, one value per row
    fn compute(&self, table: &Table) -> Result<Vec<(String, ColumnData)>, TableError>;
}

/// Run a stacker against a table, honouring its existing-column policy.
///
/// Returns `false` when the stacker was skipped.
pub fn apply_stacker(stacker: &dyn Stacker, table: &mut Table) -> Result<bool, TableError> {
    if stacker.on_existing() == ExistingColumns::Skip
        && stacker.columns_added().iter().all(|c| table.has_column(c))
    {
        return Ok(false);
    }
    for (name, data) in stacker.compute(table)? {
        table.set_column(name, data)?;
    }
    Ok(true)
}

/// Deduplicate stackers and order them by their column dependencies.
///
/// Ties keep the order of first appearance.
pub fn resolve_order(
    stackers: &[Arc<dyn Stacker>],
) -> Result<Vec<Arc<dyn Stacker>>, ConfigurationError> {
    let mut unique: Vec<Arc<dyn Stacker>> = Vec::new();
    for stacker in stackers {
        if !unique.iter().any(|s| s.key() == stacker.key()) {
            unique.push(Arc::clone(stacker));
        }
    }

    let mut producer: BTreeMap<String, usize> = BTreeMap::new();
    for (idx, stacker) in unique.iter().enumerate() {
        for column in stacker.columns_added().iter() {
            if let Some(&other) = producer.get(column) {
                return Err(ConfigurationError::DuplicateStackerOutput {
                    column: column.to_string(),
                    first: unique[other].key(),
                    second: stacker.key(),
                });
            }
            producer.insert(column.to_string(), idx);
        }
    }

    // Edges point from producer to consumer
    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); unique.len()];
    let mut pending: Vec<usize> = vec![0; unique.len()];
    for (idx, stacker) in unique.iter().enumerate() {
        for column in stacker.columns_required().iter() {
            if let Some(&source) = producer.get(column)
                && source != idx
                && dependents[source].insert(idx)
            {
                pending[idx] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..unique.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(unique.len());
    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for &next in &dependents[idx] {
            pending[next] -= 1;
            if pending[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() != unique.len() {
        let stuck: Vec<String> = (0..unique.len())
            .filter(|i| !order.contains(i))
            .map(|i| unique[i].key())
            .collect();
        return Err(ConfigurationError::StackerCycle(stuck.join(", ")));
    }

    Ok(order.into_iter().map(|i| Arc::clone(&unique[i])).collect())
}

fn default_true() -> bool {
    true
}

fn default_airmass_col() -> String {
    "airmass".to_string()
}

fn default_ra_col() -> String {
    "fieldRA".to_string()
}

fn default_dec_col() -> String {
    "fieldDec".to_string()
}

fn default_lst_col() -> String {
    "lst".to_string()
}

fn default_field_id_col() -> String {
    "fieldID".to_string()
}

fn default_site_latitude() -> f64 {
    airmass::CERRO_PACHON_LATITUDE_DEG
}

fn default_max_dither() -> f64 {
    1.75
}

fn default_seed() -> u64 {
    42
}

/// Description of a stacker, buildable into a [`Stacker`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StackerSpec {
    NormAirmass {
        #[serde(default = "default_airmass_col")]
        airmass_col: String,
        #[serde(default = "default_dec_col")]
        dec_col: String,
        #[serde(default = "default_true")]
        degrees: bool,
        #[serde(default = "default_site_latitude")]
        site_latitude_deg: f64,
    },
    HourAngle {
        #[serde(default = "default_lst_col")]
        lst_col: String,
        #[serde(default = "default_ra_col")]
        ra_col: String,
        #[serde(default = "default_true")]
        degrees: bool,
    },
    RandomDither {
        #[serde(default = "default_field_id_col")]
        field_id_col: String,
        #[serde(default = "default_ra_col")]
        ra_col: String,
        #[serde(default = "default_dec_col")]
        dec_col: String,
        #[serde(default = "default_true")]
        degrees: bool,
        #[serde(default = "default_max_dither")]
        max_dither_deg: f64,
        #[serde(default = "default_seed")]
        seed: u64,
    },
}

impl StackerSpec {
    /// Build and validate the stacker
    pub fn build(&self) -> Result<Arc<dyn Stacker>, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidParameter {
            component: "stacker",
            reason,
        };
        match self {
            StackerSpec::NormAirmass {
                airmass_col,
                dec_col,
                degrees,
                site_latitude_deg,
            } => {
                if !(-90.0..=90.0).contains(site_latitude_deg) {
                    return Err(invalid(format!(
                        "site latitude {site_latitude_deg} outside [-90, 90]"
                    )));
                }
                Ok(Arc::new(
                    NormAirmassStacker::new(airmass_col, dec_col, *degrees)
                        .with_site_latitude(*site_latitude_deg),
                ))
            }
            StackerSpec::HourAngle {
                lst_col,
                ra_col,
                degrees,
            } => Ok(Arc::new(HourAngleStacker::new(lst_col, ra_col, *degrees))),
            StackerSpec::RandomDither {
                field_id_col,
                ra_col,
                dec_col,
                degrees,
                max_dither_deg,
                seed,
            } => {
                if !(*max_dither_deg > 0.0 && *max_dither_deg < 90.0) {
                    return Err(invalid(format!(
                        "max dither {max_dither_deg} deg must be in (0, 90)"
                    )));
                }
                Ok(Arc::new(RandomDitherStacker::new(
                    field_id_col,
                    ra_col,
                    dec_col,
                    *degrees,
                    *max_dither_deg,
                    *seed,
                )))
            }
        }
    }
}
