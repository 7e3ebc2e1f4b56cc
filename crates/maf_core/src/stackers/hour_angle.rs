use std::f64::consts::PI;

use super::Stacker;
use crate::error::TableError;
use crate::table::{ColumnData, ColumnSet, Table};

pub const HOUR_ANGLE_COLUMN: &str = "HA";

/// Hour angle `LST - RA` in hours, wrapped to `[-12, 12)`
#[derive(Debug, Clone, PartialEq)]
pub struct HourAngleStacker {
    lst_col: String,
    ra_col: String,
    degrees: bool,
}

impl Default for HourAngleStacker {
    fn default() -> Self {
        Self::new("lst", "fieldRA", true)
    }
}

impl HourAngleStacker {
    /// `degrees` describes both input columns; radians otherwise
    pub fn new(lst_col: impl Into<String>, ra_col: impl Into<String>, degrees: bool) -> Self {
        Self {
            lst_col: lst_col.into(),
            ra_col: ra_col.into(),
            degrees,
        }
    }

    fn to_hours(&self, angle: f64) -> f64 {
        if self.degrees {
            angle / 15.0
        } else {
            angle * 12.0 / PI
        }
    }
}

impl Stacker for HourAngleStacker {
    fn key(&self) -> String {
        format!("HourAngle({},{},{})", self.lst_col, self.ra_col, self.degrees)
    }

    fn columns_required(&self) -> ColumnSet {
        [self.lst_col.as_str(), self.ra_col.as_str()]
            .into_iter()
            .collect()
    }

    fn columns_added(&self) -> ColumnSet {
        [HOUR_ANGLE_COLUMN].into_iter().collect()
    }

    fn compute(&self, table: &Table) -> Result<Vec<(String, ColumnData)>, TableError> {
        let lst = table.numeric(&self.lst_col)?;
        let ra = table.numeric(&self.ra_col)?;
        let ha = lst
            .iter()
            .zip(ra.iter())
            .map(|(&l, &r)| (self.to_hours(l - r) + 12.0).rem_euclid(24.0) - 12.0)
            .collect();
        Ok(vec![(HOUR_ANGLE_COLUMN.to_string(), ColumnData::Float(ha))])
    }
}
