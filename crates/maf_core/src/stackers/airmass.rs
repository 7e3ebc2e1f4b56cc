use super::Stacker;
use crate::error::TableError;
use crate::table::{ColumnData, ColumnSet, Table};

/// Geodetic latitude of Cerro Pachon
pub(crate) const CERRO_PACHON_LATITUDE_DEG: f64 = -30.2446;

pub const NORM_AIRMASS_COLUMN: &str = "normairmass";

/// Airmass divided by the lowest airmass the pointing can reach from the site.
///
/// A field transits at zenith distance `|dec - latitude|`, so the minimum
/// airmass is `1 / cos(|dec - latitude|)` and the normalized airmass is
/// `airmass * cos(|dec - latitude|)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormAirmassStacker {
    airmass_col: String,
    dec_col: String,
    degrees: bool,
    site_latitude_deg: f64,
}

impl Default for NormAirmassStacker {
    fn default() -> Self {
        Self::new("airmass", "fieldDec", true)
    }
}

impl NormAirmassStacker {
    pub fn new(airmass_col: impl Into<String>, dec_col: impl Into<String>, degrees: bool) -> Self {
        Self {
            airmass_col: airmass_col.into(),
            dec_col: dec_col.into(),
            degrees,
            site_latitude_deg: CERRO_PACHON_LATITUDE_DEG,
        }
    }

    #[must_use]
    pub fn with_site_latitude(mut self, latitude_deg: f64) -> Self {
        self.site_latitude_deg = latitude_deg;
        self
    }
}

impl Stacker for NormAirmassStacker {
    fn key(&self) -> String {
        format!(
            "NormAirmass({},{},{},{})",
            self.airmass_col, self.dec_col, self.degrees, self.site_latitude_deg
        )
    }

    fn columns_required(&self) -> ColumnSet {
        [self.airmass_col.as_str(), self.dec_col.as_str()]
            .into_iter()
            .collect()
    }

    fn columns_added(&self) -> ColumnSet {
        [NORM_AIRMASS_COLUMN].into_iter().collect()
    }

    fn compute(&self, table: &Table) -> Result<Vec<(String, ColumnData)>, TableError> {
        let airmass = table.numeric(&self.airmass_col)?;
        let dec = table.numeric(&self.dec_col)?;
        let latitude = self.site_latitude_deg.to_radians();

        let normalized = airmass
            .iter()
            .zip(dec.iter())
            .map(|(&am, &d)| {
                let d = if self.degrees { d.to_radians() } else { d };
                am * (d - latitude).abs().cos()
            })
            .collect();
        Ok(vec![(
            NORM_AIRMASS_COLUMN.to_string(),
            ColumnData::Float(normalized),
        )])
    }
}
