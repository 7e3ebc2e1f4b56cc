use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, UnitDisc};
use rustc_hash::FxHasher;

use super::{ExistingColumns, Stacker};
use crate::error::TableError;
use crate::table::{ColumnData, ColumnSet, Table, Value};

pub const DITHER_RA_COLUMN: &str = "randomDitherRA";
pub const DITHER_DEC_COLUMN: &str = "randomDitherDec";

/// Offsets every field pointing by a random point in a disc of radius
/// `max_dither_deg`.
///
/// Each field id gets its own offset, drawn from a generator seeded by the
/// stacker seed and the field id, so a field is dithered the same way no
/// matter which other fields a constraint selects.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomDitherStacker {
    field_id_col: String,
    ra_col: String,
    dec_col: String,
    degrees: bool,
    max_dither_deg: f64,
    seed: u64,
}

impl Default for RandomDitherStacker {
    fn default() -> Self {
        Self::new("fieldID", "fieldRA", "fieldDec", true, 1.75, 42)
    }
}

impl RandomDitherStacker {
    pub fn new(
        field_id_col: impl Into<String>,
        ra_col: impl Into<String>,
        dec_col: impl Into<String>,
        degrees: bool,
        max_dither_deg: f64,
        seed: u64,
    ) -> Self {
        Self {
            field_id_col: field_id_col.into(),
            ra_col: ra_col.into(),
            dec_col: dec_col.into(),
            degrees,
            max_dither_deg,
            seed,
        }
    }

    /// Offset in degrees `(d_ra_on_sky, d_dec)` for one field
    fn offset(&self, field: &Value) -> (f64, f64) {
        let mut hasher = FxHasher::default();
        field.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(self.seed ^ hasher.finish());
        let [dx, dy]: [f64; 2] = UnitDisc.sample(&mut rng);
        (dx * self.max_dither_deg, dy * self.max_dither_deg)
    }
}

impl Stacker for RandomDitherStacker {
    fn key(&self) -> String {
        format!(
            "RandomDither({},{},{},{},{},{})",
            self.field_id_col, self.ra_col, self.dec_col, self.degrees, self.max_dither_deg, self.seed
        )
    }

    fn columns_required(&self) -> ColumnSet {
        [
            self.field_id_col.as_str(),
            self.ra_col.as_str(),
            self.dec_col.as_str(),
        ]
        .into_iter()
        .collect()
    }

    fn columns_added(&self) -> ColumnSet {
        [DITHER_RA_COLUMN, DITHER_DEC_COLUMN].into_iter().collect()
    }

    fn on_existing(&self) -> ExistingColumns {
        ExistingColumns::Skip
    }

    fn compute(&self, table: &Table) -> Result<Vec<(String, ColumnData)>, TableError> {
        let fields = table.column(&self.field_id_col)?;
        let ra = table.numeric(&self.ra_col)?;
        let dec = table.numeric(&self.dec_col)?;

        let mut out_ra = Vec::with_capacity(ra.len());
        let mut out_dec = Vec::with_capacity(dec.len());
        for (row, (&r, &d)) in ra.iter().zip(dec.iter()).enumerate() {
            let (r, d) = if self.degrees {
                (r, d)
            } else {
                (r.to_degrees(), d.to_degrees())
            };
            let (dx, dy) = self.offset(&fields.value(row));

            let new_dec = (d + dy).clamp(-90.0, 90.0);
            let cos_dec = new_dec.to_radians().cos();
            let new_ra = if cos_dec > 1e-9 {
                (r + dx / cos_dec).rem_euclid(360.0)
            } else {
                r
            };

            if self.degrees {
                out_ra.push(new_ra);
                out_dec.push(new_dec);
            } else {
                out_ra.push(new_ra.to_radians());
                out_dec.push(new_dec.to_radians());
            }
        }

        Ok(vec![
            (DITHER_RA_COLUMN.to_string(), ColumnData::Float(out_ra)),
            (DITHER_DEC_COLUMN.to_string(), ColumnData::Float(out_dec)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::from_columns([
            ("fieldID", ColumnData::Int(vec![7, 7, 8])),
            ("fieldRA", ColumnData::Float(vec![10.0, 10.0, 10.0])),
            ("fieldDec", ColumnData::Float(vec![-30.0, -30.0, -30.0])),
        ])
        .unwrap()
    }

    #[test]
    fn test_same_field_same_offset() {
        let out = RandomDitherStacker::default().compute(&table()).unwrap();
        let ColumnData::Float(ra) = &out[0].1 else {
            panic!("expected float column");
        };
        let ColumnData::Float(dec) = &out[1].1 else {
            panic!("expected float column");
        };
        assert_eq!(ra[0], ra[1]);
        assert_eq!(dec[0], dec[1]);
        assert!((dec[0] + 30.0).abs() <= 1.75);
    }

    #[test]
    fn test_offset_independent_of_other_rows() {
        let stacker = RandomDitherStacker::default();
        let full = stacker.compute(&table()).unwrap();
        let only_eight = stacker.compute(&table().take(&[2])).unwrap();
        let (ColumnData::Float(a), ColumnData::Float(b)) = (&full[1].1, &only_eight[1].1) else {
            panic!("expected float columns");
        };
        assert_eq!(a[2], b[0]);
    }
}
