//! HEALPix sky grid slicer (ring ordering).

use std::f64::consts::{FRAC_PI_2, PI};

use tracing::debug;

use super::kdtree::{KdTree, chord_length, unit_vector};
use super::{PartitionGeometry, PartitionIndex, Slicer, SlicerSpec};
use crate::error::SlicerError;
use crate::table::Table;

/// Colatitude and longitude, in radians, of the center of ring-scheme pixel `ipix`.
///
/// `ipix` must be below `12 * nside^2`.
#[must_use]
pub fn pix2ang_ring(nside: u32, ipix: u64) -> (f64, f64) {
    let nside = u64::from(nside);
    let npix = 12 * nside * nside;
    let ncap = 2 * nside * (nside - 1);
    let nside_f = nside as f64;

    let (z, phi) = if ipix < ncap {
        // North polar cap
        let iring = (1 + (1 + 2 * ipix).isqrt()) / 2;
        let iphi = ipix + 1 - 2 * iring * (iring - 1);
        let z = 1.0 - (iring * iring) as f64 / (3.0 * nside_f * nside_f);
        let phi = (iphi as f64 - 0.5) * FRAC_PI_2 / iring as f64;
        (z, phi)
    } else if ipix < npix - ncap {
        // Equatorial belt
        let ip = ipix - ncap;
        let iring = ip / (4 * nside) + nside;
        let iphi = ip % (4 * nside) + 1;
        let fodd = if (iring + nside) % 2 == 1 { 1.0 } else { 0.5 };
        let z = (2 * nside) as f64 - iring as f64;
        let z = z * 2.0 / (3.0 * nside_f);
        let phi = (iphi as f64 - fodd) * FRAC_PI_2 / nside_f;
        (z, phi)
    } else {
        // South polar cap
        let ip = npix - ipix;
        let iring = (1 + (2 * ip - 1).isqrt()) / 2;
        let iphi = 4 * iring + 1 - (ip - 2 * iring * (iring - 1));
        let z = -1.0 + (iring * iring) as f64 / (3.0 * nside_f * nside_f);
        let phi = (iphi as f64 - 0.5) * FRAC_PI_2 / iring as f64;
        (z, phi)
    };

    (z.clamp(-1.0, 1.0).acos(), phi)
}

/// Center of a pixel as `(lon_deg, lat_deg)`
fn pixel_center_deg(nside: u32, ipix: u64) -> (f64, f64) {
    let (theta, phi) = pix2ang_ring(nside, ipix);
    (phi.to_degrees(), (FRAC_PI_2 - theta).to_degrees())
}

/// Every pixel of a HEALPix grid is a partition; a pixel collects every row
/// whose position lies within the slicer radius of the pixel center.
///
/// The partition count is always `12 * nside^2`, whatever the data. Rows with
/// NaN coordinates belong to no pixel.
#[derive(Debug, Clone)]
pub struct HealpixSlicer {
    spec: SlicerSpec,
    index: Option<PartitionIndex>,
}

impl HealpixSlicer {
    /// Caller guarantees `spec` is a validated [`SlicerSpec::Healpix`]
    pub(crate) fn from_spec(spec: SlicerSpec) -> Self {
        Self { spec, index: None }
    }

    fn nside(&self) -> u32 {
        match self.spec {
            SlicerSpec::Healpix { nside, .. } => nside,
            _ => 1,
        }
    }

    /// Number of pixels in the grid
    #[must_use]
    pub fn npix(&self) -> usize {
        let nside = self.nside() as usize;
        12 * nside * nside
    }
}

impl Slicer for HealpixSlicer {
    fn spec(&self) -> &SlicerSpec {
        &self.spec
    }

    fn setup(&mut self, table: &Table) -> Result<(), SlicerError> {
        let SlicerSpec::Healpix {
            nside,
            lon_col,
            lat_col,
            lat_lon_deg,
            radius_deg,
            leaf_size,
        } = &self.spec
        else {
            return Err(SlicerError::NotSetUp);
        };

        let lon = table.numeric(lon_col)?;
        let lat = table.numeric(lat_col)?;
        let entries = lon
            .iter()
            .zip(lat.iter())
            .enumerate()
            .filter(|(_, (lon, lat))| lon.is_finite() && lat.is_finite())
            .map(|(row, (&lon, &lat))| {
                let (lon, lat) = if *lat_lon_deg {
                    (lon.to_radians(), lat.to_radians())
                } else {
                    (lon, lat)
                };
                (row, unit_vector(lon, lat))
            });
        let tree = KdTree::build(entries, *leaf_size);

        let radius = chord_length(radius_deg.to_radians());
        let groups = (0..self.npix() as u64).map(|ipix| {
            let (theta, phi) = pix2ang_ring(*nside, ipix);
            tree.within(unit_vector(phi, FRAC_PI_2 - theta), radius)
        });
        let index = PartitionIndex::from_groups(groups);

        debug!(
            nside = *nside,
            rows = tree.len(),
            memberships = index.total_rows(),
            "HEALPix index built"
        );
        self.index = Some(index);
        Ok(())
    }

    fn index(&self) -> Option<&PartitionIndex> {
        self.index.as_ref()
    }

    fn geometry(&self, id: usize) -> Option<PartitionGeometry> {
        if self.index.is_none() || id >= self.npix() {
            return None;
        }
        let (lon_deg, lat_deg) = pixel_center_deg(self.nside(), id as u64);
        Some(PartitionGeometry::Pixel {
            id,
            lon_deg: lon_deg.rem_euclid(360.0),
            lat_deg,
        })
    }
}

/// Mean spacing between pixel centers, in degrees
#[must_use]
pub fn pixel_resolution_deg(nside: u32) -> f64 {
    let npix = 12.0 * f64::from(nside) * f64::from(nside);
    (4.0 * PI / npix).sqrt().to_degrees()
}
