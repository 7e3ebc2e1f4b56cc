//! Synthetic survey generator.
//!
//! Writes a visit table with the column names of a scheduler simulation
//! output so configurations can be exercised without a real run. Each night
//! observes a random subset of fields twice, about half an hour apart, in a
//! single filter.

use std::path::Path;

use color_eyre::eyre::{WrapErr, eyre};
use maf_core::table::mjd_to_timestamp;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rusqlite::{Connection, params};
use tracing::info;

/// Site latitude used for airmass and hour angle
const SITE_LATITUDE_DEG: f64 = -30.2446;
/// Start of the first night, MJD
const SURVEY_START_MJD: f64 = 59_853.0;
const FILTERS: [&str; 6] = ["u", "g", "r", "i", "z", "y"];
/// Zenith dark-sky 5-sigma depths at 0.7" seeing, per filter
const BASE_M5: [f64; 6] = [23.9, 25.0, 24.7, 24.0, 23.3, 22.1];
const VISIT_EXP_TIME: f64 = 30.0;
const MAX_AIRMASS: f64 = 3.0;

/// Parameters of a synthetic survey
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub nights: u32,
    pub visits_per_night: usize,
    pub num_fields: usize,
    pub seed: u64,
    pub table: String,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            nights: 30,
            visits_per_night: 200,
            num_fields: 500,
            seed: 42,
            table: "Summary".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Field {
    id: i64,
    ra: f64,
    dec: f64,
}

/// One generated visit row
#[derive(Debug, Clone)]
struct Visit {
    field: Field,
    filter: usize,
    night: i64,
    mjd: f64,
    airmass: f64,
    seeing: f64,
    m5: f64,
    slew_time: f64,
    lst: f64,
}

/// Altitude in degrees of a position at hour angle `ha_deg`
fn altitude_deg(dec_deg: f64, ha_deg: f64) -> f64 {
    let (dec, ha, lat) = (
        dec_deg.to_radians(),
        ha_deg.to_radians(),
        SITE_LATITUDE_DEG.to_radians(),
    );
    (dec.sin() * lat.sin() + dec.cos() * lat.cos() * ha.cos())
        .clamp(-1.0, 1.0)
        .asin()
        .to_degrees()
}

fn generate_fields(rng: &mut StdRng, count: usize) -> Vec<Field> {
    // Uniform on the sphere between dec -90 and +30
    let max_sin = 30f64.to_radians().sin();
    (0..count)
        .map(|i| Field {
            id: i as i64 + 1,
            ra: rng.random_range(0.0..360.0),
            dec: rng.random_range(-1.0..max_sin).asin().to_degrees(),
        })
        .collect()
}

fn generate_visits(config: &SynthConfig) -> color_eyre::Result<Vec<Visit>> {
    if config.num_fields == 0 {
        return Err(eyre!("synthetic survey needs at least one field"));
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let fields = generate_fields(&mut rng, config.num_fields);
    let seeing_dist = Normal::<f64>::new(0.7, 0.12)?;

    let per_pass = config.visits_per_night.div_ceil(2).min(fields.len());
    let mut visits = Vec::with_capacity(config.nights as usize * config.visits_per_night);
    for night in 0..config.nights {
        let filter = rng.random_range(0..FILTERS.len());
        let tonight: Vec<Field> = fields.choose_multiple(&mut rng, per_pass).copied().collect();
        let mut mjd = SURVEY_START_MJD + f64::from(night) + 0.05;

        for pass in 0..2 {
            let remaining = config.visits_per_night - pass * per_pass;
            for field in tonight.iter().take(remaining) {
                let slew_time = rng.random_range(2.0..12.0);
                mjd += (slew_time + VISIT_EXP_TIME) / 86_400.0;

                // Keep hour angles small enough that every field is observable
                let ha: f64 = rng.random_range(-30.0..30.0);
                let alt = altitude_deg(field.dec, ha).max(20.0);
                let airmass = (1.0 / alt.to_radians().sin()).min(MAX_AIRMASS);
                let seeing = seeing_dist.sample(&mut rng).max(0.35) * airmass.powf(0.6);
                let m5 = BASE_M5[filter] - 1.25 * (seeing / 0.7).log10() - 0.3 * (airmass - 1.0);

                visits.push(Visit {
                    field: *field,
                    filter,
                    night: i64::from(night),
                    mjd,
                    airmass,
                    seeing,
                    m5,
                    slew_time,
                    lst: (field.ra + ha).rem_euclid(360.0),
                });
            }
        }
    }
    Ok(visits)
}

/// Write a synthetic survey into `path`, replacing the table if it exists.
/// Returns the number of visits written.
pub fn write_survey(path: &Path, config: &SynthConfig) -> color_eyre::Result<usize> {
    let visits = generate_visits(config)?;
    let mut conn =
        Connection::open(path).wrap_err_with(|| format!("opening {}", path.display()))?;
    let table = config.table.replace('"', "\"\"");

    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS \"{table}\";
        CREATE TABLE \"{table}\" (
            obsHistID INTEGER PRIMARY KEY,
            fieldID INTEGER NOT NULL,
            fieldRA REAL NOT NULL,
            fieldDec REAL NOT NULL,
            filter TEXT NOT NULL,
            night INTEGER NOT NULL,
            expMJD REAL NOT NULL,
            observationStartTime TEXT NOT NULL,
            airmass REAL NOT NULL,
            finSeeing REAL NOT NULL,
            fivesigma_modified REAL NOT NULL,
            visitExpTime REAL NOT NULL,
            slewTime REAL NOT NULL,
            lst REAL NOT NULL
        );"
    ))?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO \"{table}\" (fieldID, fieldRA, fieldDec, filter, night, expMJD,
                observationStartTime, airmass, finSeeing, fivesigma_modified,
                visitExpTime, slewTime, lst)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ))?;
        for visit in &visits {
            let start = mjd_to_timestamp(visit.mjd)?;
            stmt.execute(params![
                visit.field.id,
                visit.field.ra,
                visit.field.dec,
                FILTERS[visit.filter],
                visit.night,
                visit.mjd,
                start.to_string(),
                visit.airmass,
                visit.seeing,
                visit.m5,
                VISIT_EXP_TIME,
                visit.slew_time,
                visit.lst,
            ])?;
        }
    }
    tx.commit()?;

    info!(
        path = %path.display(),
        table = %config.table,
        visits = visits.len(),
        nights = config.nights,
        "synthetic survey written"
    );
    Ok(visits.len())
}
