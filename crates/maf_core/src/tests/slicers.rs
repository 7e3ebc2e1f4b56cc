//! Tests for slicer partitioning
//!
//! These tests verify:
//! - Every slicer can be iterated repeatedly with identical results
//! - Uni, 1-D and group-by partitions are disjoint and cover the kept rows
//! - 1-D edge semantics (half-open bins, closed last bin, dropped rows)
//! - HEALPix partition count and radius membership

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::metrics::{Metric, SimpleMetric};
use crate::slicers::{BinSpec, PartitionGeometry, Slicer, SlicerSpec};
use crate::table::{ColumnData, DataSlice, Table, Value};

fn visits(n: usize, seed: u64) -> Table {
    let mut rng = StdRng::seed_from_u64(seed);
    let field: Vec<i64> = (0..n).map(|_| rng.random_range(0..20)).collect();
    Table::from_columns([
        ("fieldID", ColumnData::Int(field.clone())),
        (
            "fieldRA",
            ColumnData::Float(field.iter().map(|&f| f as f64 * 18.0).collect()),
        ),
        (
            "fieldDec",
            ColumnData::Float(field.iter().map(|&f| -60.0 + f as f64 * 3.0).collect()),
        ),
        (
            "airmass",
            ColumnData::Float((0..n).map(|_| rng.random_range(1.0..2.5)).collect()),
        ),
        (
            "night",
            ColumnData::Int((0..n).map(|_| rng.random_range(0..10)).collect()),
        ),
        (
            "expMJD",
            ColumnData::Float((0..n).map(|_| 60_000.0 + rng.random_range(0.0..10.0)).collect()),
        ),
    ])
    .unwrap()
}

fn all_specs() -> Vec<SlicerSpec> {
    vec![
        SlicerSpec::Uni,
        SlicerSpec::one_d("airmass", 7, None),
        SlicerSpec::OneD {
            column: "airmass".to_string(),
            bins: BinSpec::Auto,
            range: None,
        },
        SlicerSpec::healpix(4, "fieldRA", "fieldDec"),
        SlicerSpec::opsim_field(),
        SlicerSpec::night(),
    ]
}

fn set_up(spec: &SlicerSpec, table: &Table) -> Box<dyn Slicer> {
    let mut slicer = spec.build().unwrap();
    slicer.setup(table).unwrap();
    slicer
}

/// Angular distance in degrees between two (lon, lat) positions in degrees
fn separation_deg(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().min(1.0).asin().to_degrees()
}

/// Iterating twice yields the same partitions for every slicer
#[test]
fn test_iteration_is_restartable() {
    let table = visits(500, 1);
    for spec in all_specs() {
        let slicer = set_up(&spec, &table);
        let index = slicer.partitions().unwrap();
        let first: Vec<(usize, Vec<usize>)> =
            index.iter().map(|p| (p.id, p.rows.to_vec())).collect();
        let second: Vec<(usize, Vec<usize>)> =
            index.iter().map(|p| (p.id, p.rows.to_vec())).collect();
        assert_eq!(first, second, "{spec}");
        assert_eq!(first.len(), slicer.len().unwrap(), "{spec}");
    }
}

/// Partitions are unavailable before setup
#[test]
fn test_partitions_require_setup() {
    for spec in all_specs() {
        let slicer = spec.build().unwrap();
        assert!(slicer.partitions().is_err(), "{spec}");
        assert!(slicer.geometry(0).is_none(), "{spec}");
    }
}

/// Setting up again against another table replaces the index
#[test]
fn test_setup_replaces_index() {
    let mut slicer = SlicerSpec::Uni.build().unwrap();
    slicer.setup(&visits(10, 2)).unwrap();
    slicer.setup(&visits(25, 3)).unwrap();
    let index = slicer.partitions().unwrap();
    assert_eq!(index.get(0).unwrap().len(), 25);
}

/// The uni slicer holds every row and reproduces the whole-table metric
#[test]
fn test_uni_matches_whole_table() {
    let table = visits(300, 4);
    let slicer = set_up(&SlicerSpec::Uni, &table);
    let index = slicer.partitions().unwrap();
    assert_eq!(index.len(), 1);

    let all_rows: Vec<usize> = (0..table.num_rows()).collect();
    let metric = SimpleMetric::mean("airmass");
    let whole = metric.run(&DataSlice::new(&table, &all_rows)).unwrap();
    let sliced = metric
        .run(&DataSlice::new(&table, index.get(0).unwrap()))
        .unwrap();
    assert_eq!(whole, sliced);
    assert_eq!(slicer.geometry(0), Some(PartitionGeometry::Global));
}

/// Disjoint slicers place each row in at most one partition, and every
/// finite row in exactly one
#[test]
fn test_disjoint_slicers_cover_rows() {
    let table = visits(400, 5);
    for spec in [
        SlicerSpec::Uni,
        SlicerSpec::one_d("airmass", 9, None),
        SlicerSpec::opsim_field(),
        SlicerSpec::night(),
    ] {
        let slicer = set_up(&spec, &table);
        let mut seen = vec![0usize; table.num_rows()];
        for partition in slicer.partitions().unwrap().iter() {
            for &row in partition.rows {
                seen[row] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1), "{spec}");
    }
}

/// Values on an inner edge go to the upper bin; the top edge stays in the last bin
#[test]
fn test_one_d_edge_membership() {
    let values = vec![1.0, 1.5, 2.0, 2.5, 3.0, 0.5, 3.5, f64::NAN];
    let table = Table::from_columns([("x", ColumnData::Float(values))]).unwrap();
    let spec = SlicerSpec::OneD {
        column: "x".to_string(),
        bins: BinSpec::Edges(vec![1.0, 2.0, 3.0]),
        range: None,
    };
    let slicer = set_up(&spec, &table);
    let index = slicer.partitions().unwrap();

    assert_eq!(index.len(), 2);
    assert_eq!(index.get(0).unwrap(), &[0, 1]);
    assert_eq!(index.get(1).unwrap(), &[2, 3, 4]);
    // 0.5, 3.5 and NaN are dropped
    assert_eq!(index.total_rows(), 5);
    assert_eq!(
        slicer.geometry(1),
        Some(PartitionGeometry::Bin {
            low: 2.0,
            high: 3.0
        })
    );
}

/// Each row lands in the single bin whose edges bracket it
#[test]
fn test_one_d_bins_bracket_values() {
    let table = visits(1000, 6);
    let slicer = set_up(&SlicerSpec::one_d("airmass", 5, Some([1.0, 2.5])), &table);
    let airmass = table.numeric("airmass").unwrap();
    let index = slicer.partitions().unwrap();
    for partition in index.iter() {
        let Some(PartitionGeometry::Bin { low, high }) = slicer.geometry(partition.id) else {
            panic!("expected bin geometry");
        };
        let last = partition.id == index.len() - 1;
        for &row in partition.rows {
            let v = airmass[row];
            assert!(v >= low && (v < high || (last && v <= high)));
        }
    }
}

/// Fixed-width bins over the data range keep the row at the maximum
#[test]
fn test_one_d_bin_size_keeps_data_max() {
    let table = Table::from_columns([("x", ColumnData::Float(vec![0.0, 5.0, 19.14]))]).unwrap();
    let spec = SlicerSpec::OneD {
        column: "x".to_string(),
        bins: BinSpec::Size(0.58),
        range: None,
    };
    let slicer = set_up(&spec, &table);
    let index = slicer.partitions().unwrap();
    assert_eq!(index.total_rows(), 3);
    assert_eq!(index.get(index.len() - 1).unwrap(), &[2]);
}

/// The HEALPix domain is 12 * nside^2 cells whatever the data
#[test]
fn test_healpix_partition_count() {
    let empty = Table::from_columns([
        ("fieldRA", ColumnData::Float(vec![])),
        ("fieldDec", ColumnData::Float(vec![])),
    ])
    .unwrap();
    for nside in [1, 2, 8] {
        let spec = SlicerSpec::healpix(nside, "fieldRA", "fieldDec");
        let slicer = set_up(&spec, &empty);
        let expected = 12 * (nside as usize).pow(2);
        assert_eq!(slicer.len().unwrap(), expected);
        assert_eq!(slicer.partitions().unwrap().total_rows(), 0);

        let populated = set_up(&spec, &visits(200, 7));
        assert_eq!(populated.len().unwrap(), expected);
    }
}

/// A row belongs to a pixel exactly when it lies within the radius of the center
#[test]
fn test_healpix_radius_membership() {
    let mut rng = StdRng::seed_from_u64(8);
    let n = 3_000;
    let ra: Vec<f64> = (0..n).map(|_| rng.random_range(0.0..360.0)).collect();
    let dec: Vec<f64> = (0..n)
        .map(|_| rng.random_range(-1.0f64..1.0).asin().to_degrees())
        .collect();
    let table = Table::from_columns([
        ("ra", ColumnData::Float(ra.clone())),
        ("dec", ColumnData::Float(dec.clone())),
    ])
    .unwrap();

    let radius = 5.0;
    let spec = SlicerSpec::Healpix {
        nside: 4,
        lon_col: "ra".to_string(),
        lat_col: "dec".to_string(),
        lat_lon_deg: true,
        radius_deg: radius,
        leaf_size: 32,
    };
    let slicer = set_up(&spec, &table);
    for partition in slicer.partitions().unwrap().iter() {
        let Some(PartitionGeometry::Pixel {
            lon_deg, lat_deg, ..
        }) = slicer.geometry(partition.id)
        else {
            panic!("expected pixel geometry");
        };
        let inside: Vec<usize> = (0..n)
            .filter(|&i| separation_deg(lon_deg, lat_deg, ra[i], dec[i]) <= radius)
            .collect();
        // Allow for rounding at the boundary
        for &row in partition.rows {
            assert!(separation_deg(lon_deg, lat_deg, ra[row], dec[row]) <= radius + 1e-6);
        }
        let missed = inside
            .iter()
            .filter(|&&i| !partition.rows.contains(&i))
            .filter(|&&i| separation_deg(lon_deg, lat_deg, ra[i], dec[i]) < radius - 1e-6)
            .count();
        assert_eq!(missed, 0, "pixel {}", partition.id);
    }
}

/// Radians input gives the same partitions as degrees input
#[test]
fn test_healpix_radians_flag() {
    let table = visits(300, 9);
    let ra = table.numeric("fieldRA").unwrap().to_vec();
    let dec = table.numeric("fieldDec").unwrap().to_vec();
    let radians = Table::from_columns([
        (
            "fieldRA",
            ColumnData::Float(ra.iter().map(|v| v.to_radians()).collect()),
        ),
        (
            "fieldDec",
            ColumnData::Float(dec.iter().map(|v| v.to_radians()).collect()),
        ),
    ])
    .unwrap();

    let degrees = set_up(&SlicerSpec::healpix(8, "fieldRA", "fieldDec"), &table);
    let radians_spec = SlicerSpec::Healpix {
        nside: 8,
        lon_col: "fieldRA".to_string(),
        lat_col: "fieldDec".to_string(),
        lat_lon_deg: false,
        radius_deg: 1.75,
        leaf_size: 100,
    };
    let rad = set_up(&radians_spec, &radians);
    assert_eq!(degrees.partitions().unwrap(), rad.partitions().unwrap());
}

/// Group-by partitions follow sorted distinct keys and carry field positions
#[test]
fn test_group_by_domain() {
    let table = Table::from_columns([
        ("fieldID", ColumnData::Int(vec![5, 3, 5, 9])),
        ("fieldRA", ColumnData::Float(vec![10.0, 20.0, 10.0, 30.0])),
        ("fieldDec", ColumnData::Float(vec![-5.0, -6.0, -5.0, -7.0])),
    ])
    .unwrap();
    let slicer = set_up(&SlicerSpec::opsim_field(), &table);
    let index = slicer.partitions().unwrap();
    assert_eq!(index.len(), 3);
    assert_eq!(index.get(1).unwrap(), &[0, 2]);
    assert_eq!(
        slicer.geometry(0),
        Some(PartitionGeometry::Group {
            key: vec![Value::Int(3)],
            lon_deg: Some(20.0),
            lat_deg: Some(-6.0),
        })
    );
}

/// Multi-column keys split on every column
#[test]
fn test_group_by_multiple_columns() {
    let table = Table::from_columns([
        ("fieldID", ColumnData::Int(vec![1, 1, 1, 2])),
        (
            "filter",
            ColumnData::Text(vec!["r".into(), "g".into(), "r".into(), "r".into()]),
        ),
    ])
    .unwrap();
    let spec = SlicerSpec::GroupBy {
        columns: vec!["fieldID".to_string(), "filter".to_string()],
        lon_col: None,
        lat_col: None,
        lat_lon_deg: true,
    };
    let slicer = set_up(&spec, &table);
    assert_eq!(slicer.len().unwrap(), 3);
    assert_eq!(slicer.partitions().unwrap().get(1).unwrap(), &[0, 2]);
}

/// Night partitions are sorted by time
#[test]
fn test_night_partitions_time_ordered() {
    let table = visits(500, 10);
    let slicer = set_up(&SlicerSpec::night(), &table);
    assert!(slicer.time_ordered());
    let times = table.numeric("expMJD").unwrap();
    for partition in slicer.partitions().unwrap().iter() {
        assert!(
            partition
                .rows
                .windows(2)
                .all(|w| times[w[0]] <= times[w[1]])
        );
    }
}
