use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::feature::FeatureSet;
use crate::data::tolerance::{ElutionMode, MassMode, MassToleranceKind};
use crate::error::MatchError;

/// A feature projected onto the matching plane.
///
/// `index` refers back into the originating feature set.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub index: usize,
    pub mass: f64,
    pub elution: f64,
}

/// One non-empty cell of a 2-D mass x elution partition.
///
/// `members` holds the projected features per originating set, in input
/// order (set 0 is the master by convention, set 1 the slave). Summaries
/// live for one partition pass and are consumed by the calling matcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub mass_cell: i64,
    pub elution_cell: i64,
    pub members: Vec<Vec<GridPoint>>,
}

impl BucketSummary {
    fn new(mass_cell: i64, elution_cell: i64, set_count: usize) -> Self {
        BucketSummary {
            mass_cell,
            elution_cell,
            members: vec![Vec::new(); set_count],
        }
    }

    /// Number of originating sets with at least one member in this cell.
    pub fn set_count(&self) -> usize {
        self.members.iter().filter(|m| !m.is_empty()).count()
    }

    /// Total members across all sets.
    pub fn member_count(&self) -> usize {
        self.members.iter().map(|m| m.len()).sum()
    }
}

/// Projects a feature set onto (mass, elution) grid points.
pub fn project_feature_set(
    set: &FeatureSet,
    mass_mode: MassMode,
    elution_mode: ElutionMode,
) -> Vec<GridPoint> {
    set.features
        .iter()
        .enumerate()
        .map(|(index, feature)| GridPoint {
            index,
            mass: feature.mass_value(mass_mode),
            elution: feature.elution_value(elution_mode),
        })
        .collect()
}

fn mass_cell_index(mass: f64, origin: f64, bucket_size: f64, kind: MassToleranceKind) -> i64 {
    match kind {
        MassToleranceKind::Absolute => ((mass - origin) / bucket_size).floor() as i64,
        // Boundaries grow multiplicatively so one cell spans `bucket_size`
        // PPM of its own lower boundary: b_{k+1} = b_k * (1 + size * 1e-6).
        MassToleranceKind::Ppm => {
            let ratio = 1.0 + bucket_size * 1e-6;
            ((mass / origin).ln() / ratio.ln()).floor() as i64
        }
    }
}

fn elution_cell_index(elution: f64, origin: f64, bucket_size: f64) -> i64 {
    ((elution - origin) / bucket_size).floor() as i64
}

/// Partitions projected feature sets into 2-D grid cells.
///
/// Cell widths are `mass_bucket_size` and `elution_bucket_size`, with axis
/// origins at the union minima. The elution axis is always uniform. The mass
/// axis is uniform for `Absolute` tolerances; for `Ppm` the bucket size is in
/// PPM of the running boundary, so cells are narrower at low mass and wider
/// at high mass. Every point lands in exactly one cell, one `BucketSummary`
/// is emitted per non-empty cell, and cells come back sorted by cell key.
///
/// # Arguments
///
/// * `sets` - One projected point list per originating feature set.
/// * `mass_bucket_size` - Mass cell width, Dalton or PPM depending on kind.
/// * `elution_bucket_size` - Elution cell width.
/// * `mass_kind` - How `mass_bucket_size` is interpreted.
pub fn partition_points(
    sets: &[Vec<GridPoint>],
    mass_bucket_size: f64,
    elution_bucket_size: f64,
    mass_kind: MassToleranceKind,
) -> Result<Vec<BucketSummary>, MatchError> {
    if !mass_bucket_size.is_finite() || mass_bucket_size <= 0.0 {
        return Err(MatchError::InvalidTolerance(format!(
            "mass bucket size must be positive and finite, got {}",
            mass_bucket_size
        )));
    }
    if !elution_bucket_size.is_finite() || elution_bucket_size <= 0.0 {
        return Err(MatchError::InvalidTolerance(format!(
            "elution bucket size must be positive and finite, got {}",
            elution_bucket_size
        )));
    }

    let mut mass_origin = f64::INFINITY;
    let mut elution_origin = f64::INFINITY;
    let mut point_count = 0usize;
    for point in sets.iter().flatten() {
        mass_origin = mass_origin.min(point.mass);
        elution_origin = elution_origin.min(point.elution);
        point_count += 1;
    }
    if point_count == 0 {
        return Ok(Vec::new());
    }
    if mass_kind == MassToleranceKind::Ppm && mass_origin <= 0.0 {
        return Err(MatchError::InvalidTolerance(format!(
            "ppm partitioning requires positive masses, minimum is {}",
            mass_origin
        )));
    }

    let mut cells: BTreeMap<(i64, i64), BucketSummary> = BTreeMap::new();
    for (set_index, points) in sets.iter().enumerate() {
        for point in points {
            let key = (
                mass_cell_index(point.mass, mass_origin, mass_bucket_size, mass_kind),
                elution_cell_index(point.elution, elution_origin, elution_bucket_size),
            );
            let cell = cells
                .entry(key)
                .or_insert_with(|| BucketSummary::new(key.0, key.1, sets.len()));
            cell.members[set_index].push(*point);
        }
    }

    Ok(cells.into_values().collect())
}

/// Projects and partitions whole feature sets in one call.
pub fn partition_feature_sets(
    sets: &[&FeatureSet],
    mass_bucket_size: f64,
    elution_bucket_size: f64,
    mass_kind: MassToleranceKind,
    mass_mode: MassMode,
    elution_mode: ElutionMode,
) -> Result<Vec<BucketSummary>, MatchError> {
    let projected: Vec<Vec<GridPoint>> = sets
        .iter()
        .map(|set| project_feature_set(set, mass_mode, elution_mode))
        .collect();
    partition_points(&projected, mass_bucket_size, elution_bucket_size, mass_kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::feature::Feature;

    fn point(index: usize, mass: f64, elution: f64) -> GridPoint {
        GridPoint {
            index,
            mass,
            elution,
        }
    }

    fn cell_of(cells: &[BucketSummary], set: usize, index: usize) -> (i64, i64) {
        for cell in cells {
            if cell.members[set].iter().any(|p| p.index == index) {
                return (cell.mass_cell, cell.elution_cell);
            }
        }
        panic!("point {} of set {} not assigned to any cell", index, set);
    }

    #[test]
    fn test_absolute_grid_assignment() {
        let points = vec![vec![
            point(0, 100.0, 10.0),
            point(1, 100.4, 10.0),
            point(2, 101.2, 10.0),
        ]];
        let cells = partition_points(&points, 0.5, 1.0, MassToleranceKind::Absolute).unwrap();

        assert_eq!(cells.len(), 2);
        assert_eq!(cell_of(&cells, 0, 0), cell_of(&cells, 0, 1));
        assert_ne!(cell_of(&cells, 0, 0), cell_of(&cells, 0, 2));
    }

    #[test]
    fn test_every_point_lands_in_exactly_one_cell() {
        let points = vec![
            vec![point(0, 100.0, 10.0), point(1, 100.7, 12.0)],
            vec![point(0, 100.1, 10.1), point(1, 103.0, 30.0), point(2, 100.7, 12.0)],
        ];
        let cells = partition_points(&points, 0.5, 1.0, MassToleranceKind::Absolute).unwrap();

        let total: usize = cells.iter().map(|c| c.member_count()).sum();
        assert_eq!(total, 5);

        // Per-set membership is disjoint across cells.
        for set in 0..2 {
            let mut seen: Vec<usize> = cells
                .iter()
                .flat_map(|c| c.members[set].iter().map(|p| p.index))
                .collect();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), points[set].len());
        }
    }

    #[test]
    fn test_set_count_tracks_origin_sets() {
        let points = vec![
            vec![point(0, 100.0, 10.0), point(1, 200.0, 10.0)],
            vec![point(0, 100.1, 10.0)],
        ];
        let cells = partition_points(&points, 0.5, 1.0, MassToleranceKind::Absolute).unwrap();

        assert_eq!(cells.len(), 2);
        let shared = cells.iter().find(|c| c.set_count() == 2).unwrap();
        assert_eq!(shared.members[0].len(), 1);
        assert_eq!(shared.members[1].len(), 1);
        let lone = cells.iter().find(|c| c.set_count() == 1).unwrap();
        assert_eq!(lone.members[0][0].index, 1);
    }

    #[test]
    fn test_ppm_cells_widen_with_mass() {
        // Pairs 0.03 Da apart, once at mass 100 and once at mass 1000. At
        // 100 ppm bucket width the low-mass pair splits while the high-mass
        // pair shares a cell.
        let points = vec![vec![
            point(0, 100.0, 10.0),
            point(1, 100.03, 10.0),
            point(2, 1000.0, 10.0),
            point(3, 1000.03, 10.0),
        ]];
        let cells = partition_points(&points, 100.0, 1.0, MassToleranceKind::Ppm).unwrap();

        assert_ne!(cell_of(&cells, 0, 0), cell_of(&cells, 0, 1));
        assert_eq!(cell_of(&cells, 0, 2), cell_of(&cells, 0, 3));
    }

    #[test]
    fn test_ppm_equal_relative_spacing_from_origin() {
        // 50 ppm above the origin stays inside a 100 ppm cell.
        let points = vec![vec![point(0, 500.0, 10.0), point(1, 500.025, 10.0)]];
        let cells = partition_points(&points, 100.0, 1.0, MassToleranceKind::Ppm).unwrap();

        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].members[0].len(), 2);
    }

    #[test]
    fn test_empty_input_yields_no_cells() {
        let cells =
            partition_points(&[Vec::new(), Vec::new()], 0.5, 1.0, MassToleranceKind::Absolute)
                .unwrap();
        assert!(cells.is_empty());
    }

    #[test]
    fn test_invalid_bucket_sizes_are_rejected() {
        let points = vec![vec![point(0, 100.0, 10.0)]];
        assert!(partition_points(&points, 0.0, 1.0, MassToleranceKind::Absolute).is_err());
        assert!(partition_points(&points, 0.5, -1.0, MassToleranceKind::Absolute).is_err());
        assert!(partition_points(&points, f64::NAN, 1.0, MassToleranceKind::Absolute).is_err());
    }

    #[test]
    fn test_ppm_grid_rejects_non_positive_masses() {
        let points = vec![vec![point(0, -5.0, 10.0), point(1, 100.0, 10.0)]];
        assert!(partition_points(&points, 100.0, 1.0, MassToleranceKind::Ppm).is_err());
    }

    #[test]
    fn test_partition_feature_sets_projects_both_axes() {
        let master = FeatureSet::new(
            "run_a",
            vec![Feature::new(1000.0, 501.0, 2, 10.0, 0.4, 1200, 1.0e4, 0.9)],
        );
        let slave = FeatureSet::new(
            "run_b",
            vec![Feature::new(1000.0005, 501.0, 2, 10.01, 0.4, 1202, 1.0e4, 0.8)],
        );

        let cells = partition_feature_sets(
            &[&master, &slave],
            0.005,
            0.05,
            MassToleranceKind::Absolute,
            MassMode::Monoisotopic,
            ElutionMode::Time,
        )
        .unwrap();

        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].set_count(), 2);
        assert_eq!(cells[0].member_count(), 2);
    }
}
