use bincode::{Decode, Encode};
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::algorithm::grid::{partition_points, project_feature_set, BucketSummary};
use crate::algorithm::ordering::{order_candidates, OrderingMode};
use crate::data::feature::FeatureSet;
use crate::data::result::FeatureMatchingResult;
use crate::data::tolerance::{MassMode, Tolerance};
use crate::error::MatchError;

/// Bucket-size search space for the global clustering matcher.
///
/// Candidate bucket sizes per axis are the integer multiples of the
/// tolerance from `count * tolerance` down to `1 * tolerance`, so the
/// partition search always includes the tolerance itself as the finest
/// granularity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct ClusterParams {
    pub mass_bucket_count: usize,
    pub elution_bucket_count: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        ClusterParams {
            mass_bucket_count: 4,
            elution_bucket_count: 4,
        }
    }
}

impl ClusterParams {
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.mass_bucket_count == 0 || self.elution_bucket_count == 0 {
            return Err(MatchError::InvalidTolerance(
                "bucket counts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn candidate_sizes(tolerance: f64, count: usize) -> Vec<f64> {
    (1..=count).rev().map(|k| tolerance * k as f64).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PartitionScore {
    clean_cells: usize,
    conflict_members: usize,
}

impl PartitionScore {
    fn better_than(&self, other: &PartitionScore) -> bool {
        self.clean_cells > other.clean_cells
            || (self.clean_cells == other.clean_cells
                && self.conflict_members < other.conflict_members)
    }
}

fn score_partition(cells: &[BucketSummary]) -> PartitionScore {
    let mut score = PartitionScore {
        clean_cells: 0,
        conflict_members: 0,
    };
    for cell in cells {
        if cell.set_count() < 2 {
            continue;
        }
        if cell.members[0].len() == 1 && cell.members[1].len() == 1 {
            score.clean_cells += 1;
        } else {
            score.conflict_members += cell.member_count();
        }
    }
    score
}

/// Global clustering matching.
///
/// Both sets are projected onto the mass/elution plane and partitioned into
/// grid cells at every combination of candidate bucket sizes. The partition
/// with the most cells holding exactly one feature from each set wins; ties
/// fall to fewer features inside conflict cells, then to the coarser sizes
/// evaluated first. In the winning partition, one-to-one cells pair their
/// features directly, conflict cells rank every cell slave for each cell
/// master per `ordering_mode`, and cells touched by only one set contribute
/// nothing.
///
/// # Arguments
///
/// * `master` - The set driving the iteration.
/// * `slave` - The set supplying candidates.
/// * `tolerance` - Finest bucket size per axis and the elution mode.
/// * `params` - Bucket-size multiplier counts per axis.
/// * `mass_mode` - Mass-axis coordinate to compare on.
/// * `ordering_mode` - Candidate ranking inside conflict cells.
pub fn match_global_cluster(
    master: &FeatureSet,
    slave: &FeatureSet,
    tolerance: &Tolerance,
    params: &ClusterParams,
    mass_mode: MassMode,
    ordering_mode: OrderingMode,
) -> Result<FeatureMatchingResult, MatchError> {
    tolerance.validate()?;
    params.validate()?;

    let sets = vec![
        project_feature_set(master, mass_mode, tolerance.elution_mode),
        project_feature_set(slave, mass_mode, tolerance.elution_mode),
    ];

    let mass_sizes = candidate_sizes(tolerance.delta_mass, params.mass_bucket_count);
    let elution_sizes = candidate_sizes(tolerance.delta_elution, params.elution_bucket_count);

    let mut best: Option<(PartitionScore, (f64, f64), Vec<BucketSummary>)> = None;
    for (&mass_size, &elution_size) in mass_sizes.iter().cartesian_product(elution_sizes.iter()) {
        let cells = partition_points(&sets, mass_size, elution_size, tolerance.mass_tolerance_kind)?;
        let score = score_partition(&cells);
        let replace = match &best {
            Some((best_score, _, _)) => score.better_than(best_score),
            None => true,
        };
        if replace {
            best = Some((score, (mass_size, elution_size), cells));
        }
    }

    let mut result = FeatureMatchingResult::new();
    let Some((score, (mass_size, elution_size), cells)) = best else {
        return Ok(result);
    };
    debug!(
        "global clustering picked bucket sizes mass {} / elution {} ({} clean cells, {} conflict members)",
        mass_size, elution_size, score.clean_cells, score.conflict_members
    );

    for cell in cells {
        if cell.set_count() < 2 {
            continue;
        }
        if cell.members[0].len() == 1 && cell.members[1].len() == 1 {
            result.insert(cell.members[0][0].index, vec![cell.members[1][0].index]);
            continue;
        }
        let cell_slaves: Vec<usize> = cell.members[1].iter().map(|point| point.index).collect();
        for master_point in &cell.members[0] {
            let ranked = order_candidates(
                &cell_slaves,
                &slave.features,
                &master.features[master_point.index],
                ordering_mode,
                tolerance.elution_mode,
            );
            result.insert(master_point.index, ranked);
        }
    }

    Ok(result)
}
