use std::cmp::Ordering;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::data::feature::{Feature, FeatureSet};
use crate::data::result::FeatureMatchingResult;
use crate::data::tolerance::{
    range_gap, ElutionCompareMode, ElutionMode, MassMode, MassToleranceKind,
};
use crate::error::MatchError;

/// Window bounds and filters for the nearest-candidate matcher.
///
/// The mass window is asymmetric: `min_mass_diff` and `max_mass_diff` bound
/// the signed difference `slave - master` and need not be symmetric around
/// zero. Both are interpreted per the configured `MassToleranceKind`, so
/// under PPM they are converted against each master's own mass. The defaults
/// assume a PPM kind.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct WindowParams {
    pub min_mass_diff: f64,
    pub max_mass_diff: f64,
    pub min_elution_diff: f64,
    pub max_elution_diff: f64,
    pub elution_compare: ElutionCompareMode,
    pub same_charge_only: bool,
}

impl Default for WindowParams {
    fn default() -> Self {
        WindowParams {
            min_mass_diff: -10.0,
            max_mass_diff: 10.0,
            min_elution_diff: -0.1,
            max_elution_diff: 0.1,
            elution_compare: ElutionCompareMode::Point,
            same_charge_only: false,
        }
    }
}

fn elution_difference(
    master: &Feature,
    master_index: usize,
    candidate: &Feature,
    candidate_index: usize,
    compare: ElutionCompareMode,
    elution_mode: ElutionMode,
) -> Result<f64, MatchError> {
    match compare {
        ElutionCompareMode::Point => {
            Ok(candidate.elution_value(elution_mode) - master.elution_value(elution_mode))
        }
        ElutionCompareMode::Range => {
            let master_range = master
                .scan_range_values()
                .ok_or(MatchError::MissingScanRange {
                    index: master_index,
                })?;
            let candidate_range =
                candidate
                    .scan_range_values()
                    .ok_or(MatchError::MissingScanRange {
                        index: candidate_index,
                    })?;
            Ok(range_gap(master_range, candidate_range))
        }
    }
}

/// Windowed nearest-candidate matching.
///
/// The slave set is sorted ascending by projected mass once. For each master
/// feature the insertion index of its mass is binary-searched, then probes
/// expand outward (offsets 0, +1, -1, +2, -2, ...) until each direction has
/// independently left the mass window. Probed slaves inside the mass window
/// are accepted when their elution difference falls inside
/// `[min_elution_diff, max_elution_diff]` (Point: signed scalar difference,
/// Range: gap between scan ranges) and, with `same_charge_only`, their
/// charge equals the master's. Candidate lists keep search order, so the
/// nearest masses come first per direction; masters without any accepted
/// candidate are left out of the result.
///
/// # Arguments
///
/// * `master` - The set driving the iteration.
/// * `slave` - The set supplying candidates.
/// * `params` - Window bounds and filters.
/// * `mass_kind` - Interpretation of the mass window bounds.
/// * `mass_mode` - Mass-axis coordinate to compare on.
/// * `elution_mode` - Elution-axis coordinate to compare on.
pub fn match_windowed(
    master: &FeatureSet,
    slave: &FeatureSet,
    params: &WindowParams,
    mass_kind: MassToleranceKind,
    mass_mode: MassMode,
    elution_mode: ElutionMode,
) -> Result<FeatureMatchingResult, MatchError> {
    if params.elution_compare == ElutionCompareMode::Range && elution_mode != ElutionMode::Scan {
        return Err(MatchError::UnsupportedElutionCompare(elution_mode));
    }

    // Sort slave indices ascending by projected mass, once per invocation.
    let mut by_mass: Vec<usize> = (0..slave.features.len()).collect();
    by_mass.sort_by(|&a, &b| {
        slave.features[a]
            .mass_value(mass_mode)
            .partial_cmp(&slave.features[b].mass_value(mass_mode))
            .unwrap_or(Ordering::Equal)
    });
    let sorted_masses: Vec<f64> = by_mass
        .iter()
        .map(|&index| slave.features[index].mass_value(mass_mode))
        .collect();

    let mut result = FeatureMatchingResult::new();

    for (master_index, master_feature) in master.features.iter().enumerate() {
        let query_mass = master_feature.mass_value(mass_mode);
        let low_bound = mass_kind.absolute_delta(query_mass, params.min_mass_diff);
        let high_bound = mass_kind.absolute_delta(query_mass, params.max_mass_diff);

        // First sorted position with mass >= query; equal masses sit at and
        // above this position, so outward expansion still visits them all.
        let start = sorted_masses.partition_point(|&mass| mass < query_mass);

        let mut accepted: Vec<usize> = Vec::new();
        let mut up_active = true;
        let mut down_active = start > 0;
        let mut step = 0usize;
        while up_active || down_active {
            if up_active {
                let position = start + step;
                if position >= by_mass.len() {
                    up_active = false;
                } else {
                    let mass_diff = sorted_masses[position] - query_mass;
                    if mass_diff > high_bound {
                        up_active = false;
                    } else if mass_diff >= low_bound {
                        let slave_index = by_mass[position];
                        let candidate = &slave.features[slave_index];
                        let diff = elution_difference(
                            master_feature,
                            master_index,
                            candidate,
                            slave_index,
                            params.elution_compare,
                            elution_mode,
                        )?;
                        if diff >= params.min_elution_diff
                            && diff <= params.max_elution_diff
                            && (!params.same_charge_only || candidate.charge == master_feature.charge)
                        {
                            accepted.push(slave_index);
                        }
                    }
                }
            }
            if down_active && step >= 1 {
                if step > start {
                    down_active = false;
                } else {
                    let position = start - step;
                    let mass_diff = sorted_masses[position] - query_mass;
                    if mass_diff < low_bound {
                        down_active = false;
                    } else if mass_diff <= high_bound {
                        let slave_index = by_mass[position];
                        let candidate = &slave.features[slave_index];
                        let diff = elution_difference(
                            master_feature,
                            master_index,
                            candidate,
                            slave_index,
                            params.elution_compare,
                            elution_mode,
                        )?;
                        if diff >= params.min_elution_diff
                            && diff <= params.max_elution_diff
                            && (!params.same_charge_only || candidate.charge == master_feature.charge)
                        {
                            accepted.push(slave_index);
                        }
                    }
                }
            }
            step += 1;
        }

        result.insert(master_index, accepted);
    }

    Ok(result)
}
