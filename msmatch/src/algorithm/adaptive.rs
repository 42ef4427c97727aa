use bincode::{Decode, Encode};
use log::trace;
use serde::{Deserialize, Serialize};

use crate::algorithm::grid::{partition_points, project_feature_set, GridPoint};
use crate::algorithm::ordering::{order_candidates, OrderingMode};
use crate::data::feature::{Feature, FeatureSet};
use crate::data::result::FeatureMatchingResult;
use crate::data::tolerance::{ElutionMode, MassMode, MassToleranceKind, Tolerance};
use crate::error::MatchError;

/// Hard cap on recursion depth. The per-depth diagnostics stay growable, but
/// a configuration whose floors and step-downs imply more levels than this is
/// rejected instead of silently truncated.
pub const MAX_MATCH_DEPTH: usize = 100;

/// Floors and step-downs for the recursive adaptive matcher.
///
/// Each recursion level shrinks both tolerances by a fixed linear step. A
/// tolerance that falls below its floor is clamped there and marked
/// exhausted; once both axes are exhausted the recursion stops. The expected
/// depth is therefore `ceil((initial - floor) / step)` per axis, and tiny
/// steps paired with wide initial tolerances run into [`MAX_MATCH_DEPTH`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct AdaptiveParams {
    pub min_delta_mass: f64,
    pub min_delta_elution: f64,
    pub mass_step_down: f64,
    pub elution_step_down: f64,
}

impl Default for AdaptiveParams {
    fn default() -> Self {
        AdaptiveParams {
            min_delta_mass: 2.0,
            min_delta_elution: 0.025,
            mass_step_down: 2.0,
            elution_step_down: 0.025,
        }
    }
}

impl AdaptiveParams {
    pub fn validate(&self) -> Result<(), MatchError> {
        let values = [
            ("min_delta_mass", self.min_delta_mass),
            ("min_delta_elution", self.min_delta_elution),
            ("mass_step_down", self.mass_step_down),
            ("elution_step_down", self.elution_step_down),
        ];
        for (name, value) in values {
            if !value.is_finite() || value <= 0.0 {
                return Err(MatchError::InvalidTolerance(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Result of a recursive adaptive run: the matching itself plus a per-depth
/// count of how many master features were resolved at each recursion level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct AdaptiveMatchOutput {
    pub result: FeatureMatchingResult,
    pub matched_at_depth: Vec<usize>,
}

impl AdaptiveMatchOutput {
    pub fn summary(&self) -> String {
        let total: usize = self.matched_at_depth.iter().sum();
        if self.matched_at_depth.is_empty() {
            return format!("matched masters: {}", total);
        }
        let per_depth: Vec<String> = self
            .matched_at_depth
            .iter()
            .enumerate()
            .map(|(depth, count)| format!("depth {}: {}", depth, count))
            .collect();
        format!("matched masters: {} ({})", total, per_depth.join(", "))
    }
}

struct AdaptiveContext<'a> {
    master_features: &'a [Feature],
    slave_features: &'a [Feature],
    mass_kind: MassToleranceKind,
    elution_mode: ElutionMode,
    ordering_mode: OrderingMode,
    params: &'a AdaptiveParams,
}

fn bump(counters: &mut Vec<usize>, depth: usize, count: usize) {
    if counters.len() <= depth {
        counters.resize(depth + 1, 0);
    }
    counters[depth] += count;
}

fn recursively_match(
    ctx: &AdaptiveContext,
    master_points: Vec<GridPoint>,
    slave_points: Vec<GridPoint>,
    delta_mass: f64,
    delta_elution: f64,
    depth: usize,
    counters: &mut Vec<usize>,
) -> Result<FeatureMatchingResult, MatchError> {
    if depth >= MAX_MATCH_DEPTH {
        return Err(MatchError::RecursionDepthExceeded {
            depth,
            limit: MAX_MATCH_DEPTH,
        });
    }

    let (delta_mass, mass_exhausted) = if delta_mass < ctx.params.min_delta_mass {
        (ctx.params.min_delta_mass, true)
    } else {
        (delta_mass, false)
    };
    let (delta_elution, elution_exhausted) = if delta_elution < ctx.params.min_delta_elution {
        (ctx.params.min_delta_elution, true)
    } else {
        (delta_elution, false)
    };
    if mass_exhausted && elution_exhausted {
        return Ok(FeatureMatchingResult::new());
    }

    trace!(
        "depth {}: partitioning {} x {} features at mass {} / elution {}",
        depth,
        master_points.len(),
        slave_points.len(),
        delta_mass,
        delta_elution
    );

    let sets = vec![master_points, slave_points];
    let cells = partition_points(&sets, delta_mass, delta_elution, ctx.mass_kind)?;

    let mut result = FeatureMatchingResult::new();
    for cell in cells {
        if cell.set_count() < 2 {
            continue;
        }
        let mut members = cell.members.into_iter();
        let cell_masters = members.next().unwrap_or_default();
        let cell_slaves = members.next().unwrap_or_default();

        if cell_masters.len() == 1 && cell_slaves.len() == 1 {
            result.insert(cell_masters[0].index, vec![cell_slaves[0].index]);
            bump(counters, depth, 1);
            continue;
        }

        // Conflict cell: retry just these features with tightened tolerances.
        let sub = recursively_match(
            ctx,
            cell_masters.clone(),
            cell_slaves.clone(),
            delta_mass - ctx.params.mass_step_down,
            delta_elution - ctx.params.elution_step_down,
            depth + 1,
            counters,
        )?;

        let slave_indices: Vec<usize> = cell_slaves.iter().map(|point| point.index).collect();
        if sub.is_empty() {
            for master_point in &cell_masters {
                let ranked = order_candidates(
                    &slave_indices,
                    ctx.slave_features,
                    &ctx.master_features[master_point.index],
                    ctx.ordering_mode,
                    ctx.elution_mode,
                );
                result.insert(master_point.index, ranked);
            }
            bump(counters, depth, cell_masters.len());
            continue;
        }

        let consumed = sub.matched_slaves();
        let unconsumed_masters: Vec<usize> = cell_masters
            .iter()
            .map(|point| point.index)
            .filter(|&index| sub.candidates(index).is_none())
            .collect();
        let has_unconsumed_slave = slave_indices.iter().any(|index| !consumed.contains(index));
        result.merge(sub);

        if !unconsumed_masters.is_empty() && has_unconsumed_slave {
            for &master_index in &unconsumed_masters {
                let ranked = order_candidates(
                    &slave_indices,
                    ctx.slave_features,
                    &ctx.master_features[master_index],
                    ctx.ordering_mode,
                    ctx.elution_mode,
                );
                result.insert(master_index, ranked);
            }
            bump(counters, depth, unconsumed_masters.len());
        }
    }

    Ok(result)
}

/// Recursive adaptive matching.
///
/// Partitions both sets on the mass/elution grid at the configured tolerance,
/// resolves one-to-one cells directly and recurses into conflict cells with
/// tolerances tightened by the configured step-downs, clamped at the floors.
/// A conflict cell whose recursion comes back empty falls back to ranking
/// every cell slave for each cell master at the current level; a non-empty
/// sub-result is kept, and cell masters it left unmatched rank the full cell
/// slave list as long as at least one cell slave also went unmatched.
///
/// # Arguments
///
/// * `master` - The set driving the iteration.
/// * `slave` - The set supplying candidates.
/// * `tolerance` - Initial bucket sizes per axis and the elution mode.
/// * `params` - Floors and per-level step-downs.
/// * `mass_mode` - Mass-axis coordinate to compare on.
/// * `ordering_mode` - Candidate ranking inside ambiguous cells.
pub fn match_recursive_adaptive(
    master: &FeatureSet,
    slave: &FeatureSet,
    tolerance: &Tolerance,
    params: &AdaptiveParams,
    mass_mode: MassMode,
    ordering_mode: OrderingMode,
) -> Result<AdaptiveMatchOutput, MatchError> {
    tolerance.validate()?;
    params.validate()?;

    let master_points = project_feature_set(master, mass_mode, tolerance.elution_mode);
    let slave_points = project_feature_set(slave, mass_mode, tolerance.elution_mode);
    let ctx = AdaptiveContext {
        master_features: &master.features,
        slave_features: &slave.features,
        mass_kind: tolerance.mass_tolerance_kind,
        elution_mode: tolerance.elution_mode,
        ordering_mode,
        params,
    };

    let mut matched_at_depth: Vec<usize> = Vec::new();
    let result = recursively_match(
        &ctx,
        master_points,
        slave_points,
        tolerance.delta_mass,
        tolerance.delta_elution,
        0,
        &mut matched_at_depth,
    )?;

    Ok(AdaptiveMatchOutput {
        result,
        matched_at_depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(mass: f64, retention_time: f64, quality: f64) -> Feature {
        Feature::new(mass, mass / 2.0, 2, retention_time, 0.4, 1200, 1.0e4, quality)
    }

    fn params(
        min_delta_mass: f64,
        min_delta_elution: f64,
        mass_step_down: f64,
        elution_step_down: f64,
    ) -> AdaptiveParams {
        AdaptiveParams {
            min_delta_mass,
            min_delta_elution,
            mass_step_down,
            elution_step_down,
        }
    }

    #[test]
    fn test_single_pair_matches_at_depth_zero() {
        let master = FeatureSet::new("run_a", vec![feature(1000.0, 10.0, 0.5)]);
        let slave = FeatureSet::new("run_b", vec![feature(1000.0005, 10.01, 0.5)]);
        let tolerance = Tolerance::ppm(5.0, 0.05, ElutionMode::Time);

        let output = match_recursive_adaptive(
            &master,
            &slave,
            &tolerance,
            &AdaptiveParams::default(),
            MassMode::Monoisotopic,
            OrderingMode::ByQuality,
        )
        .unwrap();

        assert_eq!(output.result.candidates(0), Some(&[0][..]));
        assert_eq!(output.matched_at_depth, vec![1]);
        assert!(output.summary().contains("depth 0: 1"));
    }

    #[test]
    fn test_conflict_cell_resolves_at_next_depth() {
        let master = FeatureSet::new(
            "run_a",
            vec![feature(1000.0, 10.0, 0.5), feature(1000.0012, 10.0, 0.5)],
        );
        let slave = FeatureSet::new(
            "run_b",
            vec![feature(1000.0001, 10.0, 0.5), feature(1000.0013, 10.0, 0.5)],
        );
        let tolerance = Tolerance::absolute(0.01, 0.1, ElutionMode::Time);

        let output = match_recursive_adaptive(
            &master,
            &slave,
            &tolerance,
            &params(0.0001, 0.01, 0.0095, 0.05),
            MassMode::Monoisotopic,
            OrderingMode::ByQuality,
        )
        .unwrap();

        // One conflict cell at depth 0 splits into two one-to-one cells at
        // the tightened depth-1 tolerance of 0.0005.
        assert_eq!(output.result.candidates(0), Some(&[0][..]));
        assert_eq!(output.result.candidates(1), Some(&[1][..]));
        assert_eq!(output.matched_at_depth, vec![0, 2]);
        let total: usize = output.matched_at_depth.iter().sum();
        assert_eq!(total, output.result.master_count());
    }

    #[test]
    fn test_exhausted_recursion_falls_back_to_ranked_cell() {
        let master = FeatureSet::new(
            "run_a",
            vec![feature(1000.0, 10.0, 0.5), feature(1000.00002, 10.0, 0.5)],
        );
        let slave = FeatureSet::new(
            "run_b",
            vec![feature(1000.00001, 10.0, 0.3), feature(1000.00003, 10.0, 0.8)],
        );
        let tolerance = Tolerance::absolute(0.01, 1.0, ElutionMode::Time);

        let output = match_recursive_adaptive(
            &master,
            &slave,
            &tolerance,
            &params(0.001, 0.1, 0.005, 0.5),
            MassMode::Monoisotopic,
            OrderingMode::ByQuality,
        )
        .unwrap();

        // The four features never separate, so depth 2 exhausts both axes
        // and depth 1 ranks the whole cell, highest quality first.
        assert_eq!(output.result.candidates(0), Some(&[1, 0][..]));
        assert_eq!(output.result.candidates(1), Some(&[1, 0][..]));
        assert_eq!(output.matched_at_depth, vec![0, 2]);
    }

    #[test]
    fn test_unconsumed_masters_rank_full_cell() {
        let master = FeatureSet::new(
            "run_a",
            vec![feature(1000.0, 10.0, 0.5), feature(1000.006, 10.0, 0.5)],
        );
        let slave = FeatureSet::new(
            "run_b",
            vec![feature(1000.0005, 10.0, 0.1), feature(1000.011, 10.0, 0.9)],
        );
        let tolerance = Tolerance::absolute(0.03, 0.1, ElutionMode::Time);

        let output = match_recursive_adaptive(
            &master,
            &slave,
            &tolerance,
            &params(0.001, 0.01, 0.026, 0.05),
            MassMode::Monoisotopic,
            OrderingMode::ByQuality,
        )
        .unwrap();

        // Depth 1 pairs master 0 with slave 0 and drops the rest into
        // single-set cells; master 1 then ranks the full cell at depth 0.
        assert_eq!(output.result.candidates(0), Some(&[0][..]));
        assert_eq!(output.result.candidates(1), Some(&[1, 0][..]));
        assert_eq!(output.result.best_match(1), Some(1));
        assert_eq!(output.matched_at_depth, vec![1, 1]);
    }

    #[test]
    fn test_unconsumed_master_without_free_slave_stays_unmatched() {
        let master = FeatureSet::new(
            "run_a",
            vec![feature(1000.0, 10.0, 0.5), feature(1000.004, 10.0, 0.5)],
        );
        let slave = FeatureSet::new("run_b", vec![feature(1000.0002, 10.0, 0.5)]);
        let tolerance = Tolerance::absolute(0.01, 0.1, ElutionMode::Time);

        let output = match_recursive_adaptive(
            &master,
            &slave,
            &tolerance,
            &params(0.0001, 0.01, 0.0095, 0.05),
            MassMode::Monoisotopic,
            OrderingMode::ByQuality,
        )
        .unwrap();

        // The only slave is consumed at depth 1, so master 1 has nothing
        // left to rank and stays out of the result.
        assert_eq!(output.result.matched_masters(), vec![0]);
        assert_eq!(output.result.candidates(0), Some(&[0][..]));
        assert_eq!(output.matched_at_depth, vec![0, 1]);
        let total: usize = output.matched_at_depth.iter().sum();
        assert_eq!(total, output.result.master_count());
    }

    #[test]
    fn test_depth_limit_is_surfaced() {
        let master = FeatureSet::new(
            "run_a",
            vec![feature(1000.0, 10.0, 0.5), feature(1000.0, 10.0, 0.5)],
        );
        let slave = FeatureSet::new(
            "run_b",
            vec![feature(1000.0, 10.0, 0.5), feature(1000.0, 10.0, 0.5)],
        );
        let tolerance = Tolerance::absolute(1.0, 1.0, ElutionMode::Time);

        // Identical coordinates never separate and the steps are far too
        // small to reach the floors within the depth cap.
        let err = match_recursive_adaptive(
            &master,
            &slave,
            &tolerance,
            &params(1.0e-9, 1.0e-9, 1.0e-9, 1.0e-9),
            MassMode::Monoisotopic,
            OrderingMode::ByQuality,
        )
        .unwrap_err();

        assert_eq!(
            err,
            MatchError::RecursionDepthExceeded {
                depth: MAX_MATCH_DEPTH,
                limit: MAX_MATCH_DEPTH
            }
        );
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let master = FeatureSet::new("run_a", vec![feature(1000.0, 10.0, 0.5)]);
        let slave = FeatureSet::new("run_b", vec![feature(1000.0005, 10.0, 0.5)]);
        let tolerance = Tolerance::ppm(5.0, 0.05, ElutionMode::Time);

        for bad in [
            params(-1.0, 0.01, 1.0, 0.01),
            params(1.0, 0.01, 0.0, 0.01),
            params(1.0, f64::NAN, 1.0, 0.01),
        ] {
            assert!(match_recursive_adaptive(
                &master,
                &slave,
                &tolerance,
                &bad,
                MassMode::Monoisotopic,
                OrderingMode::ByQuality,
            )
            .is_err());
        }
    }

    #[test]
    fn test_empty_slave_set_yields_empty_result() {
        let master = FeatureSet::new(
            "run_a",
            vec![feature(1000.0, 10.0, 0.5), feature(2000.0, 20.0, 0.5)],
        );
        let slave = FeatureSet::new("run_b", Vec::new());

        let output = match_recursive_adaptive(
            &master,
            &slave,
            &Tolerance::default(),
            &AdaptiveParams::default(),
            MassMode::Monoisotopic,
            OrderingMode::ByQuality,
        )
        .unwrap();

        assert!(output.result.is_empty());
        assert!(output.matched_at_depth.is_empty());
    }
}
