use std::fmt;
use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use log::debug;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

use crate::algorithm::adaptive::{match_recursive_adaptive, AdaptiveParams};
use crate::algorithm::cluster::{match_global_cluster, ClusterParams};
use crate::algorithm::ordering::OrderingMode;
use crate::algorithm::window::{match_windowed, WindowParams};
use crate::data::feature::FeatureSet;
use crate::data::result::FeatureMatchingResult;
use crate::data::tolerance::{ElutionCompareMode, ElutionMode, MassMode, Tolerance};
use crate::error::MatchError;

/// Matching algorithm selector, carrying the algorithm-specific knobs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum MatcherKind {
    Windowed(WindowParams),
    GlobalClustering(ClusterParams),
    RecursiveAdaptive(AdaptiveParams),
}

impl Default for MatcherKind {
    fn default() -> Self {
        MatcherKind::Windowed(WindowParams::default())
    }
}

impl Display for MatcherKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MatcherKind::Windowed(_) => write!(f, "Windowed"),
            MatcherKind::GlobalClustering(_) => write!(f, "GlobalClustering"),
            MatcherKind::RecursiveAdaptive(_) => write!(f, "RecursiveAdaptive"),
        }
    }
}

/// Complete configuration for one matching invocation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct MatcherConfig {
    pub tolerance: Tolerance,
    pub mass_mode: MassMode,
    pub ordering_mode: OrderingMode,
    pub kind: MatcherKind,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            tolerance: Tolerance::default(),
            mass_mode: MassMode::default(),
            ordering_mode: OrderingMode::default(),
            kind: MatcherKind::default(),
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<(), MatchError> {
        self.tolerance.validate()?;
        match &self.kind {
            MatcherKind::Windowed(params) => {
                if params.elution_compare == ElutionCompareMode::Range
                    && self.tolerance.elution_mode != ElutionMode::Scan
                {
                    return Err(MatchError::UnsupportedElutionCompare(
                        self.tolerance.elution_mode,
                    ));
                }
                Ok(())
            }
            MatcherKind::GlobalClustering(params) => params.validate(),
            MatcherKind::RecursiveAdaptive(params) => params.validate(),
        }
    }
}

/// Matches two feature sets with the configured algorithm.
///
/// # Arguments
///
/// * `master` - The set driving the iteration.
/// * `slave` - The set supplying candidates.
/// * `config` - Tolerance, coordinate modes and the algorithm to run.
///
/// # Examples
///
/// ```rust
/// use msmatch::algorithm::matcher::{match_feature_sets, MatcherConfig};
/// use msmatch::data::feature::{Feature, FeatureSet};
///
/// let master = FeatureSet::new(
///     "run_a",
///     vec![Feature::new(1000.0, 500.0, 2, 10.0, 0.4, 1200, 1.0e4, 0.5)],
/// );
/// let slave = FeatureSet::new(
///     "run_b",
///     vec![Feature::new(1000.0005, 500.0, 2, 10.01, 0.4, 1205, 1.0e4, 0.5)],
/// );
///
/// let result = match_feature_sets(&master, &slave, &MatcherConfig::default()).unwrap();
/// assert_eq!(result.best_match(0), Some(0));
/// ```
pub fn match_feature_sets(
    master: &FeatureSet,
    slave: &FeatureSet,
    config: &MatcherConfig,
) -> Result<FeatureMatchingResult, MatchError> {
    config.validate()?;
    match &config.kind {
        MatcherKind::Windowed(params) => match_windowed(
            master,
            slave,
            params,
            config.tolerance.mass_tolerance_kind,
            config.mass_mode,
            config.tolerance.elution_mode,
        ),
        MatcherKind::GlobalClustering(params) => match_global_cluster(
            master,
            slave,
            &config.tolerance,
            params,
            config.mass_mode,
            config.ordering_mode,
        ),
        MatcherKind::RecursiveAdaptive(params) => {
            let output = match_recursive_adaptive(
                master,
                slave,
                &config.tolerance,
                params,
                config.mass_mode,
                config.ordering_mode,
            )?;
            debug!("recursive adaptive: {}", output.summary());
            Ok(output.result)
        }
    }
}

/// Matches one master set against many slave sets in parallel.
///
/// Results come back in slave order; a failing invocation fails the batch.
///
/// # Arguments
///
/// * `master` - The set driving the iteration.
/// * `slaves` - The slave sets, matched independently against the master.
/// * `config` - Shared configuration for every invocation.
/// * `num_threads` - Size of the thread pool the batch runs on.
pub fn match_feature_sets_batch(
    master: &FeatureSet,
    slaves: &[FeatureSet],
    config: &MatcherConfig,
    num_threads: usize,
) -> Result<Vec<FeatureMatchingResult>, MatchError> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .unwrap();
    pool.install(|| {
        slaves
            .par_iter()
            .map(|slave| match_feature_sets(master, slave, config))
            .collect()
    })
}
