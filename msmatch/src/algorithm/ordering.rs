use std::cmp::Ordering;
use std::fmt;
use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::data::feature::Feature;
use crate::data::tolerance::ElutionMode;

/// Strategy for ranking slave candidates against one master feature.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize, Encode, Decode)]
pub enum OrderingMode {
    ByQuality,
    ByElutionCloseness,
}

impl Default for OrderingMode {
    fn default() -> Self {
        OrderingMode::ByQuality
    }
}

impl Display for OrderingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OrderingMode::ByQuality => write!(f, "ByQuality"),
            OrderingMode::ByElutionCloseness => write!(f, "ByElutionCloseness"),
        }
    }
}

/// Ranks `candidates` (indices into `slaves`) best-first for `master`.
///
/// Returns a new list and leaves the input untouched. `ByQuality` sorts by
/// intrinsic candidate quality, descending. `ByElutionCloseness` sorts by
/// absolute elution distance to the master under `elution_mode`, ascending.
/// Both sorts are stable, so ties keep their input order.
pub fn order_candidates(
    candidates: &[usize],
    slaves: &[Feature],
    master: &Feature,
    mode: OrderingMode,
    elution_mode: ElutionMode,
) -> Vec<usize> {
    let mut ranked = candidates.to_vec();
    match mode {
        OrderingMode::ByQuality => {
            ranked.sort_by(|&a, &b| {
                slaves[b]
                    .quality
                    .partial_cmp(&slaves[a].quality)
                    .unwrap_or(Ordering::Equal)
            });
        }
        OrderingMode::ByElutionCloseness => {
            let reference = master.elution_value(elution_mode);
            ranked.sort_by_key(|&candidate| {
                OrderedFloat((slaves[candidate].elution_value(elution_mode) - reference).abs())
            });
        }
    }
    ranked
}
