use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Outcome of one matching invocation.
///
/// Maps the index of each matched master feature to its ordered slave
/// candidate indices, best first. Indices refer into the caller-owned
/// master and slave sets of that invocation; no feature data is copied.
/// A master with no candidate in range is simply absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct FeatureMatchingResult {
    candidates: BTreeMap<usize, Vec<usize>>,
}

impl FeatureMatchingResult {
    pub fn new() -> Self {
        FeatureMatchingResult {
            candidates: BTreeMap::new(),
        }
    }

    /// Records the ordered candidate list for one master feature.
    ///
    /// An empty list is dropped, keeping candidate-less masters out of the
    /// result. Each master is recorded at most once per invocation; a repeat
    /// insert replaces the previous list.
    pub fn insert(&mut self, master: usize, slaves: Vec<usize>) {
        if slaves.is_empty() {
            return;
        }
        self.candidates.insert(master, slaves);
    }

    /// Unions another result into this one, used when combining recursive
    /// sub-results. Masters present in both keep the incoming list.
    pub fn merge(&mut self, other: FeatureMatchingResult) {
        for (master, slaves) in other.candidates {
            self.candidates.insert(master, slaves);
        }
    }

    /// Indices of all matched master features, ascending.
    pub fn matched_masters(&self) -> Vec<usize> {
        self.candidates.keys().copied().collect()
    }

    /// Ordered candidate list for one master feature, best first.
    pub fn candidates(&self, master: usize) -> Option<&[usize]> {
        self.candidates.get(&master).map(|slaves| slaves.as_slice())
    }

    /// Best match for one master feature, the head of its candidate list.
    pub fn best_match(&self, master: usize) -> Option<usize> {
        self.candidates
            .get(&master)
            .and_then(|slaves| slaves.first().copied())
    }

    /// Indices of all slave features appearing in any candidate list.
    pub fn matched_slaves(&self) -> BTreeSet<usize> {
        self.candidates.values().flatten().copied().collect()
    }

    /// Number of matched master features.
    pub fn master_count(&self) -> usize {
        self.candidates.len()
    }

    /// Total number of (master, candidate) pairs.
    pub fn candidate_pair_count(&self) -> usize {
        self.candidates.values().map(|slaves| slaves.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[usize])> {
        self.candidates
            .iter()
            .map(|(master, slaves)| (*master, slaves.as_slice()))
    }
}

impl Display for FeatureMatchingResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FeatureMatchingResult(masters: {}, candidate pairs: {})",
            self.master_count(),
            self.candidate_pair_count()
        )
    }
}
