use std::fmt;
use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::data::tolerance::{ElutionMode, MassMode};

/// A single detected LC-MS feature.
///
/// Features are immutable inputs to the matching engine; the engine never
/// rewrites their coordinates. `charge` follows the convention that 0 means
/// unknown. `quality` is an intrinsic goodness score, larger is better.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct Feature {
    /// Monoisotopic neutral mass.
    pub mass: f64,
    /// Mass over charge.
    pub mz: f64,
    /// Charge state, 0 if unknown.
    pub charge: i32,
    /// Retention time.
    pub retention_time: f64,
    /// Hydrophobicity estimate.
    pub hydrophobicity: f64,
    /// Apex scan number.
    pub scan: i32,
    /// First and last scan, if the feature spans more than the apex.
    pub scan_range: Option<(i32, i32)>,
    /// Summed intensity.
    pub intensity: f64,
    /// Intrinsic goodness score, larger is better.
    pub quality: f64,
}

impl Feature {
    /// Constructs a new `Feature`.
    ///
    /// # Arguments
    ///
    /// * `mass` - Monoisotopic neutral mass.
    /// * `mz` - Mass over charge.
    /// * `charge` - Charge state, 0 if unknown.
    /// * `retention_time` - Retention time.
    /// * `hydrophobicity` - Hydrophobicity estimate.
    /// * `scan` - Apex scan number.
    /// * `intensity` - Summed intensity.
    /// * `quality` - Intrinsic goodness score, larger is better.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use msmatch::data::feature::Feature;
    /// let feature = Feature::new(999.98, 500.99, 2, 25.3, 0.42, 1200, 5.0e4, 0.9);
    /// assert_eq!(feature.charge, 2);
    /// assert_eq!(feature.scan_range, None);
    /// ```
    pub fn new(
        mass: f64,
        mz: f64,
        charge: i32,
        retention_time: f64,
        hydrophobicity: f64,
        scan: i32,
        intensity: f64,
        quality: f64,
    ) -> Self {
        Feature {
            mass,
            mz,
            charge,
            retention_time,
            hydrophobicity,
            scan,
            scan_range: None,
            intensity,
            quality,
        }
    }

    /// Attaches a first/last scan range.
    pub fn with_scan_range(mut self, first: i32, last: i32) -> Self {
        self.scan_range = Some((first, last));
        self
    }

    /// Mass-axis coordinate under the given mode.
    pub fn mass_value(&self, mode: MassMode) -> f64 {
        match mode {
            MassMode::Monoisotopic => self.mass,
            MassMode::Mz => self.mz,
        }
    }

    /// Elution-axis coordinate under the given mode.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use msmatch::data::feature::Feature;
    /// # use msmatch::data::tolerance::ElutionMode;
    /// let feature = Feature::new(999.98, 500.99, 2, 25.3, 0.42, 1200, 5.0e4, 0.9);
    /// assert_eq!(feature.elution_value(ElutionMode::Time), 25.3);
    /// assert_eq!(feature.elution_value(ElutionMode::Hydrophobicity), 0.42);
    /// assert_eq!(feature.elution_value(ElutionMode::Scan), 1200.0);
    /// ```
    pub fn elution_value(&self, mode: ElutionMode) -> f64 {
        match mode {
            ElutionMode::Hydrophobicity => self.hydrophobicity,
            ElutionMode::Time => self.retention_time,
            ElutionMode::Scan => self.scan as f64,
        }
    }

    /// Scan range endpoints as floats, if the feature carries a valid one.
    ///
    /// A range is valid when the first scan does not exceed the last.
    pub fn scan_range_values(&self) -> Option<(f64, f64)> {
        match self.scan_range {
            Some((first, last)) if first <= last => Some((first as f64, last as f64)),
            _ => None,
        }
    }
}

impl Display for Feature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Feature(mass: {}, mz: {}, charge: {}, rt: {}, scan: {}, quality: {})",
            self.mass, self.mz, self.charge, self.retention_time, self.scan, self.quality
        )
    }
}

/// An ordered collection of features from one acquisition run.
///
/// Matching always takes two of these, conventionally called master and
/// slave: the master drives the iteration, the slave supplies candidates.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct FeatureSet {
    /// Identifier of the originating run.
    pub run_id: String,
    pub features: Vec<Feature>,
}

impl FeatureSet {
    /// Constructs a new `FeatureSet`.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Identifier of the originating run.
    /// * `features` - The features, in acquisition order.
    pub fn new(run_id: impl Into<String>, features: Vec<Feature>) -> Self {
        FeatureSet {
            run_id: run_id.into(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }
}

impl Display for FeatureSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FeatureSet(run: {}, features: {})",
            self.run_id,
            self.features.len()
        )
    }
}
