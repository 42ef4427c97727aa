use std::fmt;
use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// How a mass tolerance value is interpreted.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize, Encode, Decode)]
pub enum MassToleranceKind {
    Absolute,
    Ppm,
}

impl MassToleranceKind {
    /// Converts a tolerance value into an absolute Dalton delta.
    ///
    /// For `Absolute` the value is returned unchanged. For `Ppm` the delta
    /// scales with the reference mass, so the conversion must always use the
    /// mass of the feature currently being queried as `reference`.
    ///
    /// # Arguments
    ///
    /// * `reference` - The mass the tolerance is applied around.
    /// * `value` - The tolerance value, in Dalton or PPM depending on kind.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use msmatch::data::tolerance::MassToleranceKind;
    /// let delta = MassToleranceKind::Ppm.absolute_delta(1000.0, 5.0);
    /// assert_eq!(delta, 0.005);
    ///
    /// let delta = MassToleranceKind::Absolute.absolute_delta(1000.0, 5.0);
    /// assert_eq!(delta, 5.0);
    /// ```
    pub fn absolute_delta(&self, reference: f64, value: f64) -> f64 {
        match self {
            MassToleranceKind::Absolute => value,
            MassToleranceKind::Ppm => reference * value / 1_000_000.0,
        }
    }
}

impl Default for MassToleranceKind {
    fn default() -> Self {
        MassToleranceKind::Ppm
    }
}

impl Display for MassToleranceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MassToleranceKind::Absolute => write!(f, "Absolute"),
            MassToleranceKind::Ppm => write!(f, "Ppm"),
        }
    }
}

/// The elution coordinate features are compared on.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize, Encode, Decode)]
pub enum ElutionMode {
    Hydrophobicity,
    Time,
    Scan,
}

impl Default for ElutionMode {
    fn default() -> Self {
        ElutionMode::Time
    }
}

impl Display for ElutionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ElutionMode::Hydrophobicity => write!(f, "Hydrophobicity"),
            ElutionMode::Time => write!(f, "Time"),
            ElutionMode::Scan => write!(f, "Scan"),
        }
    }
}

/// The mass axis features are compared on.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize, Encode, Decode)]
pub enum MassMode {
    Monoisotopic,
    Mz,
}

impl Default for MassMode {
    fn default() -> Self {
        MassMode::Monoisotopic
    }
}

impl Display for MassMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MassMode::Monoisotopic => write!(f, "Monoisotopic"),
            MassMode::Mz => write!(f, "Mz"),
        }
    }
}

/// Whether elution distances are taken between points or between scan ranges.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize, Encode, Decode)]
pub enum ElutionCompareMode {
    Point,
    Range,
}

impl Default for ElutionCompareMode {
    fn default() -> Self {
        ElutionCompareMode::Point
    }
}

impl Display for ElutionCompareMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ElutionCompareMode::Point => write!(f, "Point"),
            ElutionCompareMode::Range => write!(f, "Range"),
        }
    }
}

/// A mass tolerance plus an elution tolerance and the elution coordinate
/// they apply to.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize, Encode, Decode)]
pub struct Tolerance {
    pub delta_mass: f64,
    pub mass_tolerance_kind: MassToleranceKind,
    pub delta_elution: f64,
    pub elution_mode: ElutionMode,
}

impl Tolerance {
    /// Constructs a new `Tolerance`.
    ///
    /// # Arguments
    ///
    /// * `delta_mass` - Mass tolerance, in Dalton or PPM depending on kind.
    /// * `mass_tolerance_kind` - How `delta_mass` is interpreted.
    /// * `delta_elution` - Elution tolerance, in units of the elution mode.
    /// * `elution_mode` - The elution coordinate being compared.
    pub fn new(
        delta_mass: f64,
        mass_tolerance_kind: MassToleranceKind,
        delta_elution: f64,
        elution_mode: ElutionMode,
    ) -> Self {
        Tolerance {
            delta_mass,
            mass_tolerance_kind,
            delta_elution,
            elution_mode,
        }
    }

    /// A tolerance with an absolute Dalton mass component.
    pub fn absolute(delta_mass: f64, delta_elution: f64, elution_mode: ElutionMode) -> Self {
        Tolerance::new(
            delta_mass,
            MassToleranceKind::Absolute,
            delta_elution,
            elution_mode,
        )
    }

    /// A tolerance with a PPM mass component.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use msmatch::data::tolerance::{ElutionMode, Tolerance};
    /// let tolerance = Tolerance::ppm(10.0, 0.1, ElutionMode::Time);
    /// assert_eq!(tolerance.absolute_delta_mass(500.0), 0.005);
    /// ```
    pub fn ppm(delta_mass: f64, delta_elution: f64, elution_mode: ElutionMode) -> Self {
        Tolerance::new(
            delta_mass,
            MassToleranceKind::Ppm,
            delta_elution,
            elution_mode,
        )
    }

    /// Absolute Dalton mass delta for a comparison against `reference_mass`.
    pub fn absolute_delta_mass(&self, reference_mass: f64) -> f64 {
        self.mass_tolerance_kind
            .absolute_delta(reference_mass, self.delta_mass)
    }

    /// Rejects non-finite or negative deltas.
    pub fn validate(&self) -> Result<(), MatchError> {
        if !self.delta_mass.is_finite() || self.delta_mass < 0.0 {
            return Err(MatchError::InvalidTolerance(format!(
                "delta_mass must be finite and non-negative, got {}",
                self.delta_mass
            )));
        }
        if !self.delta_elution.is_finite() || self.delta_elution < 0.0 {
            return Err(MatchError::InvalidTolerance(format!(
                "delta_elution must be finite and non-negative, got {}",
                self.delta_elution
            )));
        }
        Ok(())
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::ppm(10.0, 0.1, ElutionMode::Time)
    }
}

impl Display for Tolerance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tolerance(mass: {} {}, elution: {} {})",
            self.delta_mass, self.mass_tolerance_kind, self.delta_elution, self.elution_mode
        )
    }
}

/// Gap between two closed intervals.
///
/// Zero when the intervals overlap or touch, otherwise the distance between
/// their nearest endpoints.
///
/// # Examples
///
/// ```rust
/// # use msmatch::data::tolerance::range_gap;
/// assert_eq!(range_gap((10.0, 20.0), (15.0, 30.0)), 0.0);
/// assert_eq!(range_gap((10.0, 12.0), (15.0, 18.0)), 3.0);
/// ```
pub fn range_gap(a: (f64, f64), b: (f64, f64)) -> f64 {
    let lower = a.0.max(b.0);
    let upper = a.1.min(b.1);
    if upper >= lower {
        0.0
    } else {
        lower - upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppm_conversion_scales_with_reference() {
        let tolerance = Tolerance::ppm(5.0, 0.05, ElutionMode::Time);
        assert_eq!(tolerance.absolute_delta_mass(1000.0), 0.005);
        assert_eq!(tolerance.absolute_delta_mass(2000.0), 0.01);
    }

    #[test]
    fn test_absolute_conversion_ignores_reference() {
        let tolerance = Tolerance::absolute(0.02, 0.05, ElutionMode::Time);
        assert_eq!(tolerance.absolute_delta_mass(1000.0), 0.02);
        assert_eq!(tolerance.absolute_delta_mass(2000.0), 0.02);
    }

    #[test]
    fn test_negative_ppm_value_keeps_sign() {
        // Asymmetric window bounds pass negative values through the same
        // conversion as positive ones.
        let delta = MassToleranceKind::Ppm.absolute_delta(1000.0, -5.0);
        assert_eq!(delta, -0.005);
    }

    #[test]
    fn test_validate_rejects_negative_deltas() {
        let tolerance = Tolerance::absolute(-0.01, 0.05, ElutionMode::Time);
        assert!(tolerance.validate().is_err());

        let tolerance = Tolerance::absolute(0.01, -0.05, ElutionMode::Time);
        assert!(tolerance.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_deltas() {
        let tolerance = Tolerance::ppm(f64::NAN, 0.05, ElutionMode::Time);
        assert!(tolerance.validate().is_err());

        let tolerance = Tolerance::ppm(5.0, f64::INFINITY, ElutionMode::Time);
        assert!(tolerance.validate().is_err());
    }

    #[test]
    fn test_range_gap_overlap_and_containment() {
        assert_eq!(range_gap((100.0, 110.0), (105.0, 115.0)), 0.0);
        assert_eq!(range_gap((100.0, 120.0), (105.0, 110.0)), 0.0);
        // Touching endpoints count as overlap.
        assert_eq!(range_gap((100.0, 110.0), (110.0, 115.0)), 0.0);
    }

    #[test]
    fn test_range_gap_disjoint_is_symmetric() {
        assert_eq!(range_gap((100.0, 110.0), (120.0, 130.0)), 10.0);
        assert_eq!(range_gap((120.0, 130.0), (100.0, 110.0)), 10.0);
    }
}
