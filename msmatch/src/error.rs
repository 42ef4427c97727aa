use thiserror::Error;

use crate::data::tolerance::ElutionMode;

/// Errors surfaced by the matching engine.
///
/// Only configuration problems are errors. Degenerate inputs such as empty
/// feature sets or masters without any candidate in range are not: they
/// produce a smaller result instead, and callers must treat a master feature
/// that is absent from the result as "no match found".
#[derive(Clone, Debug, PartialEq, Error)]
pub enum MatchError {
    /// Range elution comparison is only defined for scan-mode elution.
    #[error("range elution comparison requires scan mode, got {0}")]
    UnsupportedElutionCompare(ElutionMode),

    /// A feature was asked for its scan range but carries none, or an
    /// inverted one.
    #[error("feature {index} has no valid scan range")]
    MissingScanRange { index: usize },

    /// Tolerance, window or bucket settings that cannot be matched against.
    #[error("invalid tolerance: {0}")]
    InvalidTolerance(String),

    /// The adaptive matcher was driven past its recursion diagnostic bound.
    #[error("recursion depth {depth} exceeds the supported limit {limit}")]
    RecursionDepthExceeded { depth: usize, limit: usize },
}
