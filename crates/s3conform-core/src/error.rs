//! Error types for s3conform core

use thiserror::Error;

/// Errors raised when a value type is constructed from invalid parts or a
/// quirk configuration names something the engine does not know.
///
/// The pure components never fail at evaluation time (parsers return
/// `Option`, range resolution returns a tagged [`crate::range::Resolution`]);
/// these errors only guard construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConformError {
    /// A range spec with neither a first nor a last position
    #[error("range spec must carry a start or an end")]
    EmptyRangeSpec,
    /// A bounded range spec whose last position precedes its first
    #[error("range spec end {end} precedes start {start}")]
    InvertedRangeSpec {
        /// First byte position
        start: u64,
        /// Last byte position
        end: u64,
    },
    /// A range request with no specs
    #[error("range request must contain at least one range spec")]
    NoRangeSpecs,
    /// A range unit that cannot appear on the wire
    #[error("invalid range unit: {unit:?}")]
    InvalidRangeUnit {
        /// The rejected unit
        unit: String,
    },
    /// A Content-Range value that violates its shape invariants
    #[error("invalid content range: {reason}")]
    InvalidContentRange {
        /// Which invariant was violated
        reason: String,
    },
    /// A quirk name that is not part of the known set
    #[error("unknown quirk: {name}")]
    UnknownQuirk {
        /// The unrecognised name
        name: String,
    },
    /// A quirk preset name that is not known
    #[error("unknown quirk preset: {name}")]
    UnknownPreset {
        /// The unrecognised preset
        name: String,
    },
    /// A listing cursor token that does not decode
    #[error("malformed listing cursor token: {token}")]
    MalformedCursor {
        /// The rejected token
        token: String,
    },
}

/// Result type alias using ConformError as the error type.
pub type Result<T> = std::result::Result<T, ConformError>;
