//! Ambient error taxonomy: failures that are fatal at construction, and
//! failures navigating the snapshot timeline.
//!
//! Neither type here is used for architectural faults — those are
//! surfaced as [`crate::core::engine::FaultInfo`], a plain data record
//! returned from the hot tick loop, not an [`std::error::Error`] impl.

use thiserror::Error;

/// Fatal misconfiguration detected while constructing a subsystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The cache's set/line-size geometry leaves zero or negative tag bits.
    #[error("invalid cache geometry: {sets} sets x {line_size}-byte lines ({reason})")]
    InvalidCacheGeometry { sets: u32, line_size: u32, reason: &'static str },

    /// A cache line size that is not a multiple of the word size.
    #[error("cache line size {line_size} is not a multiple of the word size")]
    MisalignedLineSize { line_size: u32 },

    /// An unrecognized replacement-policy name in configuration.
    #[error("unknown cache replacement policy: {0}")]
    UnknownReplacementPolicy(String),

    /// A capacity field that must be positive was configured as zero.
    #[error("{field} must be greater than zero")]
    ZeroCapacity { field: &'static str },
}

/// Failure navigating the snapshot timeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// The requested step count would move outside the recorded timeline.
    #[error("snapshot step {requested} out of range [{min}, {max})")]
    OutOfRange { requested: i64, min: i64, max: i64 },
}
