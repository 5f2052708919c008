use thiserror::Error;

/// Errors raised by the simulation core.
///
/// Terminal outcomes such as a stalled run or an exhausted step budget are
/// not errors and are reported through the engine's state instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegregationError {
    /// The configuration cannot describe a valid run.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// A lattice position outside `[0, size) x [0, size)` was accessed.
    #[error("position ({row}, {col}) is outside the {size}x{size} lattice")]
    Index { row: usize, col: usize, size: usize },
}

impl SegregationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SegregationError::Configuration(message.into())
    }
}
