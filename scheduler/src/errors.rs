//! Error taxonomy for the scheduling engine.

use crate::hardware::HardwareError;

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Error type for scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The night's timing envelope could not be computed. Fatal at startup.
    #[error("night planning failed: {0}")]
    NightPlanning(String),

    /// A malformed or out-of-range sequence line. Logged and skipped during
    /// a load; never aborts it.
    #[error("invalid sequence line {line}: {reason}")]
    Validation { line: usize, reason: String },

    /// A hardware command timed out or replied with garbage.
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// An overlapped readout did not complete in time; the affected exposure
    /// is rolled back and retried.
    #[error("camera readout lost: {0}")]
    ReadoutLoss(String),

    /// The focus-analysis hand-off produced nothing usable. Fatal.
    #[error("focus analysis failed: {0}")]
    FocusFailure(String),

    /// The pointing-offset hand-off failed; previous offsets stay in effect.
    #[error("pointing-offset analysis failed: {0}")]
    OffsetFailure(String),

    /// The observation record could not be written; the run continues
    /// without a fresh checkpoint.
    #[error("could not persist observation record: {0}")]
    Persistence(String),

    /// Configuration file problems.
    #[error("configuration error: {0}")]
    Configuration(String),
}
