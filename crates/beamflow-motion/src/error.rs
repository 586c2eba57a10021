/*!
 * Error types for the beamflow motion crate.
 */
use thiserror::Error;

/// Error type for axis and sequencing operations
#[derive(Error, Debug)]
pub enum MotionError {
    /// The axis reported a fault
    #[error("Axis {axis}: {message}")]
    Axis {
        /// Name of the axis
        axis: String,
        /// Fault description
        message: String,
    },

    /// The axis position is not available
    #[error("Position of axis {0} is unknown")]
    UnknownPosition(String),

    /// A move sequence could not be built or run
    #[error("Sequence error: {0}")]
    Sequence(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] beamflow_core::error::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for motion operations
pub type Result<T> = std::result::Result<T, MotionError>;

impl MotionError {
    /// Create a new axis fault
    pub fn axis<A: AsRef<str>, S: AsRef<str>>(axis: A, msg: S) -> Self {
        MotionError::Axis {
            axis: axis.as_ref().to_string(),
            message: msg.as_ref().to_string(),
        }
    }

    /// Create a new sequence error
    pub fn sequence<S: AsRef<str>>(msg: S) -> Self {
        MotionError::Sequence(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        MotionError::Other(msg.as_ref().to_string())
    }
}
