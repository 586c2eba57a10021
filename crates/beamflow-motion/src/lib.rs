/*!
 * Beamflow Motion
 *
 * This crate provides the axis abstraction, simulated axes and the phased,
 * cancellable move sequencing used by the beamflow devices.
 */

#![warn(missing_docs)]

// Re-export core types
pub use beamflow_core::prelude;

pub mod axis;
pub mod cancel;
pub mod error;
pub mod sequence;
pub mod sim;

// Re-export main types for convenience
pub use axis::{require_position, Axis, AxisBackend, MoveStatus, SharedAxis};
pub use cancel::CancelToken;
pub use error::{MotionError, Result};
pub use sequence::{stop_all, Command, MoveSequence, Phase, SequenceOutcome};
pub use sim::{AxisCall, CallLog, SimAxis, SimBackend};

/// Beamflow motion crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the motion layer
pub fn init() -> Result<()> {
    tracing::info!("Beamflow Motion {} initialized", VERSION);
    Ok(())
}
