/*!
 * Prelude module for Beamflow Core.
 *
 * This module re-exports commonly used types and functions from the core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{Access, Kind, Value};

// Re-export config types
pub use crate::config::{
    Config, ConfigBuilder, DccmConfig, LadmConfig, SharedConfig, SimulationConfig,
};

// Re-export utility functions
pub use crate::utils::{deg_to_rad, finite, is_close, rad_to_deg};

// Re-export logging
pub use crate::logging::{device_span, operation_span};
pub use tracing::{debug, error, info, trace, warn};

// Re-export core initialization
pub use crate::init;
