/*!
 * Beamflow Devices
 *
 * This crate provides the device bindings of the beamflow workspace: the
 * DCCM energy positioner, the LADM two-rail mechanism and the EK9000 I/O
 * cards, together with the signal, registry and report plumbing they share.
 */

#![warn(missing_docs)]

// Re-export core types
pub use beamflow_core::prelude;

pub mod device;
pub mod devices;
pub mod registry;
pub mod report;
pub mod signal;

// Re-export device trait and basic implementations
pub use device::{ComponentInfo, Device, DeviceError, DeviceInfo, Result};
pub use registry::{DeviceRegistry, SharedDeviceRegistry};
pub use report::{format_reading, Table};
pub use signal::{
    pv_name, SharedSignal, Signal, SignalBackend, SignalInfo, SimSignal, SimSignalBackend,
};

/// Beamflow devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the device layer
pub fn init() -> std::result::Result<(), beamflow_core::error::Error> {
    tracing::info!("Beamflow Devices {} initialized", VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
