/*!
 * Tracing setup for beamflow.
 *
 * Devices open one span per instance, keyed by PV prefix, and nest a span
 * per operation under it so interleaved moves of several devices stay
 * readable. `RUST_LOG` always wins over the configured filter.
 */
use tracing::Span;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Install the global subscriber at `info`
pub fn init() -> Result<()> {
    install("info", true)
}

/// Install the global subscriber from the `[logging]` section
///
/// `filter` replaces the configured level when given, e.g. from a command
/// line flag ("debug", "beamflow_devices=trace").
pub fn init_from_config(config: &LoggingConfig, filter: Option<&str>) -> Result<()> {
    install(filter.unwrap_or(&config.level), config.with_target)
}

fn install(filter: &str, with_target: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(with_target))
        .with(filter)
        .try_init()
        .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))
}

/// Span covering everything a device instance logs
pub fn device_span(device: &str, prefix: &str) -> Span {
    tracing::info_span!("device", name = %device, prefix = %prefix)
}

/// Span for one operation of a device, nested under its device span
pub fn operation_span(device: &Span, operation: &str) -> Span {
    tracing::info_span!(parent: device, "operation", name = %operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_refused() {
        let _ = init();
        assert!(init_from_config(&LoggingConfig::default(), Some("debug")).is_err());
    }

    #[test]
    fn test_operation_nests_under_device() {
        let device = device_span("ladm", "XCS:LAM");
        let operation = operation_span(&device, "move_to_theta");
        let _guard = operation.enter();
        tracing::info!("inside nested spans");
    }
}
