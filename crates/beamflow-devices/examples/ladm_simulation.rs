use std::sync::Arc;
use std::time::Duration;

use beamflow_core::config::{DccmConfig, LadmConfig};
use beamflow_devices::devices::{Dccm, Ladm, MoveOutcome};
use beamflow_devices::{Device, DeviceRegistry, SimSignalBackend};
use beamflow_motion::{CancelToken, SimBackend};

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the logger
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Simulated motors settle after a short delay
    let axes = SimBackend::new().with_settle_time(Duration::from_millis(50));
    let signals = SimSignalBackend::new();

    let ladm_config = LadmConfig {
        low_limit_x: Some(-100.0),
        high_limit_x: Some(100.0),
        ..LadmConfig::default()
    };

    // Register the devices
    let registry = DeviceRegistry::new();
    let ladm = registry.register(Ladm::new("ladm", &ladm_config, &axes, &signals))?;
    let dccm = registry.register(Dccm::new("dccm", &DccmConfig::default(), &axes, &signals))?;
    info!("Registered devices: {:?}", registry.names()?);

    // Stop everything on Ctrl-C
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    // Sweep the LADM; the second move is larger than one step and gets split
    for theta in [10.0, 45.0] {
        println!("{}", ladm.theta_move_preview(theta));
        match ladm.move_to_theta(theta, 0.0, &cancel).await? {
            MoveOutcome::Completed { readback } => info!("theta now {:?}", readback),
            MoveOutcome::Cancelled => {
                info!("cancelled by operator");
                break;
            }
            other => info!("not moved: {:?}", other),
        }
    }
    println!("{}", ladm.status().await?);

    // A horizontal move outside the soft limits is refused
    let outcome = ladm.move_horizontal(250.0, &cancel).await?;
    info!("horizontal move: {:?}", outcome);

    // Print a calculation without moving
    println!("{}", ladm.calculation_table(30.0, 25.0).to_table());

    // Select 9.5 keV on the monochromator
    dccm.energy().move_energy(9.5, true).await?;
    println!("{}", dccm.status().await?);

    let shared: Arc<dyn Device> = registry.get("ladm")?;
    info!("{} is a {}", shared.name(), shared.device_type());

    registry.stop_all().await?;
    Ok(())
}
