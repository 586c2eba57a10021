use std::time::Duration;

use anyhow::anyhow;
use tracing::{info, warn};

use beamflow_core::config::Config;
use beamflow_devices::devices::{BraggCrystal, Ladm, MoveOutcome, RailGeometry};
use beamflow_devices::{Device, SimSignalBackend};
use beamflow_motion::{CancelToken, SimBackend};

use super::CliError;

#[derive(clap::Subcommand)]
pub(super) enum LadmCommand {
    /// Print rail positions for a theta without moving
    Calc(CalcArgs),
    /// Print the moves a theta change would issue
    Preview(PreviewArgs),
    /// Run a sequenced theta move against simulated axes
    Move(MoveArgs),
}

#[derive(clap::Args)]
pub(super) struct CalcArgs {
    /// Target angle in degrees
    #[arg(long, allow_negative_numbers = true)]
    theta: f64,
    /// Sample z offset
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    samz: f64,
    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
pub(super) struct PreviewArgs {
    /// Target angle in degrees
    #[arg(long, allow_negative_numbers = true)]
    theta: f64,
}

#[derive(clap::Args)]
pub(super) struct MoveArgs {
    /// Target angle in degrees
    #[arg(long, allow_negative_numbers = true)]
    theta: f64,
    /// Sample z offset
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    samz: f64,
    /// Angle the simulated rails start at
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    from: f64,
}

#[derive(clap::Subcommand)]
pub(super) enum DccmCommand {
    /// Bragg angle in degrees for a photon energy in keV
    EnergyToAngle {
        #[arg(value_name = "KEV")]
        energy: f64,
    },
    /// Photon energy in keV for a Bragg angle in degrees
    AngleToEnergy {
        #[arg(value_name = "DEG", allow_negative_numbers = true)]
        angle: f64,
    },
}

#[derive(clap::Subcommand)]
pub(super) enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
}

pub(super) async fn run_ladm_command(
    command: LadmCommand,
    config: &Config,
) -> Result<i32, CliError> {
    let geometry = RailGeometry::from(&config.ladm);
    match command {
        LadmCommand::Calc(args) => {
            let calculation = geometry.calculate(args.theta, args.samz);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&calculation)?);
            } else {
                println!("{}", calculation.to_table());
            }
            Ok(0)
        }
        LadmCommand::Preview(args) => {
            println!("{}", geometry.preview(args.theta));
            Ok(0)
        }
        LadmCommand::Move(args) => run_simulated_move(args, config, &geometry).await,
    }
}

async fn run_simulated_move(
    args: MoveArgs,
    config: &Config,
    geometry: &RailGeometry,
) -> Result<i32, CliError> {
    let axes = SimBackend::new()
        .with_settle_time(Duration::from_millis(config.simulation.settle_time_ms))
        .with_deadband(config.simulation.deadband);
    let signals = SimSignalBackend::new();
    let ladm = Ladm::new("ladm", &config.ladm, &axes, &signals);

    let start = geometry.theta_to_rails(args.from, 0.0);
    let placements = [
        ("x1", start.x1),
        ("x2", start.x2),
        ("z", start.dz),
        ("y1", 0.0),
        ("y2", 0.0),
    ];
    for (axis, position) in placements {
        axes.get(axis)
            .ok_or_else(|| anyhow!("simulated axis {} was not created", axis))?
            .teleport(Some(position));
    }
    info!("Simulated LADM starts at theta = {}", args.from);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let outcome = ladm.move_to_theta(args.theta, args.samz, &cancel).await?;
    let code = match &outcome {
        MoveOutcome::Completed { readback } => {
            println!("theta = {}", beamflow_devices::format_reading(*readback));
            0
        }
        MoveOutcome::Cancelled => {
            warn!("Move cancelled");
            130
        }
        MoveOutcome::Ambiguous(report) | MoveOutcome::Refused(report) => {
            eprintln!("{}", report);
            1
        }
    };
    println!("{}", ladm.status().await?);
    Ok(code)
}

pub(super) fn run_dccm_command(command: DccmCommand, config: &Config) -> Result<i32, CliError> {
    let crystal = BraggCrystal::new(config.dccm.lattice_spacing);
    match command {
        DccmCommand::EnergyToAngle { energy } => {
            println!("{:.4}", crystal.energy_to_angle(energy)?);
        }
        DccmCommand::AngleToEnergy { angle } => {
            println!("{:.4}", crystal.angle_to_energy(angle)?);
        }
    }
    Ok(0)
}

pub(super) fn run_config_command(command: ConfigCommand, config: &Config) -> Result<i32, CliError> {
    match command {
        ConfigCommand::Show => print!("{}", config.to_toml()?),
    }
    Ok(0)
}
