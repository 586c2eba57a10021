mod commands;

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use beamflow_core::config::{Config, ConfigBuilder};
use beamflow_core::logging;
use beamflow_devices::DeviceError;

const PROGRAM_NAME: &str = "beamflow";
const ENV_PREFIX: &str = "BEAMFLOW";

pub async fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().collect();
    match parse_and_dispatch(args, true).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{}: {}", PROGRAM_NAME, error);
            error.exit_code()
        }
    }
}

/// Run a command line without installing the log subscriber
#[cfg_attr(not(test), allow(dead_code))]
pub async fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once(PROGRAM_NAME.to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args, false).await
}

async fn parse_and_dispatch(args: Vec<String>, init_logging: bool) -> Result<i32, CliError> {
    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(err) => {
            return match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    print!("{}", err);
                    Ok(0)
                }
                _ => Err(CliError::Usage(err.to_string())),
            }
        }
    };

    let config = load_config(cli.config.as_ref())?;
    if init_logging {
        logging::init_from_config(&config.logging, cli.log_level.as_deref())?;
    }

    match cli.command {
        CliCommand::Ladm { command } => commands::run_ladm_command(command, &config).await,
        CliCommand::Dccm { command } => commands::run_dccm_command(command, &config),
        CliCommand::Config { command } => commands::run_config_command(command, &config),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, CliError> {
    let mut builder = ConfigBuilder::new().with_environment_prefix(ENV_PREFIX);
    if let Some(path) = path {
        if !path.exists() {
            return Err(CliError::Usage(format!(
                "configuration file {} does not exist",
                path.display()
            )));
        }
        builder = builder.with_config_file(path);
    }
    Ok(builder.build()?)
}

#[derive(Parser)]
#[command(
    name = "beamflow",
    version,
    about = "LADM and DCCM calculations and simulated moves"
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log filter, overrides the configured level
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Large angle detector mover
    Ladm {
        #[command(subcommand)]
        command: commands::LadmCommand,
    },
    /// Double channel-cut monochromator
    Dccm {
        #[command(subcommand)]
        command: commands::DccmCommand,
    },
    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        command: commands::ConfigCommand,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Core(#[from] beamflow_core::error::Error),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_help_exits_cleanly() {
        assert_eq!(run(["--help"]).await.unwrap(), 0);
        assert_eq!(run(["ladm", "--help"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_command_is_usage_error() {
        let error = run(["monochromate"]).await.unwrap_err();
        assert!(matches!(error, CliError::Usage(_)));
        assert_eq!(error.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_ladm_calculation() {
        assert_eq!(run(["ladm", "calc", "--theta", "10"]).await.unwrap(), 0);
        assert_eq!(
            run(["ladm", "calc", "--theta", "10", "--samz", "25", "--json"])
                .await
                .unwrap(),
            0
        );
        assert_eq!(run(["ladm", "preview", "--theta", "-5"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ladm_simulated_move() {
        let code = run(["ladm", "move", "--theta", "20", "--from", "10"])
            .await
            .unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_dccm_conversions() {
        assert_eq!(run(["dccm", "energy-to-angle", "9.5"]).await.unwrap(), 0);
        assert_eq!(run(["dccm", "angle-to-energy", "12.0"]).await.unwrap(), 0);

        let error = run(["dccm", "energy-to-angle", "1.0"]).await.unwrap_err();
        assert!(matches!(error, CliError::Device(DeviceError::Domain(_))));
        assert_eq!(error.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[ladm]\nmax_theta_step_deg = 20.0").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = load_config(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.ladm.max_theta_step_deg, 20.0);
        assert_eq!(run(["--config", path.as_str(), "config", "show"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let error = run(["--config", "/nonexistent/beamflow.toml", "config", "show"])
            .await
            .unwrap_err();
        assert!(matches!(error, CliError::Usage(_)));
    }
}
