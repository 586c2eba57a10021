/*!
 * Configuration management for beamflow.
 *
 * This module provides functionality to load, validate, and access configuration
 * settings for beamflow devices: mechanism geometry, crystal constants, soft
 * limits and the logging setup.
 */
use std::path::Path;
use std::sync::Arc;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Core configuration for beamflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Large angle detector mover configuration
    #[serde(default)]
    pub ladm: LadmConfig,

    /// Double crystal monochromator configuration
    #[serde(default)]
    pub dccm: DccmConfig,

    /// Simulated hardware configuration
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// General configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Hutch the devices live in (XCS, XPP, ...)
    #[serde(default = "default_hutch")]
    pub hutch: String,

    /// Application environment (development, production, etc.)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to print the log target
    #[serde(default = "default_with_target")]
    pub with_target: bool,
}

/// Large angle detector mover configuration
///
/// Lengths are in millimetres and angles in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadmConfig {
    /// Base PV of the mechanism
    #[serde(default = "default_ladm_prefix")]
    pub prefix: String,

    /// Distance from the interaction point to the short rail
    #[serde(default = "default_short_rail_radius")]
    pub short_rail_radius: f64,

    /// Distance from the interaction point to the long rail
    #[serde(default = "default_long_rail_radius")]
    pub long_rail_radius: f64,

    /// Rail angle (90 - 27 degrees)
    #[serde(default = "default_rail_angle")]
    pub rail_angle_deg: f64,

    /// Reference angle used for the sample z correction
    #[serde(default = "default_reference_angle")]
    pub reference_angle_deg: f64,

    /// Maximum disagreement between the two rail derived angles
    #[serde(default = "default_theta_tolerance")]
    pub theta_tolerance_deg: f64,

    /// Largest theta change performed in one sequenced move
    #[serde(default = "default_max_theta_step")]
    pub max_theta_step_deg: f64,

    /// Low soft limit of the horizontal translation
    #[serde(default)]
    pub low_limit_x: Option<f64>,

    /// High soft limit of the horizontal translation
    #[serde(default)]
    pub high_limit_x: Option<f64>,

    /// PV receiving the theta readback after each move
    #[serde(default = "default_theta_readback_pv")]
    pub theta_readback_pv: String,

    /// PV receiving the gamma readback after vertical moves
    #[serde(default = "default_gamma_readback_pv")]
    pub gamma_readback_pv: String,
}

/// Double crystal monochromator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DccmConfig {
    /// Base PV of the monochromator motors
    #[serde(default = "default_dccm_prefix")]
    pub prefix: String,

    /// Crystal lattice spacing in angstrom
    #[serde(default = "default_lattice_spacing")]
    pub lattice_spacing: f64,

    /// Lowest commandable energy in keV
    #[serde(default = "default_energy_low")]
    pub energy_low_kev: f64,

    /// Highest commandable energy in keV
    #[serde(default = "default_energy_high")]
    pub energy_high_kev: f64,

    /// Translation position with the crystals in the beam
    #[serde(default)]
    pub in_position: f64,

    /// Translation position with the crystals out of the beam
    #[serde(default = "default_out_position")]
    pub out_position: f64,

    /// Suffix of the PV ACR uses to report the move status
    #[serde(default = "default_acr_status_suffix")]
    pub acr_status_suffix: String,

    /// Index of the ACR energy request PV
    #[serde(default = "default_acr_pv_index")]
    pub acr_pv_index: u32,
}

/// Simulated hardware configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Time a simulated axis takes to settle after a move
    #[serde(default)]
    pub settle_time_ms: u64,

    /// Deadband reported by simulated axes
    #[serde(default = "default_deadband")]
    pub deadband: f64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            hutch: default_hutch(),
            environment: default_environment(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: default_with_target(),
        }
    }
}

impl Default for LadmConfig {
    fn default() -> Self {
        Self {
            prefix: default_ladm_prefix(),
            short_rail_radius: default_short_rail_radius(),
            long_rail_radius: default_long_rail_radius(),
            rail_angle_deg: default_rail_angle(),
            reference_angle_deg: default_reference_angle(),
            theta_tolerance_deg: default_theta_tolerance(),
            max_theta_step_deg: default_max_theta_step(),
            low_limit_x: None,
            high_limit_x: None,
            theta_readback_pv: default_theta_readback_pv(),
            gamma_readback_pv: default_gamma_readback_pv(),
        }
    }
}

impl Default for DccmConfig {
    fn default() -> Self {
        Self {
            prefix: default_dccm_prefix(),
            lattice_spacing: default_lattice_spacing(),
            energy_low_kev: default_energy_low(),
            energy_high_kev: default_energy_high(),
            in_position: 0.0,
            out_position: default_out_position(),
            acr_status_suffix: default_acr_status_suffix(),
            acr_pv_index: default_acr_pv_index(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            settle_time_ms: 0,
            deadband: default_deadband(),
        }
    }
}

fn default_app_name() -> String {
    "beamflow".to_string()
}

fn default_hutch() -> String {
    "XCS".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_with_target() -> bool {
    true
}

fn default_ladm_prefix() -> String {
    "XCS:LAM".to_string()
}

fn default_short_rail_radius() -> f64 {
    2960.0
}

fn default_long_rail_radius() -> f64 {
    6735.0
}

fn default_rail_angle() -> f64 {
    63.0
}

fn default_reference_angle() -> f64 {
    27.0
}

fn default_theta_tolerance() -> f64 {
    0.01
}

fn default_max_theta_step() -> f64 {
    28.0
}

fn default_theta_readback_pv() -> String {
    "XCS:VARS:LAM:Theta".to_string()
}

fn default_gamma_readback_pv() -> String {
    "XCS:VARS:LAM:Gamma".to_string()
}

fn default_dccm_prefix() -> String {
    "SP1L0:DCCM".to_string()
}

fn default_lattice_spacing() -> f64 {
    3.1356011499587773
}

fn default_energy_low() -> f64 {
    4.0
}

fn default_energy_high() -> f64 {
    25.0
}

fn default_out_position() -> f64 {
    -25.0
}

fn default_acr_status_suffix() -> String {
    "AO805".to_string()
}

fn default_acr_pv_index() -> u32 {
    2
}

fn default_deadband() -> f64 {
    0.01
}

impl Config {
    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the values that would make the conversions meaningless
    pub fn validate(&self) -> Result<()> {
        let ladm = &self.ladm;
        if ladm.short_rail_radius <= 0.0 || ladm.long_rail_radius <= ladm.short_rail_radius {
            return Err(Error::config(format!(
                "rail radii must satisfy 0 < short ({}) < long ({})",
                ladm.short_rail_radius, ladm.long_rail_radius
            )));
        }
        if ladm.theta_tolerance_deg <= 0.0 || ladm.max_theta_step_deg <= 0.0 {
            return Err(Error::config("theta tolerance and step must be positive"));
        }
        if let (Some(low), Some(high)) = (ladm.low_limit_x, ladm.high_limit_x) {
            if low >= high {
                return Err(Error::config(format!(
                    "horizontal soft limits are inverted: {} >= {}",
                    low, high
                )));
            }
        }
        let dccm = &self.dccm;
        if dccm.lattice_spacing <= 0.0 {
            return Err(Error::config("lattice spacing must be positive"));
        }
        if dccm.energy_low_kev >= dccm.energy_high_kev {
            return Err(Error::config("energy limits are inverted"));
        }
        Ok(())
    }
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
    override_with: Option<Config>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Override with an existing config
    pub fn override_with(mut self, config: Config) -> Self {
        self.override_with = Some(config);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        if let Some(config) = self.override_with {
            config.validate()?;
            return Ok(config);
        }

        let mut config_builder = ConfigLib::builder();

        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;
        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}
