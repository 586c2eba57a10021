/*!
 * Device trait and core device abstractions.
 *
 * A device groups the axes and signals of one piece of hardware under a PV
 * prefix. Every device can describe itself, stop its motion and render a
 * status table.
 */
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use beamflow_core::error::Error as CoreError;
use beamflow_core::types::Kind;
use beamflow_motion::MotionError;

use crate::report::Table;

/// Error type for device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// A conversion was asked for a value outside its mathematical domain
    #[error("Domain error: {0}")]
    Domain(String),

    /// The value is out of range for the quantity
    #[error("Value out of range for {0}: {1}")]
    ValueOutOfRange(String, String),

    /// A signal could not be read or written
    #[error("Signal error on {pv}: {message}")]
    Signal {
        /// PV of the signal
        pv: String,
        /// Failure description
        message: String,
    },

    /// The value type is not valid for the signal
    #[error("Invalid value type for {0}: expected {1}, got {2}")]
    InvalidValueType(String, String, String),

    /// No device with this name
    #[error("Device not found: {0}")]
    NotFound(String),

    /// A device with this name is already registered
    #[error("Device already registered: {0}")]
    AlreadyRegistered(String),

    /// Axis or sequencing error
    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

impl DeviceError {
    /// Create a new domain error
    pub fn domain<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Domain(msg.as_ref().to_string())
    }

    /// Create a new out of range error
    pub fn out_of_range<Q: AsRef<str>, S: AsRef<str>>(quantity: Q, msg: S) -> Self {
        DeviceError::ValueOutOfRange(quantity.as_ref().to_string(), msg.as_ref().to_string())
    }

    /// Create a new signal error
    pub fn signal<P: AsRef<str>, S: AsRef<str>>(pv: P, msg: S) -> Self {
        DeviceError::Signal {
            pv: pv.as_ref().to_string(),
            message: msg.as_ref().to_string(),
        }
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Other(msg.as_ref().to_string())
    }
}

/// A named part of a device (an axis or a signal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInfo {
    /// Attribute name (x1, th1, measured, ...)
    pub name: String,
    /// PV suffix appended to the device prefix
    pub suffix: String,
    /// How the component is reported
    pub kind: Kind,
    /// Short description
    pub doc: String,
}

/// Device information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// The device name
    pub name: String,
    /// Base PV of the device
    pub prefix: String,
    /// The device type
    pub device_type: String,
    /// Description of the hardware
    pub description: Option<String>,
    /// Components of the device
    pub components: Vec<ComponentInfo>,
}

impl DeviceInfo {
    /// Create device information without components
    pub fn new<N, P, T>(name: N, prefix: P, device_type: T) -> Self
    where
        N: Into<String>,
        P: Into<String>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            device_type: device_type.into(),
            description: None,
            components: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a component
    pub fn with_component(mut self, name: &str, suffix: &str, kind: Kind, doc: &str) -> Self {
        self.components.push(ComponentInfo {
            name: name.to_string(),
            suffix: suffix.to_string(),
            kind,
            doc: doc.to_string(),
        });
        self
    }

    /// Look up a component by name
    pub fn component(&self, name: &str) -> Option<&ComponentInfo> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// The core device trait
#[async_trait]
pub trait Device: Send + Sync + Debug {
    /// Get the device information
    fn info(&self) -> &DeviceInfo;

    /// Get the device name
    fn name(&self) -> &str {
        &self.info().name
    }

    /// Get the base PV
    fn prefix(&self) -> &str {
        &self.info().prefix
    }

    /// Get the device type
    fn device_type(&self) -> &str {
        &self.info().device_type
    }

    /// Stop every motion the device can command
    async fn stop(&self) -> Result<()>;

    /// Snapshot of the device as a table
    async fn status(&self) -> Result<Table>;
}
