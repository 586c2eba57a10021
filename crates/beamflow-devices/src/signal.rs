/*!
 * Process variable signals.
 *
 * A signal is a single named control point: a readback, a setpoint or a
 * calibration constant. Devices receive signals from a `SignalBackend` so
 * the same binding works against a live control system or the in-memory
 * simulation below.
 */
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use beamflow_core::types::{Access, Kind, Value};

use crate::device::{DeviceError, Result};

/// Join a device prefix and a component suffix
pub fn pv_name(prefix: &str, suffix: &str) -> String {
    format!("{}{}", prefix, suffix)
}

/// Static description of a signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalInfo {
    /// Full PV name
    pub pv: String,
    /// Read-only or read-write
    pub access: Access,
    /// How the signal is reported
    pub kind: Kind,
    /// Long name shown to operators
    pub description: String,
}

impl SignalInfo {
    /// Describe a read-only signal
    pub fn read_only<P: Into<String>, D: Into<String>>(pv: P, kind: Kind, description: D) -> Self {
        Self {
            pv: pv.into(),
            access: Access::ReadOnly,
            kind,
            description: description.into(),
        }
    }

    /// Describe a read-write signal
    pub fn read_write<P: Into<String>, D: Into<String>>(pv: P, kind: Kind, description: D) -> Self {
        Self {
            pv: pv.into(),
            access: Access::ReadWrite,
            kind,
            description: description.into(),
        }
    }
}

/// A process variable
#[async_trait]
pub trait Signal: Send + Sync + Debug {
    /// Static description
    fn info(&self) -> &SignalInfo;

    /// Full PV name
    fn pv(&self) -> &str {
        &self.info().pv
    }

    /// Read the current value
    async fn read(&self) -> Result<Value>;

    /// Write a new value
    async fn write(&self, value: Value) -> Result<()>;

    /// Read a numeric value, `None` when the PV holds no value
    async fn read_float(&self) -> Result<Option<f64>> {
        let value = self.read().await?;
        if value.is_null() {
            return Ok(None);
        }
        value.as_float().map(Some).ok_or_else(|| {
            DeviceError::InvalidValueType(
                self.pv().to_string(),
                "float".to_string(),
                value.type_name().to_string(),
            )
        })
    }

    /// Read a string value
    async fn read_string(&self) -> Result<String> {
        let value = self.read().await?;
        match value {
            Value::String(s) => Ok(s),
            other => Err(DeviceError::InvalidValueType(
                self.pv().to_string(),
                "string".to_string(),
                other.type_name().to_string(),
            )),
        }
    }
}

/// A reference-counted signal
pub type SharedSignal = Arc<dyn Signal>;

/// Creates signals bound to process variables
pub trait SignalBackend: Send + Sync {
    /// Create a signal for the described PV
    fn signal(&self, info: SignalInfo) -> SharedSignal;
}

/// An in-memory signal
#[derive(Debug)]
pub struct SimSignal {
    info: SignalInfo,
    value: RwLock<Value>,
    writes: RwLock<Vec<Value>>,
}

impl SimSignal {
    /// Create a signal holding `Value::Null`
    pub fn new(info: SignalInfo) -> Self {
        Self {
            info,
            value: RwLock::new(Value::Null),
            writes: RwLock::new(Vec::new()),
        }
    }

    /// Change the value as the control system would, bypassing access checks
    pub fn set_readback<V: Into<Value>>(&self, value: V) -> Result<()> {
        let mut current = self
            .value
            .write()
            .map_err(|_| DeviceError::signal(&self.info.pv, "value lock poisoned"))?;
        *current = value.into();
        Ok(())
    }

    /// Values written through [`Signal::write`], oldest first
    pub fn writes(&self) -> Vec<Value> {
        self.writes.read().map(|w| w.clone()).unwrap_or_default()
    }

    /// Most recent value written through [`Signal::write`]
    pub fn last_write(&self) -> Option<Value> {
        self.writes.read().ok().and_then(|w| w.last().cloned())
    }
}

#[async_trait]
impl Signal for SimSignal {
    fn info(&self) -> &SignalInfo {
        &self.info
    }

    async fn read(&self) -> Result<Value> {
        self.value
            .read()
            .map(|v| v.clone())
            .map_err(|_| DeviceError::signal(&self.info.pv, "value lock poisoned"))
    }

    async fn write(&self, value: Value) -> Result<()> {
        if self.info.access == Access::ReadOnly {
            return Err(DeviceError::signal(&self.info.pv, "signal is read-only"));
        }
        debug!(pv = %self.info.pv, %value, "write");
        self.set_readback(value.clone())?;
        self.writes
            .write()
            .map_err(|_| DeviceError::signal(&self.info.pv, "write log lock poisoned"))?
            .push(value);
        Ok(())
    }
}

/// Backend producing in-memory signals, one per PV
#[derive(Debug, Clone, Default)]
pub struct SimSignalBackend {
    signals: Arc<RwLock<HashMap<String, Arc<SimSignal>>>>,
}

impl SimSignalBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the signal for a PV, keeping a typed handle
    pub fn sim_signal(&self, info: SignalInfo) -> Arc<SimSignal> {
        if let Some(existing) = self.get(&info.pv) {
            return existing;
        }
        let signal = Arc::new(SimSignal::new(info));
        if let Ok(mut signals) = self.signals.write() {
            signals.insert(signal.info.pv.clone(), signal.clone());
        }
        signal
    }

    /// Look up a signal created by this backend
    pub fn get(&self, pv: &str) -> Option<Arc<SimSignal>> {
        self.signals.read().ok().and_then(|s| s.get(pv).cloned())
    }

    /// Names of every PV created so far, sorted
    pub fn pvs(&self) -> Vec<String> {
        let mut pvs: Vec<String> = self
            .signals
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();
        pvs.sort();
        pvs
    }
}

impl SignalBackend for SimSignalBackend {
    fn signal(&self, info: SignalInfo) -> SharedSignal {
        self.sim_signal(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_write() {
        let backend = SimSignalBackend::new();
        let signal = backend.signal(SignalInfo::read_write(
            pv_name("XCS:VARS:LAM", ":Theta"),
            Kind::Normal,
            "LADM theta",
        ));

        assert_eq!(signal.read_float().await.unwrap(), None);
        signal.write(Value::Float(12.5)).await.unwrap();
        assert_eq!(signal.read_float().await.unwrap(), Some(12.5));

        let typed = backend.get("XCS:VARS:LAM:Theta").unwrap();
        assert_eq!(typed.writes(), vec![Value::Float(12.5)]);
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let signal = SimSignal::new(SignalInfo::read_only("TST:AI:1.VAL", Kind::Normal, "Converted value"));
        assert!(signal.write(Value::Float(1.0)).await.is_err());

        signal.set_readback(3.0).unwrap();
        assert_eq!(signal.read_float().await.unwrap(), Some(3.0));
        assert!(signal.last_write().is_none());
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let signal = SimSignal::new(SignalInfo::read_write("TST:AI:1.EGU", Kind::Config, "Engineering units"));
        signal.set_readback("Torr").unwrap();
        assert_eq!(signal.read_string().await.unwrap(), "Torr");
        let err = signal.read_float().await.unwrap_err();
        assert!(matches!(err, DeviceError::InvalidValueType(_, _, got) if got == "string"));
    }

    #[test]
    fn test_backend_shares_signals() {
        let backend = SimSignalBackend::new();
        let a = backend.sim_signal(SignalInfo::read_write("A", Kind::Normal, "a"));
        let b = backend.sim_signal(SignalInfo::read_write("A", Kind::Normal, "a"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(backend.pvs(), vec!["A".to_string()]);
    }
}
