/*!
 * Cards attached to EK9000 bus couplers.
 */
use serde::{Deserialize, Serialize};

use beamflow_core::types::{Kind, Value};

use crate::device::{DeviceError, Result};
use crate::signal::{pv_name, SharedSignal, SignalBackend, SignalInfo};

/// A converted analog reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Converted value, `None` when the channel has no value
    pub value: Option<f64>,
    /// Engineering units
    pub units: String,
}

/// Linear calibration of an analog channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Engineering units per ADC count
    pub slope: f64,
    /// Offset in engineering units
    pub offset: f64,
}

impl Calibration {
    /// Convert a raw ADC count
    pub fn apply(&self, raw: f64) -> f64 {
        raw * self.slope + self.offset
    }
}

/// EL3174 analog input card channel
#[derive(Debug, Clone)]
pub struct El3174Channel {
    prefix: String,
    measured: SharedSignal,
    raw_adc: SharedSignal,
    egu: SharedSignal,
    slope: SharedSignal,
    offset: SharedSignal,
    conversion: SharedSignal,
    precision: SharedSignal,
}

impl El3174Channel {
    /// Bind the channel at `prefix`
    pub fn new(prefix: &str, signals: &dyn SignalBackend) -> Self {
        let ro = |suffix: &str, kind: Kind, doc: &str| {
            signals.signal(SignalInfo::read_only(pv_name(prefix, suffix), kind, doc))
        };
        let rw = |suffix: &str, doc: &str| {
            signals.signal(SignalInfo::read_write(pv_name(prefix, suffix), Kind::Config, doc))
        };
        Self {
            prefix: prefix.to_string(),
            measured: ro(".VAL", Kind::Normal, "Converted value"),
            raw_adc: ro(".RVAL", Kind::Config, "Raw ADC count"),
            egu: rw(".EGU", "Engineering units"),
            slope: rw(".ESLO", "EGU per ADC count"),
            offset: rw(".EOFF", "Offset in EGU"),
            conversion: rw(".LINR", "Conversion"),
            precision: rw(".PREC", "Precision"),
        }
    }

    /// Base PV of the channel
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Converted value with its units
    pub async fn read(&self) -> Result<Reading> {
        let value = self.measured.read_float().await?;
        let units = match self.egu.read().await? {
            Value::String(units) => units,
            _ => String::new(),
        };
        Ok(Reading { value, units })
    }

    /// Raw ADC count
    pub async fn raw(&self) -> Result<Option<f64>> {
        self.raw_adc.read_float().await
    }

    /// Current slope and offset
    pub async fn calibration(&self) -> Result<Calibration> {
        let slope = self.slope.read_float().await?;
        let offset = self.offset.read_float().await?;
        match (slope, offset) {
            (Some(slope), Some(offset)) => Ok(Calibration { slope, offset }),
            _ => Err(DeviceError::signal(
                self.slope.pv(),
                "calibration constants are not set",
            )),
        }
    }

    /// Write a new slope and offset
    pub async fn set_calibration(&self, calibration: Calibration) -> Result<()> {
        self.slope.write(Value::Float(calibration.slope)).await?;
        self.offset.write(Value::Float(calibration.offset)).await
    }

    /// Set the engineering units
    pub async fn set_units(&self, units: &str) -> Result<()> {
        self.egu.write(Value::from(units)).await
    }

    /// Conversion mode and display precision
    pub async fn format(&self) -> Result<(Value, Value)> {
        Ok((self.conversion.read().await?, self.precision.read().await?))
    }

    /// Convert a raw count with the current calibration
    pub async fn convert_raw(&self, raw: f64) -> Result<f64> {
        Ok(self.calibration().await?.apply(raw))
    }
}

/// Pressure, humidity and temperature monitor
#[derive(Debug, Clone)]
pub struct EnvironmentalMonitor {
    /// Pressure channel
    pub pressure: El3174Channel,
    /// Relative humidity channel
    pub humidity: El3174Channel,
    /// Temperature channel
    pub temperature: El3174Channel,
}

/// One reading of every environmental channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReadings {
    /// Pressure
    pub pressure: Reading,
    /// Relative humidity
    pub humidity: Reading,
    /// Temperature
    pub temperature: Reading,
}

impl EnvironmentalMonitor {
    /// Bind the three channels under `prefix`
    pub fn new(prefix: &str, signals: &dyn SignalBackend) -> Self {
        Self {
            pressure: El3174Channel::new(&pv_name(prefix, ":1"), signals),
            humidity: El3174Channel::new(&pv_name(prefix, ":2"), signals),
            temperature: El3174Channel::new(&pv_name(prefix, ":3"), signals),
        }
    }

    /// Read every channel
    pub async fn read_all(&self) -> Result<EnvironmentReadings> {
        let (pressure, humidity, temperature) = tokio::try_join!(
            self.pressure.read(),
            self.humidity.read(),
            self.temperature.read()
        )?;
        Ok(EnvironmentReadings {
            pressure,
            humidity,
            temperature,
        })
    }
}

/// Commanded state of a relay shutter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutterState {
    /// Relay released
    Closed,
    /// Relay energized
    Open,
}

impl From<ShutterState> for Value {
    fn from(state: ShutterState) -> Self {
        Value::Integer(match state {
            ShutterState::Closed => 0,
            ShutterState::Open => 1,
        })
    }
}

/// 24 VDC shutter driven by a relay card
#[derive(Debug, Clone)]
pub struct SimpleShutter {
    actuate: SharedSignal,
}

impl SimpleShutter {
    /// Bind the relay at `prefix`
    pub fn new(prefix: &str, signals: &dyn SignalBackend) -> Self {
        Self {
            actuate: signals.signal(SignalInfo::read_write(prefix, Kind::Normal, "Actuate State")),
        }
    }

    /// Energize the relay
    pub async fn open(&self) -> Result<()> {
        self.actuate.write(ShutterState::Open.into()).await
    }

    /// Release the relay
    pub async fn close(&self) -> Result<()> {
        self.actuate.write(ShutterState::Closed.into()).await
    }

    /// Last commanded state, `None` before the first command
    pub async fn state(&self) -> Result<Option<ShutterState>> {
        let value = self.actuate.read().await?;
        if value.is_null() {
            return Ok(None);
        }
        match value.as_integer() {
            Some(0) => Ok(Some(ShutterState::Closed)),
            Some(_) => Ok(Some(ShutterState::Open)),
            None => Err(DeviceError::InvalidValueType(
                self.actuate.pv().to_string(),
                "integer".to_string(),
                value.type_name().to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Signal, SimSignalBackend};

    #[tokio::test]
    async fn test_channel_read_and_calibration() {
        let signals = SimSignalBackend::new();
        let channel = El3174Channel::new("XCS:EK9K1:AI:01", &signals);

        signals.get("XCS:EK9K1:AI:01.VAL").unwrap().set_readback(21.5).unwrap();
        channel.set_units("C").await.unwrap();
        let reading = channel.read().await.unwrap();
        assert_eq!(reading, Reading { value: Some(21.5), units: "C".to_string() });

        assert!(channel.calibration().await.is_err());
        channel
            .set_calibration(Calibration { slope: 0.5, offset: -2.0 })
            .await
            .unwrap();
        assert_eq!(channel.convert_raw(10.0).await.unwrap(), 3.0);
        assert_eq!(channel.raw().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_only_channel_value() {
        let signals = SimSignalBackend::new();
        let channel = El3174Channel::new("TST:AI", &signals);
        let measured = signals.get("TST:AI.VAL").unwrap();
        assert!(measured.write(Value::Float(1.0)).await.is_err());
        assert_eq!(channel.prefix(), "TST:AI");
    }

    #[tokio::test]
    async fn test_environmental_monitor() {
        let signals = SimSignalBackend::new();
        let monitor = EnvironmentalMonitor::new("XCS:MODS", &signals);
        signals.get("XCS:MODS:1.VAL").unwrap().set_readback(760.0).unwrap();
        signals.get("XCS:MODS:3.VAL").unwrap().set_readback(22.0).unwrap();

        let readings = monitor.read_all().await.unwrap();
        assert_eq!(readings.pressure.value, Some(760.0));
        assert_eq!(readings.humidity.value, None);
        assert_eq!(readings.temperature.value, Some(22.0));
    }

    #[tokio::test]
    async fn test_shutter() {
        let signals = SimSignalBackend::new();
        let shutter = SimpleShutter::new("XCS:SHUTTER:01", &signals);
        assert_eq!(shutter.state().await.unwrap(), None);

        shutter.open().await.unwrap();
        assert_eq!(shutter.state().await.unwrap(), Some(ShutterState::Open));
        shutter.close().await.unwrap();
        assert_eq!(shutter.state().await.unwrap(), Some(ShutterState::Closed));
        assert_eq!(signals.get("XCS:SHUTTER:01").unwrap().writes().len(), 2);
    }
}
