/*!
 * Double Channel Cut Monochromator.
 *
 * The DCCM selects the photon energy through the Bragg angle of its
 * crystals. `DccmEnergy` lets callers command energy in keV while the
 * upstream crystal axis `th1` moves in degrees.
 */
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, Instrument, Span};

use beamflow_core::config::DccmConfig;
use beamflow_core::logging::{device_span, operation_span};
use beamflow_core::types::{Kind, Value};
use beamflow_core::utils::{deg_to_rad, is_close, rad_to_deg};
use beamflow_motion::{AxisBackend, MoveStatus, SharedAxis};

use crate::device::{Device, DeviceError, DeviceInfo, Result};
use crate::report::{format_reading, Table};
use crate::signal::{pv_name, SharedSignal, SignalBackend, SignalInfo};

/// Planck constant times the speed of light, in eV angstrom
pub const HC_EV_ANGSTROM: f64 = 12398.419;

/// Lattice spacing of the Si(111) reflection, in angstrom
pub const SI_111_D_SPACING: f64 = 3.1356011499587773;

/// Bragg's law for one crystal reflection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BraggCrystal {
    d_spacing: f64,
}

impl BraggCrystal {
    /// Crystal with lattice spacing `d_spacing` in angstrom
    pub fn new(d_spacing: f64) -> Self {
        Self { d_spacing }
    }

    /// Lattice spacing in angstrom
    pub fn d_spacing(&self) -> f64 {
        self.d_spacing
    }

    /// Bragg angle in degrees for a photon energy in keV
    pub fn energy_to_angle(&self, energy_kev: f64) -> Result<f64> {
        let sin_theta = HC_EV_ANGSTROM / (energy_kev * 1000.0) / (2.0 * self.d_spacing);
        if !sin_theta.is_finite() || sin_theta.abs() > 1.0 {
            return Err(DeviceError::domain(format!(
                "no Bragg angle for {} keV with d = {} A",
                energy_kev, self.d_spacing
            )));
        }
        Ok(rad_to_deg(sin_theta.asin()))
    }

    /// Photon energy in keV for a Bragg angle in degrees
    pub fn angle_to_energy(&self, angle_deg: f64) -> Result<f64> {
        let energy = HC_EV_ANGSTROM / (2.0 * self.d_spacing * deg_to_rad(angle_deg).sin()) / 1000.0;
        if !energy.is_finite() {
            return Err(DeviceError::domain(format!(
                "no photon energy for a Bragg angle of {} deg",
                angle_deg
            )));
        }
        Ok(energy)
    }
}

impl Default for BraggCrystal {
    fn default() -> Self {
        Self::new(SI_111_D_SPACING)
    }
}

/// Energy coordinate of the pseudo positioner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PseudoPosition {
    /// Photon energy in keV
    pub energy: f64,
}

/// Real coordinate of the pseudo positioner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealPosition {
    /// Upstream crystal angle in degrees
    pub th1: f64,
}

/// Energy pseudo positioner over the upstream crystal axis
#[derive(Debug, Clone)]
pub struct DccmEnergy {
    crystal: BraggCrystal,
    th1: SharedAxis,
    limits: (f64, f64),
}

impl DccmEnergy {
    /// Positioner over `th1` with energy limits from `config`
    pub fn new(th1: SharedAxis, config: &DccmConfig) -> Self {
        Self {
            crystal: BraggCrystal::new(config.lattice_spacing),
            th1,
            limits: (config.energy_low_kev, config.energy_high_kev),
        }
    }

    /// Crystal used for the conversions
    pub fn crystal(&self) -> &BraggCrystal {
        &self.crystal
    }

    /// Energy limits in keV
    pub fn limits(&self) -> (f64, f64) {
        self.limits
    }

    /// Setpoint of the real axis for an energy
    pub fn forward(&self, pseudo: PseudoPosition) -> Result<RealPosition> {
        Ok(RealPosition {
            th1: self.crystal.energy_to_angle(pseudo.energy)?,
        })
    }

    /// Energy for a real axis position
    pub fn inverse(&self, real: RealPosition) -> Result<PseudoPosition> {
        Ok(PseudoPosition {
            energy: self.crystal.angle_to_energy(real.th1)?,
        })
    }

    fn check_limits(&self, energy: f64) -> Result<()> {
        let (low, high) = self.limits;
        if !(low..=high).contains(&energy) {
            return Err(DeviceError::out_of_range(
                "energy",
                format!("{} keV is outside [{}, {}] keV", energy, low, high),
            ));
        }
        Ok(())
    }

    /// Move to a photon energy in keV
    pub async fn move_energy(&self, energy: f64, wait: bool) -> Result<MoveStatus> {
        self.check_limits(energy)?;
        let real = self.forward(PseudoPosition { energy })?;
        info!("Moving {} to {} deg for {} keV", self.th1.name(), real.th1, energy);
        Ok(self.th1.move_to(real.th1, wait).await?)
    }

    /// Current energy in keV, `None` when the angle is unknown
    pub async fn energy(&self) -> Result<Option<f64>> {
        match self.th1.position().await? {
            Some(th1) => Ok(Some(self.inverse(RealPosition { th1 })?.energy)),
            None => Ok(None),
        }
    }

    /// Current angle of the real axis in degrees
    pub async fn angle(&self) -> Result<Option<f64>> {
        Ok(self.th1.position().await?)
    }
}

/// Hutch of a DCCM prefix: XPP and XCS are recognised, everything else is TST
pub fn infer_hutch(prefix: &str) -> &'static str {
    if prefix.contains("XPP") {
        "XPP"
    } else if prefix.contains("XCS") {
        "XCS"
    } else {
        "TST"
    }
}

/// Energy positioner that also requests the energy from ACR
#[derive(Debug, Clone)]
pub struct DccmEnergyWithAcr {
    energy: DccmEnergy,
    hutch: String,
    acr_status_suffix: String,
    pv_index: u32,
    request: SharedSignal,
    status: SharedSignal,
}

impl DccmEnergyWithAcr {
    /// Wrap `energy`; the hutch is inferred from `prefix` unless given
    pub fn new(
        energy: DccmEnergy,
        prefix: &str,
        hutch: Option<&str>,
        config: &DccmConfig,
        signals: &dyn SignalBackend,
    ) -> Self {
        let hutch = hutch.unwrap_or_else(|| infer_hutch(prefix)).to_string();
        let request = signals.signal(SignalInfo::read_write(
            format!("{}:USER:MCC:EPHOT:SET{}", hutch, config.acr_pv_index),
            Kind::Normal,
            "ACR photon energy request (eV)",
        ));
        let status = signals.signal(SignalInfo::read_only(
            format!("SIOC:SYS0:ML00:{}", config.acr_status_suffix),
            Kind::Normal,
            "ACR move status",
        ));
        Self {
            energy,
            hutch,
            acr_status_suffix: config.acr_status_suffix.clone(),
            pv_index: config.acr_pv_index,
            request,
            status,
        }
    }

    /// Hutch the requests are made for
    pub fn hutch(&self) -> &str {
        &self.hutch
    }

    /// Suffix of the ACR status PV
    pub fn acr_status_suffix(&self) -> &str {
        &self.acr_status_suffix
    }

    /// Index of the ACR request PV
    pub fn pv_index(&self) -> u32 {
        self.pv_index
    }

    /// The wrapped energy positioner
    pub fn positioner(&self) -> &DccmEnergy {
        &self.energy
    }

    /// Request the energy from ACR in eV, then move the crystal
    pub async fn move_energy(&self, energy: f64, wait: bool) -> Result<MoveStatus> {
        self.energy.check_limits(energy)?;
        let ev = energy * 1000.0;
        debug!(pv = self.request.pv(), ev, "ACR energy request");
        self.request.write(Value::Float(ev)).await?;
        self.energy.move_energy(energy, wait).await
    }

    /// Last status reported by ACR
    pub async fn acr_status(&self) -> Result<Option<f64>> {
        self.status.read_float().await
    }
}

/// Position of the chamber translation relative to the beam
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightpathState {
    /// At the saved "in" position
    pub inserted: bool,
    /// At the saved "out" position
    pub removed: bool,
    /// Fraction of the beam passed downstream
    pub transmission: f64,
}

/// The full DCCM assembly
#[derive(Debug)]
pub struct Dccm {
    info: DeviceInfo,
    th1: SharedAxis,
    th2: SharedAxis,
    tx: SharedAxis,
    txd: SharedAxis,
    tyd: SharedAxis,
    energy: DccmEnergy,
    energy_with_acr: DccmEnergyWithAcr,
    in_position: f64,
    out_position: f64,
    span: Span,
}

impl Dccm {
    /// Create the assembly under `config.prefix`
    pub fn new<S: Into<String>>(
        name: S,
        config: &DccmConfig,
        axes: &dyn AxisBackend,
        signals: &dyn SignalBackend,
    ) -> Self {
        let prefix = config.prefix.as_str();
        let name = name.into();
        let span = device_span(&name, prefix);
        let bind = |axis: &str, suffix: &str| axes.axis(axis, &pv_name(prefix, suffix));
        let th1 = bind("th1", ":MMS:TH1");
        let energy = DccmEnergy::new(th1.clone(), config);
        let energy_with_acr =
            DccmEnergyWithAcr::new(energy.clone(), prefix, None, config, signals);

        let info = DeviceInfo::new(name, prefix, "DCCM")
            .with_description("Double Channel Cut Monochromator")
            .with_component("th1", ":MMS:TH1", Kind::Normal, "Bragg Upstream/TH1 Axis")
            .with_component("th2", ":MMS:TH2", Kind::Normal, "Bragg Downstream/TH2 Axis")
            .with_component("tx", ":MMS:TX", Kind::Normal, "Translation X Axis")
            .with_component("txd", ":MMS:TXD", Kind::Normal, "YAG Diagnostic X Axis")
            .with_component("tyd", ":MMS:TYD", Kind::Normal, "YAG Diagnostic Y Axis")
            .with_component("energy", "", Kind::Hinted, "DCCM Photon Energy");

        Self {
            info,
            th2: bind("th2", ":MMS:TH2"),
            tx: bind("tx", ":MMS:TX"),
            txd: bind("txd", ":MMS:TXD"),
            tyd: bind("tyd", ":MMS:TYD"),
            th1,
            energy,
            energy_with_acr,
            in_position: config.in_position,
            out_position: config.out_position,
            span,
        }
    }

    /// Energy positioner
    pub fn energy(&self) -> &DccmEnergy {
        &self.energy
    }

    /// Energy positioner that also requests the energy from ACR
    pub fn energy_with_acr(&self) -> &DccmEnergyWithAcr {
        &self.energy_with_acr
    }

    /// Upstream crystal axis
    pub fn th1(&self) -> &SharedAxis {
        &self.th1
    }

    /// Downstream crystal axis
    pub fn th2(&self) -> &SharedAxis {
        &self.th2
    }

    /// Chamber translation
    pub fn tx(&self) -> &SharedAxis {
        &self.tx
    }

    fn axes(&self) -> [&SharedAxis; 5] {
        [&self.th1, &self.th2, &self.tx, &self.txd, &self.tyd]
    }

    /// Move the chamber to the saved "in" position
    pub async fn insert(&self, wait: bool) -> Result<MoveStatus> {
        Ok(self
            .tx
            .move_to(self.in_position, wait)
            .instrument(operation_span(&self.span, "insert"))
            .await?)
    }

    /// Move the chamber to the saved "out" position
    pub async fn remove(&self, wait: bool) -> Result<MoveStatus> {
        Ok(self
            .tx
            .move_to(self.out_position, wait)
            .instrument(operation_span(&self.span, "remove"))
            .await?)
    }

    /// Lightpath state for a chamber position
    pub fn lightpath_state(&self, tx: f64) -> LightpathState {
        let removed = is_close(tx, self.out_position);
        LightpathState {
            inserted: is_close(tx, self.in_position),
            removed,
            transmission: if removed { 1.0 } else { 0.9 },
        }
    }

    /// Lightpath state at the current chamber position
    pub async fn current_lightpath_state(&self) -> Result<Option<LightpathState>> {
        Ok(self
            .tx
            .position()
            .await?
            .map(|tx| self.lightpath_state(tx)))
    }
}

#[async_trait]
impl Device for Dccm {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    async fn stop(&self) -> Result<()> {
        for axis in self.axes() {
            axis.stop().await?;
        }
        Ok(())
    }

    async fn status(&self) -> Result<Table> {
        let mut table = Table::new(["Motor", "User", "Dial"]).with_title("DCCM Status");
        table.add_row([
            "Energy (keV)".to_string(),
            format_reading(self.energy.energy().await?),
            "-".to_string(),
        ]);
        for axis in self.axes() {
            table.add_row([
                axis.name().to_string(),
                format_reading(axis.position().await?),
                format_reading(axis.dial_position().await?),
            ]);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SimSignalBackend;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use beamflow_motion::{Axis, SimBackend};

    fn dccm() -> (SimBackend, SimSignalBackend, Dccm) {
        let axes = SimBackend::new();
        let signals = SimSignalBackend::new();
        let dccm = Dccm::new("dccm", &DccmConfig::default(), &axes, &signals);
        (axes, signals, dccm)
    }

    #[test]
    fn test_energy_round_trip() {
        let crystal = BraggCrystal::default();
        for energy in [4.0, 7.112, 9.5, 12.0, 18.3, 25.0] {
            let angle = crystal.energy_to_angle(energy).unwrap();
            assert_relative_eq!(
                crystal.angle_to_energy(angle).unwrap(),
                energy,
                max_relative = 1e-9
            );
        }
    }

    #[test]
    fn test_known_angle() {
        let crystal = BraggCrystal::default();
        let angle = crystal.energy_to_angle(8.0).unwrap();
        assert_abs_diff_eq!(angle, 14.31, epsilon = 0.01);
    }

    #[test]
    fn test_domain_errors() {
        let crystal = BraggCrystal::default();
        assert!(matches!(crystal.energy_to_angle(1.0), Err(DeviceError::Domain(_))));
        assert!(matches!(crystal.energy_to_angle(0.0), Err(DeviceError::Domain(_))));
        assert!(matches!(crystal.angle_to_energy(0.0), Err(DeviceError::Domain(_))));
    }

    #[test]
    fn test_hutch_inference() {
        assert_eq!(infer_hutch("XPP:MON:MPZ:07A"), "XPP");
        assert_eq!(infer_hutch("XCS:DCCM"), "XCS");
        assert_eq!(infer_hutch("SP1L0:DCCM"), "TST");
    }

    #[tokio::test]
    async fn test_move_energy() {
        let (axes, _signals, dccm) = dccm();
        dccm.energy().move_energy(10.0, true).await.unwrap();

        let th1 = axes.get("th1").unwrap().position().await.unwrap().unwrap();
        assert_relative_eq!(th1, BraggCrystal::default().energy_to_angle(10.0).unwrap());
        assert_relative_eq!(dccm.energy().energy().await.unwrap().unwrap(), 10.0, max_relative = 1e-9);
        assert_eq!(dccm.th1().pv(), "SP1L0:DCCM:MMS:TH1");
    }

    #[tokio::test]
    async fn test_energy_limits() {
        let (axes, _signals, dccm) = dccm();
        let err = dccm.energy().move_energy(30.0, false).await.unwrap_err();
        assert!(matches!(err, DeviceError::ValueOutOfRange(ref q, _) if q == "energy"));
        assert_eq!(axes.log().move_count(), 0);
    }

    #[tokio::test]
    async fn test_acr_request_in_ev() {
        let (axes, signals, dccm) = dccm();
        let acr = dccm.energy_with_acr();
        assert_eq!(acr.hutch(), "TST");
        assert_eq!(acr.acr_status_suffix(), "AO805");
        assert_eq!(acr.pv_index(), 2);

        acr.move_energy(9.5, false).await.unwrap();
        let request = signals.get("TST:USER:MCC:EPHOT:SET2").unwrap();
        assert_eq!(request.last_write(), Some(Value::Float(9500.0)));
        assert_eq!(axes.log().move_count(), 1);
        assert_eq!(acr.acr_status().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_remove_lightpath() {
        let (_axes, _signals, dccm) = dccm();
        dccm.remove(true).await.unwrap();
        let state = dccm.current_lightpath_state().await.unwrap().unwrap();
        assert!(state.removed && !state.inserted);
        assert_eq!(state.transmission, 1.0);

        dccm.insert(true).await.unwrap();
        let state = dccm.current_lightpath_state().await.unwrap().unwrap();
        assert!(state.inserted && !state.removed);
        assert_eq!(state.transmission, 0.9);

        let state = dccm.lightpath_state(-12.0);
        assert!(!state.inserted && !state.removed);
    }

    #[tokio::test]
    async fn test_status_and_stop() {
        let (axes, _signals, dccm) = dccm();
        dccm.energy().move_energy(12.0, true).await.unwrap();
        let table = dccm.status().await.unwrap();
        assert_eq!(table.cell("Energy (keV)", "User"), Some("12.0000"));
        assert_eq!(table.rows().len(), 6);

        dccm.stop().await.unwrap();
        assert_eq!(axes.log().stopped_axes(), vec!["th1", "th2", "tx", "txd", "tyd"]);
    }
}
