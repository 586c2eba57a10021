/*!
 * Large Angle Detector Mover.
 *
 * The LADM sweeps a detector across the hutch floor on two linear rails. The
 * short rail `x1` and the long rail `x2` set the sweep angle theta, the depth
 * stage `z` keeps the detector on the sample, and `y1`/`y2` tilt the arm
 * vertically (gamma). The reference position for rail lengths is theta =
 * 27 degrees.
 *
 * Moves that involve the depth stage are sequenced to keep the rails clear
 * of it: when z has to increase it moves first and settles before the rails
 * go, otherwise the rails move first. Theta changes larger than the maximum
 * step are done in two halves.
 */
use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument, Span};

use beamflow_core::config::LadmConfig;
use beamflow_core::logging::{device_span, operation_span};
use beamflow_core::types::{Kind, Value};
use beamflow_motion::{
    require_position, stop_all, AxisBackend, CancelToken, MoveSequence, Phase, SequenceOutcome,
    SharedAxis,
};

use crate::device::{Device, DeviceError, DeviceInfo, Result};
use crate::report::{format_reading, Table};
use crate::signal::{pv_name, SharedSignal, SignalBackend, SignalInfo};

pub mod geometry;

pub use geometry::{
    Calculation, HorizontalProjection, RailGeometry, RailTargets, ThetaReadback, VerticalTargets,
};

const MAIN_AXES: [(&str, &str, &str); 5] = [
    ("x1", ":MMS:01", "X1 Upstream"),
    ("x2", ":MMS:04", "X2 Downstream"),
    ("y1", ":MMS:03", "Y1 Upstream"),
    ("y2", ":MMS:05", "Y2 Downstream"),
    ("z", ":MMS:02", "Z Upstream"),
];

const AUX_AXES: [(&str, &str, &str); 8] = [
    ("bs6_r", ":MMS:12", "Beam Stop In Out 1"),
    ("bs6_t", ":MMS:11", "Beam Stop Trans 1"),
    ("bs2_r", ":MMS:13", "Beam Stop In Out 2"),
    ("bs2_t", ":MMS:14", "Beam Stop Trans 2"),
    ("bs10_r", ":MMS:15", "Beam Stop In Out 3"),
    ("bs10_t", ":MMS:16", "Beam Stop Trans 3"),
    ("det_x", ":MMS:06", "Detector Motor x"),
    ("det_y", ":MMS:07", "Detector Motor y"),
];

/// Software bounds on the horizontal translation; `None` leaves a side open
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftLimits {
    /// Lower bound
    pub low: Option<f64>,
    /// Upper bound
    pub high: Option<f64>,
}

impl SoftLimits {
    /// Whether `x` lies strictly inside the window
    pub fn allows(&self, x: f64) -> bool {
        self.low.map_or(true, |low| x > low) && self.high.map_or(true, |high| x < high)
    }
}

/// How a sequenced LADM operation ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MoveOutcome {
    /// All phases settled; carries the readback of the moved quantity
    Completed {
        /// Theta, horizontal translation or gamma after the move
        readback: Option<f64>,
    },
    /// Cancelled; the axes were stopped
    Cancelled,
    /// The current theta is undefined, nothing moved
    Ambiguous(String),
    /// Outside the soft limits, nothing moved
    Refused(String),
}

impl MoveOutcome {
    /// Whether any motion was attempted
    pub fn moved(&self) -> bool {
        matches!(self, MoveOutcome::Completed { .. } | MoveOutcome::Cancelled)
    }
}

/// The LADM controller
#[derive(Debug)]
pub struct Ladm {
    info: DeviceInfo,
    geometry: RailGeometry,
    x1: SharedAxis,
    x2: SharedAxis,
    y1: SharedAxis,
    y2: SharedAxis,
    z: SharedAxis,
    auxiliary: BTreeMap<String, SharedAxis>,
    theta_pv: SharedSignal,
    gamma_pv: SharedSignal,
    limits: RwLock<SoftLimits>,
    span: Span,
}

impl Ladm {
    /// Create the controller, binding every axis under `config.prefix`
    pub fn new<S: Into<String>>(
        name: S,
        config: &LadmConfig,
        axes: &dyn AxisBackend,
        signals: &dyn SignalBackend,
    ) -> Self {
        let prefix = config.prefix.as_str();
        let name = name.into();
        let span = device_span(&name, prefix);
        let mut info = DeviceInfo::new(name, prefix, "LADM")
            .with_description("Large Angle Detector Mover");
        for &(axis, suffix, doc) in MAIN_AXES.iter().chain(AUX_AXES.iter()) {
            info = info.with_component(axis, suffix, Kind::Normal, doc);
        }

        let bind = |axis: &str, suffix: &str| axes.axis(axis, &pv_name(prefix, suffix));
        let auxiliary = AUX_AXES
            .iter()
            .map(|&(axis, suffix, _)| (axis.to_string(), bind(axis, suffix)))
            .collect();

        Self {
            geometry: RailGeometry::from(config),
            x1: bind("x1", ":MMS:01"),
            x2: bind("x2", ":MMS:04"),
            y1: bind("y1", ":MMS:03"),
            y2: bind("y2", ":MMS:05"),
            z: bind("z", ":MMS:02"),
            auxiliary,
            theta_pv: signals.signal(SignalInfo::read_write(
                config.theta_readback_pv.clone(),
                Kind::Normal,
                "LADM_theta",
            )),
            gamma_pv: signals.signal(SignalInfo::read_write(
                config.gamma_readback_pv.clone(),
                Kind::Normal,
                "LADM_gamma",
            )),
            limits: RwLock::new(SoftLimits {
                low: config.low_limit_x,
                high: config.high_limit_x,
            }),
            info,
            span,
        }
    }

    /// Geometry used by every conversion
    pub fn geometry(&self) -> &RailGeometry {
        &self.geometry
    }

    /// Short rail
    pub fn x1(&self) -> &SharedAxis {
        &self.x1
    }

    /// Long rail
    pub fn x2(&self) -> &SharedAxis {
        &self.x2
    }

    /// Short rail height
    pub fn y1(&self) -> &SharedAxis {
        &self.y1
    }

    /// Long rail height
    pub fn y2(&self) -> &SharedAxis {
        &self.y2
    }

    /// Depth stage
    pub fn z(&self) -> &SharedAxis {
        &self.z
    }

    /// Beam stop or detector axis by name (bs6_r, det_x, ...)
    pub fn auxiliary(&self, name: &str) -> Option<&SharedAxis> {
        self.auxiliary.get(name)
    }

    fn motion_axes(&self) -> [SharedAxis; 5] {
        [
            self.x1.clone(),
            self.x2.clone(),
            self.y1.clone(),
            self.y2.clone(),
            self.z.clone(),
        ]
    }

    fn rails_phase(&self, x1: f64, x2: f64) -> Phase {
        Phase::new("Moving x1 and x2")
            .with_move(self.x1.clone(), x1)
            .with_move(self.x2.clone(), x2)
    }

    fn z_phase(&self, z: f64) -> Phase {
        Phase::new("Moving z").with_move(self.z.clone(), z)
    }

    fn ordered(&self, name: &str, z_first: bool, rails: Phase, z: Phase) -> MoveSequence {
        let (first, second) = if z_first { (z, rails) } else { (rails, z) };
        MoveSequence::new(name)
            .then(first)
            .then(second)
            .stop_on_cancel(self.motion_axes())
    }

    /// Theta from the current rail positions
    pub async fn theta_readback(&self, samz: f64) -> Result<ThetaReadback> {
        let x1 = require_position(self.x1.as_ref()).await?;
        let x2 = require_position(self.x2.as_ref()).await?;
        Ok(self.geometry.rails_to_theta(x1, x2, samz))
    }

    async fn current_theta(&self, samz: f64) -> Result<Option<f64>> {
        match (self.x1.position().await?, self.x2.position().await?) {
            (Some(x1), Some(x2)) => Ok(self.geometry.agreed_theta(x1, x2, samz)),
            _ => Ok(None),
        }
    }

    async fn publish_theta(&self, samz: f64) -> Result<Option<f64>> {
        let theta = self.current_theta(samz).await?;
        if let Some(theta) = theta {
            self.theta_pv.write(Value::Float(theta)).await?;
        }
        Ok(theta)
    }

    /// Rail targets the mechanism would move to, without moving
    pub fn theta_move_preview(&self, theta: f64) -> String {
        self.geometry.preview(theta)
    }

    /// Rail targets for a theta and sample offset, without moving
    pub fn calculation_table(&self, theta: f64, samz: f64) -> Calculation {
        self.geometry.calculate(theta, samz)
    }

    /// Move to `theta`, splitting changes larger than the maximum step
    pub async fn move_to_theta(
        &self,
        theta: f64,
        samz: f64,
        cancel: &CancelToken,
    ) -> Result<MoveOutcome> {
        self.sequenced_theta_move(theta, samz, cancel)
            .instrument(operation_span(&self.span, "move_to_theta"))
            .await
    }

    async fn sequenced_theta_move(
        &self,
        theta: f64,
        samz: f64,
        cancel: &CancelToken,
    ) -> Result<MoveOutcome> {
        let x1 = require_position(self.x1.as_ref()).await?;
        let x2 = require_position(self.x2.as_ref()).await?;
        let current = match self.geometry.agreed_theta(x1, x2, samz) {
            Some(current) => current,
            None => {
                let report = self.geometry.disagreement_report(x1, x2, samz);
                warn!("theta is undefined, not moving:\n{}", report);
                return Ok(MoveOutcome::Ambiguous(report));
            }
        };
        debug!(current, target = theta, "theta move");

        if (theta - current).abs() > self.geometry.max_step() {
            let halfway = (theta + current) / 2.0;
            info!("Splitting theta move at {}", halfway);
            if self.theta_movement(halfway, samz, cancel).await?.is_cancelled() {
                return Ok(MoveOutcome::Cancelled);
            }
        }
        if self.theta_movement(theta, samz, cancel).await?.is_cancelled() {
            return Ok(MoveOutcome::Cancelled);
        }
        Ok(MoveOutcome::Completed {
            readback: self.current_theta(samz).await?,
        })
    }

    async fn theta_movement(
        &self,
        theta: f64,
        samz: f64,
        cancel: &CancelToken,
    ) -> Result<SequenceOutcome> {
        let targets = self.geometry.theta_to_rails(theta, samz);
        let z_now = require_position(self.z.as_ref()).await?;
        let sequence = self.ordered(
            "theta",
            z_now < targets.dz,
            self.rails_phase(targets.x1, targets.x2),
            self.z_phase(targets.dz),
        );
        let outcome = sequence.run(cancel).await?;
        self.publish_theta(samz).await?;
        Ok(outcome)
    }

    /// Command x1, x2 and z for `theta` at once, without sequencing or waiting
    pub async fn set_theta(&self, theta: f64) -> Result<()> {
        let targets = self.geometry.theta_to_rails(theta, 0.0);
        self.x1.move_to(targets.x1, false).await?;
        self.x2.move_to(targets.x2, false).await?;
        self.z.move_to(targets.dz, false).await?;
        Ok(())
    }

    /// Current soft limits
    pub fn soft_limits(&self) -> SoftLimits {
        self.limits.read().map(|l| *l).unwrap_or_default()
    }

    /// Low horizontal soft limit
    pub fn low_limit_x(&self) -> Option<f64> {
        self.soft_limits().low
    }

    /// High horizontal soft limit
    pub fn high_limit_x(&self) -> Option<f64> {
        self.soft_limits().high
    }

    /// Set the low horizontal soft limit
    pub fn set_low_limit_x(&self, value: Option<f64>) -> Result<()> {
        self.limits
            .write()
            .map_err(|_| DeviceError::other("soft limit lock poisoned"))?
            .low = value;
        Ok(())
    }

    /// Set the high horizontal soft limit
    pub fn set_high_limit_x(&self, value: Option<f64>) -> Result<()> {
        self.limits
            .write()
            .map_err(|_| DeviceError::other("soft limit lock poisoned"))?
            .high = value;
        Ok(())
    }

    /// Translate the whole mechanism horizontally to `x`
    pub async fn move_horizontal(&self, x: f64, cancel: &CancelToken) -> Result<MoveOutcome> {
        let limits = self.soft_limits();
        if !limits.allows(x) {
            let message = format!(
                "Asked to move XT to {} outside limits ({}, {}), aborting",
                x,
                format_reading(limits.low),
                format_reading(limits.high)
            );
            warn!("{}", message);
            return Ok(MoveOutcome::Refused(message));
        }

        let x12 = self.geometry.x_to_x12(x);
        let z_target = self.geometry.x_to_z(x);
        let z_now = require_position(self.z.as_ref()).await?;
        let sequence = self.ordered(
            "horizontal",
            z_target > z_now,
            self.rails_phase(x12, x12),
            self.z_phase(z_target),
        );
        self.finish_horizontal(sequence, cancel)
            .instrument(operation_span(&self.span, "move_horizontal"))
            .await
    }

    /// Translate the whole mechanism horizontally by `dx`, without limit checks
    pub async fn tweak_horizontal(&self, dx: f64, cancel: &CancelToken) -> Result<MoveOutcome> {
        let dx12 = self.geometry.x_to_x12(dx);
        let dz = self.geometry.x_to_z(dx);
        let rails = Phase::new("Moving x1 and x2")
            .with_relative(self.x1.clone(), dx12)
            .with_relative(self.x2.clone(), dx12);
        let z = Phase::new("Moving z").with_relative(self.z.clone(), dz);
        let sequence = self.ordered("horizontal tweak", dz > 0.0, rails, z);
        self.finish_horizontal(sequence, cancel)
            .instrument(operation_span(&self.span, "tweak_horizontal"))
            .await
    }

    async fn finish_horizontal(
        &self,
        sequence: MoveSequence,
        cancel: &CancelToken,
    ) -> Result<MoveOutcome> {
        if sequence.run(cancel).await?.is_cancelled() {
            return Ok(MoveOutcome::Cancelled);
        }
        Ok(MoveOutcome::Completed {
            readback: self.horizontal_readback().await?,
        })
    }

    /// Command the horizontal translation at once, without limits, sequencing or waiting
    pub async fn set_horizontal(&self, x: f64) -> Result<()> {
        let x12 = self.geometry.x_to_x12(x);
        self.x1.move_to(x12, false).await?;
        self.x2.move_to(x12, false).await?;
        self.z.move_to(self.geometry.x_to_z(x), false).await?;
        Ok(())
    }

    /// Horizontal translation, `None` when the axes disagree
    pub async fn horizontal_readback(&self) -> Result<Option<f64>> {
        let (x1, x2, z) = match (
            self.x1.position().await?,
            self.x2.position().await?,
            self.z.position().await?,
        ) {
            (Some(x1), Some(x2), Some(z)) => (x1, x2, z),
            _ => return Ok(None),
        };
        Ok(self.geometry.horizontal_readback(
            x1,
            x2,
            z,
            self.x1.deadband().await?,
            self.x2.deadband().await?,
            self.z.deadband().await?,
        ))
    }

    /// Vertical angle from the rail heights and a one line summary
    pub async fn vertical_angle(&self) -> Result<(Option<f64>, String)> {
        let y1 = self.y1.position().await?;
        let y2 = self.y2.position().await?;
        let gamma = match (y1, y2) {
            (Some(y1), Some(y2)) => {
                Some(self.geometry.y2_to_gamma(y2) - self.geometry.y1_to_gamma(y1))
            }
            _ => None,
        };
        let message = format!(
            "gamma = {}(y1 = {}/y2 = {})",
            format_reading(gamma),
            format_reading(y1),
            format_reading(y2)
        );
        Ok((gamma, message))
    }

    /// Raise both rails by `dy`
    pub async fn move_vertical(&self, dy: f64, cancel: &CancelToken) -> Result<MoveOutcome> {
        let phase = Phase::new("Moving y1 and y2")
            .with_relative(self.y1.clone(), dy)
            .with_relative(self.y2.clone(), dy);
        self.run_vertical(phase, cancel)
            .instrument(operation_span(&self.span, "move_vertical"))
            .await
    }

    /// Tilt the arm by `gamma` degrees
    pub async fn tweak_gamma(&self, gamma: f64, cancel: &CancelToken) -> Result<MoveOutcome> {
        let targets = self.geometry.gamma_to_rails(gamma);
        let phase = Phase::new("Moving y1 and y2")
            .with_relative(self.y1.clone(), targets.y1)
            .with_relative(self.y2.clone(), targets.y2);
        self.run_vertical(phase, cancel)
            .instrument(operation_span(&self.span, "tweak_gamma"))
            .await
    }

    async fn run_vertical(&self, phase: Phase, cancel: &CancelToken) -> Result<MoveOutcome> {
        let sequence = MoveSequence::new("vertical")
            .then(phase)
            .stop_on_cancel(self.motion_axes());
        if sequence.run(cancel).await?.is_cancelled() {
            return Ok(MoveOutcome::Cancelled);
        }
        let (gamma, message) = self.vertical_angle().await?;
        info!("{}", message);
        if let Some(gamma) = gamma {
            self.gamma_pv.write(Value::Float(gamma)).await?;
        }
        Ok(MoveOutcome::Completed { readback: gamma })
    }

    /// Wait for z, x1 and x2 to settle
    pub async fn wait_all(&self) -> Result<()> {
        self.z.wait().await?;
        self.x1.wait().await?;
        self.x2.wait().await?;
        Ok(())
    }
}

#[async_trait]
impl Device for Ladm {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    async fn stop(&self) -> Result<()> {
        stop_all(&self.motion_axes()).await;
        Ok(())
    }

    async fn status(&self) -> Result<Table> {
        let mut table = Table::new(["Motor", "User", "Dial"]).with_title("LADM Status");
        table.add_row([
            "Theta".to_string(),
            format_reading(self.current_theta(0.0).await?),
            "-".to_string(),
        ]);
        table.add_row([
            "XT".to_string(),
            format_reading(self.horizontal_readback().await?),
            "-".to_string(),
        ]);
        for axis in [&self.x1, &self.y1, &self.x2, &self.y2, &self.z] {
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
    use approx::assert_abs_diff_eq;
    use beamflow_motion::{AxisCall, SimBackend};
    use std::time::Duration;
    use test_log::test;

    struct Rig {
        axes: SimBackend,
        signals: SimSignalBackend,
        ladm: Ladm,
    }

    fn rig_with(config: LadmConfig, axes: SimBackend) -> Rig {
        let signals = SimSignalBackend::new();
        let ladm = Ladm::new("ladm", &config, &axes, &signals);
        Rig { axes, signals, ladm }
    }

    fn rig() -> Rig {
        rig_with(LadmConfig::default(), SimBackend::new())
    }

    impl Rig {
        fn place_at_theta(&self, theta: f64) {
            let t = self.ladm.geometry().theta_to_rails(theta, 0.0);
            for (name, position) in [("x1", t.x1), ("x2", t.x2), ("z", t.dz)] {
                self.axes.get(name).unwrap().teleport(Some(position));
            }
        }

        fn theta_pv_writes(&self) -> Vec<Value> {
            self.signals.get("XCS:VARS:LAM:Theta").unwrap().writes()
        }
    }

    #[test]
    fn test_axes_bound_to_prefix() {
        let rig = rig();
        assert_eq!(rig.ladm.x1().pv(), "XCS:LAM:MMS:01");
        assert_eq!(rig.ladm.x2().pv(), "XCS:LAM:MMS:04");
        assert_eq!(rig.ladm.y1().pv(), "XCS:LAM:MMS:03");
        assert_eq!(rig.ladm.y2().pv(), "XCS:LAM:MMS:05");
        assert_eq!(rig.ladm.z().pv(), "XCS:LAM:MMS:02");
        assert_eq!(rig.ladm.auxiliary("bs10_t").unwrap().pv(), "XCS:LAM:MMS:16");
        assert_eq!(rig.ladm.auxiliary("det_y").unwrap().pv(), "XCS:LAM:MMS:07");
        assert_eq!(rig.ladm.info().components.len(), 13);
    }

    #[test(tokio::test)]
    async fn test_z_increasing_moves_z_first() {
        let rig = rig();
        let outcome = rig
            .ladm
            .move_to_theta(10.0, 0.0, &CancelToken::new())
            .await
            .unwrap();

        let log = rig.axes.log();
        let z_wait = log.first_wait("z").unwrap();
        assert!(log.first_move("z").unwrap() < z_wait);
        assert!(z_wait < log.first_move("x1").unwrap());
        assert!(z_wait < log.first_move("x2").unwrap());

        match outcome {
            MoveOutcome::Completed { readback } => {
                assert_abs_diff_eq!(readback.unwrap(), 10.0, epsilon = 0.01)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(rig.theta_pv_writes().len(), 1);
    }

    #[test(tokio::test)]
    async fn test_z_decreasing_moves_rails_first() {
        let rig = rig();
        rig.place_at_theta(10.0);
        rig.ladm
            .move_to_theta(5.0, 0.0, &CancelToken::new())
            .await
            .unwrap();

        let log = rig.axes.log();
        let z_move = log.first_move("z").unwrap();
        assert!(log.first_move("x1").unwrap() < z_move);
        assert!(log.first_move("x2").unwrap() < z_move);
        assert!(log.first_wait("x1").unwrap() < z_move);
        assert!(log.first_wait("x2").unwrap() < z_move);
    }

    #[test(tokio::test)]
    async fn test_large_move_is_split() {
        let rig = rig();
        rig.ladm
            .move_to_theta(40.0, 0.0, &CancelToken::new())
            .await
            .unwrap();

        let geometry = rig.ladm.geometry();
        let x1_targets = rig.axes.log().targets_for("x1");
        assert_eq!(x1_targets.len(), 2);
        assert_abs_diff_eq!(geometry.x1_to_theta(x1_targets[0], 0.0), 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(geometry.x1_to_theta(x1_targets[1], 0.0), 40.0, epsilon = 1e-9);
        assert_eq!(rig.theta_pv_writes().len(), 2);
    }

    #[test(tokio::test)]
    async fn test_small_move_is_not_split() {
        let rig = rig();
        rig.place_at_theta(30.0);
        rig.ladm
            .move_to_theta(2.0, 0.0, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(rig.axes.log().targets_for("x1").len(), 1);
    }

    #[test(tokio::test)]
    async fn test_undefined_theta_does_not_move() {
        let rig = rig();
        let t = rig.ladm.geometry().theta_to_rails(10.0, 0.0);
        rig.axes.get("x1").unwrap().teleport(Some(t.x1));

        let outcome = rig
            .ladm
            .move_to_theta(20.0, 0.0, &CancelToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, MoveOutcome::Ambiguous(ref report) if report.contains("theta(x2)")));
        assert_eq!(rig.axes.log().move_count(), 0);
        assert!(!outcome.moved());
    }

    #[test(tokio::test)]
    async fn test_cancellation_stops_all_axes() {
        let axes = SimBackend::new().with_settle_time(Duration::from_secs(30));
        let rig = rig_with(LadmConfig::default(), axes);
        let token = CancelToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            rig.ladm.move_to_theta(10.0, 0.0, &token),
        )
        .await
        .expect("move ignored cancellation")
        .unwrap();

        assert_eq!(outcome, MoveOutcome::Cancelled);
        let stopped = rig.axes.log().stopped_axes();
        for axis in ["x1", "x2", "y1", "y2", "z"] {
            assert!(stopped.iter().any(|s| s == axis), "{} not stopped", axis);
        }
        assert_eq!(rig.axes.log().first_move("x1"), None);
    }

    #[test(tokio::test)]
    async fn test_axis_fault_propagates() {
        let rig = rig();
        rig.axes.get("z").unwrap().fail_next_move("following error");
        let err = rig
            .ladm
            .move_to_theta(10.0, 0.0, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Motion(_)));
    }

    #[test(tokio::test)]
    async fn test_set_theta_is_unsequenced() {
        let rig = rig();
        rig.ladm.set_theta(12.0).await.unwrap();
        let calls = rig.axes.log().calls();
        assert_eq!(calls.len(), 3);
        assert!(calls
            .iter()
            .all(|c| matches!(c, AxisCall::Move { wait: false, .. })));
    }

    #[test(tokio::test)]
    async fn test_horizontal_limits() {
        let config = LadmConfig {
            low_limit_x: Some(-10.0),
            high_limit_x: Some(10.0),
            ..LadmConfig::default()
        };
        let rig = rig_with(config, SimBackend::new());
        let cancel = CancelToken::new();

        for x in [-10.0, 10.0, 25.0] {
            let outcome = rig.ladm.move_horizontal(x, &cancel).await.unwrap();
            assert!(matches!(outcome, MoveOutcome::Refused(_)));
        }
        assert_eq!(rig.axes.log().move_count(), 0);

        let outcome = rig.ladm.move_horizontal(5.0, &cancel).await.unwrap();
        match outcome {
            MoveOutcome::Completed { readback } => {
                assert_abs_diff_eq!(readback.unwrap(), 5.0, epsilon = 1e-9)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let log = rig.axes.log();
        assert!(log.first_wait("z").unwrap() < log.first_move("x1").unwrap());
    }

    #[test(tokio::test)]
    async fn test_soft_limit_setters() {
        let rig = rig();
        assert!(rig.ladm.soft_limits().allows(1e6));
        rig.ladm.set_low_limit_x(Some(0.0)).unwrap();
        rig.ladm.set_high_limit_x(Some(1.0)).unwrap();
        assert_eq!(rig.ladm.low_limit_x(), Some(0.0));
        assert_eq!(rig.ladm.high_limit_x(), Some(1.0));
        assert!(!rig.ladm.soft_limits().allows(1.0));
        assert!(rig.ladm.soft_limits().allows(0.5));
    }

    #[test(tokio::test)]
    async fn test_tweak_horizontal_is_relative_and_unchecked() {
        let config = LadmConfig {
            high_limit_x: Some(1.0),
            ..LadmConfig::default()
        };
        let rig = rig_with(config, SimBackend::new());
        let cancel = CancelToken::new();

        rig.ladm.tweak_horizontal(-4.0, &cancel).await.unwrap();
        rig.ladm.tweak_horizontal(6.0, &cancel).await.unwrap();

        let log = rig.axes.log();
        let first_z = log
            .position_of(|c| matches!(c, AxisCall::MoveRelative { axis, .. } if axis == "z"))
            .unwrap();
        assert!(log.first_move("x1").unwrap() < first_z);
        assert_abs_diff_eq!(
            rig.ladm.horizontal_readback().await.unwrap().unwrap(),
            2.0,
            epsilon = 1e-9
        );
    }

    #[test(tokio::test)]
    async fn test_positive_tweak_moves_z_first() {
        let rig = rig();
        rig.ladm
            .tweak_horizontal(6.0, &CancelToken::new())
            .await
            .unwrap();

        let log = rig.axes.log();
        let z_move = log.first_move("z").unwrap();
        let z_wait = log.first_wait("z").unwrap();
        assert!(z_move < z_wait);
        assert!(z_wait < log.first_move("x1").unwrap());
        assert!(z_wait < log.first_move("x2").unwrap());
    }

    #[test(tokio::test)]
    async fn test_consecutive_moves_with_sample_offset() {
        let rig = rig();
        let cancel = CancelToken::new();

        let first = rig.ladm.move_to_theta(10.0, 100.0, &cancel).await.unwrap();
        match first {
            MoveOutcome::Completed { readback } => {
                assert_abs_diff_eq!(readback.unwrap(), 10.0, epsilon = 1e-6)
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let second = rig.ladm.move_to_theta(12.0, 100.0, &cancel).await.unwrap();
        match second {
            MoveOutcome::Completed { readback } => {
                assert_abs_diff_eq!(readback.unwrap(), 12.0, epsilon = 1e-6)
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let geometry = rig.ladm.geometry();
        let x1_targets = rig.axes.log().targets_for("x1");
        assert_eq!(x1_targets.len(), 2);
        assert_abs_diff_eq!(geometry.x1_to_theta(x1_targets[1], 100.0), 12.0, epsilon = 1e-9);

        let writes = rig.theta_pv_writes();
        assert_eq!(writes.len(), 2);
        assert_abs_diff_eq!(writes[1].as_float().unwrap(), 12.0, epsilon = 1e-6);
    }

    #[test(tokio::test)]
    async fn test_set_horizontal() {
        let rig = rig();
        rig.ladm.set_horizontal(3.0).await.unwrap();
        rig.ladm.wait_all().await.unwrap();
        assert_abs_diff_eq!(
            rig.ladm.horizontal_readback().await.unwrap().unwrap(),
            3.0,
            epsilon = 1e-9
        );
    }

    #[test(tokio::test)]
    async fn test_vertical_moves() {
        let rig = rig();
        let cancel = CancelToken::new();

        rig.ladm.move_vertical(2.0, &cancel).await.unwrap();
        assert_eq!(rig.ladm.y1().position().await.unwrap(), Some(2.0));
        assert_eq!(rig.ladm.y2().position().await.unwrap(), Some(2.0));

        rig.axes.get("y1").unwrap().teleport(Some(0.0));
        rig.axes.get("y2").unwrap().teleport(Some(0.0));
        let outcome = rig.ladm.tweak_gamma(1.0, &cancel).await.unwrap();
        assert!(outcome.moved());

        let (gamma, message) = rig.ladm.vertical_angle().await.unwrap();
        assert_abs_diff_eq!(gamma.unwrap(), 0.0, epsilon = 1e-9);
        assert!(message.starts_with("gamma = "));
        let gamma_pv = rig.signals.get("XCS:VARS:LAM:Gamma").unwrap();
        assert_eq!(gamma_pv.writes().len(), 2);
    }

    #[test(tokio::test)]
    async fn test_status_and_stop() {
        let rig = rig();
        rig.place_at_theta(15.0);
        rig.axes.get("x2").unwrap().teleport(Some(1.0));

        let table = rig.ladm.status().await.unwrap();
        assert_eq!(table.title(), Some("LADM Status"));
        assert_eq!(table.cell("Theta", "User"), Some("undefined"));
        assert_eq!(table.cell("x2", "User"), Some("1.0000"));
        let motors: Vec<&str> = table.rows().iter().map(|r| r[0].as_str()).collect();
        assert_eq!(motors, vec!["Theta", "XT", "x1", "y1", "x2", "y2", "z"]);

        rig.ladm.stop().await.unwrap();
        assert_eq!(rig.axes.log().stopped_axes(), vec!["x1", "x2", "y1", "y2", "z"]);
    }

    #[test]
    fn test_reports_do_not_move() {
        let rig = rig();
        let calc = rig.ladm.calculation_table(27.0, 50.0);
        assert_eq!(calc.samz_offset, 50.0);
        assert!(rig.ladm.theta_move_preview(27.0).contains("Move z to"));
        assert_eq!(rig.axes.log().calls().len(), 0);
    }
}
