/*!
 * Simulated axes.
 *
 * `SimAxis` behaves like a motor record without hardware: moves are accepted
 * immediately, the readback reaches the setpoint once the axis is waited on,
 * and every command is appended to a shared `CallLog` so tests can check the
 * order in which a device drove its axes.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::axis::{Axis, AxisBackend, MoveStatus, SharedAxis};
use crate::error::{MotionError, Result};

/// A command received by a simulated axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AxisCall {
    /// Absolute move request
    Move {
        /// Axis name
        axis: String,
        /// Requested position
        target: f64,
        /// Whether the caller asked to wait
        wait: bool,
    },
    /// Relative move request
    MoveRelative {
        /// Axis name
        axis: String,
        /// Requested offset
        delta: f64,
        /// Whether the caller asked to wait
        wait: bool,
    },
    /// Wait for the last move to settle
    Wait {
        /// Axis name
        axis: String,
    },
    /// Stop request
    Stop {
        /// Axis name
        axis: String,
    },
}

impl AxisCall {
    /// Name of the axis that received the call
    pub fn axis(&self) -> &str {
        match self {
            AxisCall::Move { axis, .. }
            | AxisCall::MoveRelative { axis, .. }
            | AxisCall::Wait { axis }
            | AxisCall::Stop { axis } => axis,
        }
    }

    /// Whether the call commands motion
    pub fn is_move(&self) -> bool {
        matches!(self, AxisCall::Move { .. } | AxisCall::MoveRelative { .. })
    }
}

/// Ordered record of every command sent to a group of simulated axes
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<AxisCall>>>);

impl CallLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: AxisCall) {
        trace!(?call, "axis call");
        if let Ok(mut calls) = self.0.lock() {
            calls.push(call);
        }
    }

    /// Snapshot of the recorded calls
    pub fn calls(&self) -> Vec<AxisCall> {
        self.0.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Forget all recorded calls
    pub fn clear(&self) {
        if let Ok(mut calls) = self.0.lock() {
            calls.clear();
        }
    }

    /// Number of move requests recorded
    pub fn move_count(&self) -> usize {
        self.calls().iter().filter(|call| call.is_move()).count()
    }

    /// Absolute targets requested from one axis, in order
    pub fn targets_for(&self, axis: &str) -> Vec<f64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                AxisCall::Move { axis: a, target, .. } if a == axis => Some(target),
                _ => None,
            })
            .collect()
    }

    /// Index of the first call matching the predicate
    pub fn position_of<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&AxisCall) -> bool,
    {
        self.calls().iter().position(predicate)
    }

    /// Index of the first move issued to an axis
    pub fn first_move(&self, axis: &str) -> Option<usize> {
        self.position_of(|call| call.is_move() && call.axis() == axis)
    }

    /// Index of the first wait issued to an axis
    pub fn first_wait(&self, axis: &str) -> Option<usize> {
        self.position_of(|call| matches!(call, AxisCall::Wait { axis: a } if a == axis))
    }

    /// Names of the axes that received a stop, in order
    pub fn stopped_axes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                AxisCall::Stop { axis } => Some(axis),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug)]
struct SimState {
    position: Option<f64>,
    setpoint: Option<f64>,
    moving: bool,
    pending_fault: Option<String>,
}

type WaitHook = Arc<dyn Fn() + Send + Sync>;

/// A simulated motor axis
pub struct SimAxis {
    name: String,
    pv: String,
    log: CallLog,
    state: Mutex<SimState>,
    dial_offset: f64,
    deadband: f64,
    settle_time: Duration,
    wait_hook: Option<WaitHook>,
}

impl fmt::Debug for SimAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimAxis")
            .field("name", &self.name)
            .field("pv", &self.pv)
            .field("state", &self.state)
            .field("dial_offset", &self.dial_offset)
            .field("deadband", &self.deadband)
            .field("settle_time", &self.settle_time)
            .finish()
    }
}

impl SimAxis {
    /// Create an axis at position 0 recording into `log`
    pub fn new<S: Into<String>>(name: S, log: CallLog) -> Self {
        let name = name.into();
        Self {
            pv: name.clone(),
            name,
            log,
            state: Mutex::new(SimState {
                position: Some(0.0),
                setpoint: Some(0.0),
                moving: false,
                pending_fault: None,
            }),
            dial_offset: 0.0,
            deadband: 0.01,
            settle_time: Duration::ZERO,
            wait_hook: None,
        }
    }

    /// Bind the axis to a PV name
    pub fn with_pv<S: Into<String>>(mut self, pv: S) -> Self {
        self.pv = pv.into();
        self
    }

    /// Start at the given position
    pub fn with_position(self, position: f64) -> Self {
        self.teleport(Some(position));
        self
    }

    /// Set the retry deadband
    pub fn with_deadband(mut self, deadband: f64) -> Self {
        self.deadband = deadband;
        self
    }

    /// Set the user to dial offset (`dial = user - offset`)
    pub fn with_dial_offset(mut self, offset: f64) -> Self {
        self.dial_offset = offset;
        self
    }

    /// Simulate a settling time on every wait
    pub fn with_settle_time(mut self, settle_time: Duration) -> Self {
        self.settle_time = settle_time;
        self
    }

    /// Run a callback each time the axis is waited on
    pub fn with_wait_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.wait_hook = Some(Arc::new(hook));
        self
    }

    /// Place the axis somewhere without recording a move; `None` makes the readback unknown
    pub fn teleport(&self, position: Option<f64>) {
        if let Ok(mut state) = self.state.lock() {
            state.position = position;
            state.setpoint = position;
            state.moving = false;
        }
    }

    /// Make the next move request fail with the given message
    pub fn fail_next_move<S: Into<String>>(&self, message: S) {
        if let Ok(mut state) = self.state.lock() {
            state.pending_fault = Some(message.into());
        }
    }

    /// Whether a move was issued and not yet waited on or stopped
    pub fn is_moving(&self) -> bool {
        self.state.lock().map(|state| state.moving).unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|_| MotionError::axis(&self.name, "simulated state lock poisoned"))
    }

    fn start_move(&self, target: f64) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(message) = state.pending_fault.take() {
            return Err(MotionError::axis(&self.name, message));
        }
        state.setpoint = Some(target);
        state.moving = true;
        Ok(())
    }

    async fn settle(&self) -> Result<()> {
        if !self.settle_time.is_zero() {
            sleep(self.settle_time).await;
        }
        let mut state = self.lock()?;
        if state.moving {
            state.position = state.setpoint;
            state.moving = false;
        }
        Ok(())
    }
}

#[async_trait]
impl Axis for SimAxis {
    fn name(&self) -> &str {
        &self.name
    }

    fn pv(&self) -> &str {
        &self.pv
    }

    async fn move_to(&self, target: f64, wait: bool) -> Result<MoveStatus> {
        self.log.push(AxisCall::Move {
            axis: self.name.clone(),
            target,
            wait,
        });
        self.start_move(target)?;
        debug!(axis = %self.name, target, "simulated move");
        if wait {
            self.settle().await?;
            Ok(MoveStatus::settled(&self.name, target))
        } else {
            Ok(MoveStatus::pending(&self.name, target))
        }
    }

    async fn move_relative(&self, delta: f64, wait: bool) -> Result<MoveStatus> {
        self.log.push(AxisCall::MoveRelative {
            axis: self.name.clone(),
            delta,
            wait,
        });
        let base = self
            .lock()?
            .setpoint
            .ok_or_else(|| MotionError::UnknownPosition(self.name.clone()))?;
        let target = base + delta;
        self.start_move(target)?;
        if wait {
            self.settle().await?;
            Ok(MoveStatus::settled(&self.name, target))
        } else {
            Ok(MoveStatus::pending(&self.name, target))
        }
    }

    async fn position(&self) -> Result<Option<f64>> {
        Ok(self.lock()?.position)
    }

    async fn dial_position(&self) -> Result<Option<f64>> {
        Ok(self.lock()?.position.map(|p| p - self.dial_offset))
    }

    async fn wait(&self) -> Result<()> {
        self.log.push(AxisCall::Wait {
            axis: self.name.clone(),
        });
        if let Some(hook) = &self.wait_hook {
            hook();
        }
        self.settle().await
    }

    async fn stop(&self) -> Result<()> {
        self.log.push(AxisCall::Stop {
            axis: self.name.clone(),
        });
        let mut state = self.lock()?;
        state.moving = false;
        state.setpoint = state.position;
        Ok(())
    }

    async fn deadband(&self) -> Result<f64> {
        Ok(self.deadband)
    }
}

/// Backend producing simulated axes that share one call log
#[derive(Debug, Clone)]
pub struct SimBackend {
    log: CallLog,
    deadband: f64,
    settle_time: Duration,
    axes: Arc<Mutex<HashMap<String, Arc<SimAxis>>>>,
}

impl SimBackend {
    /// Create a backend with a fresh call log
    pub fn new() -> Self {
        Self {
            log: CallLog::new(),
            deadband: 0.01,
            settle_time: Duration::ZERO,
            axes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Set the deadband of the axes created afterwards
    pub fn with_deadband(mut self, deadband: f64) -> Self {
        self.deadband = deadband;
        self
    }

    /// Set the settling time of the axes created afterwards
    pub fn with_settle_time(mut self, settle_time: Duration) -> Self {
        self.settle_time = settle_time;
        self
    }

    /// The shared call log
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Look up an axis created by this backend
    pub fn get(&self, name: &str) -> Option<Arc<SimAxis>> {
        self.axes.lock().ok().and_then(|axes| axes.get(name).cloned())
    }

    /// Create a simulated axis and keep a typed handle to it
    pub fn sim_axis(&self, name: &str, pv: &str) -> Arc<SimAxis> {
        let axis = Arc::new(
            SimAxis::new(name, self.log.clone())
                .with_pv(pv)
                .with_deadband(self.deadband)
                .with_settle_time(self.settle_time),
        );
        if let Ok(mut axes) = self.axes.lock() {
            axes.insert(name.to_string(), axis.clone());
        }
        axis
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AxisBackend for SimBackend {
    fn axis(&self, name: &str, pv: &str) -> SharedAxis {
        self.sim_axis(name, pv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_position_follows_wait() {
        let log = CallLog::new();
        let axis = SimAxis::new("z", log.clone());

        let status = axis.move_to(12.0, false).await.unwrap();
        assert!(!status.settled);
        assert!(axis.is_moving());
        assert_eq!(axis.position().await.unwrap(), Some(0.0));

        axis.wait().await.unwrap();
        assert_eq!(axis.position().await.unwrap(), Some(12.0));
        assert_eq!(
            log.calls(),
            vec![
                AxisCall::Move {
                    axis: "z".into(),
                    target: 12.0,
                    wait: false
                },
                AxisCall::Wait { axis: "z".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_relative_move_from_setpoint() {
        let axis = SimAxis::new("y1", CallLog::new()).with_position(5.0);
        axis.move_relative(-2.0, true).await.unwrap();
        assert_eq!(axis.position().await.unwrap(), Some(3.0));
    }

    #[tokio::test]
    async fn test_stop_holds_position() {
        let log = CallLog::new();
        let axis = SimAxis::new("x1", log.clone()).with_position(1.0);
        axis.move_to(100.0, false).await.unwrap();
        axis.stop().await.unwrap();
        axis.wait().await.unwrap();
        assert_eq!(axis.position().await.unwrap(), Some(1.0));
        assert_eq!(log.stopped_axes(), vec!["x1".to_string()]);
    }

    #[tokio::test]
    async fn test_dial_offset_and_unknown_position() {
        let axis = SimAxis::new("x2", CallLog::new())
            .with_position(10.0)
            .with_dial_offset(2.5);
        assert_eq!(axis.dial_position().await.unwrap(), Some(7.5));

        axis.teleport(None);
        assert_eq!(axis.position().await.unwrap(), None);
        assert!(axis.move_relative(1.0, false).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let axis = SimAxis::new("z", CallLog::new());
        axis.fail_next_move("following error");
        let err = axis.move_to(1.0, false).await.unwrap_err();
        assert!(matches!(err, MotionError::Axis { ref message, .. } if message == "following error"));
        assert!(axis.move_to(1.0, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_backend_shares_log() {
        let backend = SimBackend::new().with_deadband(0.05);
        let x1 = backend.axis("x1", "XCS:LAM:MMS:01");
        let x2 = backend.axis("x2", "XCS:LAM:MMS:04");
        x1.move_to(1.0, false).await.unwrap();
        x2.move_to(2.0, false).await.unwrap();

        assert_eq!(backend.log().move_count(), 2);
        assert_eq!(x2.pv(), "XCS:LAM:MMS:04");
        assert_eq!(x1.deadband().await.unwrap(), 0.05);
        assert!(backend.get("x1").is_some());
        assert_eq!(backend.log().first_move("x2"), Some(1));
    }
}
