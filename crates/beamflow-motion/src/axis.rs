/*!
 * Axis abstraction.
 *
 * An axis is one motorized degree of freedom (a rail, a translation, a crystal
 * angle). Devices never talk to motor controllers directly; they hold shared
 * axes and drive them through this trait.
 *
 * # Contract
 * - Positions are in user units (millimetres or degrees)
 * - `move_to` and `move_relative` with `wait = false` return once the command is
 *   accepted; `wait` blocks until the most recent move settles
 * - `position` returns `None` when the controller has no valid readback
 * - `stop` is best effort and may be called at any time
 */
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MotionError, Result};

/// Status handle returned by a move request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveStatus {
    /// Name of the axis that was commanded
    pub axis: String,
    /// Requested user position
    pub target: f64,
    /// Whether the axis had settled when the handle was produced
    pub settled: bool,
}

impl MoveStatus {
    /// Create a status for a move that is still in flight
    pub fn pending<S: Into<String>>(axis: S, target: f64) -> Self {
        Self {
            axis: axis.into(),
            target,
            settled: false,
        }
    }

    /// Create a status for a move that has settled
    pub fn settled<S: Into<String>>(axis: S, target: f64) -> Self {
        Self {
            axis: axis.into(),
            target,
            settled: true,
        }
    }
}

/// A single motorized axis
#[async_trait]
pub trait Axis: Send + Sync + Debug {
    /// Short name of the axis (x1, z, th1, ...)
    fn name(&self) -> &str;

    /// Process variable the axis is bound to
    fn pv(&self) -> &str;

    /// Move to an absolute user position
    async fn move_to(&self, target: f64, wait: bool) -> Result<MoveStatus>;

    /// Move relative to the current position
    async fn move_relative(&self, delta: f64, wait: bool) -> Result<MoveStatus> {
        let current = self
            .position()
            .await?
            .ok_or_else(|| MotionError::UnknownPosition(self.name().to_string()))?;
        self.move_to(current + delta, wait).await
    }

    /// Current user position, `None` if unknown
    async fn position(&self) -> Result<Option<f64>>;

    /// Current dial (raw controller) position, `None` if unknown
    async fn dial_position(&self) -> Result<Option<f64>>;

    /// Block until the most recent move settles
    async fn wait(&self) -> Result<()>;

    /// Halt motion immediately
    async fn stop(&self) -> Result<()>;

    /// Retry deadband of the axis, the tolerance under which it counts as in position
    async fn deadband(&self) -> Result<f64>;
}

/// A reference-counted axis
pub type SharedAxis = Arc<dyn Axis>;

/// Creates axes bound to process variables
pub trait AxisBackend: Send + Sync {
    /// Create the axis `name` bound to `pv`
    fn axis(&self, name: &str, pv: &str) -> SharedAxis;
}

/// Read a position that must be known
pub async fn require_position(axis: &dyn Axis) -> Result<f64> {
    axis.position()
        .await?
        .ok_or_else(|| MotionError::UnknownPosition(axis.name().to_string()))
}
