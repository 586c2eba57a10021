/*!
 * Phased move sequences.
 *
 * A sequence is an ordered list of phases. All moves of a phase are issued
 * together, then the sequence waits for every axis of the phase to settle
 * before the next phase starts. A `CancelToken` is checked before each phase
 * and raced against the waits; on cancellation every axis registered with
 * `stop_on_cancel` receives a stop and the run reports `Cancelled`.
 */
use std::fmt;

use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::axis::SharedAxis;
use crate::cancel::CancelToken;
use crate::error::{MotionError, Result};

/// Target of one axis in a phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Absolute user position
    Absolute(f64),
    /// Offset from the current setpoint
    Relative(f64),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Absolute(target) => write!(f, "{:.4}", target),
            Command::Relative(delta) => write!(f, "{:+.4}", delta),
        }
    }
}

/// A group of moves issued together and awaited together
#[derive(Debug, Clone)]
pub struct Phase {
    label: String,
    moves: Vec<(SharedAxis, Command)>,
}

impl Phase {
    /// Create an empty phase
    pub fn new<S: Into<String>>(label: S) -> Self {
        Self {
            label: label.into(),
            moves: Vec::new(),
        }
    }

    /// Add an absolute move
    pub fn with_move(mut self, axis: SharedAxis, target: f64) -> Self {
        self.moves.push((axis, Command::Absolute(target)));
        self
    }

    /// Add a relative move
    pub fn with_relative(mut self, axis: SharedAxis, delta: f64) -> Self {
        self.moves.push((axis, Command::Relative(delta)));
        self
    }

    /// Label used in log messages
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Commanded moves, in issue order
    pub fn moves(&self) -> &[(SharedAxis, Command)] {
        &self.moves
    }

    /// Whether the phase commands nothing
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// One line summary such as `z -> 12.0000, x1 -> 3.1000`
    pub fn describe(&self) -> String {
        self.moves
            .iter()
            .map(|(axis, command)| format!("{} -> {}", axis.name(), command))
            .collect::<Vec<_>>()
            .join(", ")
    }

    async fn issue(&self) -> Result<()> {
        for (axis, command) in &self.moves {
            match command {
                Command::Absolute(target) => axis.move_to(*target, false).await?,
                Command::Relative(delta) => axis.move_relative(*delta, false).await?,
            };
        }
        Ok(())
    }

    async fn settle(&self) -> Result<()> {
        try_join_all(self.moves.iter().map(|(axis, _)| axis.wait())).await?;
        Ok(())
    }
}

/// How a sequence run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceOutcome {
    /// Every phase settled
    Completed {
        /// Number of phases run
        phases: usize,
    },
    /// Cancellation was requested and the axes were told to stop
    Cancelled {
        /// Phases that settled before cancellation
        completed_phases: usize,
    },
}

impl SequenceOutcome {
    /// Check whether the run was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SequenceOutcome::Cancelled { .. })
    }
}

/// An ordered list of phases
#[derive(Debug, Clone)]
pub struct MoveSequence {
    name: String,
    phases: Vec<Phase>,
    stop_on_cancel: Vec<SharedAxis>,
}

impl MoveSequence {
    /// Create an empty sequence
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            phases: Vec::new(),
            stop_on_cancel: Vec::new(),
        }
    }

    /// Append a phase; empty phases are skipped
    pub fn then(mut self, phase: Phase) -> Self {
        if !phase.is_empty() {
            self.phases.push(phase);
        }
        self
    }

    /// Axes stopped when the run is cancelled
    pub fn stop_on_cancel<I>(mut self, axes: I) -> Self
    where
        I: IntoIterator<Item = SharedAxis>,
    {
        self.stop_on_cancel.extend(axes);
        self
    }

    /// Sequence name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Phases in run order
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Run every phase in order
    ///
    /// An axis fault aborts the run and is returned as an error. Cancellation
    /// is not an error.
    pub async fn run(&self, cancel: &CancelToken) -> Result<SequenceOutcome> {
        if self.phases.is_empty() {
            return Err(MotionError::sequence(format!(
                "sequence {} has no phases",
                self.name
            )));
        }

        for (index, phase) in self.phases.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(index).await);
            }

            info!("{}: {}", phase.label(), phase.describe());
            phase.issue().await?;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(self.cancelled(index).await);
                }
                settled = phase.settle() => settled?,
            }
            debug!(sequence = %self.name, phase = index, "phase settled");
        }

        info!("{}: done", self.name);
        Ok(SequenceOutcome::Completed {
            phases: self.phases.len(),
        })
    }

    async fn cancelled(&self, completed_phases: usize) -> SequenceOutcome {
        warn!("{}: cancelled, stopping motors", self.name);
        stop_all(&self.stop_on_cancel).await;
        SequenceOutcome::Cancelled { completed_phases }
    }
}

/// Stop every axis, logging failures instead of returning them
pub async fn stop_all(axes: &[SharedAxis]) {
    let results = join_all(axes.iter().map(|axis| axis.stop())).await;
    for (axis, result) in axes.iter().zip(results) {
        if let Err(e) = result {
            warn!(axis = axis.name(), "stop failed: {}", e);
        }
    }
}
