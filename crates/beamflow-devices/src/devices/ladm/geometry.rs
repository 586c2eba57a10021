/*!
 * LADM rail geometry.
 *
 * The mechanism is positioned by two rails at distances `r` (short rail) and
 * `R` (long rail) from the sample, both inclined at the rail angle `alpha`
 * (63 degrees). Theta is the sweep angle of the arm, zero when the arm is
 * parallel to the beam. Lengths are in millimetres, angles in degrees.
 *
 * A sample z offset moves the interaction point downstream and shortens
 * both effective radii by `samz * cos(27 deg)`.
 */
use serde::{Deserialize, Serialize};

use beamflow_core::config::LadmConfig;
use beamflow_core::utils::{deg_to_rad, finite, rad_to_deg};

use crate::report::Table;

/// Rail targets for a theta
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RailTargets {
    /// Short rail position
    pub x1: f64,
    /// Long rail position
    pub x2: f64,
    /// Depth stage position
    pub dz: f64,
}

/// Rail heights for a vertical angle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerticalTargets {
    /// Short rail height
    pub y1: f64,
    /// Long rail height
    pub y2: f64,
    /// Height difference `y2 - y1`
    pub dy: f64,
}

/// Horizontal translation implied by each axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizontalProjection {
    /// From the short rail
    pub by_x1: f64,
    /// From the long rail
    pub by_x2: f64,
    /// From the depth stage
    pub by_z: f64,
}

/// Theta derived from the rail positions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ThetaReadback {
    /// Both rails give the same angle within tolerance
    Agreed(f64),
    /// The rails disagree; theta is undefined
    Disagree {
        /// Angle from the short rail
        by_x1: f64,
        /// Angle from the long rail
        by_x2: f64,
    },
    /// Readback with a sample z offset
    WithOffset {
        /// Angle from the short rail at the given offset
        by_x1: f64,
        /// Angle from the long rail at the given offset
        by_x2: f64,
        /// Offset the angles were computed with
        samz_offset: f64,
        /// Angle from the rail separation alone
        theta: f64,
        /// Offset consistent with `theta` and the short rail, if finite
        computed_samz_offset: Option<f64>,
    },
}

impl ThetaReadback {
    /// The angle, `None` when undefined
    pub fn value(&self) -> Option<f64> {
        match self {
            ThetaReadback::Agreed(theta) => Some(*theta),
            ThetaReadback::Disagree { .. } => None,
            ThetaReadback::WithOffset { theta, .. } => finite(*theta),
        }
    }

    /// Human readable summary
    pub fn describe(&self) -> String {
        match self {
            ThetaReadback::Agreed(theta) => format!("theta = {}", theta),
            ThetaReadback::Disagree { by_x1, by_x2 } => {
                format!("theta undefined: {} (by x1) / {} (by x2)", by_x1, by_x2)
            }
            ThetaReadback::WithOffset {
                by_x1,
                by_x2,
                samz_offset,
                theta,
                computed_samz_offset,
            } => format!(
                "{} (by x1) / {} (by x2) at sample z {}\nor\ntheta {} at sample z offset {}",
                by_x1,
                by_x2,
                samz_offset,
                theta,
                computed_samz_offset
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "undefined".to_string())
            ),
        }
    }
}

/// Result of a theta calculation, no motion involved
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    /// Requested theta
    pub theta: f64,
    /// Short rail target
    pub x1: f64,
    /// Long rail target
    pub x2: f64,
    /// Depth stage target
    pub dz: f64,
    /// Sample z offset used
    pub samz_offset: f64,
}

impl Calculation {
    /// Render as a one row table
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(["Theta", "x1", "x2", "delta z", "sample z offset"]);
        table.add_row([
            self.theta.to_string(),
            self.x1.to_string(),
            self.x2.to_string(),
            self.dz.to_string(),
            self.samz_offset.to_string(),
        ]);
        table
    }
}

/// Immutable LADM geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RailGeometry {
    short_radius: f64,
    long_radius: f64,
    alpha: f64,
    reference_cos: f64,
    tolerance: f64,
    max_step: f64,
}

impl RailGeometry {
    /// Build the geometry from radii and angles in degrees
    pub fn new(
        short_radius: f64,
        long_radius: f64,
        rail_angle_deg: f64,
        reference_angle_deg: f64,
    ) -> Self {
        Self {
            short_radius,
            long_radius,
            alpha: deg_to_rad(rail_angle_deg),
            reference_cos: deg_to_rad(reference_angle_deg).cos(),
            tolerance: 0.01,
            max_step: 28.0,
        }
    }

    /// Set the rail disagreement tolerance
    pub fn with_tolerance(mut self, tolerance_deg: f64) -> Self {
        self.tolerance = tolerance_deg;
        self
    }

    /// Set the largest theta change done in one sequenced move
    pub fn with_max_step(mut self, max_step_deg: f64) -> Self {
        self.max_step = max_step_deg;
        self
    }

    /// Short rail radius
    pub fn short_radius(&self) -> f64 {
        self.short_radius
    }

    /// Long rail radius
    pub fn long_radius(&self) -> f64 {
        self.long_radius
    }

    /// Rail angle in radians
    pub fn rail_angle(&self) -> f64 {
        self.alpha
    }

    /// Rail disagreement tolerance in degrees
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Largest theta change done in one sequenced move
    pub fn max_step(&self) -> f64 {
        self.max_step
    }

    fn effective(&self, radius: f64, samz: f64) -> f64 {
        radius - samz * self.reference_cos
    }

    /// Rail targets for `theta_deg`; `dz` is zero at theta zero
    pub fn theta_to_rails(&self, theta_deg: f64, samz: f64) -> RailTargets {
        let theta = deg_to_rad(theta_deg);
        let r = self.effective(self.short_radius, samz);
        let big_r = self.effective(self.long_radius, samz);
        let (sin_a, sin_at) = (self.alpha.sin(), (self.alpha + theta).sin());

        let x1 = r * theta.sin() / (sin_a * sin_at);
        let x2 = big_r * theta.sin() / (sin_a * sin_at);
        let dz = if theta == 0.0 {
            0.0
        } else {
            r / sin_a - x1 * sin_a / theta.sin()
        };
        RailTargets { x1, x2, dz }
    }

    fn rail_to_theta(&self, x: f64, radius: f64, samz: f64) -> f64 {
        let num = x * self.alpha.sin().powi(2);
        let den = self.effective(radius, samz) - x * (2.0 * self.alpha).sin() / 2.0;
        rad_to_deg((num / den).atan())
    }

    /// Theta implied by the short rail alone
    pub fn x1_to_theta(&self, x1: f64, samz: f64) -> f64 {
        self.rail_to_theta(x1, self.short_radius, samz)
    }

    /// Theta implied by the long rail alone
    pub fn x2_to_theta(&self, x2: f64, samz: f64) -> f64 {
        self.rail_to_theta(x2, self.long_radius, samz)
    }

    /// Theta from both rails
    pub fn rails_to_theta(&self, x1: f64, x2: f64, samz: f64) -> ThetaReadback {
        let by_x1 = self.x1_to_theta(x1, samz);
        let by_x2 = self.x2_to_theta(x2, samz);

        if samz > 0.0 {
            let thetar = ((x2 - x1) / (self.long_radius - self.short_radius)).atan();
            let sin_a = self.alpha.sin();
            let computed = -((x1 * sin_a.powi(2) / thetar.tan()) - self.short_radius
                + x1 * (2.0 * self.alpha).sin() / 2.0)
                / self.reference_cos;
            ThetaReadback::WithOffset {
                by_x1,
                by_x2,
                samz_offset: samz,
                theta: rad_to_deg(thetar),
                computed_samz_offset: finite(computed),
            }
        } else if (by_x1 - by_x2).abs() < self.tolerance {
            ThetaReadback::Agreed(by_x1)
        } else {
            ThetaReadback::Disagree { by_x1, by_x2 }
        }
    }

    /// Theta both rails agree on at sample offset `samz`, `None` if they don't
    pub fn agreed_theta(&self, x1: f64, x2: f64, samz: f64) -> Option<f64> {
        let by_x1 = self.x1_to_theta(x1, samz);
        let by_x2 = self.x2_to_theta(x2, samz);
        ((by_x1 - by_x2).abs() < self.tolerance)
            .then_some(by_x1)
            .and_then(finite)
    }

    /// What each rail would need for the other rail's angle
    pub fn disagreement_report(&self, x1: f64, x2: f64, samz: f64) -> String {
        let theta1 = self.x1_to_theta(x1, samz);
        let theta2 = self.x2_to_theta(x2, samz);
        let by_1 = self.theta_to_rails(theta1, 0.0);
        let by_2 = self.theta_to_rails(theta2, 0.0);
        format!(
            "theta(x1) = {}.\nShould move x2 to {}.\nShould move z to {}.\n\
             theta(x2) = {}.\nShould move x1 to {}.\nShould move z to {}",
            theta1, by_1.x2, by_1.dz, theta2, by_2.x1, by_2.dz
        )
    }

    /// Move preview for `theta_deg`
    pub fn preview(&self, theta_deg: f64) -> String {
        let targets = self.theta_to_rails(theta_deg, 0.0);
        format!(
            "Move x1 to {}.\nMove x2 to {}.\nMove z to {}.",
            targets.x1, targets.x2, targets.dz
        )
    }

    /// Rail targets for a theta and offset, as a report
    pub fn calculate(&self, theta_deg: f64, samz: f64) -> Calculation {
        let targets = self.theta_to_rails(theta_deg, samz);
        Calculation {
            theta: theta_deg,
            x1: targets.x1,
            x2: targets.x2,
            dz: targets.dz,
            samz_offset: samz,
        }
    }

    /// Rail heights for a vertical angle
    pub fn gamma_to_rails(&self, gamma_deg: f64) -> VerticalTargets {
        let gamma = deg_to_rad(gamma_deg);
        let y1 = self.short_radius * gamma.tan();
        let y2 = self.long_radius * gamma.tan();
        VerticalTargets { y1, y2, dy: y2 - y1 }
    }

    /// Vertical angle implied by the short rail height
    pub fn y1_to_gamma(&self, y1: f64) -> f64 {
        rad_to_deg((y1 / self.short_radius).atan())
    }

    /// Vertical angle implied by the long rail height
    pub fn y2_to_gamma(&self, y2: f64) -> f64 {
        rad_to_deg((y2 / self.long_radius).atan())
    }

    /// Rail displacement for a horizontal translation
    pub fn x_to_x12(&self, x: f64) -> f64 {
        x / self.alpha.sin()
    }

    /// Depth displacement for a horizontal translation
    pub fn x_to_z(&self, x: f64) -> f64 {
        x / self.alpha.tan()
    }

    /// Horizontal translation implied by each axis
    pub fn rails_to_x(&self, x1: f64, x2: f64, z: f64) -> HorizontalProjection {
        HorizontalProjection {
            by_x1: x1 * self.alpha.sin(),
            by_x2: x2 * self.alpha.sin(),
            by_z: z * self.alpha.tan(),
        }
    }

    /// Horizontal translation when the axes agree within their deadbands
    pub fn horizontal_readback(
        &self,
        x1: f64,
        x2: f64,
        z: f64,
        deadband_x1: f64,
        deadband_x2: f64,
        deadband_z: f64,
    ) -> Option<f64> {
        let projection = self.rails_to_x(x1, x2, z);
        if (projection.by_x1 - projection.by_x2).abs() > deadband_x1 + deadband_x2 {
            return None;
        }
        let z_theo = self.x_to_z(projection.by_x1);
        ((z - z_theo).abs() < 2.0 * deadband_z).then_some(projection.by_x1)
    }
}

impl From<&LadmConfig> for RailGeometry {
    fn from(config: &LadmConfig) -> Self {
        RailGeometry::new(
            config.short_rail_radius,
            config.long_rail_radius,
            config.rail_angle_deg,
            config.reference_angle_deg,
        )
        .with_tolerance(config.theta_tolerance_deg)
        .with_max_step(config.max_theta_step_deg)
    }
}

impl Default for RailGeometry {
    fn default() -> Self {
        RailGeometry::from(&LadmConfig::default())
    }
}
