/*!
 * Device implementations for beamflow.
 */

pub mod dccm;
pub mod ek9000;
pub mod ladm;

pub use dccm::{BraggCrystal, Dccm, DccmEnergy, DccmEnergyWithAcr, LightpathState};
pub use ek9000::{El3174Channel, EnvironmentalMonitor, SimpleShutter};
pub use ladm::{Ladm, MoveOutcome, RailGeometry, SoftLimits, ThetaReadback};
