/*!
 * Numeric helpers shared by the device crates.
 *
 * Angle conversions are `deg * PI / 180` and `rad * 180 / PI`, not
 * `f64::to_radians`; the geometry constants depend on the exact rounding.
 */
use std::f64::consts::PI;

/// Relative tolerance used by [`is_close`]
pub const DEFAULT_RTOL: f64 = 1e-5;

/// Absolute tolerance used by [`is_close`]
pub const DEFAULT_ATOL: f64 = 1e-8;

/// Convert degrees to radians
#[inline]
pub fn deg_to_rad(deg: f64) -> f64 {
    deg * PI / 180.0
}

/// Convert radians to degrees
#[inline]
pub fn rad_to_deg(rad: f64) -> f64 {
    rad * 180.0 / PI
}

/// Check `|a - b| <= atol + rtol * |b|` with the default tolerances
pub fn is_close(a: f64, b: f64) -> bool {
    is_close_with(a, b, DEFAULT_RTOL, DEFAULT_ATOL)
}

/// Check `|a - b| <= atol + rtol * |b|`
pub fn is_close_with(a: f64, b: f64, rtol: f64, atol: f64) -> bool {
    (a - b).abs() <= atol + rtol * b.abs()
}

/// Keep finite values, map NaN and infinities to `None`
#[inline]
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
