//! Tolerance helpers for comparing layout coordinates and track meters

use geo::Coord;

/// Two layout coordinates closer than this (per axis, in meters) are the same location
pub const LAYOUT_COORDINATE_DELTA: f64 = 0.001;

/// Number of decimals track meter values are resolved to
pub const DEFAULT_TRACK_METER_DECIMALS: u32 = 3;

/// Round a value half away from zero to the given number of decimals
#[inline(always)]
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Check whether two values differ by at most `delta`
#[inline(always)]
pub fn is_same_value(a: f64, b: f64, delta: f64) -> bool {
    (a - b).abs() <= delta
}

/// Check whether two coordinates are the same within `delta` on both axes
#[inline(always)]
pub fn is_same_coord(a: Coord<f64>, b: Coord<f64>, delta: f64) -> bool {
    is_same_value(a.x, b.x, delta) && is_same_value(a.y, b.y, delta)
}

/// Check whether two coordinates are the same layout location
#[inline(always)]
pub fn is_same_location(a: Coord<f64>, b: Coord<f64>) -> bool {
    is_same_coord(a, b, LAYOUT_COORDINATE_DELTA)
}
